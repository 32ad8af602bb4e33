use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::services::signature::secrets_match;
use crate::services::validation::FormErrors;

/// Domain errors raised when an OAuth client is given values outside its
/// closed enumerations. These abort the whole mutation.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum OAuthClientError {
    #[error("\"{0}\" is not a valid grant type. Use one of: authorization_code, client_credentials, refresh_token, password.")]
    InvalidGrantType(String),

    #[error("{0} is not supported. Choose one of: public, user_profile, read:users, write:users.")]
    InvalidScope(String),

    #[error("{0} is already supported")]
    DuplicateScope(String),

    #[error("Failed to generate client secret")]
    SecretGeneration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
    Password,
}

impl GrantType {
    pub const ALL: [GrantType; 4] = [
        GrantType::AuthorizationCode,
        GrantType::ClientCredentials,
        GrantType::RefreshToken,
        GrantType::Password,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
            GrantType::Password => "password",
        }
    }
}

impl FromStr for GrantType {
    type Err = OAuthClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GrantType::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| OAuthClientError::InvalidGrantType(s.to_string()))
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "user_profile")]
    UserProfile,
    #[serde(rename = "read:users")]
    ReadUsers,
    #[serde(rename = "write:users")]
    WriteUsers,
}

impl Scope {
    pub const ALL: [Scope; 4] = [
        Scope::Public,
        Scope::UserProfile,
        Scope::ReadUsers,
        Scope::WriteUsers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Public => "public",
            Scope::UserProfile => "user_profile",
            Scope::ReadUsers => "read:users",
            Scope::WriteUsers => "write:users",
        }
    }
}

impl FromStr for Scope {
    type Err = OAuthClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| OAuthClientError::InvalidScope(s.to_string()))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Random 32-byte secret, hex encoded
pub fn generate_secret() -> Result<String, OAuthClientError> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| OAuthClientError::SecretGeneration)?;

    Ok(hex::encode(bytes))
}

#[derive(Debug, Clone, Serialize)]
pub struct OAuthClient {
    pub id: Uuid,
    name: String,
    description: String,
    redirect_uris: Vec<String>,
    #[serde(skip_serializing)]
    secret: String,
    allowed_grant_types: Vec<GrantType>,
    supported_scopes: Vec<Scope>,
    ask_user_for_authorization: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OAuthClient {
    /// Builds a client; a missing secret is generated
    pub fn new<S: AsRef<str>>(
        name: &str,
        description: &str,
        secret: Option<String>,
        allowed_grant_types: &[S],
        redirect_uris: Vec<String>,
    ) -> Result<Self, OAuthClientError> {
        let secret = match secret.filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => generate_secret()?,
        };

        let mut client = Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            redirect_uris: Vec::new(),
            secret,
            allowed_grant_types: Vec::new(),
            supported_scopes: Vec::new(),
            ask_user_for_authorization: true,
            created_at: None,
            updated_at: None,
        };

        client.set_allowed_grant_types(allowed_grant_types)?;
        for uri in redirect_uris {
            client.add_redirect_uri(&uri);
        }

        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    /// Redirect URIs form a set: adding a known URI is a no-op
    pub fn add_redirect_uri(&mut self, uri: &str) {
        if !self.has_redirect_uri(uri) {
            self.redirect_uris.push(uri.to_string());
        }
    }

    pub fn remove_redirect_uri(&mut self, uri: &str) {
        self.redirect_uris.retain(|u| u != uri);
    }

    pub fn redirect_uris(&self) -> &[String] {
        &self.redirect_uris
    }

    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Replaces the grant types; nothing changes if any value is unknown
    pub fn set_allowed_grant_types<S: AsRef<str>>(
        &mut self,
        grant_types: &[S],
    ) -> Result<(), OAuthClientError> {
        let parsed = grant_types
            .iter()
            .map(|g| g.as_ref().parse::<GrantType>())
            .collect::<Result<Vec<_>, _>>()?;

        self.allowed_grant_types = parsed;
        Ok(())
    }

    pub fn allowed_grant_types(&self) -> &[GrantType] {
        &self.allowed_grant_types
    }

    pub fn is_allowed_grant_type(&self, grant_type: &str) -> bool {
        self.allowed_grant_types
            .iter()
            .any(|g| g.as_str() == grant_type)
    }

    pub fn add_supported_scope(&mut self, scope: &str) -> Result<(), OAuthClientError> {
        if self.supports_scope(scope) {
            return Err(OAuthClientError::DuplicateScope(scope.to_string()));
        }

        let scope: Scope = scope.parse()?;
        self.supported_scopes.push(scope);
        Ok(())
    }

    /// Replaces the supported scopes; nothing changes on an unknown or duplicated scope
    pub fn set_supported_scopes<S: AsRef<str>>(
        &mut self,
        scopes: &[S],
    ) -> Result<(), OAuthClientError> {
        let mut candidate = self.clone();
        candidate.supported_scopes.clear();
        for scope in scopes {
            candidate.add_supported_scope(scope.as_ref())?;
        }

        self.supported_scopes = candidate.supported_scopes;
        Ok(())
    }

    pub fn supports_scope(&self, scope: &str) -> bool {
        self.supported_scopes.iter().any(|s| s.as_str() == scope)
    }

    pub fn supported_scopes(&self) -> &[Scope] {
        &self.supported_scopes
    }

    pub fn verify_secret(&self, secret: &str) -> bool {
        secrets_match(self.secret.as_bytes(), secret.as_bytes())
    }

    pub fn ask_user_for_authorization(&self) -> bool {
        self.ask_user_for_authorization
    }

    pub fn set_ask_user_for_authorization(&mut self, ask: bool) {
        self.ask_user_for_authorization = ask;
    }

    /// Form-level constraints, checked before persisting
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();

        errors.max_length("name", &self.name, 32);
        errors.min_length(
            "description",
            &self.description,
            10,
            "La description doit faire au moins 10 caractères.",
        );
        errors.max_length("description", &self.description, 200);

        if self.redirect_uris.is_empty() {
            errors.add(
                "redirect_uris",
                "Veuillez spécifier au moins une adresse de redirection.",
            );
        }
        for uri in &self.redirect_uris {
            errors.optional_url("redirect_uris", uri);
        }

        if self.allowed_grant_types.is_empty() {
            errors.add("allowed_grant_types", crate::services::validation::NOT_BLANK);
        }

        errors
    }
}

impl fmt::Display for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, FromRow)]
struct OAuthClientRow {
    id: Uuid,
    name: String,
    description: String,
    redirect_uris: Json<Vec<String>>,
    secret: String,
    allowed_grant_types: Vec<String>,
    supported_scopes: Vec<String>,
    ask_user_for_authorization: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OAuthClientRow> for OAuthClient {
    type Error = OAuthClientError;

    fn try_from(row: OAuthClientRow) -> Result<Self, Self::Error> {
        let mut client = OAuthClient::new(
            &row.name,
            &row.description,
            Some(row.secret),
            row.allowed_grant_types.as_slice(),
            row.redirect_uris.0,
        )?;
        client.id = row.id;
        client.set_supported_scopes(row.supported_scopes.as_slice())?;
        client.ask_user_for_authorization = row.ask_user_for_authorization;
        client.created_at = Some(row.created_at);
        client.updated_at = Some(row.updated_at);

        Ok(client)
    }
}

fn decode_error(e: OAuthClientError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

fn grant_type_strings(client: &OAuthClient) -> Vec<String> {
    client
        .allowed_grant_types
        .iter()
        .map(|g| g.as_str().to_string())
        .collect()
}

fn scope_strings(client: &OAuthClient) -> Vec<String> {
    client
        .supported_scopes
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

impl OAuthClient {
    /// Inserts a new client
    pub async fn insert(&self, pool: &PgPool) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, OAuthClientRow>(
            r#"
            INSERT INTO oauth_clients (
                id, name, description, redirect_uris, secret,
                allowed_grant_types, supported_scopes, ask_user_for_authorization
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.description)
        .bind(Json(&self.redirect_uris))
        .bind(&self.secret)
        .bind(grant_type_strings(self))
        .bind(scope_strings(self))
        .bind(self.ask_user_for_authorization)
        .fetch_one(pool)
        .await?;

        OAuthClient::try_from(row).map_err(decode_error)
    }

    /// Writes every mutable attribute back
    pub async fn update(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE oauth_clients
            SET
                name = $2,
                description = $3,
                redirect_uris = $4,
                allowed_grant_types = $5,
                supported_scopes = $6,
                ask_user_for_authorization = $7,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.description)
        .bind(Json(&self.redirect_uris))
        .bind(grant_type_strings(self))
        .bind(scope_strings(self))
        .bind(self.ask_user_for_authorization)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, OAuthClientRow>(
            r#"
            SELECT * FROM oauth_clients WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        row.map(OAuthClient::try_from)
            .transpose()
            .map_err(decode_error)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, OAuthClientRow>(
            r#"
            SELECT * FROM oauth_clients
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|row| OAuthClient::try_from(row).map_err(decode_error))
            .collect()
    }

    /// Soft delete
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE oauth_clients SET deleted_at = NOW() WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient::new(
            "En-Marche !",
            "Plateforme citoyenne",
            None,
            &["authorization_code", "refresh_token"],
            vec!["https://en-marche.fr/callback".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_new_generates_secret() {
        let client = client();

        assert_eq!(client.secret().len(), 64);
        assert!(client.verify_secret(&client.secret().to_string()));
        assert!(!client.verify_secret("wrong"));
        assert!(client.ask_user_for_authorization());
        assert_eq!(client.to_string(), "En-Marche !");
    }

    #[test]
    fn test_invalid_grant_type_is_rejected_without_partial_update() {
        let mut client = client();

        let result = client.set_allowed_grant_types(&["client_credentials", "implicit"]);

        assert_eq!(
            result,
            Err(OAuthClientError::InvalidGrantType("implicit".to_string()))
        );
        assert!(client.is_allowed_grant_type("authorization_code"));
        assert!(!client.is_allowed_grant_type("client_credentials"));
    }

    #[test]
    fn test_new_with_invalid_grant_type_fails() {
        let result = OAuthClient::new("x", "description", None, &["foo"], vec![]);

        assert!(matches!(result, Err(OAuthClientError::InvalidGrantType(g)) if g == "foo"));
    }

    #[test]
    fn test_scopes() {
        let mut client = client();

        client.add_supported_scope("public").unwrap();
        assert!(client.supports_scope("public"));

        assert_eq!(
            client.add_supported_scope("public"),
            Err(OAuthClientError::DuplicateScope("public".to_string()))
        );
        assert_eq!(
            client.add_supported_scope("admin"),
            Err(OAuthClientError::InvalidScope("admin".to_string()))
        );

        assert!(client
            .set_supported_scopes(&["user_profile", "user_profile"])
            .is_err());
        assert_eq!(client.supported_scopes(), &[Scope::Public]);

        client
            .set_supported_scopes(&["user_profile", "read:users"])
            .unwrap();
        assert_eq!(
            client.supported_scopes(),
            &[Scope::UserProfile, Scope::ReadUsers]
        );
    }

    #[test]
    fn test_redirect_uris_have_set_semantics() {
        let mut client = client();

        client.add_redirect_uri("https://en-marche.fr/callback");
        client.add_redirect_uri("https://app.en-marche.fr/callback");
        assert_eq!(client.redirect_uris().len(), 2);

        client.remove_redirect_uri("https://en-marche.fr/callback");
        assert!(!client.has_redirect_uri("https://en-marche.fr/callback"));
        assert_eq!(
            client.redirect_uris(),
            &["https://app.en-marche.fr/callback".to_string()]
        );
    }

    #[test]
    fn test_validation_constraints() {
        let mut client = OAuthClient::new(
            "A name that is definitely longer than thirty-two characters",
            "Short",
            Some("secret".to_string()),
            &[] as &[&str],
            vec![],
        )
        .unwrap();

        let errors = client.validate();
        assert!(errors.has("name"));
        assert!(errors.has("description"));
        assert!(errors.has("redirect_uris"));
        assert!(errors.has("allowed_grant_types"));

        client.set_name("Client");
        client.set_description("Une description correcte");
        client.add_redirect_uri("https://client.example.org/cb");
        client.set_allowed_grant_types(&["password"]).unwrap();
        assert!(client.validate().is_empty());
    }
}
