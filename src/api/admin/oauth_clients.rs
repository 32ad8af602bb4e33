use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::csrf::{self, submitted_token, DeleteForm, DELETE_OAUTH_CLIENT_TOKEN};
use crate::api::flash::{self, Flash};
use crate::api::form::{Choice, FormData};
use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::oauth_client::{GrantType, OAuthClient, Scope};
use crate::services::validation::FormErrors;

const LIST_PATH: &str = "/admin/oauth-clients";

/// Submitted client fields; grant types and scopes stay raw so the
/// domain model decides whether they are acceptable
#[derive(Debug, Clone, Default)]
struct OAuthClientForm {
    name: String,
    description: String,
    redirect_uris: Vec<String>,
    allowed_grant_types: Vec<String>,
    supported_scopes: Vec<String>,
    ask_user_for_authorization: bool,
}

impl OAuthClientForm {
    fn from_fields(form: &FormData) -> Self {
        Self {
            name: form.get("name").trim().to_string(),
            description: form.get("description").trim().to_string(),
            redirect_uris: form.all("redirect_uris"),
            allowed_grant_types: form.all("allowed_grant_types"),
            supported_scopes: form.all("supported_scopes"),
            ask_user_for_authorization: form.checked("ask_user_for_authorization"),
        }
    }

    fn from_client(client: &OAuthClient) -> Self {
        Self {
            name: client.name().to_string(),
            description: client.description().to_string(),
            redirect_uris: client.redirect_uris().to_vec(),
            allowed_grant_types: client
                .allowed_grant_types()
                .iter()
                .map(|g| g.as_str().to_string())
                .collect(),
            supported_scopes: client
                .supported_scopes()
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            ask_user_for_authorization: client.ask_user_for_authorization(),
        }
    }

    /// Copies the form onto `client`; unknown grant types or scopes abort
    /// before anything is changed
    fn apply(&self, client: &mut OAuthClient) -> Result<()> {
        let mut candidate = client.clone();

        candidate.set_name(&self.name);
        candidate.set_description(&self.description);
        for uri in client.redirect_uris() {
            candidate.remove_redirect_uri(uri);
        }
        for uri in &self.redirect_uris {
            candidate.add_redirect_uri(uri);
        }
        candidate.set_allowed_grant_types(self.allowed_grant_types.as_slice())?;
        candidate.set_supported_scopes(self.supported_scopes.as_slice())?;
        candidate.set_ask_user_for_authorization(self.ask_user_for_authorization);

        *client = candidate;
        Ok(())
    }

    fn build_client(&self) -> Result<OAuthClient> {
        let mut client = OAuthClient::new(
            &self.name,
            &self.description,
            None,
            self.allowed_grant_types.as_slice(),
            vec![],
        )?;
        self.apply(&mut client)?;
        Ok(client)
    }
}

fn validate(client: &OAuthClient) -> FormErrors {
    let mut errors = FormErrors::new();
    errors.not_blank("name", client.name());
    errors.merge(client.validate());
    errors
}

#[derive(Template)]
#[template(path = "admin/oauth_clients/list.html")]
struct OAuthClientListTemplate {
    flashes: Vec<Flash>,
    clients: Vec<OAuthClient>,
    delete_token: String,
}

#[derive(Template)]
#[template(path = "admin/oauth_clients/form.html")]
struct OAuthClientFormTemplate {
    flashes: Vec<Flash>,
    action: String,
    is_new: bool,
    grant_types: Vec<Choice>,
    scopes: Vec<Choice>,
    form: OAuthClientForm,
    errors: FormErrors,
}

impl OAuthClientFormTemplate {
    fn new(id: Option<Uuid>, form: OAuthClientForm, errors: FormErrors) -> Self {
        let grant_types = GrantType::ALL
            .iter()
            .map(|g| Choice {
                value: g.as_str(),
                label: g.as_str(),
                selected: form.allowed_grant_types.iter().any(|v| v == g.as_str()),
            })
            .collect();
        let scopes = Scope::ALL
            .iter()
            .map(|s| Choice {
                value: s.as_str(),
                label: s.as_str(),
                selected: form.supported_scopes.iter().any(|v| v == s.as_str()),
            })
            .collect();

        Self {
            flashes: vec![],
            action: match id {
                Some(id) => format!("{}/{}", LIST_PATH, id),
                None => format!("{}/nouveau", LIST_PATH),
            },
            is_new: id.is_none(),
            grant_types,
            scopes,
            form,
            errors,
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::NotFound("OAuth client not found".to_string()))
}

async fn find_client(state: &AppState, id: &str) -> Result<OAuthClient> {
    OAuthClient::find_by_id(&state.pool, parse_id(id)?)
        .await?
        .ok_or_else(|| AppError::NotFound("OAuth client not found".to_string()))
}

async fn list_clients(
    State(state): State<AppState>,
    session: Session,
) -> Result<OAuthClientListTemplate> {
    Ok(OAuthClientListTemplate {
        flashes: flash::take_flashes(&session).await?,
        clients: OAuthClient::list(&state.pool).await?,
        delete_token: csrf::csrf_token(&session, DELETE_OAUTH_CLIENT_TOKEN).await?,
    })
}

async fn new_client(session: Session) -> Result<OAuthClientFormTemplate> {
    let form = OAuthClientForm {
        ask_user_for_authorization: true,
        ..Default::default()
    };

    let mut template = OAuthClientFormTemplate::new(None, form, FormErrors::new());
    template.flashes = flash::take_flashes(&session).await?;
    Ok(template)
}

async fn create_client(
    State(state): State<AppState>,
    session: Session,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let form = OAuthClientForm::from_fields(&FormData::new(fields));
    let client = form.build_client()?;

    let errors = validate(&client);
    if !errors.is_empty() {
        return Ok(OAuthClientFormTemplate::new(None, form, errors).into_response());
    }

    let client = client.insert(&state.pool).await?;
    tracing::info!(oauth_client_id = %client.id, name = %client, "OAuth client created");

    flash::info(&session, "Le client OAuth a bien été créé.").await?;

    Ok(Redirect::to(LIST_PATH).into_response())
}

async fn edit_client(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<OAuthClientFormTemplate> {
    let client = find_client(&state, &id).await?;

    let mut template = OAuthClientFormTemplate::new(
        Some(client.id),
        OAuthClientForm::from_client(&client),
        FormErrors::new(),
    );
    template.flashes = flash::take_flashes(&session).await?;
    Ok(template)
}

async fn update_client(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let mut client = find_client(&state, &id).await?;
    let form = OAuthClientForm::from_fields(&FormData::new(fields));
    form.apply(&mut client)?;

    let errors = validate(&client);
    if !errors.is_empty() {
        return Ok(OAuthClientFormTemplate::new(Some(client.id), form, errors).into_response());
    }

    client.update(&state.pool).await?;
    tracing::info!(oauth_client_id = %client.id, "OAuth client updated");

    flash::info(&session, "Le client OAuth a bien été mis à jour.").await?;

    Ok(Redirect::to(LIST_PATH).into_response())
}

async fn delete_client(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Query(query): Query<DeleteForm>,
    form: Option<Form<DeleteForm>>,
) -> Result<Redirect> {
    let token = submitted_token(query, form);
    csrf::check_delete_form(&session, DELETE_OAUTH_CLIENT_TOKEN, token.as_deref()).await?;

    let client = find_client(&state, &id).await?;
    OAuthClient::delete(&state.pool, client.id).await?;
    tracing::info!(oauth_client_id = %client.id, "OAuth client deleted");

    flash::info(&session, "Le client OAuth a bien été supprimé.").await?;

    Ok(Redirect::to(LIST_PATH))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(LIST_PATH, get(list_clients))
        .route(
            "/admin/oauth-clients/nouveau",
            get(new_client).post(create_client),
        )
        .route(
            "/admin/oauth-clients/:id",
            get(edit_client).post(update_client),
        )
        .route(
            "/admin/oauth-clients/:id/supprimer",
            post(delete_client).delete(delete_client),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FormData {
        FormData::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn valid_form() -> OAuthClientForm {
        OAuthClientForm::from_fields(&fields(&[
            ("name", "En-Marche !"),
            ("description", "Plateforme Citoyenne de la République En-Marche !"),
            ("redirect_uris[]", "http://client-oauth.docker:8000/client/receive_authcode"),
            ("allowed_grant_types[]", "authorization_code"),
            ("allowed_grant_types[]", "refresh_token"),
            ("supported_scopes[]", "public"),
            ("ask_user_for_authorization", "1"),
        ]))
    }

    #[test]
    fn test_form_builds_client() {
        let client = valid_form().build_client().unwrap();

        assert_eq!(client.name(), "En-Marche !");
        assert!(client.is_allowed_grant_type("refresh_token"));
        assert!(client.supports_scope("public"));
        assert_eq!(client.redirect_uris().len(), 1);
        assert_eq!(client.secret().len(), 64);
        assert!(validate(&client).is_empty());
    }

    #[test]
    fn test_invalid_grant_type_leaves_client_untouched() {
        let mut client = valid_form().build_client().unwrap();
        let mut form = OAuthClientForm::from_client(&client);
        form.name = "Renamed".to_string();
        form.allowed_grant_types.push("implicit".to_string());

        assert!(form.apply(&mut client).is_err());
        assert_eq!(client.name(), "En-Marche !");
        assert_eq!(client.allowed_grant_types().len(), 2);
    }

    #[test]
    fn test_form_constraints() {
        let mut form = valid_form();
        form.name = String::new();
        form.description = "Trop court".chars().take(5).collect();
        form.redirect_uris.clear();
        form.allowed_grant_types.clear();

        let client = form.build_client().unwrap();
        let errors = validate(&client);

        assert!(errors.has("name"));
        assert!(errors.has("description"));
        assert!(errors.has("redirect_uris"));
        assert!(errors.has("allowed_grant_types"));
    }

    #[test]
    fn test_redirect_uris_are_replaced() {
        let mut client = valid_form().build_client().unwrap();
        let mut form = OAuthClientForm::from_client(&client);
        form.redirect_uris = vec!["https://example.fr/callback".to_string()];

        form.apply(&mut client).unwrap();

        assert_eq!(
            client.redirect_uris().to_vec(),
            vec!["https://example.fr/callback".to_string()]
        );
    }
}
