//! Per-intention CSRF tokens kept in the session.
//!
//! Each destructive form (`delete_experience`, `delete_oauth_client`, ...)
//! gets its own token; the token lives as long as the session.

use std::collections::HashMap;

use axum::Form;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::session::SESSION_KEY_CSRF_TOKENS;
use crate::error::{AppError, Result};
use crate::services::signature::secrets_match;

pub const DELETE_EXPERIENCE_TOKEN: &str = "delete_summary_experience";
pub const DELETE_TRAINING_TOKEN: &str = "delete_summary_training";
pub const DELETE_LANGUAGE_TOKEN: &str = "delete_summary_language";
pub const DELETE_SOCIAL_SHARE_TOKEN: &str = "delete_social_share";
pub const DELETE_OAUTH_CLIENT_TOKEN: &str = "delete_oauth_client";
pub const COMMITTEE_TOKEN: &str = "committee";

/// Returns the session token for `intention`, generating it on first use
pub async fn csrf_token(session: &Session, intention: &str) -> Result<String> {
    let mut tokens: HashMap<String, String> = session
        .get(SESSION_KEY_CSRF_TOKENS)
        .await?
        .unwrap_or_default();

    if let Some(token) = tokens.get(intention) {
        return Ok(token.clone());
    }

    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("failed to generate CSRF token")))?;
    let token = hex::encode(bytes);

    tokens.insert(intention.to_string(), token.clone());
    session.insert(SESSION_KEY_CSRF_TOKENS, tokens).await?;

    Ok(token)
}

pub async fn is_csrf_token_valid(session: &Session, intention: &str, submitted: &str) -> Result<bool> {
    let tokens: HashMap<String, String> = session
        .get(SESSION_KEY_CSRF_TOKENS)
        .await?
        .unwrap_or_default();

    Ok(match tokens.get(intention) {
        Some(expected) => secrets_match(expected.as_bytes(), submitted.as_bytes()),
        None => false,
    })
}

/// Guards a delete action: a missing token means no form was submitted,
/// a wrong one is rejected; both answer 404.
pub async fn check_delete_form(session: &Session, intention: &str, submitted: Option<&str>) -> Result<()> {
    let Some(submitted) = submitted else {
        return Err(AppError::NotFound("No form submitted.".to_string()));
    };

    if !is_csrf_token_valid(session, intention, submitted).await? {
        return Err(AppError::NotFound("Invalid token.".to_string()));
    }

    Ok(())
}

/// Delete forms post `_token`; a bare DELETE may carry it in the query string
#[derive(Debug, Default, Deserialize)]
pub struct DeleteForm {
    #[serde(rename = "_token")]
    pub token: Option<String>,
}

pub fn submitted_token(query: DeleteForm, form: Option<Form<DeleteForm>>) -> Option<String> {
    form.and_then(|Form(form)| form.token).or(query.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_token_is_stable_per_intention() {
        let session = session();

        let first = csrf_token(&session, DELETE_EXPERIENCE_TOKEN).await.unwrap();
        let again = csrf_token(&session, DELETE_EXPERIENCE_TOKEN).await.unwrap();
        let other = csrf_token(&session, DELETE_TRAINING_TOKEN).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn test_delete_form_checks() {
        let session = session();
        let token = csrf_token(&session, DELETE_LANGUAGE_TOKEN).await.unwrap();

        assert!(check_delete_form(&session, DELETE_LANGUAGE_TOKEN, Some(&token)).await.is_ok());

        let missing = check_delete_form(&session, DELETE_LANGUAGE_TOKEN, None).await;
        assert!(matches!(missing, Err(AppError::NotFound(m)) if m == "No form submitted."));

        let wrong = check_delete_form(&session, DELETE_LANGUAGE_TOKEN, Some("bogus")).await;
        assert!(matches!(wrong, Err(AppError::NotFound(m)) if m == "Invalid token."));

        let other_intention = check_delete_form(&session, DELETE_TRAINING_TOKEN, Some(&token)).await;
        assert!(other_intention.is_err());
    }

    #[test]
    fn test_submitted_token_prefers_form_body() {
        let query = DeleteForm {
            token: Some("from-query".to_string()),
        };
        let body = DeleteForm {
            token: Some("from-body".to_string()),
        };

        assert_eq!(
            submitted_token(query, Some(Form(body))).as_deref(),
            Some("from-body")
        );
        assert_eq!(
            submitted_token(
                DeleteForm {
                    token: Some("from-query".to_string())
                },
                None
            )
            .as_deref(),
            Some("from-query")
        );
        assert_eq!(submitted_token(DeleteForm::default(), None), None);
    }
}
