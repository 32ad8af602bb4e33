use std::path::{Path as FsPath, PathBuf};

use askama::Template;
use axum::{
    extract::{Path, Query, Request, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::auth::HOME_PATH;
use crate::api::flash::{self, Flash};
use crate::api::middleware::{
    auth::{current_adherent, require_auth},
    session::AppState,
};
use crate::error::{AppError, Result};
use crate::models::{Adherent, Committee};
use crate::services::mailer::{Mailer, Message};
use crate::services::validation::FormErrors;

pub const DOCUMENTS_ADHERENTS: &str = "adherents";
pub const DOCUMENTS_HOSTS: &str = "hosts";

const CONTACT_ORIGINS: [&str; 2] = ["event", "committee"];

#[derive(Debug, Clone)]
pub struct Document {
    pub kind: &'static str,
    pub name: String,
}

impl Document {
    pub fn url(&self) -> String {
        format!("/espace-adherent/documents/{}/{}", self.kind, self.name)
    }
}

/// Plain file names only, no hidden files or path components
fn is_safe_document_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

fn document_kind(kind: &str) -> Option<&'static str> {
    match kind {
        DOCUMENTS_ADHERENTS => Some(DOCUMENTS_ADHERENTS),
        DOCUMENTS_HOSTS => Some(DOCUMENTS_HOSTS),
        _ => None,
    }
}

/// Files of `<documents_dir>/<kind>`, sorted by name; a missing directory lists nothing
async fn list_documents(documents_dir: &str, kind: &'static str) -> Result<Vec<Document>> {
    let dir = FsPath::new(documents_dir).join(kind);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(AppError::Internal(e.into())),
    };

    let mut documents = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::Internal(e.into()))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && is_safe_document_name(&name) {
            documents.push(Document { kind, name });
        }
    }
    documents.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(documents)
}

#[derive(Template)]
#[template(path = "adherent/documents.html")]
struct DocumentsTemplate {
    flashes: Vec<Flash>,
    adherent_documents: Vec<Document>,
    host_documents: Vec<Document>,
    is_host: bool,
}

async fn documents(State(state): State<AppState>, session: Session) -> Result<DocumentsTemplate> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let is_host = Committee::is_host(&state.pool, adherent.id).await?;

    let host_documents = if is_host {
        list_documents(&state.config.documents_dir, DOCUMENTS_HOSTS).await?
    } else {
        vec![]
    };

    Ok(DocumentsTemplate {
        flashes: flash::take_flashes(&session).await?,
        adherent_documents: list_documents(&state.config.documents_dir, DOCUMENTS_ADHERENTS).await?,
        host_documents,
        is_host,
    })
}

async fn download_document(
    State(state): State<AppState>,
    session: Session,
    Path((kind, name)): Path<(String, String)>,
    request: Request,
) -> Result<Response> {
    let adherent = current_adherent(&session, &state.pool).await?;

    let kind = document_kind(&kind)
        .ok_or_else(|| AppError::NotFound("Unknown document type".to_string()))?;
    if !is_safe_document_name(&name) {
        return Err(AppError::NotFound("Document not found".to_string()));
    }
    if kind == DOCUMENTS_HOSTS && !Committee::is_host(&state.pool, adherent.id).await? {
        return Err(AppError::Forbidden);
    }

    let path: PathBuf = FsPath::new(&state.config.documents_dir).join(kind).join(&name);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(AppError::NotFound("Document not found".to_string()));
    }

    tracing::debug!(adherent_id = %adherent.id, kind, name = %name, "Document downloaded");

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}

#[derive(Debug, Default, Deserialize)]
struct ContactQuery {
    from: Option<String>,
    id: Option<String>,
}

/// Where the contact form was opened from, used to send the sender back
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContactOrigin {
    from: String,
    id: Uuid,
}

impl ContactQuery {
    fn origin(&self) -> Result<Option<ContactOrigin>> {
        let Some(from) = self.from.as_deref().filter(|f| !f.is_empty()) else {
            return Ok(None);
        };

        if !CONTACT_ORIGINS.contains(&from) {
            return Err(AppError::BadRequest(format!("Invalid origin \"{}\"", from)));
        }

        let id = self
            .id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| AppError::BadRequest("Invalid origin id".to_string()))?;

        Ok(Some(ContactOrigin {
            from: from.to_string(),
            id,
        }))
    }

    fn query_string(&self) -> String {
        match (&self.from, &self.id) {
            (Some(from), Some(id)) => format!("?from={}&id={}", from, id),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContactForm {
    content: String,
}

#[derive(Template)]
#[template(path = "adherent/contact.html")]
struct ContactTemplate {
    flashes: Vec<Flash>,
    recipient: Adherent,
    action: String,
    content: String,
    errors: FormErrors,
}

async fn find_recipient(state: &AppState, uuid: &str) -> Result<Adherent> {
    let id = Uuid::parse_str(uuid)
        .map_err(|_| AppError::NotFound("Adherent not found".to_string()))?;

    Adherent::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Adherent not found".to_string()))
}

async fn contact_form(
    State(state): State<AppState>,
    session: Session,
    Path(uuid): Path<String>,
    Query(query): Query<ContactQuery>,
) -> Result<ContactTemplate> {
    current_adherent(&session, &state.pool).await?;
    let recipient = find_recipient(&state, &uuid).await?;
    query.origin()?;

    Ok(ContactTemplate {
        flashes: flash::take_flashes(&session).await?,
        action: format!("/espace-adherent/contacter/{}{}", recipient.id, query.query_string()),
        recipient,
        content: String::new(),
        errors: FormErrors::new(),
    })
}

async fn contact(
    State(state): State<AppState>,
    session: Session,
    Path(uuid): Path<String>,
    Query(query): Query<ContactQuery>,
    Form(form): Form<ContactForm>,
) -> Result<Response> {
    let sender = current_adherent(&session, &state.pool).await?;
    let recipient = find_recipient(&state, &uuid).await?;
    let origin = query.origin()?;

    let mut errors = FormErrors::new();
    errors.not_blank("content", &form.content);
    if !errors.is_empty() {
        return Ok(ContactTemplate {
            flashes: vec![],
            action: format!("/espace-adherent/contacter/{}{}", recipient.id, query.query_string()),
            recipient,
            content: form.content,
            errors,
        }
        .into_response());
    }

    Mailer::new(state.pool.clone())
        .send(&Message::adherent_contact(
            &sender.email,
            &sender.full_name(),
            &recipient.email,
            form.content.trim(),
        ))
        .await?;
    tracing::info!(sender_id = %sender.id, recipient_id = %recipient.id, "Adherent contacted");

    flash::info(&session, "Votre message a bien été envoyé.").await?;

    let target = match origin {
        Some(ContactOrigin { from, id }) if from == "committee" => {
            match Committee::find_by_id(&state.pool, id).await? {
                Some(committee) => format!("/comites/{}", committee.slug),
                None => HOME_PATH.to_string(),
            }
        }
        _ => HOME_PATH.to_string(),
    };

    Ok(Redirect::to(&target).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/espace-adherent/documents", get(documents))
        .route(
            "/espace-adherent/documents/:kind/:name",
            get(download_document),
        )
        .route(
            "/espace-adherent/contacter/:uuid",
            get(contact_form).post(contact),
        )
        .route_layer(axum::middleware::from_fn(require_auth))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(from: Option<&str>, id: Option<&str>) -> ContactQuery {
        ContactQuery {
            from: from.map(str::to_string),
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn test_contact_origin() {
        let id = Uuid::new_v4();

        assert_eq!(query(None, None).origin().unwrap(), None);
        assert_eq!(
            query(Some("committee"), Some(&id.to_string())).origin().unwrap(),
            Some(ContactOrigin {
                from: "committee".to_string(),
                id
            })
        );
        assert!(matches!(
            query(Some("foo"), Some(&id.to_string())).origin(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            query(Some("event"), Some("foo")).origin(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            query(Some("event"), None).origin(),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_document_names() {
        assert!(is_safe_document_name("charte-des-comites.pdf"));
        assert!(!is_safe_document_name("../secret.pdf"));
        assert!(!is_safe_document_name("hosts/guide.pdf"));
        assert!(!is_safe_document_name(".env"));
        assert!(!is_safe_document_name(""));
    }

    #[test]
    fn test_document_kinds() {
        assert_eq!(document_kind("hosts"), Some(DOCUMENTS_HOSTS));
        assert_eq!(document_kind("adherents"), Some(DOCUMENTS_ADHERENTS));
        assert_eq!(document_kind("referents"), None);
    }

    #[tokio::test]
    async fn test_missing_documents_directory_lists_nothing() {
        let documents = list_documents("/nonexistent/documents", DOCUMENTS_ADHERENTS)
            .await
            .unwrap();
        assert!(documents.is_empty());
    }
}
