use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::csrf::{self, submitted_token, DeleteForm, DELETE_SOCIAL_SHARE_TOKEN};
use crate::api::flash::{self, Flash};
use crate::api::form::{single_choice, Choice};
use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::social_share::{
    SocialShare, SocialShareCategory, SocialShareData, SocialShareListItem, TYPES,
};
use crate::services::validation::FormErrors;

const LIST_PATH: &str = "/admin/social-shares";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SocialShareForm {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    category: String,
    media: String,
    default_url: String,
    description: String,
    twitter_url: String,
    facebook_url: String,
    position: String,
    published: Option<String>,
}

impl SocialShareForm {
    fn from_share(share: &SocialShare) -> Self {
        Self {
            name: share.name.clone(),
            kind: share.kind.clone(),
            category: share.category_id.to_string(),
            media: share.media.clone(),
            default_url: share.default_url.clone(),
            description: share.description.clone(),
            twitter_url: share.twitter_url.clone().unwrap_or_default(),
            facebook_url: share.facebook_url.clone().unwrap_or_default(),
            position: share.position.to_string(),
            published: share.published.then(|| "1".to_string()),
        }
    }

    fn to_data(&self) -> (FormErrors, SocialShareData) {
        let optional = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        let mut errors = FormErrors::new();
        let position = match self.position.trim() {
            "" => 1,
            value => value.parse::<i32>().unwrap_or_else(|_| {
                errors.add("position", "Cette valeur doit être un nombre entier.");
                1
            }),
        };

        let data = SocialShareData {
            name: self.name.clone(),
            kind: self.kind.clone(),
            category_id: Uuid::parse_str(self.category.trim()).ok(),
            media: self.media.clone(),
            default_url: self.default_url.clone(),
            description: self.description.clone(),
            twitter_url: optional(&self.twitter_url),
            facebook_url: optional(&self.facebook_url),
            position,
            published: self.published.is_some(),
        };
        errors.merge(data.validate());

        (errors, data)
    }
}

/// Category select option
struct CategoryOption {
    id: Uuid,
    name: String,
    selected: bool,
}

#[derive(Template)]
#[template(path = "admin/social_shares/list.html")]
struct SocialShareListTemplate {
    flashes: Vec<Flash>,
    shares: Vec<SocialShareListItem>,
    delete_token: String,
}

#[derive(Template)]
#[template(path = "admin/social_shares/form.html")]
struct SocialShareFormTemplate {
    flashes: Vec<Flash>,
    action: String,
    is_new: bool,
    types: Vec<Choice>,
    categories: Vec<CategoryOption>,
    form: SocialShareForm,
    errors: FormErrors,
}

impl SocialShareFormTemplate {
    async fn new(
        state: &AppState,
        id: Option<Uuid>,
        form: SocialShareForm,
        errors: FormErrors,
    ) -> Result<Self> {
        let categories = SocialShareCategory::list(&state.pool)
            .await?
            .into_iter()
            .map(|c| CategoryOption {
                selected: c.id.to_string() == form.category,
                id: c.id,
                name: c.name,
            })
            .collect();

        Ok(Self {
            flashes: vec![],
            action: match id {
                Some(id) => format!("{}/{}", LIST_PATH, id),
                None => format!("{}/nouveau", LIST_PATH),
            },
            is_new: id.is_none(),
            types: single_choice(&TYPES, &form.kind),
            categories,
            form,
            errors,
        })
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::NotFound("Social share not found".to_string()))
}

async fn find_share(state: &AppState, id: &str) -> Result<SocialShare> {
    SocialShare::find_by_id(&state.pool, parse_id(id)?)
        .await?
        .ok_or_else(|| AppError::NotFound("Social share not found".to_string()))
}

async fn list_shares(
    State(state): State<AppState>,
    session: Session,
) -> Result<SocialShareListTemplate> {
    Ok(SocialShareListTemplate {
        flashes: flash::take_flashes(&session).await?,
        shares: SocialShare::list(&state.pool).await?,
        delete_token: csrf::csrf_token(&session, DELETE_SOCIAL_SHARE_TOKEN).await?,
    })
}

async fn new_share(
    State(state): State<AppState>,
    session: Session,
) -> Result<SocialShareFormTemplate> {
    let form = SocialShareForm {
        kind: "image".to_string(),
        position: "1".to_string(),
        ..Default::default()
    };

    let mut template = SocialShareFormTemplate::new(&state, None, form, FormErrors::new()).await?;
    template.flashes = flash::take_flashes(&session).await?;
    Ok(template)
}

async fn create_share(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SocialShareForm>,
) -> Result<Response> {
    let (errors, data) = form.to_data();
    if !errors.is_empty() {
        return Ok(SocialShareFormTemplate::new(&state, None, form, errors)
            .await?
            .into_response());
    }

    let share = SocialShare::create(&state.pool, &data).await?;
    tracing::info!(social_share_id = %share.id, "Social share created");

    flash::info(&session, "Le partage a bien été créé.").await?;

    Ok(Redirect::to(LIST_PATH).into_response())
}

async fn edit_share(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<SocialShareFormTemplate> {
    let share = find_share(&state, &id).await?;

    let mut template = SocialShareFormTemplate::new(
        &state,
        Some(share.id),
        SocialShareForm::from_share(&share),
        FormErrors::new(),
    )
    .await?;
    template.flashes = flash::take_flashes(&session).await?;
    Ok(template)
}

async fn update_share(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<SocialShareForm>,
) -> Result<Response> {
    let share = find_share(&state, &id).await?;

    let (errors, data) = form.to_data();
    if !errors.is_empty() {
        return Ok(SocialShareFormTemplate::new(&state, Some(share.id), form, errors)
            .await?
            .into_response());
    }

    SocialShare::update(&state.pool, share.id, &data).await?;
    tracing::info!(social_share_id = %share.id, "Social share updated");

    flash::info(&session, "Le partage a bien été mis à jour.").await?;

    Ok(Redirect::to(LIST_PATH).into_response())
}

async fn delete_share(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Query(query): Query<DeleteForm>,
    form: Option<Form<DeleteForm>>,
) -> Result<Redirect> {
    let token = submitted_token(query, form);
    csrf::check_delete_form(&session, DELETE_SOCIAL_SHARE_TOKEN, token.as_deref()).await?;

    let id = parse_id(&id)?;
    if SocialShare::delete(&state.pool, id).await? {
        tracing::info!(social_share_id = %id, "Social share deleted");
        flash::info(&session, "Le partage a bien été supprimé.").await?;
    }

    Ok(Redirect::to(LIST_PATH))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(LIST_PATH, get(list_shares))
        .route(
            "/admin/social-shares/nouveau",
            get(new_share).post(create_share),
        )
        .route(
            "/admin/social-shares/:id",
            get(edit_share).post(update_share),
        )
        .route(
            "/admin/social-shares/:id/supprimer",
            post(delete_share).delete(delete_share),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::validation::{INVALID_CHOICE, NOT_BLANK};

    fn form() -> SocialShareForm {
        SocialShareForm {
            name: "Europe".to_string(),
            kind: "video".to_string(),
            category: Uuid::new_v4().to_string(),
            media: "europe.mp4".to_string(),
            default_url: "https://en-marche.fr/europe".to_string(),
            description: "Partagez notre vision de l'Europe".to_string(),
            twitter_url: " ".to_string(),
            position: "2".to_string(),
            published: Some("1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_form() {
        let (errors, data) = form().to_data();

        assert!(errors.is_empty());
        assert_eq!(data.position, 2);
        assert!(data.published);
        assert_eq!(data.twitter_url, None);
        assert!(data.category_id.is_some());
    }

    #[test]
    fn test_invalid_form() {
        let mut form = form();
        form.kind = "gif".to_string();
        form.category = "not-a-uuid".to_string();
        form.position = "deux".to_string();
        form.published = None;

        let (errors, data) = form.to_data();

        assert_eq!(errors.for_field("type"), vec![INVALID_CHOICE]);
        assert_eq!(errors.for_field("category"), vec![NOT_BLANK]);
        assert!(errors.has("position"));
        assert!(!data.published);
    }
}
