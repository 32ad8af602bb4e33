use std::collections::HashSet;

use askama::Template;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::csrf::{self, COMMITTEE_TOKEN};
use crate::api::flash::{self, Flash};
use crate::api::form::{single_choice, Choice};
use crate::api::middleware::{
    auth::{current_adherent, optional_adherent, require_auth},
    session::AppState,
};
use crate::error::{AppError, Result};
use crate::models::adherent::{choice_keys, Adherent, COUNTRIES};
use crate::models::committee::{
    Committee, CommitteeFeedEntry, CommitteeMembership, CommitteeMessage, CreateCommitteeData,
};
use crate::services::mailer::{Mailer, Message};
use crate::services::slugify::{slug_base, unique_slug};
use crate::services::validation::FormErrors;

const CREATE_PATH: &str = "/espace-adherent/creer-mon-comite";
const FEED_LENGTH: i64 = 30;

const NAME_TOO_SHORT: &str = "Cette chaîne est trop courte. Elle doit avoir au minimum 2 caractères.";
const DESCRIPTION_TOO_SHORT: &str =
    "Votre texte de description est trop court. Il doit compter 5 caractères minimum.";
const CONFIDENTIALITY_TERMS_REQUIRED: &str = "Vous devez accepter les règles de confidentialité.";
const CONTACTING_TERMS_REQUIRED: &str =
    "Vous devez accepter d'être contacté(e) par la plateforme En Marche !";

const MESSAGE_PUBLISHED: &str = "Votre message a bien été publié.";
const MESSAGE_SAVED: &str = "Votre message a bien été enregistré. Il n'apparaîtra pas dans le fil du comité.";
const COMMITTEE_LEFT: &str = "Vous ne suivez plus ce comité.";
const SUPERVISOR_CANNOT_LEAVE: &str = "Le responsable d'un comité ne peut pas le quitter.";
const NOT_A_MEMBER: &str = "Vous ne suivez pas ce comité.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommitteeForm {
    pub name: String,
    pub description: String,
    pub address: String,
    pub postal_code: String,
    pub city_code: String,
    pub city_name: String,
    pub country: String,
    pub facebook_page_url: String,
    pub twitter_nickname: String,
    pub google_plus_page_url: String,
    pub accept_confidentiality_terms: Option<String>,
    pub accept_contacting_terms: Option<String>,
}

impl CommitteeForm {
    fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();

        errors.min_length("name", &self.name, 2, NAME_TOO_SHORT);
        errors.max_length("name", &self.name, 50);
        errors.min_length("description", &self.description, 5, DESCRIPTION_TOO_SHORT);
        errors.max_length("description", &self.description, 140);
        errors.choice("country", &self.country, &choice_keys(&COUNTRIES));
        errors.address(
            "address",
            &self.country,
            &self.address,
            &self.postal_code,
            &self.city_code,
        );
        errors.optional_url("facebook_page_url", &self.facebook_page_url);
        errors.optional_twitter_nickname("twitter_nickname", &self.twitter_nickname);
        errors.optional_url("google_plus_page_url", &self.google_plus_page_url);

        if self.accept_confidentiality_terms.is_none() {
            errors.add("accept_confidentiality_terms", CONFIDENTIALITY_TERMS_REQUIRED);
        }
        if self.accept_contacting_terms.is_none() {
            errors.add("accept_contacting_terms", CONTACTING_TERMS_REQUIRED);
        }

        errors
    }

    fn into_data(self, slug: String, created_by: &Adherent) -> CreateCommitteeData {
        let optional = |value: String| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        CreateCommitteeData {
            slug,
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            address: self.address.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            city_code: self.city_code.trim().to_string(),
            city_name: optional(self.city_name),
            country: self.country,
            facebook_page_url: optional(self.facebook_page_url),
            twitter_nickname: optional(self.twitter_nickname)
                .map(|n| n.trim_start_matches('@').to_string()),
            google_plus_page_url: optional(self.google_plus_page_url),
            created_by: created_by.id,
        }
    }
}

#[derive(Template)]
#[template(path = "committees/create.html")]
struct CreateCommitteeTemplate {
    flashes: Vec<Flash>,
    form: CommitteeForm,
    countries: Vec<Choice>,
    errors: FormErrors,
}

#[derive(Template)]
#[template(path = "committees/show.html")]
struct CommitteeTemplate {
    flashes: Vec<Flash>,
    committee: Committee,
    members_count: i64,
    feed: Vec<CommitteeFeedEntry>,
    is_member: bool,
    can_host: bool,
    csrf_token: String,
    message: String,
    publish: bool,
    errors: FormErrors,
}

async fn ensure_can_create(state: &AppState, adherent: &Adherent) -> Result<()> {
    if !Committee::can_create_committee(&state.pool, adherent.id).await? {
        tracing::warn!(adherent_id = %adherent.id, "Committee creation refused");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

async fn new_committee(State(state): State<AppState>, session: Session) -> Result<CreateCommitteeTemplate> {
    let adherent = current_adherent(&session, &state.pool).await?;
    ensure_can_create(&state, &adherent).await?;

    let form = CommitteeForm {
        country: "FR".to_string(),
        ..Default::default()
    };

    Ok(CreateCommitteeTemplate {
        flashes: flash::take_flashes(&session).await?,
        countries: single_choice(&COUNTRIES, &form.country),
        form,
        errors: FormErrors::new(),
    })
}

async fn create_committee(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CommitteeForm>,
) -> Result<Response> {
    let adherent = current_adherent(&session, &state.pool).await?;
    ensure_can_create(&state, &adherent).await?;

    let errors = form.validate();
    if !errors.is_empty() {
        return Ok(CreateCommitteeTemplate {
            flashes: vec![],
            countries: single_choice(&COUNTRIES, &form.country),
            form,
            errors,
        }
        .into_response());
    }

    let base = slug_base(&form.name);
    let taken: HashSet<String> = Committee::slugs_like(&state.pool, &base)
        .await?
        .into_iter()
        .collect();
    let slug = unique_slug(&base, |candidate| taken.contains(candidate));

    let committee = Committee::create(&state.pool, form.into_data(slug, &adherent)).await?;
    tracing::info!(
        committee_id = %committee.id,
        adherent_id = %adherent.id,
        "Committee created, waiting for approval"
    );

    let committee_url = format!("{}/comites/{}", state.config.base_url, committee.slug);
    Mailer::new(state.pool.clone())
        .send(&Message::committee_creation_confirmation(
            &adherent.email,
            &adherent.first_name,
            &committee.name,
            &committee_url,
        ))
        .await?;

    flash::info(
        &session,
        "Votre comité a été créé avec succès. Il est néanmoins en attente de validation par un administrateur. Vous serez informé(e) par e-mail dès sa validation.",
    )
    .await?;

    Ok(Redirect::to(&format!("/comites/{}", committee.slug)).into_response())
}

/// Pending committees are only visible to their members
async fn load_visible_committee(
    state: &AppState,
    slug: &str,
    viewer: Option<&Adherent>,
) -> Result<(Committee, Option<CommitteeMembership>)> {
    let committee = Committee::find_by_slug(&state.pool, slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Committee not found".to_string()))?;

    let membership = match viewer {
        Some(viewer) => Committee::find_membership(&state.pool, committee.id, viewer.id).await?,
        None => None,
    };

    if !committee.is_approved() && membership.is_none() {
        return Err(AppError::NotFound("Committee not found".to_string()));
    }

    Ok((committee, membership))
}

async fn render_committee(
    state: &AppState,
    session: &Session,
    committee: Committee,
    membership: Option<CommitteeMembership>,
    message: String,
    publish: bool,
    errors: FormErrors,
    flashes: Vec<Flash>,
) -> Result<CommitteeTemplate> {
    Ok(CommitteeTemplate {
        flashes,
        members_count: Committee::count_members(&state.pool, committee.id).await?,
        feed: CommitteeMessage::published_feed(&state.pool, committee.id, FEED_LENGTH).await?,
        is_member: membership.is_some(),
        can_host: membership.as_ref().is_some_and(|m| m.can_host()),
        csrf_token: csrf::csrf_token(session, COMMITTEE_TOKEN).await?,
        committee,
        message,
        publish,
        errors,
    })
}

async fn show_committee(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<CommitteeTemplate> {
    let viewer = optional_adherent(&session, &state.pool).await?;
    let (committee, membership) = load_visible_committee(&state, &slug, viewer.as_ref()).await?;
    let flashes = flash::take_flashes(&session).await?;

    render_committee(
        &state,
        &session,
        committee,
        membership,
        String::new(),
        true,
        FormErrors::new(),
        flashes,
    )
    .await
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitteeActionForm {
    #[serde(rename = "_token")]
    token: Option<String>,
    content: String,
    published: Option<String>,
}

impl CommitteeActionForm {
    /// Unchecked "published" keeps the message out of the feed
    fn to_message(&self, committee_id: Uuid, author_id: Uuid) -> CommitteeMessage {
        CommitteeMessage::new(committee_id, author_id, &self.content, self.published.is_some())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LeaveOutcome {
    NotAMember,
    Supervisor,
    Leave,
}

fn leave_outcome(membership: Option<&CommitteeMembership>) -> LeaveOutcome {
    match membership {
        None => LeaveOutcome::NotAMember,
        Some(m) if m.is_supervisor() => LeaveOutcome::Supervisor,
        Some(_) => LeaveOutcome::Leave,
    }
}

async fn check_token(session: &Session, form: &CommitteeActionForm) -> Result<()> {
    let valid = match form.token.as_deref() {
        Some(token) => csrf::is_csrf_token_valid(session, COMMITTEE_TOKEN, token).await?,
        None => false,
    };
    if !valid {
        return Err(AppError::BadRequest("Invalid CSRF token".to_string()));
    }
    Ok(())
}

async fn follow_committee(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
    Form(form): Form<CommitteeActionForm>,
) -> Result<Redirect> {
    let adherent = current_adherent(&session, &state.pool).await?;
    check_token(&session, &form).await?;

    let (committee, membership) = load_visible_committee(&state, &slug, Some(&adherent)).await?;
    if membership.is_none() {
        Committee::follow(&state.pool, committee.id, adherent.id).await?;
        tracing::info!(committee_id = %committee.id, adherent_id = %adherent.id, "Committee followed");
        flash::info(&session, "Vous suivez désormais ce comité.").await?;
    }

    Ok(Redirect::to(&format!("/comites/{}", committee.slug)))
}

async fn unfollow_committee(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
    Form(form): Form<CommitteeActionForm>,
) -> Result<Redirect> {
    let adherent = current_adherent(&session, &state.pool).await?;
    check_token(&session, &form).await?;

    let (committee, membership) = load_visible_committee(&state, &slug, Some(&adherent)).await?;
    let message = match leave_outcome(membership.as_ref()) {
        LeaveOutcome::NotAMember => NOT_A_MEMBER,
        LeaveOutcome::Supervisor => SUPERVISOR_CANNOT_LEAVE,
        LeaveOutcome::Leave => {
            Committee::unfollow(&state.pool, committee.id, adherent.id).await?;
            tracing::info!(committee_id = %committee.id, adherent_id = %adherent.id, "Committee unfollowed");
            COMMITTEE_LEFT
        }
    };
    flash::info(&session, message).await?;

    Ok(Redirect::to(&format!("/comites/{}", committee.slug)))
}

async fn publish_message(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
    Form(form): Form<CommitteeActionForm>,
) -> Result<Response> {
    let adherent = current_adherent(&session, &state.pool).await?;
    check_token(&session, &form).await?;

    let (committee, membership) = load_visible_committee(&state, &slug, Some(&adherent)).await?;
    if !membership.as_ref().is_some_and(|m| m.can_host()) {
        return Err(AppError::Forbidden);
    }

    let message = form.to_message(committee.id, adherent.id);
    let errors = message.validate();
    if !errors.is_empty() {
        return Ok(render_committee(
            &state,
            &session,
            committee,
            membership,
            form.content,
            message.published,
            errors,
            vec![],
        )
        .await?
        .into_response());
    }

    message.insert(&state.pool).await?;
    tracing::info!(
        committee_id = %committee.id,
        message_id = %message.id,
        published = message.published,
        "Committee message saved"
    );

    let notice = if message.published {
        MESSAGE_PUBLISHED
    } else {
        MESSAGE_SAVED
    };
    flash::info(&session, notice).await?;

    Ok(Redirect::to(&format!("/comites/{}", committee.slug)).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(CREATE_PATH, get(new_committee).post(create_committee))
        .route("/comites/:slug/rejoindre", post(follow_committee))
        .route("/comites/:slug/quitter", post(unfollow_committee))
        .route("/comites/:slug/messages", post(publish_message))
        .route_layer(axum::middleware::from_fn(require_auth))
        .route("/comites/:slug", get(show_committee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::validation::{
        ADDRESS_REQUIRED, INVALID_POSTAL_CODE, INVALID_TWITTER_NICKNAME, INVALID_URL,
        UNRECOGNIZED_ADDRESS,
    };

    #[test]
    fn test_invalid_committee_yields_ten_errors() {
        let form = CommitteeForm {
            name: "F".to_string(),
            description: "F".to_string(),
            country: "FR".to_string(),
            postal_code: "99999".to_string(),
            city_code: "10102-45029".to_string(),
            facebook_page_url: "yo".to_string(),
            twitter_nickname: "@!!".to_string(),
            google_plus_page_url: "yo".to_string(),
            ..Default::default()
        };

        let errors = form.validate();

        assert_eq!(errors.len(), 10);
        assert_eq!(errors.for_field("name"), vec![NAME_TOO_SHORT]);
        assert_eq!(errors.for_field("description"), vec![DESCRIPTION_TOO_SHORT]);
        assert_eq!(errors.for_field("address.postal_code"), vec![INVALID_POSTAL_CODE]);
        assert_eq!(errors.for_field("address.city"), vec![UNRECOGNIZED_ADDRESS]);
        assert_eq!(errors.for_field("address.address"), vec![ADDRESS_REQUIRED]);
        assert_eq!(errors.for_field("facebook_page_url"), vec![INVALID_URL]);
        assert_eq!(errors.for_field("twitter_nickname"), vec![INVALID_TWITTER_NICKNAME]);
        assert_eq!(errors.for_field("google_plus_page_url"), vec![INVALID_URL]);
        assert_eq!(
            errors.for_field("accept_confidentiality_terms"),
            vec![CONFIDENTIALITY_TERMS_REQUIRED]
        );
        assert_eq!(
            errors.for_field("accept_contacting_terms"),
            vec![CONTACTING_TERMS_REQUIRED]
        );
    }

    #[test]
    fn test_valid_committee() {
        let form = CommitteeForm {
            name: "Lyon est En Marche !".to_string(),
            description: "Comité français En Marche ! de la ville de Lyon".to_string(),
            address: "6 rue Neyret".to_string(),
            postal_code: "69001".to_string(),
            city_code: "69001-69381".to_string(),
            country: "FR".to_string(),
            facebook_page_url: "https://www.facebook.com/EnMarcheLyon".to_string(),
            twitter_nickname: "@enmarchelyon".to_string(),
            google_plus_page_url: "https://plus.google.com/+EnMarcheavecEmmanuelMacron?hl=fr"
                .to_string(),
            accept_confidentiality_terms: Some("1".to_string()),
            accept_contacting_terms: Some("1".to_string()),
            ..Default::default()
        };

        assert!(form.validate().is_empty());

        let carl = crate::models::adherent::fixtures::adherent("Carl", "Mirabeau");
        let data = form.into_data("lyon-est-en-marche".to_string(), &carl);
        assert_eq!(data.twitter_nickname.as_deref(), Some("enmarchelyon"));
        assert_eq!(data.city_name, None);
        assert_eq!(data.created_by, carl.id);
    }

    #[test]
    fn test_message_is_published_only_when_checked() {
        let (committee_id, author_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut form = CommitteeActionForm {
            content: "Tractage samedi au marché".to_string(),
            ..Default::default()
        };

        let draft = form.to_message(committee_id, author_id);
        assert!(!draft.published);
        assert!(draft.validate().is_empty());

        form.published = Some("1".to_string());
        let message = form.to_message(committee_id, author_id);
        assert!(message.published);
        assert_eq!(message.committee_id, committee_id);
        assert_eq!(message.author_id, author_id);
    }

    #[test]
    fn test_leave_outcome_tells_non_members_from_supervisors() {
        use crate::models::committee::{PRIVILEGE_FOLLOWER, PRIVILEGE_SUPERVISOR};

        let mut membership = CommitteeMembership {
            committee_id: Uuid::new_v4(),
            adherent_id: Uuid::new_v4(),
            privilege: PRIVILEGE_FOLLOWER.to_string(),
            joined_at: chrono::Utc::now(),
        };

        assert_eq!(leave_outcome(None), LeaveOutcome::NotAMember);
        assert_eq!(leave_outcome(Some(&membership)), LeaveOutcome::Leave);

        membership.privilege = PRIVILEGE_SUPERVISOR.to_string();
        assert_eq!(leave_outcome(Some(&membership)), LeaveOutcome::Supervisor);
    }
}
