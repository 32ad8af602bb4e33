//! The summary (CV) wizard of the adherent space.
//!
//! Every page loads the adherent's summary through [`SummaryManager`],
//! creating it on first visit. Child entities (experiences, trainings,
//! languages) are edited one at a time and only ever looked up inside the
//! adherent's own summary, so foreign ids answer 404.

use std::str::FromStr;

use askama::Template;
use axum::{
    extract::{Path, Query, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::NaiveDate;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::assets::signed_asset_url;
use crate::api::csrf::{
    self, submitted_token, DeleteForm, DELETE_EXPERIENCE_TOKEN, DELETE_LANGUAGE_TOKEN,
    DELETE_TRAINING_TOKEN,
};
use crate::api::flash::{self, Flash};
use crate::api::form::{choices, single_choice, Choice, FormData};
use crate::api::middleware::{
    auth::{current_adherent, require_auth},
    session::AppState,
};
use crate::error::{AppError, Result};
use crate::models::adherent::Adherent;
use crate::models::summary::{
    JobExperience, Language, Summary, SummaryStep, Training, AVAILABILITIES, CONTRACTS,
    CONTRIBUTION_WISHES, JOB_DURATIONS, JOB_LOCATIONS, LANGUAGE_ALREADY_SPOKEN, LANGUAGE_CODES,
    LANGUAGE_LEVELS, MISSION_TYPES,
};
use crate::services::activity_tracker::{
    recent_activities_for_adherent, Activity, RECENT_ACTIVITIES_LIMIT,
};
use crate::services::summary_manager::SummaryManager;
use crate::services::validation::{FormErrors, NOT_BLANK};

pub const BASE_PATH: &str = "/espace-adherent/mon-cv";

const STEP_SAVED: &str = "Vos modifications ont bien été enregistrées.";
const SUMMARY_NOT_COMPLETE: &str = "Votre CV doit être complet pour être publié.";
const SUMMARY_PUBLISHED: &str = "Votre CV a bien été publié.";

/// The wizard is not open to the public yet
pub async fn disable_in_production(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if state.config.is_production() {
        return Err(AppError::NotFound("Not found".to_string()));
    }

    Ok(next.run(request).await)
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::NotFound("Item not found".to_string()))
}

fn item_not_found() -> AppError {
    AppError::NotFound("Item not found".to_string())
}

/// Profile photo of the adherent, behind a signed URL
pub fn photo_url(adherent: &Adherent, secret: &[u8]) -> String {
    signed_asset_url(&format!("images/{}.jpg", adherent.id), secret)
}

/// Parses the period inputs shared by experiences and trainings.
///
/// A missing or invalid start date is reported and replaced by
/// `NaiveDate::MIN` so the remaining fields still get validated.
fn parse_period(
    errors: &mut FormErrors,
    started_at: &str,
    ended_at: &str,
    on_going: bool,
) -> (NaiveDate, Option<NaiveDate>) {
    let started = if started_at.trim().is_empty() {
        errors.add("started_at", NOT_BLANK);
        None
    } else {
        errors.optional_date("started_at", started_at)
    };
    let ended = errors.optional_date("ended_at", ended_at);

    (
        started.unwrap_or(NaiveDate::MIN),
        if on_going { None } else { ended },
    )
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Template)]
#[template(path = "summary_manager/index.html")]
struct IndexTemplate {
    flashes: Vec<Flash>,
    adherent: Adherent,
    summary: Summary,
    activities: Vec<Activity>,
    photo_url: String,
    delete_experience_token: String,
    delete_training_token: String,
    delete_language_token: String,
}

async fn index(State(state): State<AppState>, session: Session) -> Result<IndexTemplate> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let summary = SummaryManager::new(state.pool.clone())
        .get_for_adherent(&adherent)
        .await?;
    let activities =
        recent_activities_for_adherent(&state.pool, adherent.id, RECENT_ACTIVITIES_LIMIT).await?;

    Ok(IndexTemplate {
        flashes: flash::take_flashes(&session).await?,
        photo_url: photo_url(&adherent, state.config.app_secret.expose_secret().as_bytes()),
        delete_experience_token: csrf::csrf_token(&session, DELETE_EXPERIENCE_TOKEN).await?,
        delete_training_token: csrf::csrf_token(&session, DELETE_TRAINING_TOKEN).await?,
        delete_language_token: csrf::csrf_token(&session, DELETE_LANGUAGE_TOKEN).await?,
        adherent,
        summary,
        activities,
    })
}

async fn toggle_recent_activities(
    State(state): State<AppState>,
    session: Session,
) -> Result<Redirect> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let manager = SummaryManager::new(state.pool.clone());

    let mut summary = manager.get_for_adherent(&adherent).await?;
    summary.toggle_showing_recent_activities();
    manager.update_summary(&summary).await?;

    let message = if summary.showing_recent_activities {
        "Vos activités récentes sont désormais visibles sur votre CV."
    } else {
        "Vos activités récentes sont désormais masquées sur votre CV."
    };
    flash::info(&session, message).await?;

    Ok(Redirect::to(BASE_PATH))
}

// Experiences

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExperienceForm {
    company: String,
    position: String,
    location: String,
    website: String,
    company_facebook_page: String,
    company_twitter_nickname: String,
    contract: String,
    duration: String,
    description: String,
    started_at: String,
    ended_at: String,
    on_going: Option<String>,
}

impl ExperienceForm {
    fn from_experience(experience: &JobExperience) -> Self {
        Self {
            company: experience.company.clone(),
            position: experience.position.clone(),
            location: experience.location.clone(),
            website: experience.website.clone().unwrap_or_default(),
            company_facebook_page: experience.company_facebook_page.clone().unwrap_or_default(),
            company_twitter_nickname: experience
                .company_twitter_nickname
                .clone()
                .unwrap_or_default(),
            contract: experience.contract.clone(),
            duration: experience.duration.clone(),
            description: experience.description.clone().unwrap_or_default(),
            started_at: format_date(Some(experience.started_at)),
            ended_at: format_date(experience.ended_at),
            on_going: experience.on_going.then(|| "1".to_string()),
        }
    }

    fn to_experience(&self, id: Uuid, summary_id: Uuid) -> (FormErrors, JobExperience) {
        let mut errors = FormErrors::new();
        let on_going = self.on_going.is_some();
        let (started_at, ended_at) =
            parse_period(&mut errors, &self.started_at, &self.ended_at, on_going);

        let experience = JobExperience {
            id,
            summary_id,
            company: self.company.trim().to_string(),
            position: self.position.trim().to_string(),
            location: self.location.trim().to_string(),
            website: optional(&self.website),
            company_facebook_page: optional(&self.company_facebook_page),
            company_twitter_nickname: optional(&self.company_twitter_nickname)
                .map(|n| n.trim_start_matches('@').to_string()),
            contract: self.contract.clone(),
            duration: self.duration.clone(),
            description: optional(&self.description),
            started_at,
            ended_at,
            on_going,
            display_order: 0,
        };
        errors.merge(experience.validate());

        (errors, experience)
    }
}

#[derive(Template)]
#[template(path = "summary_manager/experience.html")]
struct ExperienceTemplate {
    flashes: Vec<Flash>,
    action: String,
    is_new: bool,
    contracts: Vec<Choice>,
    durations: Vec<Choice>,
    form: ExperienceForm,
    errors: FormErrors,
}

impl ExperienceTemplate {
    fn new(id: Option<Uuid>, form: ExperienceForm, errors: FormErrors) -> Self {
        Self {
            flashes: vec![],
            action: item_action("experience", id),
            is_new: id.is_none(),
            contracts: single_choice(&CONTRACTS, &form.contract),
            durations: single_choice(&JOB_DURATIONS, &form.duration),
            form,
            errors,
        }
    }
}

fn item_action(kind: &str, id: Option<Uuid>) -> String {
    match id {
        Some(id) => format!("{}/{}/{}", BASE_PATH, kind, id),
        None => format!("{}/{}", BASE_PATH, kind),
    }
}

async fn experience_form(
    state: &AppState,
    session: &Session,
    id: Option<Uuid>,
) -> Result<ExperienceTemplate> {
    let adherent = current_adherent(session, &state.pool).await?;
    let summary = SummaryManager::new(state.pool.clone())
        .get_for_adherent(&adherent)
        .await?;

    let form = match id {
        Some(id) => {
            ExperienceForm::from_experience(summary.experience(id).ok_or_else(item_not_found)?)
        }
        None => ExperienceForm::default(),
    };

    let mut template = ExperienceTemplate::new(id, form, FormErrors::new());
    template.flashes = flash::take_flashes(session).await?;
    Ok(template)
}

async fn save_experience(
    state: &AppState,
    session: &Session,
    id: Option<Uuid>,
    form: ExperienceForm,
) -> Result<Response> {
    let adherent = current_adherent(session, &state.pool).await?;
    let manager = SummaryManager::new(state.pool.clone());
    let mut summary = manager.get_for_adherent(&adherent).await?;

    if let Some(id) = id {
        summary.experience(id).ok_or_else(item_not_found)?;
    }

    let (errors, experience) = form.to_experience(id.unwrap_or_else(Uuid::new_v4), summary.id);
    if !errors.is_empty() {
        return Ok(ExperienceTemplate::new(id, form, errors).into_response());
    }

    manager.update_experiences(&mut summary, experience).await?;
    flash::info(session, "L'expérience a bien été enregistrée.").await?;

    Ok(Redirect::to(BASE_PATH).into_response())
}

async fn new_experience(
    State(state): State<AppState>,
    session: Session,
) -> Result<ExperienceTemplate> {
    experience_form(&state, &session, None).await
}

async fn edit_experience(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<ExperienceTemplate> {
    experience_form(&state, &session, Some(parse_id(&id)?)).await
}

async fn create_experience(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ExperienceForm>,
) -> Result<Response> {
    save_experience(&state, &session, None, form).await
}

async fn update_experience(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<ExperienceForm>,
) -> Result<Response> {
    save_experience(&state, &session, Some(parse_id(&id)?), form).await
}

// Trainings

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TrainingForm {
    organization: String,
    diploma: String,
    study_field: String,
    description: String,
    extra_curricular: String,
    started_at: String,
    ended_at: String,
    on_going: Option<String>,
}

impl TrainingForm {
    fn from_training(training: &Training) -> Self {
        Self {
            organization: training.organization.clone(),
            diploma: training.diploma.clone(),
            study_field: training.study_field.clone(),
            description: training.description.clone().unwrap_or_default(),
            extra_curricular: training.extra_curricular.clone().unwrap_or_default(),
            started_at: format_date(Some(training.started_at)),
            ended_at: format_date(training.ended_at),
            on_going: training.on_going.then(|| "1".to_string()),
        }
    }

    fn to_training(&self, id: Uuid, summary_id: Uuid) -> (FormErrors, Training) {
        let mut errors = FormErrors::new();
        let on_going = self.on_going.is_some();
        let (started_at, ended_at) =
            parse_period(&mut errors, &self.started_at, &self.ended_at, on_going);

        let training = Training {
            id,
            summary_id,
            organization: self.organization.trim().to_string(),
            diploma: self.diploma.trim().to_string(),
            study_field: self.study_field.trim().to_string(),
            description: optional(&self.description),
            extra_curricular: optional(&self.extra_curricular),
            started_at,
            ended_at,
            on_going,
            display_order: 0,
        };
        errors.merge(training.validate());

        (errors, training)
    }
}

#[derive(Template)]
#[template(path = "summary_manager/training.html")]
struct TrainingTemplate {
    flashes: Vec<Flash>,
    action: String,
    is_new: bool,
    form: TrainingForm,
    errors: FormErrors,
}

async fn training_form(
    state: &AppState,
    session: &Session,
    id: Option<Uuid>,
) -> Result<TrainingTemplate> {
    let adherent = current_adherent(session, &state.pool).await?;
    let summary = SummaryManager::new(state.pool.clone())
        .get_for_adherent(&adherent)
        .await?;

    let form = match id {
        Some(id) => TrainingForm::from_training(summary.training(id).ok_or_else(item_not_found)?),
        None => TrainingForm::default(),
    };

    Ok(TrainingTemplate {
        flashes: flash::take_flashes(session).await?,
        action: item_action("formation", id),
        is_new: id.is_none(),
        form,
        errors: FormErrors::new(),
    })
}

async fn save_training(
    state: &AppState,
    session: &Session,
    id: Option<Uuid>,
    form: TrainingForm,
) -> Result<Response> {
    let adherent = current_adherent(session, &state.pool).await?;
    let manager = SummaryManager::new(state.pool.clone());
    let mut summary = manager.get_for_adherent(&adherent).await?;

    if let Some(id) = id {
        summary.training(id).ok_or_else(item_not_found)?;
    }

    let (errors, training) = form.to_training(id.unwrap_or_else(Uuid::new_v4), summary.id);
    if !errors.is_empty() {
        return Ok(TrainingTemplate {
            flashes: vec![],
            action: item_action("formation", id),
            is_new: id.is_none(),
            form,
            errors,
        }
        .into_response());
    }

    manager.update_trainings(&mut summary, training).await?;
    flash::info(session, "La formation a bien été enregistrée.").await?;

    Ok(Redirect::to(BASE_PATH).into_response())
}

async fn new_training(State(state): State<AppState>, session: Session) -> Result<TrainingTemplate> {
    training_form(&state, &session, None).await
}

async fn edit_training(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<TrainingTemplate> {
    training_form(&state, &session, Some(parse_id(&id)?)).await
}

async fn create_training(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<TrainingForm>,
) -> Result<Response> {
    save_training(&state, &session, None, form).await
}

async fn update_training(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<TrainingForm>,
) -> Result<Response> {
    save_training(&state, &session, Some(parse_id(&id)?), form).await
}

// Languages

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LanguageForm {
    code: String,
    level: String,
}

impl LanguageForm {
    fn to_language(&self, id: Uuid, summary: &Summary) -> (FormErrors, Language) {
        let language = Language {
            id,
            summary_id: summary.id,
            code: self.code.trim().to_string(),
            level: self.level.trim().to_string(),
            display_order: 0,
        };

        let mut errors = language.validate();
        if summary.speaks(&language.code, Some(id)) {
            errors.add("code", LANGUAGE_ALREADY_SPOKEN);
        }

        (errors, language)
    }
}

#[derive(Template)]
#[template(path = "summary_manager/language.html")]
struct LanguageTemplate {
    flashes: Vec<Flash>,
    action: String,
    is_new: bool,
    codes: Vec<Choice>,
    levels: Vec<Choice>,
    errors: FormErrors,
}

impl LanguageTemplate {
    fn new(id: Option<Uuid>, form: &LanguageForm, errors: FormErrors) -> Self {
        Self {
            flashes: vec![],
            action: item_action("langue", id),
            is_new: id.is_none(),
            codes: single_choice(&LANGUAGE_CODES, &form.code),
            levels: single_choice(&LANGUAGE_LEVELS, &form.level),
            errors,
        }
    }
}

async fn language_form(
    state: &AppState,
    session: &Session,
    id: Option<Uuid>,
) -> Result<LanguageTemplate> {
    let adherent = current_adherent(session, &state.pool).await?;
    let summary = SummaryManager::new(state.pool.clone())
        .get_for_adherent(&adherent)
        .await?;

    let form = match id {
        Some(id) => {
            let language = summary.language(id).ok_or_else(item_not_found)?;
            LanguageForm {
                code: language.code.clone(),
                level: language.level.clone(),
            }
        }
        None => LanguageForm::default(),
    };

    let mut template = LanguageTemplate::new(id, &form, FormErrors::new());
    template.flashes = flash::take_flashes(session).await?;
    Ok(template)
}

async fn save_language(
    state: &AppState,
    session: &Session,
    id: Option<Uuid>,
    form: LanguageForm,
) -> Result<Response> {
    let adherent = current_adherent(session, &state.pool).await?;
    let manager = SummaryManager::new(state.pool.clone());
    let mut summary = manager.get_for_adherent(&adherent).await?;

    if let Some(id) = id {
        summary.language(id).ok_or_else(item_not_found)?;
    }

    let (errors, language) = form.to_language(id.unwrap_or_else(Uuid::new_v4), &summary);
    if !errors.is_empty() {
        return Ok(LanguageTemplate::new(id, &form, errors).into_response());
    }

    manager.update_languages(&mut summary, language).await?;
    flash::info(session, "La langue a bien été enregistrée.").await?;

    Ok(Redirect::to(BASE_PATH).into_response())
}

async fn new_language(State(state): State<AppState>, session: Session) -> Result<LanguageTemplate> {
    language_form(&state, &session, None).await
}

async fn edit_language(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<LanguageTemplate> {
    language_form(&state, &session, Some(parse_id(&id)?)).await
}

async fn create_language(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LanguageForm>,
) -> Result<Response> {
    save_language(&state, &session, None, form).await
}

async fn update_language(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<LanguageForm>,
) -> Result<Response> {
    save_language(&state, &session, Some(parse_id(&id)?), form).await
}

// Removals

/// Flashes `notice` only when the manager actually removed the item
async fn removal_done(session: &Session, removed: bool, notice: &str) -> Result<Redirect> {
    if removed {
        flash::info(session, notice).await?;
    }

    Ok(Redirect::to(BASE_PATH))
}

async fn remove_experience(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Query(query): Query<DeleteForm>,
    form: Option<Form<DeleteForm>>,
) -> Result<Redirect> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let token = submitted_token(query, form);
    csrf::check_delete_form(&session, DELETE_EXPERIENCE_TOKEN, token.as_deref()).await?;

    let removed = SummaryManager::new(state.pool.clone())
        .remove_experience(&adherent, parse_id(&id)?)
        .await?;

    removal_done(&session, removed, "L'expérience a bien été supprimée.").await
}

async fn remove_training(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Query(query): Query<DeleteForm>,
    form: Option<Form<DeleteForm>>,
) -> Result<Redirect> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let token = submitted_token(query, form);
    csrf::check_delete_form(&session, DELETE_TRAINING_TOKEN, token.as_deref()).await?;

    let removed = SummaryManager::new(state.pool.clone())
        .remove_training(&adherent, parse_id(&id)?)
        .await?;

    removal_done(&session, removed, "La formation a bien été supprimée.").await
}

async fn remove_language(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Query(query): Query<DeleteForm>,
    form: Option<Form<DeleteForm>>,
) -> Result<Redirect> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let token = submitted_token(query, form);
    csrf::check_delete_form(&session, DELETE_LANGUAGE_TOKEN, token.as_deref()).await?;

    let removed = SummaryManager::new(state.pool.clone())
        .remove_language(&adherent, parse_id(&id)?)
        .await?;

    removal_done(&session, removed, "La langue a bien été supprimée.").await
}

// Publication

async fn publish(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let manager = SummaryManager::new(state.pool.clone());
    let mut summary = manager.get_for_adherent(&adherent).await?;

    let published = manager.publish_summary(&mut summary).await?;

    publication_done(&session, published, &summary.slug).await
}

/// Incomplete summaries go back to the manager; published ones to their public page
async fn publication_done(session: &Session, published: bool, slug: &str) -> Result<Redirect> {
    if !published {
        flash::info(session, SUMMARY_NOT_COMPLETE).await?;
        return Ok(Redirect::to(BASE_PATH));
    }

    flash::info(session, SUMMARY_PUBLISHED).await?;

    Ok(Redirect::to(&format!("/membre/{}", slug)))
}

async fn unpublish(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let adherent = current_adherent(&session, &state.pool).await?;

    let unpublished = SummaryManager::new(state.pool.clone())
        .unpublish_summary_for_adherent(&adherent)
        .await?;

    if unpublished {
        flash::info(&session, "Votre CV a bien été dépublié.").await?;
    } else {
        flash::add_flash(&session, "error", "Votre CV n'a pas pu être dépublié.").await?;
    }

    Ok(Redirect::to(BASE_PATH))
}

// Skills autocompletion

#[derive(Debug, Default, Deserialize)]
struct AutocompleteQuery {
    #[serde(default)]
    term: String,
}

fn is_xml_http_request(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|value| value.to_str().ok())
        == Some("XMLHttpRequest")
}

async fn skills_autocomplete(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Query(query): Query<AutocompleteQuery>,
) -> Result<Json<Vec<String>>> {
    if !is_xml_http_request(&headers) {
        return Err(AppError::NotFound("Not found".to_string()));
    }

    let adherent = current_adherent(&session, &state.pool).await?;
    let skills = SummaryManager::new(state.pool.clone())
        .available_skills(&adherent, &query.term)
        .await?;

    Ok(Json(skills))
}

// Steps

fn parse_step(step: &str) -> Result<SummaryStep> {
    SummaryStep::from_str(step).map_err(AppError::NotFound)
}

/// Copies the step fields of the submitted form onto the summary
fn apply_step(summary: &mut Summary, step: SummaryStep, form: &FormData) {
    match step {
        SummaryStep::Synthesis => {
            summary.current_profession = form.optional("current_profession");
            summary.contribution_wish = form.optional("contribution_wish");
            summary.availabilities = form.all("availabilities");
            summary.job_locations = form.all("job_locations");
            summary.professional_synopsis = form.optional("professional_synopsis");
        }
        SummaryStep::Missions => {
            summary.mission_type_wishes = form.all("mission_type_wishes");
        }
        SummaryStep::Motivation => {
            summary.motivation = form.optional("motivation");
        }
        SummaryStep::Competences => {}
        SummaryStep::Contact => {
            summary.contact_email = form.optional("contact_email");
            summary.linked_in_url = form.optional("linked_in_url");
            summary.website_url = form.optional("website_url");
            summary.facebook_url = form.optional("facebook_url");
            summary.twitter_nickname = form
                .optional("twitter_nickname")
                .map(|n| n.trim_start_matches('@').to_string());
            summary.viadeo_url = form.optional("viadeo_url");
        }
    }
}

#[derive(Template)]
#[template(path = "summary_manager/step.html")]
struct StepTemplate {
    flashes: Vec<Flash>,
    step: &'static str,
    action: String,
    summary: Summary,
    contribution_wishes: Vec<Choice>,
    availabilities: Vec<Choice>,
    job_locations: Vec<Choice>,
    mission_types: Vec<Choice>,
    errors: FormErrors,
}

impl StepTemplate {
    fn new(step: SummaryStep, summary: Summary, errors: FormErrors) -> Self {
        Self {
            flashes: vec![],
            step: step.as_str(),
            action: format!("{}/{}", BASE_PATH, step),
            contribution_wishes: single_choice(
                &CONTRIBUTION_WISHES,
                summary.contribution_wish.as_deref().unwrap_or_default(),
            ),
            availabilities: choices(&AVAILABILITIES, &summary.availabilities),
            job_locations: choices(&JOB_LOCATIONS, &summary.job_locations),
            mission_types: choices(&MISSION_TYPES, &summary.mission_type_wishes),
            summary,
            errors,
        }
    }
}

async fn step_form(
    State(state): State<AppState>,
    session: Session,
    Path(step): Path<String>,
) -> Result<StepTemplate> {
    let step = parse_step(&step)?;
    let adherent = current_adherent(&session, &state.pool).await?;
    let summary = SummaryManager::new(state.pool.clone())
        .get_for_adherent(&adherent)
        .await?;

    let mut template = StepTemplate::new(step, summary, FormErrors::new());
    template.flashes = flash::take_flashes(&session).await?;
    Ok(template)
}

async fn save_step(
    State(state): State<AppState>,
    session: Session,
    Path(step): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let step = parse_step(&step)?;
    let adherent = current_adherent(&session, &state.pool).await?;
    let manager = SummaryManager::new(state.pool.clone());
    let mut summary = manager.get_for_adherent(&adherent).await?;
    let form = FormData::new(fields);

    apply_step(&mut summary, step, &form);
    let errors = summary.validate_step(step);
    if !errors.is_empty() {
        return Ok(StepTemplate::new(step, summary, errors).into_response());
    }

    if step == SummaryStep::Competences {
        manager.set_skills(&mut summary, &form.all("skills")).await?;
    } else {
        manager.update_summary(&summary).await?;
    }

    flash::info(&session, STEP_SAVED).await?;

    Ok(Redirect::to(BASE_PATH).into_response())
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(BASE_PATH, get(index))
        .route(
            "/espace-adherent/mon-cv/activites_recentes/cacher_afficher",
            get(toggle_recent_activities),
        )
        .route(
            "/espace-adherent/mon-cv/experience",
            get(new_experience).post(create_experience),
        )
        .route(
            "/espace-adherent/mon-cv/experience/:id",
            get(edit_experience).post(update_experience),
        )
        .route(
            "/espace-adherent/mon-cv/experience/:id/supprimer",
            post(remove_experience).delete(remove_experience),
        )
        .route(
            "/espace-adherent/mon-cv/formation",
            get(new_training).post(create_training),
        )
        .route(
            "/espace-adherent/mon-cv/formation/:id",
            get(edit_training).post(update_training),
        )
        .route(
            "/espace-adherent/mon-cv/formation/:id/supprimer",
            post(remove_training).delete(remove_training),
        )
        .route(
            "/espace-adherent/mon-cv/langue",
            get(new_language).post(create_language),
        )
        .route(
            "/espace-adherent/mon-cv/langue/:id",
            get(edit_language).post(update_language),
        )
        .route(
            "/espace-adherent/mon-cv/langue/:id/supprimer",
            post(remove_language).delete(remove_language),
        )
        .route("/espace-adherent/mon-cv/publier", get(publish))
        .route("/espace-adherent/mon-cv/depublier", get(unpublish))
        .route(
            "/espace-adherent/mon-cv/competences/autocompletion",
            get(skills_autocomplete),
        )
        .route(
            "/espace-adherent/mon-cv/:step",
            get(step_form).post(save_step),
        )
        .route_layer(axum::middleware::from_fn(require_auth))
        // Added last so it runs first: production answers 404 even to anonymous visitors
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            disable_in_production,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::summary::fixtures;
    use crate::models::summary::{ENDED_AT_REQUIRED, ENDED_BEFORE_STARTED};
    use crate::services::validation::{INVALID_CHOICE, INVALID_DATE};
    use axum::http::HeaderValue;

    fn session() -> Session {
        Session::new(None, std::sync::Arc::new(tower_sessions::MemoryStore::default()), None)
    }

    fn location(redirect: Redirect) -> String {
        let response = redirect.into_response();
        response.headers()[axum::http::header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn flash_messages(session: &Session) -> Vec<String> {
        flash::take_flashes(session)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.message)
            .collect()
    }

    #[tokio::test]
    async fn test_incomplete_summary_flashes_and_returns_to_manager() {
        let session = session();

        let redirect = publication_done(&session, false, "carl-mirabeau").await.unwrap();

        assert_eq!(location(redirect), BASE_PATH);
        assert_eq!(flash_messages(&session).await, vec![SUMMARY_NOT_COMPLETE]);
    }

    #[tokio::test]
    async fn test_published_summary_goes_to_public_page() {
        let session = session();

        let redirect = publication_done(&session, true, "carl-mirabeau").await.unwrap();

        assert_eq!(location(redirect), "/membre/carl-mirabeau");
        assert_eq!(flash_messages(&session).await, vec![SUMMARY_PUBLISHED]);
    }

    #[tokio::test]
    async fn test_removal_flashes_only_on_success() {
        let session = session();

        let redirect = removal_done(&session, false, "La langue a bien été supprimée.")
            .await
            .unwrap();
        assert_eq!(location(redirect), BASE_PATH);
        assert!(flash_messages(&session).await.is_empty());

        removal_done(&session, true, "La langue a bien été supprimée.")
            .await
            .unwrap();
        assert_eq!(
            flash_messages(&session).await,
            vec!["La langue a bien été supprimée."]
        );
    }

    fn form(pairs: &[(&str, &str)]) -> FormData {
        FormData::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_unknown_step_lists_known_steps() {
        match parse_step("foo") {
            Err(AppError::NotFound(message)) => assert_eq!(
                message,
                "Invalid step \"foo\", known steps are \"synthesis\", \"missions\", \"motivation\", \"competences\", \"contact\"."
            ),
            other => panic!("unexpected result: {:?}", other.map(|s| s.as_str())),
        }
        assert_eq!(parse_step("missions").unwrap(), SummaryStep::Missions);
    }

    #[test]
    fn test_synthesis_step_is_applied_and_validated() {
        let mut summary = fixtures::summary(Uuid::new_v4());
        apply_step(
            &mut summary,
            SummaryStep::Synthesis,
            &form(&[
                ("current_profession", " Développeur "),
                ("contribution_wish", "volunteer"),
                ("availabilities[]", "weekends"),
                ("availabilities[]", "evenings"),
                ("job_locations[]", "remote"),
                ("professional_synopsis", "Développeur web depuis dix ans."),
            ]),
        );

        assert_eq!(summary.current_profession.as_deref(), Some("Développeur"));
        assert_eq!(summary.availabilities, vec!["weekends", "evenings"]);
        assert!(summary.validate_step(SummaryStep::Synthesis).is_empty());

        apply_step(
            &mut summary,
            SummaryStep::Synthesis,
            &form(&[("contribution_wish", "millionaire")]),
        );
        let errors = summary.validate_step(SummaryStep::Synthesis);
        assert_eq!(errors.for_field("current_profession"), vec![NOT_BLANK]);
        assert_eq!(errors.for_field("contribution_wish"), vec![INVALID_CHOICE]);
    }

    #[test]
    fn test_contact_step_strips_twitter_at_sign() {
        let mut summary = fixtures::summary(Uuid::new_v4());
        apply_step(
            &mut summary,
            SummaryStep::Contact,
            &form(&[
                ("contact_email", "carl@example.fr"),
                ("twitter_nickname", "@carlmirabeau"),
            ]),
        );

        assert_eq!(summary.twitter_nickname.as_deref(), Some("carlmirabeau"));
        assert_eq!(summary.linked_in_url, None);
        assert!(summary.validate_step(SummaryStep::Contact).is_empty());
    }

    #[test]
    fn test_experience_form_period() {
        let summary_id = Uuid::new_v4();
        let mut form = ExperienceForm {
            company: "Example SAS".to_string(),
            position: "Développeur".to_string(),
            location: "Lyon".to_string(),
            contract: "cdi".to_string(),
            duration: "full_time".to_string(),
            started_at: "2012-09-01".to_string(),
            ended_at: "2011-01-01".to_string(),
            ..Default::default()
        };

        let (errors, _) = form.to_experience(Uuid::new_v4(), summary_id);
        assert_eq!(errors.for_field("ended_at"), vec![ENDED_BEFORE_STARTED]);

        form.ended_at = String::new();
        let (errors, _) = form.to_experience(Uuid::new_v4(), summary_id);
        assert_eq!(errors.for_field("ended_at"), vec![ENDED_AT_REQUIRED]);

        form.on_going = Some("1".to_string());
        form.ended_at = "2011-01-01".to_string();
        let (errors, experience) = form.to_experience(Uuid::new_v4(), summary_id);
        assert!(errors.is_empty());
        assert_eq!(experience.ended_at, None);
        assert_eq!(experience.summary_id, summary_id);
    }

    #[test]
    fn test_training_form_requires_start_date() {
        let form = TrainingForm {
            organization: "Université Lyon 1".to_string(),
            diploma: "Master".to_string(),
            study_field: "Informatique".to_string(),
            started_at: "septembre".to_string(),
            on_going: Some("1".to_string()),
            ..Default::default()
        };
        let (errors, _) = form.to_training(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(errors.for_field("started_at"), vec![INVALID_DATE]);

        let blank = TrainingForm {
            started_at: String::new(),
            ..form
        };
        let (errors, _) = blank.to_training(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(errors.for_field("started_at"), vec![NOT_BLANK]);
    }

    #[test]
    fn test_language_form_rejects_language_already_spoken() {
        let mut summary = fixtures::summary(Uuid::new_v4());
        summary.upsert_language(fixtures::language("en", "fluent"));
        let english_id = summary.languages[0].id;

        let form = LanguageForm {
            code: "en".to_string(),
            level: "basic".to_string(),
        };

        let (errors, _) = form.to_language(Uuid::new_v4(), &summary);
        assert_eq!(errors.for_field("code"), vec![LANGUAGE_ALREADY_SPOKEN]);

        // Editing the same language keeps its code
        let (errors, language) = form.to_language(english_id, &summary);
        assert!(errors.is_empty());
        assert_eq!(language.summary_id, summary.id);
    }

    #[test]
    fn test_autocompletion_requires_xhr() {
        let mut headers = HeaderMap::new();
        assert!(!is_xml_http_request(&headers));

        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert!(is_xml_http_request(&headers));
    }

    #[test]
    fn test_photo_url_is_signed() {
        let carl = crate::models::adherent::fixtures::adherent("Carl", "Mirabeau");
        let url = photo_url(&carl, b"secret");

        assert!(url.starts_with(&format!("/assets/images/{}.jpg?s=", carl.id)));
    }
}
