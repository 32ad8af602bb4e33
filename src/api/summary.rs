use askama::Template;
use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use secrecy::ExposeSecret;
use tower_sessions::Session;

use crate::api::flash::{self, Flash};
use crate::api::middleware::{auth::optional_adherent, session::AppState};
use crate::api::summary_manager::photo_url;
use crate::error::{AppError, Result};
use crate::models::{Adherent, Summary};
use crate::services::activity_tracker::{
    recent_activities_for_adherent, Activity, RECENT_ACTIVITIES_LIMIT,
};

#[derive(Template)]
#[template(path = "summary/show.html")]
struct SummaryTemplate {
    flashes: Vec<Flash>,
    member: Adherent,
    summary: Summary,
    photo_url: String,
    activities: Vec<Activity>,
    is_owner: bool,
}

/// Unpublished summaries are only shown to their owner
fn is_visible(summary: &Summary, viewer: Option<&Adherent>) -> bool {
    summary.public || viewer.is_some_and(|v| v.id == summary.member_id)
}

async fn show_summary(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<SummaryTemplate> {
    let not_found = || AppError::NotFound("Summary not found".to_string());

    let summary = Summary::find_by_slug(&state.pool, &slug)
        .await?
        .ok_or_else(not_found)?;
    let viewer = optional_adherent(&session, &state.pool).await?;
    if !is_visible(&summary, viewer.as_ref()) {
        return Err(not_found());
    }

    let member = Adherent::find_by_id(&state.pool, summary.member_id)
        .await?
        .ok_or_else(not_found)?;

    let activities = if summary.showing_recent_activities {
        recent_activities_for_adherent(&state.pool, member.id, RECENT_ACTIVITIES_LIMIT).await?
    } else {
        vec![]
    };

    Ok(SummaryTemplate {
        flashes: flash::take_flashes(&session).await?,
        photo_url: photo_url(&member, state.config.app_secret.expose_secret().as_bytes()),
        is_owner: viewer.is_some_and(|v| v.id == member.id),
        member,
        summary,
        activities,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/membre/:slug", get(show_summary))
}
