use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use super::session::{AppState, SESSION_KEY_ADHERENT_ID};
use crate::error::{AppError, Result};
use crate::models::adherent::Adherent;

/// Middleware that sends anonymous visitors to the login page
pub async fn require_auth(session: Session, request: Request, next: Next) -> Result<Response> {
    let adherent_id: Option<Uuid> = session.get(SESSION_KEY_ADHERENT_ID).await?;

    if adherent_id.is_none() {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Middleware restricting the back-office to administrators
pub async fn require_admin(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response> {
    let adherent = current_adherent(&session, &state.pool).await?;

    if !adherent.is_admin {
        tracing::warn!(adherent_id = %adherent.id, "Back-office access denied");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

/// Loads the adherent stored in the session
pub async fn current_adherent(session: &Session, pool: &PgPool) -> Result<Adherent> {
    let adherent_id: Uuid = session
        .get(SESSION_KEY_ADHERENT_ID)
        .await?
        .ok_or(AppError::Unauthorized)?;

    match Adherent::find_by_id(pool, adherent_id).await? {
        Some(adherent) => Ok(adherent),
        None => {
            // Account removed while the session was alive
            session.flush().await?;
            Err(AppError::Unauthorized)
        }
    }
}

/// Same as [`current_adherent`] but for pages anonymous visitors may see too
pub async fn optional_adherent(session: &Session, pool: &PgPool) -> Result<Option<Adherent>> {
    let adherent_id: Option<Uuid> = session.get(SESSION_KEY_ADHERENT_ID).await?;

    match adherent_id {
        Some(id) => Ok(Adherent::find_by_id(pool, id).await?),
        None => Ok(None),
    }
}
