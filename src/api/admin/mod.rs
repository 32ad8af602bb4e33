// Back-office - administrators only

pub mod oauth_clients;
pub mod social_shares;
pub mod summaries;

use axum::Router;

use crate::api::middleware::{auth::require_admin, session::AppState};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(summaries::router())
        .merge(social_shares::router())
        .merge(oauth_clients::router())
        .route_layer(axum::middleware::from_fn_with_state(state, require_admin))
}
