// API module - HTTP endpoints

pub mod adherent;
pub mod admin;
pub mod assets;
pub mod auth;
pub mod committees;
pub mod csrf;
pub mod flash;
pub mod form;
pub mod health;
pub mod middleware;
pub mod profile;
pub mod summary;
pub mod summary_manager;

use axum::{routing::get_service, Router};
use std::path::Path;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{SessionManagerLayer, SessionStore};

use middleware::session::AppState;

/// Assembles every area of the site behind the given session layer
pub fn build_router<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    let static_routes = Router::new().nest_service(
        "/static",
        get_service(ServeDir::new(Path::new("web").join("static"))),
    );

    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(profile::router())
        .merge(adherent::router())
        .merge(committees::router())
        .merge(summary_manager::router(state.clone()))
        .merge(summary::router())
        .merge(assets::router())
        .merge(admin::router(state.clone()))
        .merge(static_routes)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppEnv, Config};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use secrecy::Secret;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    fn app(app_env: AppEnv) -> Router {
        let config = Config {
            database_url: "postgres://localhost/espace_adherent_test".to_string(),
            base_url: "http://localhost:8000".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            app_env,
            app_secret: Secret::new("s3cr3t".to_string()),
            assets_dir: "var/assets".to_string(),
            documents_dir: "var/documents".to_string(),
            session_secure: false,
        };
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let state = AppState { pool, config };

        build_router(state, middleware::session::session_layer(MemoryStore::default(), false))
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_visitor_is_sent_to_login() {
        let response = get(app(AppEnv::Test), "/espace-adherent/mon-profil").await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            crate::error::LOGIN_PATH
        );
    }

    #[tokio::test]
    async fn test_summary_manager_is_hidden_in_production() {
        let response = get(app(AppEnv::Production), "/espace-adherent/mon-cv").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summary_manager_requires_login_outside_production() {
        let response = get(app(AppEnv::Test), "/espace-adherent/mon-cv").await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_asset_with_bad_signature_is_not_found() {
        let response = get(app(AppEnv::Test), "/assets/images/photo.jpg?s=nope").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
