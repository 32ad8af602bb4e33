use std::collections::HashMap;
use std::path::{Component, Path as FsPath};

use axum::{
    extract::{Path, Query, Request, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use secrecy::ExposeSecret;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::services::signature::{sign_asset, verify_asset};

/// `/assets/<path>?s=<signature>` for a file under the assets directory
pub fn signed_asset_url(path: &str, secret: &[u8]) -> String {
    let path = path.trim_start_matches('/');
    format!("/assets/{}?s={}", path, sign_asset(path, &[], secret))
}

/// Relative paths without `..`, root or prefix components
fn is_safe_asset_path(path: &str) -> bool {
    !path.is_empty()
        && FsPath::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

async fn serve_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Result<Response> {
    let not_found = || AppError::NotFound("Asset not found".to_string());

    let signature = params.get("s").ok_or_else(not_found)?;
    let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();

    let secret = state.config.app_secret.expose_secret().as_bytes();
    if let Err(e) = verify_asset(&path, &params, signature, secret) {
        tracing::debug!(path = %path, error = %e, "Rejected asset signature");
        return Err(not_found());
    }

    if !is_safe_asset_path(&path) {
        return Err(not_found());
    }

    let file = FsPath::new(&state.config.assets_dir).join(&path);
    if !tokio::fs::try_exists(&file).await.unwrap_or(false) {
        return Err(not_found());
    }

    match ServeFile::new(file).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/assets/*path", get(serve_asset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_asset_url_verifies() {
        let secret = b"app-secret";
        let url = signed_asset_url("/images/photo.jpg", secret);

        let signature = url
            .split_once("?s=")
            .map(|(_, s)| s.to_string())
            .unwrap();
        assert!(url.starts_with("/assets/images/photo.jpg?s="));
        assert!(verify_asset("images/photo.jpg", &[], &signature, secret).is_ok());
        assert!(verify_asset("images/other.jpg", &[], &signature, secret).is_err());
    }

    #[test]
    fn test_asset_paths() {
        assert!(is_safe_asset_path("images/photo.jpg"));
        assert!(!is_safe_asset_path("../config.env"));
        assert!(!is_safe_asset_path("/etc/passwd"));
        assert!(!is_safe_asset_path("images/../../secret"));
        assert!(!is_safe_asset_path(""));
    }
}
