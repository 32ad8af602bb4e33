use askama::Template;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::flash::{self, Flash};
use crate::api::middleware::session::{AppState, SESSION_KEY_ADHERENT_ID};
use crate::error::{Result, LOGIN_PATH};
use crate::models::adherent::Adherent;
use crate::services::password::verify_password;

pub const HOME_PATH: &str = "/espace-adherent/mon-profil";
const INVALID_CREDENTIALS: &str = "Adresse e-mail ou mot de passe invalide.";

#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    flashes: Vec<Flash>,
    email: String,
    error: Option<&'static str>,
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// Show login form
async fn login_form(session: Session) -> Result<LoginTemplate> {
    Ok(LoginTemplate {
        flashes: flash::take_flashes(&session).await?,
        email: String::new(),
        error: None,
    })
}

/// Authenticates an adherent by e-mail and password
async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let adherent = Adherent::find_by_email(&state.pool, &form.email).await?;

    let authenticated = match &adherent {
        Some(adherent) => match verify_password(&form.password, &adherent.password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::error!(adherent_id = %adherent.id, error = %e, "Stored password hash is unreadable");
                false
            }
        },
        None => false,
    };

    let Some(adherent) = adherent.filter(|_| authenticated) else {
        tracing::info!("Failed login attempt");
        return Ok(LoginTemplate {
            flashes: vec![],
            email: form.email,
            error: Some(INVALID_CREDENTIALS),
        }
        .into_response());
    };

    session.cycle_id().await?;
    session.insert(SESSION_KEY_ADHERENT_ID, adherent.id).await?;

    tracing::info!(adherent_id = %adherent.id, "Adherent logged in");

    Ok(Redirect::to(HOME_PATH).into_response())
}

async fn logout(session: Session) -> Result<Redirect> {
    session.flush().await?;

    Ok(Redirect::to(LOGIN_PATH))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(LOGIN_PATH, get(login_form).post(login))
        .route("/espace-adherent/deconnexion", get(logout))
}
