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
use crate::api::form::{choices, single_choice, Choice, FormData};
use crate::api::middleware::{
    auth::{current_adherent, require_auth},
    session::AppState,
};
use crate::error::{AppError, Result};
use crate::models::adherent::{
    choice_keys, Adherent, UpdateProfileData, COUNTRIES, EMAIL_SUBSCRIPTIONS, GENDERS, INTERESTS,
    POSITIONS,
};
use crate::services::password::{hash_password, verify_password};
use crate::services::validation::FormErrors;

const PROFILE_PATH: &str = "/espace-adherent/mon-profil";
const INTERESTS_PATH: &str = "/espace-adherent/mon-profil/centres-d-interet";
const PASSWORD_PATH: &str = "/espace-adherent/mon-profil/changer-mot-de-passe";
const EMAIL_PREFERENCES_PATH: &str = "/espace-adherent/mon-profil/preferences-des-emails";

const INVALID_PASSWORD: &str = "Le mot de passe est invalide.";
const PASSWORD_MISMATCH: &str = "Les deux mots de passe doivent correspondre.";
const PASSWORD_TOO_SHORT: &str = "Votre mot de passe doit comporter au moins 8 caractères.";
const PASSWORD_MIN_LENGTH: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub gender: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub postal_code: String,
    pub city_code: String,
    pub city_name: String,
    pub country: String,
    pub phone_country: String,
    pub phone_number: String,
    pub position: String,
    pub birthdate: String,
}

impl ProfileForm {
    fn from_adherent(adherent: &Adherent) -> Self {
        Self {
            gender: adherent.gender.clone(),
            first_name: adherent.first_name.clone(),
            last_name: adherent.last_name.clone(),
            address: adherent.address.clone().unwrap_or_default(),
            postal_code: adherent.postal_code.clone().unwrap_or_default(),
            city_code: adherent.city_code.clone().unwrap_or_default(),
            city_name: adherent.city_name.clone().unwrap_or_default(),
            country: adherent.country.clone(),
            phone_country: adherent.phone_country.clone().unwrap_or_default(),
            phone_number: adherent.phone_number.clone().unwrap_or_default(),
            position: adherent.position.clone().unwrap_or_default(),
            birthdate: adherent
                .birthdate
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        }
    }

    /// Collects every field error; data is only returned when the form is valid
    pub fn validate(&self) -> (FormErrors, Option<UpdateProfileData>) {
        let mut errors = FormErrors::new();

        errors.choice("gender", &self.gender, &choice_keys(&GENDERS));
        errors.not_blank("first_name", &self.first_name);
        errors.not_blank("last_name", &self.last_name);
        errors.choice("country", &self.country, &choice_keys(&COUNTRIES));
        errors.address(
            "address",
            &self.country,
            &self.address,
            &self.postal_code,
            &self.city_code,
        );
        errors.choice("position", &self.position, &choice_keys(&POSITIONS));
        let birthdate = errors.optional_date("birthdate", &self.birthdate);

        if !errors.is_empty() {
            return (errors, None);
        }

        let optional = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        let data = UpdateProfileData {
            gender: self.gender.clone(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            address: self.address.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            city_code: self.city_code.trim().to_string(),
            city_name: optional(&self.city_name),
            country: self.country.clone(),
            phone_country: optional(&self.phone_country),
            phone_number: optional(&self.phone_number),
            position: self.position.clone(),
            birthdate,
        };

        (errors, Some(data))
    }
}

#[derive(Template)]
#[template(path = "profile/edit.html")]
struct ProfileTemplate {
    flashes: Vec<Flash>,
    adherent: Adherent,
    active: &'static str,
    form: ProfileForm,
    genders: Vec<Choice>,
    countries: Vec<Choice>,
    positions: Vec<Choice>,
    errors: FormErrors,
}

impl ProfileTemplate {
    fn new(flashes: Vec<Flash>, adherent: Adherent, form: ProfileForm, errors: FormErrors) -> Self {
        Self {
            flashes,
            genders: single_choice(&GENDERS, &form.gender),
            countries: single_choice(&COUNTRIES, &form.country),
            positions: single_choice(&POSITIONS, &form.position),
            adherent,
            active: PROFILE_PATH,
            form,
            errors,
        }
    }
}

#[derive(Template)]
#[template(path = "profile/interests.html")]
struct InterestsTemplate {
    flashes: Vec<Flash>,
    adherent: Adherent,
    active: &'static str,
    interests: Vec<Choice>,
    errors: FormErrors,
}

#[derive(Template)]
#[template(path = "profile/password.html")]
struct PasswordTemplate {
    flashes: Vec<Flash>,
    adherent: Adherent,
    active: &'static str,
    errors: FormErrors,
}

#[derive(Template)]
#[template(path = "profile/email_preferences.html")]
struct EmailPreferencesTemplate {
    flashes: Vec<Flash>,
    adherent: Adherent,
    active: &'static str,
    subscriptions: Vec<Choice>,
    errors: FormErrors,
}

async fn edit_profile(State(state): State<AppState>, session: Session) -> Result<ProfileTemplate> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let form = ProfileForm::from_adherent(&adherent);

    Ok(ProfileTemplate::new(
        flash::take_flashes(&session).await?,
        adherent,
        form,
        FormErrors::new(),
    ))
}

async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ProfileForm>,
) -> Result<Response> {
    let adherent = current_adherent(&session, &state.pool).await?;

    let (errors, data) = form.validate();
    let Some(data) = data else {
        return Ok(ProfileTemplate::new(vec![], adherent, form, errors).into_response());
    };

    Adherent::update_profile(&state.pool, adherent.id, data).await?;
    tracing::info!(adherent_id = %adherent.id, "Profile updated");

    flash::info(&session, "Vos informations ont été mises à jour avec succès.").await?;

    Ok(Redirect::to(PROFILE_PATH).into_response())
}

async fn edit_interests(State(state): State<AppState>, session: Session) -> Result<InterestsTemplate> {
    let adherent = current_adherent(&session, &state.pool).await?;

    Ok(InterestsTemplate {
        flashes: flash::take_flashes(&session).await?,
        interests: choices(&INTERESTS, &adherent.interests),
        adherent,
        active: INTERESTS_PATH,
        errors: FormErrors::new(),
    })
}

async fn update_interests(
    State(state): State<AppState>,
    session: Session,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let submitted = FormData::new(fields).all("interests");

    let mut errors = FormErrors::new();
    if !errors.choices("interests", &submitted, &choice_keys(&INTERESTS)) {
        return Ok(InterestsTemplate {
            flashes: vec![],
            interests: choices(&INTERESTS, &submitted),
            adherent,
            active: INTERESTS_PATH,
            errors,
        }
        .into_response());
    }

    // Stored in display order whatever the submission order
    let interests: Vec<String> = choice_keys(&INTERESTS)
        .into_iter()
        .filter(|key| submitted.iter().any(|s| s == key))
        .map(String::from)
        .collect();

    Adherent::update_interests(&state.pool, adherent.id, &interests).await?;
    tracing::info!(adherent_id = %adherent.id, count = interests.len(), "Interests updated");

    flash::info(&session, "Vos centres d'intérêt ont bien été mis à jour.").await?;

    Ok(Redirect::to(INTERESTS_PATH).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChangePasswordForm {
    old_password: String,
    new_password: String,
    new_password_confirmation: String,
}

fn validate_password_change(form: &ChangePasswordForm, adherent: &Adherent) -> FormErrors {
    let mut errors = FormErrors::new();

    if !verify_password(&form.old_password, &adherent.password_hash).unwrap_or(false) {
        errors.add("old_password", INVALID_PASSWORD);
    }

    if errors.not_blank("new_password", &form.new_password) {
        if form.new_password != form.new_password_confirmation {
            errors.add("new_password", PASSWORD_MISMATCH);
        } else {
            errors.min_length(
                "new_password",
                &form.new_password,
                PASSWORD_MIN_LENGTH,
                PASSWORD_TOO_SHORT,
            );
        }
    }

    errors
}

async fn edit_password(State(state): State<AppState>, session: Session) -> Result<PasswordTemplate> {
    let adherent = current_adherent(&session, &state.pool).await?;

    Ok(PasswordTemplate {
        flashes: flash::take_flashes(&session).await?,
        adherent,
        active: PASSWORD_PATH,
        errors: FormErrors::new(),
    })
}

async fn change_password(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Response> {
    let adherent = current_adherent(&session, &state.pool).await?;

    let errors = validate_password_change(&form, &adherent);
    if !errors.is_empty() {
        return Ok(PasswordTemplate {
            flashes: vec![],
            adherent,
            active: PASSWORD_PATH,
            errors,
        }
        .into_response());
    }

    let hash = hash_password(&form.new_password).map_err(|e| AppError::Internal(e.into()))?;
    Adherent::update_password_hash(&state.pool, adherent.id, &hash).await?;
    tracing::info!(adherent_id = %adherent.id, "Password changed");

    flash::info(&session, "Votre mot de passe a bien été modifié.").await?;

    Ok(Redirect::to(PASSWORD_PATH).into_response())
}

async fn edit_email_preferences(
    State(state): State<AppState>,
    session: Session,
) -> Result<EmailPreferencesTemplate> {
    let adherent = current_adherent(&session, &state.pool).await?;

    Ok(EmailPreferencesTemplate {
        flashes: flash::take_flashes(&session).await?,
        subscriptions: choices(&EMAIL_SUBSCRIPTIONS, &adherent.email_subscriptions),
        adherent,
        active: EMAIL_PREFERENCES_PATH,
        errors: FormErrors::new(),
    })
}

async fn update_email_preferences(
    State(state): State<AppState>,
    session: Session,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let adherent = current_adherent(&session, &state.pool).await?;
    let submitted = FormData::new(fields).all("email_subscriptions");

    let mut errors = FormErrors::new();
    if !errors.choices("email_subscriptions", &submitted, &choice_keys(&EMAIL_SUBSCRIPTIONS)) {
        return Ok(EmailPreferencesTemplate {
            flashes: vec![],
            subscriptions: choices(&EMAIL_SUBSCRIPTIONS, &adherent.email_subscriptions),
            adherent,
            active: EMAIL_PREFERENCES_PATH,
            errors,
        }
        .into_response());
    }

    Adherent::update_email_subscriptions(&state.pool, adherent.id, &submitted).await?;
    tracing::info!(adherent_id = %adherent.id, "E-mail preferences updated");

    flash::info(&session, "Vos préférences d'e-mails ont bien été mises à jour.").await?;

    Ok(Redirect::to(EMAIL_PREFERENCES_PATH).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(PROFILE_PATH, get(edit_profile).post(update_profile))
        .route(INTERESTS_PATH, get(edit_interests).post(update_interests))
        .route(PASSWORD_PATH, get(edit_password).post(change_password))
        .route(
            EMAIL_PREFERENCES_PATH,
            get(edit_email_preferences).post(update_email_preferences),
        )
        .route_layer(axum::middleware::from_fn(require_auth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::adherent::fixtures::adherent;
    use crate::services::validation::{
        ADDRESS_REQUIRED, INVALID_POSTAL_CODE, NOT_BLANK, UNRECOGNIZED_ADDRESS,
    };

    #[test]
    fn test_invalid_profile_yields_five_errors_in_form_order() {
        let form = ProfileForm {
            gender: "male".to_string(),
            country: "FR".to_string(),
            postal_code: "99999".to_string(),
            city_code: "10102-45029".to_string(),
            phone_country: "FR".to_string(),
            position: "student".to_string(),
            ..Default::default()
        };

        let (errors, data) = form.validate();
        let messages: Vec<&str> = errors.all().iter().map(|e| e.message.as_str()).collect();

        assert!(data.is_none());
        assert_eq!(
            messages,
            vec![
                NOT_BLANK,
                NOT_BLANK,
                INVALID_POSTAL_CODE,
                UNRECOGNIZED_ADDRESS,
                ADDRESS_REQUIRED
            ]
        );
    }

    #[test]
    fn test_valid_profile() {
        let form = ProfileForm {
            gender: "female".to_string(),
            first_name: "Jean".to_string(),
            last_name: "Dupont".to_string(),
            address: "9 rue du Lycée".to_string(),
            postal_code: "06000".to_string(),
            city_code: "06000-6088".to_string(),
            city_name: "Nice".to_string(),
            country: "FR".to_string(),
            phone_country: "FR".to_string(),
            phone_number: "0401020304".to_string(),
            position: "student".to_string(),
            birthdate: "1985-10-27".to_string(),
        };

        let (errors, data) = form.validate();
        let data = data.unwrap();

        assert!(errors.is_empty());
        assert_eq!(data.city_name.as_deref(), Some("Nice"));
        assert_eq!(data.birthdate.unwrap().to_string(), "1985-10-27");
    }

    #[test]
    fn test_profile_form_prefills_from_adherent() {
        let form = ProfileForm::from_adherent(&adherent("Carl", "Mirabeau"));

        assert_eq!(form.address, "122 rue de Mouxy");
        assert_eq!(form.city_code, "73100-73182");
        assert_eq!(form.birthdate, "1950-07-08");
        assert_eq!(form.position, "retired");
    }

    #[test]
    fn test_blank_password_change_yields_two_errors() {
        let mut carl = adherent("Carl", "Mirabeau");
        carl.password_hash = hash_password("secret!12345").unwrap();

        let errors = validate_password_change(&ChangePasswordForm::default(), &carl);
        let messages: Vec<&str> = errors.all().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec![INVALID_PASSWORD, NOT_BLANK]);

        let valid = ChangePasswordForm {
            old_password: "secret!12345".to_string(),
            new_password: "heaneaheah".to_string(),
            new_password_confirmation: "heaneaheah".to_string(),
        };
        assert!(validate_password_change(&valid, &carl).is_empty());

        let mismatch = ChangePasswordForm {
            new_password_confirmation: "other".to_string(),
            ..valid
        };
        assert_eq!(
            validate_password_change(&mismatch, &carl).for_field("new_password"),
            vec![PASSWORD_MISMATCH]
        );
    }
}
