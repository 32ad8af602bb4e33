use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const GENDERS: [(&str, &str); 2] = [("male", "Homme"), ("female", "Femme")];

pub const POSITIONS: [(&str, &str); 5] = [
    ("student", "Étudiant"),
    ("employed", "En activité"),
    ("self_employed", "Indépendant"),
    ("unemployed", "En recherche d'emploi"),
    ("retired", "Retraité"),
];

/// Interests an adherent can pin on the profile, in display order
pub const INTERESTS: [(&str, &str); 18] = [
    ("agriculture", "Agriculture"),
    ("culture", "Culture"),
    ("democratie", "Démocratie"),
    ("economie", "Économie"),
    ("education", "Éducation"),
    ("egalite", "Égalité F/H"),
    ("emploi", "Emploi"),
    ("environnement", "Environnement"),
    ("europe", "Europe"),
    ("international", "International"),
    ("jeunesse", "Jeunesse"),
    ("justice", "Justice"),
    ("logement", "Logement"),
    ("numerique", "Numérique"),
    ("sante", "Santé"),
    ("securite", "Sécurité"),
    ("solidarite", "Solidarité"),
    ("territoire", "Territoire"),
];

pub const COUNTRIES: [(&str, &str); 10] = [
    ("FR", "France"),
    ("BE", "Belgique"),
    ("CH", "Suisse"),
    ("LU", "Luxembourg"),
    ("DE", "Allemagne"),
    ("ES", "Espagne"),
    ("IT", "Italie"),
    ("GB", "Royaume-Uni"),
    ("US", "États-Unis"),
    ("CA", "Canada"),
];

pub const SUBSCRIBED_EMAILS_MAIN: &str = "subscribed_emails_main";
pub const SUBSCRIBED_EMAILS_REFERENTS: &str = "subscribed_emails_referents";
pub const SUBSCRIBED_EMAILS_LOCAL_HOST: &str = "subscribed_emails_local_host";

pub const EMAIL_SUBSCRIPTIONS: [(&str, &str); 3] = [
    (SUBSCRIBED_EMAILS_MAIN, "Recevoir les e-mails nationaux"),
    (SUBSCRIBED_EMAILS_REFERENTS, "Recevoir les e-mails de mon référent"),
    (SUBSCRIBED_EMAILS_LOCAL_HOST, "Recevoir les e-mails de mes animateurs locaux"),
];

pub fn choice_keys(choices: &[(&'static str, &'static str)]) -> Vec<&'static str> {
    choices.iter().map(|(key, _)| *key).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Adherent {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub gender: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city_code: Option<String>,
    pub city_name: Option<String>,
    pub country: String,
    pub phone_country: Option<String>,
    pub phone_number: Option<String>,
    pub position: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub interests: Vec<String>,
    pub email_subscriptions: Vec<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAdherentData {
    pub email: String,
    pub password_hash: String,
    pub gender: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone)]
pub struct UpdateProfileData {
    pub gender: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub postal_code: String,
    pub city_code: String,
    pub city_name: Option<String>,
    pub country: String,
    pub phone_country: Option<String>,
    pub phone_number: Option<String>,
    pub position: String,
    pub birthdate: Option<NaiveDate>,
}

impl Adherent {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// "Membre depuis nov. 2016"
    pub fn membership_since(&self) -> String {
        const MONTHS: [&str; 12] = [
            "janv.", "févr.", "mars", "avr.", "mai", "juin", "juil.", "août", "sept.", "oct.",
            "nov.", "déc.",
        ];
        let month = MONTHS
            .get(chrono::Datelike::month0(&self.created_at) as usize)
            .copied()
            .unwrap_or_default();

        format!(
            "Membre depuis {} {}",
            month,
            chrono::Datelike::year(&self.created_at)
        )
    }

    pub fn has_subscribed(&self, subscription: &str) -> bool {
        self.email_subscriptions.iter().any(|s| s == subscription)
    }

    pub fn has_subscribed_main_emails(&self) -> bool {
        self.has_subscribed(SUBSCRIBED_EMAILS_MAIN)
    }

    pub fn has_subscribed_referents_emails(&self) -> bool {
        self.has_subscribed(SUBSCRIBED_EMAILS_REFERENTS)
    }

    pub fn has_subscribed_local_host_emails(&self) -> bool {
        self.has_subscribed(SUBSCRIBED_EMAILS_LOCAL_HOST)
    }

    /// Registers a new adherent
    pub async fn create(pool: &PgPool, data: CreateAdherentData) -> Result<Self, sqlx::Error> {
        let adherent = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO adherents (email, password_hash, gender, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(data.email.trim().to_lowercase())
        .bind(&data.password_hash)
        .bind(&data.gender)
        .bind(&data.first_name)
        .bind(&data.last_name)
        .fetch_one(pool)
        .await?;

        Ok(adherent)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let adherent = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM adherents WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(adherent)
    }

    /// E-mail lookups are case-insensitive
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let adherent = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM adherents WHERE email = $1
            "#,
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;

        Ok(adherent)
    }

    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProfileData,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE adherents
            SET
                gender = $2,
                first_name = $3,
                last_name = $4,
                address = $5,
                postal_code = $6,
                city_code = $7,
                city_name = $8,
                country = $9,
                phone_country = $10,
                phone_number = $11,
                position = $12,
                birthdate = $13,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&data.gender)
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(&data.address)
        .bind(&data.postal_code)
        .bind(&data.city_code)
        .bind(&data.city_name)
        .bind(&data.country)
        .bind(&data.phone_country)
        .bind(&data.phone_number)
        .bind(&data.position)
        .bind(data.birthdate)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update_interests(
        pool: &PgPool,
        id: Uuid,
        interests: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE adherents SET interests = $2, updated_at = NOW() WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(interests)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update_email_subscriptions(
        pool: &PgPool,
        id: Uuid,
        subscriptions: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE adherents SET email_subscriptions = $2, updated_at = NOW() WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(subscriptions)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update_password_hash(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE adherents SET password_hash = $2, updated_at = NOW() WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(())
    }
}
