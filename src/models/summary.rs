//! The member summary (CV) aggregate and its owned collections.
//!
//! A summary owns its job experiences, trainings, languages and skills.
//! Collections are loaded alongside the summary row and mutated through
//! the aggregate so that ordering and ownership checks live in one place;
//! [`crate::services::summary_manager::SummaryManager`] persists the result.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::adherent::choice_keys;
use crate::services::validation::FormErrors;

pub const CONTRIBUTION_WISHES: [(&str, &str); 3] = [
    ("volunteer", "Bénévole"),
    ("part_time", "Temps partiel"),
    ("full_time", "Temps plein"),
];

pub const AVAILABILITIES: [(&str, &str); 4] = [
    ("full_time", "Temps plein"),
    ("part_time", "Temps partiel"),
    ("evenings", "Soirées"),
    ("weekends", "Week-ends"),
];

pub const JOB_LOCATIONS: [(&str, &str); 3] = [
    ("on_site", "Sur place"),
    ("remote", "À distance"),
    ("mobile", "En mobilité"),
];

pub const MISSION_TYPES: [(&str, &str); 6] = [
    ("communication", "Communication"),
    ("digital", "Numérique"),
    ("events", "Événementiel"),
    ("expertise", "Expertise thématique"),
    ("fundraising", "Levée de fonds"),
    ("local_action", "Action locale"),
];

pub const CONTRACTS: [(&str, &str); 6] = [
    ("cdi", "CDI"),
    ("cdd", "CDD"),
    ("interim", "Intérim"),
    ("freelance", "Indépendant"),
    ("internship", "Stage"),
    ("volunteering", "Bénévolat"),
];

pub const JOB_DURATIONS: [(&str, &str); 2] = [("full_time", "Temps plein"), ("part_time", "Temps partiel")];

pub const LANGUAGE_CODES: [(&str, &str); 8] = [
    ("fr", "Français"),
    ("en", "Anglais"),
    ("de", "Allemand"),
    ("es", "Espagnol"),
    ("it", "Italien"),
    ("pt", "Portugais"),
    ("ar", "Arabe"),
    ("zh", "Chinois"),
];

pub const LANGUAGE_LEVELS: [(&str, &str); 4] = [
    ("basic", "Notions"),
    ("medium", "Intermédiaire"),
    ("fluent", "Courant"),
    ("native", "Langue maternelle"),
];

pub const LANGUAGE_ALREADY_SPOKEN: &str = "Cette langue figure déjà dans votre CV.";
pub const ENDED_BEFORE_STARTED: &str = "La date de fin doit être postérieure à la date de début.";
pub const ENDED_AT_REQUIRED: &str = "Indiquez une date de fin ou cochez « en cours ».";

/// Label of a choice key, falling back to the key itself
pub fn choice_label(choices: &[(&'static str, &'static str)], key: &str) -> String {
    choices
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Wizard steps, in the order they are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStep {
    Synthesis,
    Missions,
    Motivation,
    Competences,
    Contact,
}

impl SummaryStep {
    pub const ALL: [SummaryStep; 5] = [
        SummaryStep::Synthesis,
        SummaryStep::Missions,
        SummaryStep::Motivation,
        SummaryStep::Competences,
        SummaryStep::Contact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStep::Synthesis => "synthesis",
            SummaryStep::Missions => "missions",
            SummaryStep::Motivation => "motivation",
            SummaryStep::Competences => "competences",
            SummaryStep::Contact => "contact",
        }
    }

    /// `"synthesis", "missions", ...` for error messages
    pub fn known_steps() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\", \"")
    }
}

impl FromStr for SummaryStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Invalid step \"{}\", known steps are \"{}\".",
                    s,
                    Self::known_steps()
                )
            })
    }
}

impl fmt::Display for SummaryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Items owned by a summary and kept in display order
pub trait SummaryItem {
    fn id(&self) -> Uuid;
    fn display_order(&self) -> i32;
    fn set_display_order(&mut self, order: i32);
}

/// Outcome of adding an item to one of the summary collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

fn upsert_item<T: SummaryItem>(items: &mut Vec<T>, mut item: T) -> Upsert {
    if let Some(existing) = items.iter_mut().find(|i| i.id() == item.id()) {
        item.set_display_order(existing.display_order());
        *existing = item;
        return Upsert::Replaced;
    }

    let next = items.iter().map(|i| i.display_order()).max().unwrap_or(0) + 1;
    item.set_display_order(next);
    items.push(item);
    Upsert::Inserted
}

fn remove_item<T: SummaryItem>(items: &mut Vec<T>, id: Uuid) -> bool {
    let before = items.len();
    items.retain(|i| i.id() != id);
    items.len() != before
}

fn validate_period(
    errors: &mut FormErrors,
    started_at: NaiveDate,
    ended_at: Option<NaiveDate>,
    on_going: bool,
) {
    match ended_at {
        Some(ended_at) if ended_at < started_at => errors.add("ended_at", ENDED_BEFORE_STARTED),
        None if !on_going => errors.add("ended_at", ENDED_AT_REQUIRED),
        _ => {}
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobExperience {
    pub id: Uuid,
    pub summary_id: Uuid,
    pub company: String,
    pub position: String,
    pub location: String,
    pub website: Option<String>,
    pub company_facebook_page: Option<String>,
    pub company_twitter_nickname: Option<String>,
    pub contract: String,
    pub duration: String,
    pub description: Option<String>,
    pub started_at: NaiveDate,
    pub ended_at: Option<NaiveDate>,
    pub on_going: bool,
    pub display_order: i32,
}

impl SummaryItem for JobExperience {
    fn id(&self) -> Uuid {
        self.id
    }

    fn display_order(&self) -> i32 {
        self.display_order
    }

    fn set_display_order(&mut self, order: i32) {
        self.display_order = order;
    }
}

impl JobExperience {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.not_blank("company", &self.company);
        errors.not_blank("position", &self.position);
        errors.not_blank("location", &self.location);
        errors.choice("contract", &self.contract, &choice_keys(&CONTRACTS));
        errors.choice("duration", &self.duration, &choice_keys(&JOB_DURATIONS));
        errors.optional_url("website", self.website.as_deref().unwrap_or_default());
        errors.optional_url(
            "company_facebook_page",
            self.company_facebook_page.as_deref().unwrap_or_default(),
        );
        errors.optional_twitter_nickname(
            "company_twitter_nickname",
            self.company_twitter_nickname.as_deref().unwrap_or_default(),
        );
        validate_period(&mut errors, self.started_at, self.ended_at, self.on_going);
        errors
    }

    pub fn contract_label(&self) -> String {
        choice_label(&CONTRACTS, &self.contract)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO member_summary_job_experiences (
                id, summary_id, company, position, location, website, company_facebook_page,
                company_twitter_nickname, contract, duration, description, started_at,
                ended_at, on_going, display_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(self.id)
        .bind(self.summary_id)
        .bind(&self.company)
        .bind(&self.position)
        .bind(&self.location)
        .bind(&self.website)
        .bind(&self.company_facebook_page)
        .bind(&self.company_twitter_nickname)
        .bind(&self.contract)
        .bind(&self.duration)
        .bind(&self.description)
        .bind(self.started_at)
        .bind(self.ended_at)
        .bind(self.on_going)
        .bind(self.display_order)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE member_summary_job_experiences
            SET
                company = $3,
                position = $4,
                location = $5,
                website = $6,
                company_facebook_page = $7,
                company_twitter_nickname = $8,
                contract = $9,
                duration = $10,
                description = $11,
                started_at = $12,
                ended_at = $13,
                on_going = $14
            WHERE id = $1 AND summary_id = $2
            "#,
        )
        .bind(self.id)
        .bind(self.summary_id)
        .bind(&self.company)
        .bind(&self.position)
        .bind(&self.location)
        .bind(&self.website)
        .bind(&self.company_facebook_page)
        .bind(&self.company_twitter_nickname)
        .bind(&self.contract)
        .bind(&self.duration)
        .bind(&self.description)
        .bind(self.started_at)
        .bind(self.ended_at)
        .bind(self.on_going)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &PgPool, summary_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM member_summary_job_experiences WHERE id = $1 AND summary_id = $2
            "#,
        )
        .bind(id)
        .bind(summary_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Training {
    pub id: Uuid,
    pub summary_id: Uuid,
    pub organization: String,
    pub diploma: String,
    pub study_field: String,
    pub description: Option<String>,
    pub extra_curricular: Option<String>,
    pub started_at: NaiveDate,
    pub ended_at: Option<NaiveDate>,
    pub on_going: bool,
    pub display_order: i32,
}

impl SummaryItem for Training {
    fn id(&self) -> Uuid {
        self.id
    }

    fn display_order(&self) -> i32 {
        self.display_order
    }

    fn set_display_order(&mut self, order: i32) {
        self.display_order = order;
    }
}

impl Training {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.not_blank("organization", &self.organization);
        errors.not_blank("diploma", &self.diploma);
        errors.not_blank("study_field", &self.study_field);
        validate_period(&mut errors, self.started_at, self.ended_at, self.on_going);
        errors
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO member_summary_trainings (
                id, summary_id, organization, diploma, study_field, description,
                extra_curricular, started_at, ended_at, on_going, display_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(self.id)
        .bind(self.summary_id)
        .bind(&self.organization)
        .bind(&self.diploma)
        .bind(&self.study_field)
        .bind(&self.description)
        .bind(&self.extra_curricular)
        .bind(self.started_at)
        .bind(self.ended_at)
        .bind(self.on_going)
        .bind(self.display_order)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE member_summary_trainings
            SET
                organization = $3,
                diploma = $4,
                study_field = $5,
                description = $6,
                extra_curricular = $7,
                started_at = $8,
                ended_at = $9,
                on_going = $10
            WHERE id = $1 AND summary_id = $2
            "#,
        )
        .bind(self.id)
        .bind(self.summary_id)
        .bind(&self.organization)
        .bind(&self.diploma)
        .bind(&self.study_field)
        .bind(&self.description)
        .bind(&self.extra_curricular)
        .bind(self.started_at)
        .bind(self.ended_at)
        .bind(self.on_going)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &PgPool, summary_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM member_summary_trainings WHERE id = $1 AND summary_id = $2
            "#,
        )
        .bind(id)
        .bind(summary_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Language {
    pub id: Uuid,
    pub summary_id: Uuid,
    pub code: String,
    pub level: String,
    pub display_order: i32,
}

impl SummaryItem for Language {
    fn id(&self) -> Uuid {
        self.id
    }

    fn display_order(&self) -> i32 {
        self.display_order
    }

    fn set_display_order(&mut self, order: i32) {
        self.display_order = order;
    }
}

impl Language {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.choice("code", &self.code, &choice_keys(&LANGUAGE_CODES));
        errors.choice("level", &self.level, &choice_keys(&LANGUAGE_LEVELS));
        errors
    }

    pub fn name(&self) -> String {
        choice_label(&LANGUAGE_CODES, &self.code)
    }

    pub fn level_label(&self) -> String {
        choice_label(&LANGUAGE_LEVELS, &self.level)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO member_summary_languages (id, summary_id, code, level, display_order)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(self.id)
        .bind(self.summary_id)
        .bind(&self.code)
        .bind(&self.level)
        .bind(self.display_order)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn update(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE member_summary_languages SET code = $3, level = $4
            WHERE id = $1 AND summary_id = $2
            "#,
        )
        .bind(self.id)
        .bind(self.summary_id)
        .bind(&self.code)
        .bind(&self.level)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &PgPool, summary_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM member_summary_languages WHERE id = $1 AND summary_id = $2
            "#,
        )
        .bind(id)
        .bind(summary_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Skill {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

impl Skill {
    /// Looks a skill up by slug, creating it on first use
    pub async fn find_or_create(pool: &PgPool, name: &str, slug: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO skills (name, slug)
            VALUES ($1, $2)
            ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
            RETURNING *
            "#,
        )
        .bind(name.trim())
        .bind(slug)
        .fetch_one(pool)
        .await
    }

    /// Skill names whose slug starts with `slug_prefix`, minus the ones already in the summary
    pub async fn find_available_for_summary(
        pool: &PgPool,
        slug_prefix: &str,
        summary_id: Uuid,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT s.name FROM skills s
            WHERE s.slug LIKE $1 || '%'
              AND s.id NOT IN (SELECT skill_id FROM summary_skills WHERE summary_id = $2)
            ORDER BY s.name ASC
            LIMIT $3
            "#,
        )
        .bind(slug_prefix)
        .bind(summary_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Summary {
    pub id: Uuid,
    pub member_id: Uuid,
    pub slug: String,
    pub current_profession: Option<String>,
    pub contribution_wish: Option<String>,
    pub availabilities: Vec<String>,
    pub job_locations: Vec<String>,
    pub professional_synopsis: Option<String>,
    pub mission_type_wishes: Vec<String>,
    pub motivation: Option<String>,
    pub showing_recent_activities: bool,
    pub contact_email: Option<String>,
    pub linked_in_url: Option<String>,
    pub website_url: Option<String>,
    pub facebook_url: Option<String>,
    pub twitter_nickname: Option<String>,
    pub viadeo_url: Option<String>,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub experiences: Vec<JobExperience>,
    #[sqlx(skip)]
    pub trainings: Vec<Training>,
    #[sqlx(skip)]
    pub languages: Vec<Language>,
    #[sqlx(skip)]
    pub skills: Vec<Skill>,
}

impl Summary {
    /// Everything needed before the summary may be shown publicly
    pub fn is_completed(&self) -> bool {
        !is_blank(&self.current_profession)
            && !is_blank(&self.contribution_wish)
            && !self.availabilities.is_empty()
            && !self.job_locations.is_empty()
            && !is_blank(&self.professional_synopsis)
            && !self.mission_type_wishes.is_empty()
            && !is_blank(&self.motivation)
            && !is_blank(&self.contact_email)
            && !self.experiences.is_empty()
    }

    pub fn toggle_showing_recent_activities(&mut self) {
        self.showing_recent_activities = !self.showing_recent_activities;
    }

    pub fn contribution_wish_label(&self) -> String {
        self.contribution_wish
            .as_deref()
            .map(|wish| choice_label(&CONTRIBUTION_WISHES, wish))
            .unwrap_or_default()
    }

    pub fn availabilities_labels(&self) -> Vec<String> {
        self.availabilities
            .iter()
            .map(|a| choice_label(&AVAILABILITIES, a))
            .collect()
    }

    pub fn upsert_experience(&mut self, mut experience: JobExperience) -> Upsert {
        experience.summary_id = self.id;
        upsert_item(&mut self.experiences, experience)
    }

    pub fn upsert_training(&mut self, mut training: Training) -> Upsert {
        training.summary_id = self.id;
        upsert_item(&mut self.trainings, training)
    }

    pub fn upsert_language(&mut self, mut language: Language) -> Upsert {
        language.summary_id = self.id;
        upsert_item(&mut self.languages, language)
    }

    pub fn remove_experience(&mut self, id: Uuid) -> bool {
        remove_item(&mut self.experiences, id)
    }

    pub fn remove_training(&mut self, id: Uuid) -> bool {
        remove_item(&mut self.trainings, id)
    }

    pub fn remove_language(&mut self, id: Uuid) -> bool {
        remove_item(&mut self.languages, id)
    }

    pub fn experience(&self, id: Uuid) -> Option<&JobExperience> {
        self.experiences.iter().find(|e| e.id == id)
    }

    pub fn training(&self, id: Uuid) -> Option<&Training> {
        self.trainings.iter().find(|t| t.id == id)
    }

    pub fn language(&self, id: Uuid) -> Option<&Language> {
        self.languages.iter().find(|l| l.id == id)
    }

    /// True when another language of the summary already uses `code`
    pub fn speaks(&self, code: &str, except: Option<Uuid>) -> bool {
        self.languages
            .iter()
            .any(|l| l.code == code && Some(l.id) != except)
    }

    pub fn validate_step(&self, step: SummaryStep) -> FormErrors {
        let mut errors = FormErrors::new();
        match step {
            SummaryStep::Synthesis => {
                errors.not_blank(
                    "current_profession",
                    self.current_profession.as_deref().unwrap_or_default(),
                );
                let wish = self.contribution_wish.as_deref().unwrap_or_default();
                if errors.not_blank("contribution_wish", wish) {
                    errors.choice(
                        "contribution_wish",
                        wish,
                        &choice_keys(&CONTRIBUTION_WISHES),
                    );
                }
                errors.choices(
                    "availabilities",
                    &self.availabilities,
                    &choice_keys(&AVAILABILITIES),
                );
                errors.choices(
                    "job_locations",
                    &self.job_locations,
                    &choice_keys(&JOB_LOCATIONS),
                );
                errors.not_blank(
                    "professional_synopsis",
                    self.professional_synopsis.as_deref().unwrap_or_default(),
                );
            }
            SummaryStep::Missions => {
                errors.choices(
                    "mission_type_wishes",
                    &self.mission_type_wishes,
                    &choice_keys(&MISSION_TYPES),
                );
            }
            SummaryStep::Motivation => {
                errors.not_blank("motivation", self.motivation.as_deref().unwrap_or_default());
            }
            SummaryStep::Competences => {}
            SummaryStep::Contact => {
                errors.email("contact_email", self.contact_email.as_deref().unwrap_or_default());
                errors.optional_url("linked_in_url", self.linked_in_url.as_deref().unwrap_or_default());
                errors.optional_url("website_url", self.website_url.as_deref().unwrap_or_default());
                errors.optional_url("facebook_url", self.facebook_url.as_deref().unwrap_or_default());
                errors.optional_url("viadeo_url", self.viadeo_url.as_deref().unwrap_or_default());
                errors.optional_twitter_nickname(
                    "twitter_nickname",
                    self.twitter_nickname.as_deref().unwrap_or_default(),
                );
            }
        }
        errors
    }

    /// Inserts an empty summary unless the member already has one, then returns it
    pub async fn create_for_member(
        pool: &PgPool,
        member_id: Uuid,
        slug: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO summaries (member_id, slug)
            VALUES ($1, $2)
            ON CONFLICT (member_id) DO NOTHING
            "#,
        )
        .bind(member_id)
        .bind(slug)
        .execute(pool)
        .await?;

        let mut summary = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM summaries WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .fetch_one(pool)
        .await?;

        summary.load_collections(pool).await?;
        Ok(summary)
    }

    pub async fn find_for_member(pool: &PgPool, member_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let summary = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM summaries WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

        match summary {
            Some(mut summary) => {
                summary.load_collections(pool).await?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let summary = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM summaries WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(pool)
        .await?;

        match summary {
            Some(mut summary) => {
                summary.load_collections(pool).await?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    pub async fn slugs_like(pool: &PgPool, base: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT slug FROM summaries WHERE slug LIKE $1 || '%'
            "#,
        )
        .bind(base)
        .fetch_all(pool)
        .await
    }

    async fn load_collections(&mut self, pool: &PgPool) -> Result<(), sqlx::Error> {
        self.experiences = sqlx::query_as::<_, JobExperience>(
            r#"
            SELECT * FROM member_summary_job_experiences
            WHERE summary_id = $1 ORDER BY display_order ASC
            "#,
        )
        .bind(self.id)
        .fetch_all(pool)
        .await?;

        self.trainings = sqlx::query_as::<_, Training>(
            r#"
            SELECT * FROM member_summary_trainings
            WHERE summary_id = $1 ORDER BY display_order ASC
            "#,
        )
        .bind(self.id)
        .fetch_all(pool)
        .await?;

        self.languages = sqlx::query_as::<_, Language>(
            r#"
            SELECT * FROM member_summary_languages
            WHERE summary_id = $1 ORDER BY display_order ASC
            "#,
        )
        .bind(self.id)
        .fetch_all(pool)
        .await?;

        self.skills = sqlx::query_as::<_, Skill>(
            r#"
            SELECT s.id, s.name, s.slug FROM skills s
            JOIN summary_skills ss ON ss.skill_id = s.id
            WHERE ss.summary_id = $1 ORDER BY ss.display_order ASC
            "#,
        )
        .bind(self.id)
        .fetch_all(pool)
        .await?;

        Ok(())
    }

    /// Saves the scalar fields; collections are written item by item
    pub async fn update(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE summaries
            SET
                current_profession = $2,
                contribution_wish = $3,
                availabilities = $4,
                job_locations = $5,
                professional_synopsis = $6,
                mission_type_wishes = $7,
                motivation = $8,
                showing_recent_activities = $9,
                contact_email = $10,
                linked_in_url = $11,
                website_url = $12,
                facebook_url = $13,
                twitter_nickname = $14,
                viadeo_url = $15,
                public = $16,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(&self.current_profession)
        .bind(&self.contribution_wish)
        .bind(&self.availabilities)
        .bind(&self.job_locations)
        .bind(&self.professional_synopsis)
        .bind(&self.mission_type_wishes)
        .bind(&self.motivation)
        .bind(self.showing_recent_activities)
        .bind(&self.contact_email)
        .bind(&self.linked_in_url)
        .bind(&self.website_url)
        .bind(&self.facebook_url)
        .bind(&self.twitter_nickname)
        .bind(&self.viadeo_url)
        .bind(self.public)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Replaces the skill list in one transaction, keeping the given order
    pub async fn replace_skills(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM summary_skills WHERE summary_id = $1
            "#,
        )
        .bind(self.id)
        .execute(&mut *tx)
        .await?;

        for (order, skill) in self.skills.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO summary_skills (summary_id, skill_id, display_order)
                VALUES ($1, $2, $3)
                ON CONFLICT (summary_id, skill_id) DO NOTHING
                "#,
            )
            .bind(self.id)
            .bind(skill.id)
            .bind(order as i32 + 1)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_public(pool: &PgPool, member_id: Uuid, public: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE summaries SET public = $2, updated_at = NOW() WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .bind(public)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// One row of the back-office summary list
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SummaryListItem {
    pub id: Uuid,
    pub member_name: String,
    pub current_profession: Option<String>,
    pub contribution_wish: Option<String>,
    pub availabilities: Vec<String>,
    pub contact_email: Option<String>,
    pub public: bool,
}

impl SummaryListItem {
    pub fn contribution_wish_label(&self) -> String {
        self.contribution_wish
            .as_deref()
            .map(|wish| choice_label(&CONTRIBUTION_WISHES, wish))
            .unwrap_or_default()
    }

    pub fn availabilities_labels(&self) -> String {
        self.availabilities
            .iter()
            .map(|a| choice_label(&AVAILABILITIES, a))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryFilters {
    #[serde(default)]
    pub member: String,
    #[serde(default)]
    pub current_profession: String,
    #[serde(default)]
    pub contribution_wish: String,
    #[serde(default)]
    pub availability: String,
}

impl SummaryListItem {
    /// Filtered page of summaries sorted by member name; blank filters match everything
    pub async fn list(
        pool: &PgPool,
        filters: &SummaryFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let items = sqlx::query_as::<_, Self>(
            r#"
            SELECT s.id, a.first_name || ' ' || a.last_name AS member_name,
                   s.current_profession, s.contribution_wish, s.availabilities,
                   s.contact_email, s.public
            FROM summaries s
            JOIN adherents a ON a.id = s.member_id
            WHERE ($1 = '' OR (a.first_name || ' ' || a.last_name) ILIKE '%' || $1 || '%')
              AND ($2 = '' OR s.current_profession ILIKE '%' || $2 || '%')
              AND ($3 = '' OR s.contribution_wish = $3)
              AND ($4 = '' OR $4 = ANY(s.availabilities))
            ORDER BY a.last_name ASC, a.first_name ASC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filters.member.trim())
        .bind(filters.current_profession.trim())
        .bind(filters.contribution_wish.trim())
        .bind(filters.availability.trim())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM summaries s
            JOIN adherents a ON a.id = s.member_id
            WHERE ($1 = '' OR (a.first_name || ' ' || a.last_name) ILIKE '%' || $1 || '%')
              AND ($2 = '' OR s.current_profession ILIKE '%' || $2 || '%')
              AND ($3 = '' OR s.contribution_wish = $3)
              AND ($4 = '' OR $4 = ANY(s.availabilities))
            "#,
        )
        .bind(filters.member.trim())
        .bind(filters.current_profession.trim())
        .bind(filters.contribution_wish.trim())
        .bind(filters.availability.trim())
        .fetch_one(pool)
        .await?;

        Ok((items, total))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::services::validation::{INVALID_CHOICE, INVALID_EMAIL, NOT_BLANK};

    #[test]
    fn test_completeness_requires_every_section() {
        let member_id = Uuid::new_v4();
        assert!(!summary(member_id).is_completed());
        assert!(completed_summary(member_id).is_completed());

        let mut without_experience = completed_summary(member_id);
        let id = without_experience.experiences[0].id;
        assert!(without_experience.remove_experience(id));
        assert!(!without_experience.is_completed());

        let mut blank_motivation = completed_summary(member_id);
        blank_motivation.motivation = Some("   ".to_string());
        assert!(!blank_motivation.is_completed());

        let mut no_location = completed_summary(member_id);
        no_location.job_locations.clear();
        assert!(!no_location.is_completed());
    }

    #[test]
    fn test_upsert_appends_then_replaces_in_place() {
        let mut summary = summary(Uuid::new_v4());

        assert_eq!(summary.upsert_experience(experience("A")), Upsert::Inserted);
        assert_eq!(summary.upsert_experience(experience("B")), Upsert::Inserted);
        assert_eq!(summary.experiences[0].display_order, 1);
        assert_eq!(summary.experiences[1].display_order, 2);
        assert!(summary.experiences.iter().all(|e| e.summary_id == summary.id));

        let mut edited = summary.experiences[0].clone();
        edited.company = "A bis".to_string();
        edited.display_order = 42;
        assert_eq!(summary.upsert_experience(edited), Upsert::Replaced);

        assert_eq!(summary.experiences.len(), 2);
        assert_eq!(summary.experiences[0].company, "A bis");
        assert_eq!(summary.experiences[0].display_order, 1);
    }

    #[test]
    fn test_item_of_another_summary_cannot_be_removed() {
        let mut carl = summary(Uuid::new_v4());
        let mut jacques = summary(Uuid::new_v4());
        carl.upsert_experience(experience("Example SAS"));
        let experience_id = carl.experiences[0].id;

        assert!(!jacques.remove_experience(experience_id));
        assert_eq!(carl.experiences.len(), 1);

        assert!(carl.remove_experience(experience_id));
        assert!(carl.experiences.is_empty());
    }

    #[test]
    fn test_remove_unknown_item_is_a_noop() {
        let mut summary = summary(Uuid::new_v4());
        summary.upsert_training(training("Université Lyon 2"));
        summary.upsert_language(language("en", "fluent"));

        assert!(!summary.remove_training(Uuid::new_v4()));
        assert!(!summary.remove_language(Uuid::new_v4()));
        assert_eq!(summary.trainings.len(), 1);
        assert_eq!(summary.languages.len(), 1);
    }

    #[test]
    fn test_languages_are_unique_per_code() {
        let mut summary = summary(Uuid::new_v4());
        summary.upsert_language(language("en", "fluent"));
        let english = summary.languages[0].id;

        assert!(summary.speaks("en", None));
        assert!(!summary.speaks("en", Some(english)));
        assert!(!summary.speaks("de", None));
    }

    #[test]
    fn test_toggle_showing_recent_activities() {
        let mut summary = summary(Uuid::new_v4());

        summary.toggle_showing_recent_activities();
        assert!(!summary.showing_recent_activities);
        summary.toggle_showing_recent_activities();
        assert!(summary.showing_recent_activities);
    }

    #[test]
    fn test_steps() {
        assert_eq!("missions".parse::<SummaryStep>(), Ok(SummaryStep::Missions));

        let err = "bogus".parse::<SummaryStep>().unwrap_err();
        assert_eq!(
            err,
            "Invalid step \"bogus\", known steps are \"synthesis\", \"missions\", \"motivation\", \"competences\", \"contact\"."
        );
    }

    #[test]
    fn test_step_validation() {
        let mut summary = summary(Uuid::new_v4());

        let errors = summary.validate_step(SummaryStep::Synthesis);
        assert_eq!(errors.for_field("current_profession"), vec![NOT_BLANK]);
        assert_eq!(errors.for_field("contribution_wish"), vec![NOT_BLANK]);

        summary.mission_type_wishes = vec!["astronaut".to_string()];
        let errors = summary.validate_step(SummaryStep::Missions);
        assert_eq!(errors.for_field("mission_type_wishes"), vec![INVALID_CHOICE]);

        summary.contact_email = Some("carl@example".to_string());
        let errors = summary.validate_step(SummaryStep::Contact);
        assert_eq!(errors.for_field("contact_email"), vec![INVALID_EMAIL]);

        assert!(summary.validate_step(SummaryStep::Competences).is_empty());
    }

    #[test]
    fn test_item_validation() {
        let mut experience = experience("Example SAS");
        assert!(experience.validate().is_empty());

        experience.on_going = false;
        assert_eq!(experience.validate().for_field("ended_at"), vec![ENDED_AT_REQUIRED]);

        experience.ended_at = NaiveDate::from_ymd_opt(2010, 1, 1);
        assert_eq!(experience.validate().for_field("ended_at"), vec![ENDED_BEFORE_STARTED]);

        let language = language("klingon", "fluent");
        assert_eq!(language.validate().for_field("code"), vec![INVALID_CHOICE]);
    }

    #[test]
    fn test_labels() {
        let summary = completed_summary(Uuid::new_v4());

        assert_eq!(summary.contribution_wish_label(), "Bénévole");
        assert_eq!(summary.availabilities_labels(), vec!["Week-ends"]);
        assert_eq!(language("en", "native").name(), "Anglais");
        assert_eq!(choice_label(&CONTRACTS, "unknown"), "unknown");
    }
}
