use std::collections::HashSet;

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    adherent::Adherent,
    summary::{JobExperience, Language, Skill, Summary, Training, Upsert},
};
use crate::services::slugify::{slug_base, slugify, unique_slug};

/// Autocompletion never returns more than this many skills
pub const SKILLS_AUTOCOMPLETE_LIMIT: i64 = 10;

/// Extra tries when a concurrent signup grabs the same slug
const SLUG_RETRIES: usize = 3;

#[derive(thiserror::Error, Debug)]
pub enum SummaryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Orchestrates reads and writes of an adherent's summary
#[derive(Clone)]
pub struct SummaryManager {
    pool: PgPool,
}

impl SummaryManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the adherent's summary, creating an empty one on first access
    #[tracing::instrument(skip(self, adherent), fields(adherent_id = %adherent.id))]
    pub async fn get_for_adherent(&self, adherent: &Adherent) -> Result<Summary, SummaryError> {
        if let Some(summary) = Summary::find_for_member(&self.pool, adherent.id).await? {
            return Ok(summary);
        }

        let base = slug_base(&adherent.full_name());
        let mut retries = 0;

        loop {
            let taken: HashSet<String> = Summary::slugs_like(&self.pool, &base)
                .await?
                .into_iter()
                .collect();
            let slug = unique_slug(&base, |candidate| taken.contains(candidate));

            match Summary::create_for_member(&self.pool, adherent.id, &slug).await {
                Ok(summary) => {
                    tracing::info!(summary_id = %summary.id, slug = %summary.slug, "Summary created");
                    return Ok(summary);
                }
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() && retries < SLUG_RETRIES => {
                    retries += 1;
                    tracing::debug!(%slug, retries, "Summary slug taken meanwhile, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[tracing::instrument(skip(self, summary), fields(summary_id = %summary.id))]
    pub async fn update_summary(&self, summary: &Summary) -> Result<(), SummaryError> {
        summary.update(&self.pool).await?;

        tracing::debug!("Summary updated");

        Ok(())
    }

    /// Appends the experience, or replaces the one with the same id
    #[tracing::instrument(skip(self, summary, experience), fields(summary_id = %summary.id, experience_id = %experience.id))]
    pub async fn update_experiences(
        &self,
        summary: &mut Summary,
        experience: JobExperience,
    ) -> Result<(), SummaryError> {
        let id = experience.id;
        let outcome = summary.upsert_experience(experience);

        if let Some(stored) = summary.experience(id) {
            match outcome {
                Upsert::Inserted => stored.insert(&self.pool).await?,
                Upsert::Replaced => stored.update(&self.pool).await?,
            }
        }

        tracing::info!(?outcome, "Job experience saved");

        Ok(())
    }

    #[tracing::instrument(skip(self, summary, training), fields(summary_id = %summary.id, training_id = %training.id))]
    pub async fn update_trainings(
        &self,
        summary: &mut Summary,
        training: Training,
    ) -> Result<(), SummaryError> {
        let id = training.id;
        let outcome = summary.upsert_training(training);

        if let Some(stored) = summary.training(id) {
            match outcome {
                Upsert::Inserted => stored.insert(&self.pool).await?,
                Upsert::Replaced => stored.update(&self.pool).await?,
            }
        }

        tracing::info!(?outcome, "Training saved");

        Ok(())
    }

    #[tracing::instrument(skip(self, summary, language), fields(summary_id = %summary.id, language_id = %language.id))]
    pub async fn update_languages(
        &self,
        summary: &mut Summary,
        language: Language,
    ) -> Result<(), SummaryError> {
        let id = language.id;
        let outcome = summary.upsert_language(language);

        if let Some(stored) = summary.language(id) {
            match outcome {
                Upsert::Inserted => stored.insert(&self.pool).await?,
                Upsert::Replaced => stored.update(&self.pool).await?,
            }
        }

        tracing::info!(?outcome, "Language saved");

        Ok(())
    }

    /// Removes the experience only when it belongs to the adherent's own summary
    #[tracing::instrument(skip(self, adherent), fields(adherent_id = %adherent.id))]
    pub async fn remove_experience(
        &self,
        adherent: &Adherent,
        experience_id: Uuid,
    ) -> Result<bool, SummaryError> {
        let Some(mut summary) = Summary::find_for_member(&self.pool, adherent.id).await? else {
            return Ok(false);
        };

        if !summary.remove_experience(experience_id) {
            tracing::warn!(%experience_id, "Experience is not part of the adherent's summary");
            return Ok(false);
        }

        Ok(JobExperience::delete(&self.pool, summary.id, experience_id).await?)
    }

    #[tracing::instrument(skip(self, adherent), fields(adherent_id = %adherent.id))]
    pub async fn remove_training(
        &self,
        adherent: &Adherent,
        training_id: Uuid,
    ) -> Result<bool, SummaryError> {
        let Some(mut summary) = Summary::find_for_member(&self.pool, adherent.id).await? else {
            return Ok(false);
        };

        if !summary.remove_training(training_id) {
            tracing::warn!(%training_id, "Training is not part of the adherent's summary");
            return Ok(false);
        }

        Ok(Training::delete(&self.pool, summary.id, training_id).await?)
    }

    #[tracing::instrument(skip(self, adherent), fields(adherent_id = %adherent.id))]
    pub async fn remove_language(
        &self,
        adherent: &Adherent,
        language_id: Uuid,
    ) -> Result<bool, SummaryError> {
        let Some(mut summary) = Summary::find_for_member(&self.pool, adherent.id).await? else {
            return Ok(false);
        };

        if !summary.remove_language(language_id) {
            tracing::warn!(%language_id, "Language is not part of the adherent's summary");
            return Ok(false);
        }

        Ok(Language::delete(&self.pool, summary.id, language_id).await?)
    }

    /// Flips the summary public; incomplete summaries are left untouched
    #[tracing::instrument(skip(self, summary), fields(summary_id = %summary.id))]
    pub async fn publish_summary(&self, summary: &mut Summary) -> Result<bool, SummaryError> {
        if !summary.is_completed() {
            tracing::debug!("Summary not complete, publication refused");
            return Ok(false);
        }

        summary.public = true;
        Summary::set_public(&self.pool, summary.member_id, true).await?;

        tracing::info!("Summary published");

        Ok(true)
    }

    /// False when the adherent has no summary
    #[tracing::instrument(skip(self, adherent), fields(adherent_id = %adherent.id))]
    pub async fn unpublish_summary_for_adherent(
        &self,
        adherent: &Adherent,
    ) -> Result<bool, SummaryError> {
        let unpublished = Summary::set_public(&self.pool, adherent.id, false).await?;

        if unpublished {
            tracing::info!("Summary unpublished");
        }

        Ok(unpublished)
    }

    /// Replaces the summary skills with `names`, creating unknown skills on the way
    #[tracing::instrument(skip(self, summary, names), fields(summary_id = %summary.id))]
    pub async fn set_skills(&self, summary: &mut Summary, names: &[String]) -> Result<(), SummaryError> {
        let mut seen = HashSet::new();
        let mut skills = Vec::new();

        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let slug = slugify(name);
            if slug.is_empty() || !seen.insert(slug.clone()) {
                continue;
            }
            skills.push(Skill::find_or_create(&self.pool, name, &slug).await?);
        }

        summary.skills = skills;
        summary.replace_skills(&self.pool).await?;

        tracing::debug!(count = summary.skills.len(), "Skills updated");

        Ok(())
    }

    /// Skill names matching `term` that the adherent does not list yet
    pub async fn available_skills(
        &self,
        adherent: &Adherent,
        term: &str,
    ) -> Result<Vec<String>, SummaryError> {
        let slug = slugify(term);
        if slug.is_empty() {
            return Ok(vec![]);
        }

        let summary = self.get_for_adherent(adherent).await?;

        Ok(Skill::find_available_for_summary(
            &self.pool,
            &slug,
            summary.id,
            SKILLS_AUTOCOMPLETE_LIMIT,
        )
        .await?)
    }
}
