use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::adherent::choice_keys;
use crate::services::validation::FormErrors;

pub const TYPES: [(&str, &str); 2] = [("image", "Image"), ("video", "Vidéo")];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SocialShareCategory {
    pub id: Uuid,
    pub name: String,
    pub position: i32,
}

impl SocialShareCategory {
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM social_share_categories ORDER BY position ASC
            "#,
        )
        .fetch_all(pool)
        .await
    }
}

/// A shareable content block (image or video) shown on the social sharing page
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SocialShare {
    pub id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub category_id: Uuid,
    pub media: String,
    pub default_url: String,
    pub description: String,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,
    pub position: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// List row with the category name joined in
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SocialShareListItem {
    pub id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub category_name: String,
    pub media: String,
    pub position: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SocialShareData {
    pub name: String,
    pub kind: String,
    pub category_id: Option<Uuid>,
    pub media: String,
    pub default_url: String,
    pub description: String,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,
    pub position: i32,
    pub published: bool,
}

impl SocialShareData {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.not_blank("name", &self.name);
        errors.max_length("name", &self.name, 100);
        errors.choice("type", &self.kind, &choice_keys(&TYPES));
        if self.category_id.is_none() {
            errors.add("category", crate::services::validation::NOT_BLANK);
        }
        errors.not_blank("media", &self.media);
        if errors.not_blank("default_url", &self.default_url) {
            errors.optional_url("default_url", &self.default_url);
        }
        errors.not_blank("description", &self.description);
        errors.optional_url("twitter_url", self.twitter_url.as_deref().unwrap_or_default());
        errors.optional_url("facebook_url", self.facebook_url.as_deref().unwrap_or_default());
        if self.position < 1 {
            errors.add("position", "Cette valeur doit être supérieure ou égale à 1.");
        }
        errors
    }
}

impl SocialShareListItem {
    pub fn type_label(&self) -> String {
        crate::models::summary::choice_label(&TYPES, &self.kind)
    }
}

impl SocialShare {
    pub async fn list(pool: &PgPool) -> Result<Vec<SocialShareListItem>, sqlx::Error> {
        sqlx::query_as::<_, SocialShareListItem>(
            r#"
            SELECT s.id, s.name, s.type, c.name AS category_name, s.media, s.position,
                   s.published, s.created_at, s.updated_at
            FROM social_shares s
            JOIN social_share_categories c ON c.id = s.category_id
            ORDER BY s.position ASC, s.created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM social_shares WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// `data` must have passed [`SocialShareData::validate`]
    pub async fn create(pool: &PgPool, data: &SocialShareData) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO social_shares (
                name, type, category_id, media, default_url, description,
                twitter_url, facebook_url, position, published
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(data.name.trim())
        .bind(&data.kind)
        .bind(data.category_id)
        .bind(data.media.trim())
        .bind(data.default_url.trim())
        .bind(data.description.trim())
        .bind(&data.twitter_url)
        .bind(&data.facebook_url)
        .bind(data.position)
        .bind(data.published)
        .fetch_one(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: &SocialShareData) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE social_shares
            SET
                name = $2,
                type = $3,
                category_id = $4,
                media = $5,
                default_url = $6,
                description = $7,
                twitter_url = $8,
                facebook_url = $9,
                position = $10,
                published = $11,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(&data.kind)
        .bind(data.category_id)
        .bind(data.media.trim())
        .bind(data.default_url.trim())
        .bind(data.description.trim())
        .bind(&data.twitter_url)
        .bind(&data.facebook_url)
        .bind(data.position)
        .bind(data.published)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM social_shares WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::validation::{INVALID_CHOICE, INVALID_URL, NOT_BLANK};

    fn data() -> SocialShareData {
        SocialShareData {
            name: "Europe".to_string(),
            kind: "image".to_string(),
            category_id: Some(Uuid::new_v4()),
            media: "europe.jpg".to_string(),
            default_url: "https://en-marche.fr/europe".to_string(),
            description: "Partagez notre vision de l'Europe".to_string(),
            twitter_url: None,
            facebook_url: None,
            position: 1,
            published: true,
        }
    }

    #[test]
    fn test_valid_share() {
        assert!(data().validate().is_empty());
    }

    #[test]
    fn test_invalid_share() {
        let mut share = data();
        share.kind = "gif".to_string();
        share.category_id = None;
        share.default_url = "europe".to_string();
        share.position = 0;

        let errors = share.validate();
        assert_eq!(errors.for_field("type"), vec![INVALID_CHOICE]);
        assert_eq!(errors.for_field("category"), vec![NOT_BLANK]);
        assert_eq!(errors.for_field("default_url"), vec![INVALID_URL]);
        assert!(errors.has("position"));
    }
}
