use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::services::validation::FormErrors;

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_APPROVED: &str = "APPROVED";

pub const PRIVILEGE_SUPERVISOR: &str = "SUPERVISOR";
pub const PRIVILEGE_HOST: &str = "HOST";
pub const PRIVILEGE_FOLLOWER: &str = "FOLLOWER";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Committee {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub address: String,
    pub postal_code: String,
    pub city_code: String,
    pub city_name: Option<String>,
    pub country: String,
    pub facebook_page_url: Option<String>,
    pub twitter_nickname: Option<String>,
    pub google_plus_page_url: Option<String>,
    pub status: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCommitteeData {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub address: String,
    pub postal_code: String,
    pub city_code: String,
    pub city_name: Option<String>,
    pub country: String,
    pub facebook_page_url: Option<String>,
    pub twitter_nickname: Option<String>,
    pub google_plus_page_url: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommitteeMembership {
    pub committee_id: Uuid,
    pub adherent_id: Uuid,
    pub privilege: String,
    pub joined_at: DateTime<Utc>,
}

impl CommitteeMembership {
    pub fn can_host(&self) -> bool {
        self.privilege == PRIVILEGE_HOST || self.privilege == PRIVILEGE_SUPERVISOR
    }

    pub fn is_supervisor(&self) -> bool {
        self.privilege == PRIVILEGE_SUPERVISOR
    }
}

impl Committee {
    pub fn is_waiting_for_approval(&self) -> bool {
        self.status == STATUS_PENDING
    }

    pub fn is_approved(&self) -> bool {
        self.status == STATUS_APPROVED
    }

    /// Creates the committee, waiting for approval, with its creator as supervisor
    pub async fn create(pool: &PgPool, data: CreateCommitteeData) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let committee = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO committees (
                slug, name, description, address, postal_code, city_code, city_name,
                country, facebook_page_url, twitter_nickname, google_plus_page_url,
                status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(&data.slug)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.address)
        .bind(&data.postal_code)
        .bind(&data.city_code)
        .bind(&data.city_name)
        .bind(&data.country)
        .bind(&data.facebook_page_url)
        .bind(&data.twitter_nickname)
        .bind(&data.google_plus_page_url)
        .bind(STATUS_PENDING)
        .bind(data.created_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO committee_memberships (committee_id, adherent_id, privilege)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(committee.id)
        .bind(data.created_by)
        .bind(PRIVILEGE_SUPERVISOR)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(committee)
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let committee = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM committees WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(pool)
        .await?;

        Ok(committee)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let committee = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM committees WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(committee)
    }

    /// Slugs already used by committees starting with `base`
    pub async fn slugs_like(pool: &PgPool, base: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT slug FROM committees WHERE slug LIKE $1 || '%'
            "#,
        )
        .bind(base)
        .fetch_all(pool)
        .await
    }

    /// An adherent may create a committee only when hosting none and having none pending
    pub async fn can_create_committee(pool: &PgPool, adherent_id: Uuid) -> Result<bool, sqlx::Error> {
        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM committee_memberships
                WHERE adherent_id = $1 AND privilege IN ('HOST', 'SUPERVISOR')
            ) OR EXISTS (
                SELECT 1 FROM committees
                WHERE created_by = $1 AND status = 'PENDING'
            )
            "#,
        )
        .bind(adherent_id)
        .fetch_one(pool)
        .await?;

        Ok(!blocked)
    }

    pub async fn find_membership(
        pool: &PgPool,
        committee_id: Uuid,
        adherent_id: Uuid,
    ) -> Result<Option<CommitteeMembership>, sqlx::Error> {
        sqlx::query_as::<_, CommitteeMembership>(
            r#"
            SELECT * FROM committee_memberships
            WHERE committee_id = $1 AND adherent_id = $2
            "#,
        )
        .bind(committee_id)
        .bind(adherent_id)
        .fetch_optional(pool)
        .await
    }

    /// True when the adherent hosts or supervises at least one committee
    pub async fn is_host(pool: &PgPool, adherent_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM committee_memberships
                WHERE adherent_id = $1 AND privilege IN ('HOST', 'SUPERVISOR')
            )
            "#,
        )
        .bind(adherent_id)
        .fetch_one(pool)
        .await
    }

    pub async fn follow(pool: &PgPool, committee_id: Uuid, adherent_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO committee_memberships (committee_id, adherent_id, privilege)
            VALUES ($1, $2, $3)
            ON CONFLICT (committee_id, adherent_id) DO NOTHING
            "#,
        )
        .bind(committee_id)
        .bind(adherent_id)
        .bind(PRIVILEGE_FOLLOWER)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Supervisors stay; returns whether a membership was removed
    pub async fn unfollow(pool: &PgPool, committee_id: Uuid, adherent_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM committee_memberships
            WHERE committee_id = $1 AND adherent_id = $2 AND privilege <> 'SUPERVISOR'
            "#,
        )
        .bind(committee_id)
        .bind(adherent_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_members(pool: &PgPool, committee_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM committee_memberships WHERE committee_id = $1
            "#,
        )
        .bind(committee_id)
        .fetch_one(pool)
        .await
    }
}

pub const MESSAGE_MIN_LENGTH: usize = 10;
pub const MESSAGE_TOO_SHORT: &str = "Le message doit contenir au moins 10 caractères.";

/// A message posted by a host to the committee feed
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommitteeMessage {
    pub id: Uuid,
    pub committee_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// Feed entry joined with its author's name for display
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CommitteeFeedEntry {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author_first_name: String,
    pub author_last_name: String,
}

impl CommitteeMessage {
    pub fn new(committee_id: Uuid, author_id: Uuid, content: &str, published: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            committee_id,
            author_id,
            content: content.trim().to_string(),
            published,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        if errors.not_blank("content", &self.content) {
            errors.min_length("content", &self.content, MESSAGE_MIN_LENGTH, MESSAGE_TOO_SHORT);
        }
        errors
    }

    /// Persists a message that passed [`CommitteeMessage::validate`]
    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO committee_feed_items (id, committee_id, author_id, content, published, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(self.id)
        .bind(self.committee_id)
        .bind(self.author_id)
        .bind(&self.content)
        .bind(self.published)
        .bind(self.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn published_feed(
        pool: &PgPool,
        committee_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CommitteeFeedEntry>, sqlx::Error> {
        sqlx::query_as::<_, CommitteeFeedEntry>(
            r#"
            SELECT f.id, f.content, f.created_at,
                   a.first_name AS author_first_name, a.last_name AS author_last_name
            FROM committee_feed_items f
            JOIN adherents a ON a.id = f.author_id
            WHERE f.committee_id = $1 AND f.published
            ORDER BY f.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(committee_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::validation::NOT_BLANK;

    #[test]
    fn test_message_content_rules() {
        let committee_id = Uuid::new_v4();
        let author_id = Uuid::new_v4();

        let blank = CommitteeMessage::new(committee_id, author_id, "   ", true);
        assert_eq!(blank.validate().for_field("content"), vec![NOT_BLANK]);

        let short = CommitteeMessage::new(committee_id, author_id, "Bonjour", true);
        assert_eq!(short.validate().for_field("content"), vec![MESSAGE_TOO_SHORT]);

        let ok = CommitteeMessage::new(committee_id, author_id, "Réunion mardi à 19h", false);
        assert!(ok.validate().is_empty());
        assert!(!ok.published);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL"]
    async fn test_unpublished_message_stays_out_of_feed(pool: PgPool) {
        use crate::models::adherent::{Adherent, CreateAdherentData};

        let host = Adherent::create(
            &pool,
            CreateAdherentData {
                email: "gisele.berthoux@example.fr".to_string(),
                password_hash: String::new(),
                gender: "female".to_string(),
                first_name: "Gisele".to_string(),
                last_name: "Berthoux".to_string(),
            },
        )
        .await
        .unwrap();
        let committee = Committee::create(
            &pool,
            CreateCommitteeData {
                slug: "paris-8".to_string(),
                name: "En Marche Paris 8".to_string(),
                description: "Le comité du 8e arrondissement".to_string(),
                address: "60 avenue des Champs-Élysées".to_string(),
                postal_code: "75008".to_string(),
                city_code: "75008-75108".to_string(),
                city_name: None,
                country: "FR".to_string(),
                facebook_page_url: None,
                twitter_nickname: None,
                google_plus_page_url: None,
                created_by: host.id,
            },
        )
        .await
        .unwrap();

        CommitteeMessage::new(committee.id, host.id, "Brouillon de la réunion", false)
            .insert(&pool)
            .await
            .unwrap();
        CommitteeMessage::new(committee.id, host.id, "Réunion mardi à 19h", true)
            .insert(&pool)
            .await
            .unwrap();

        let feed = CommitteeMessage::published_feed(&pool, committee.id, 30).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].content, "Réunion mardi à 19h");
    }

    #[test]
    fn test_content_is_trimmed() {
        let message = CommitteeMessage::new(Uuid::new_v4(), Uuid::new_v4(), "  Tractage samedi  ", true);

        assert_eq!(message.content, "Tractage samedi");
    }

    #[test]
    fn test_membership_privileges() {
        let mut membership = CommitteeMembership {
            committee_id: Uuid::new_v4(),
            adherent_id: Uuid::new_v4(),
            privilege: PRIVILEGE_FOLLOWER.to_string(),
            joined_at: Utc::now(),
        };
        assert!(!membership.can_host());

        membership.privilege = PRIVILEGE_HOST.to_string();
        assert!(membership.can_host());
        assert!(!membership.is_supervisor());

        membership.privilege = PRIVILEGE_SUPERVISOR.to_string();
        assert!(membership.can_host());
        assert!(membership.is_supervisor());
    }
}
