use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const KIND_COMMITTEE_JOINED: &str = "committee_joined";
pub const KIND_COMMITTEE_MESSAGE: &str = "committee_message";

/// How many activities the summary pages show
pub const RECENT_ACTIVITIES_LIMIT: i64 = 5;

/// Something an adherent did recently, as shown on the summary pages
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Activity {
    pub kind: String,
    pub committee_name: String,
    pub committee_slug: String,
    pub content: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl Activity {
    pub fn describe(&self) -> String {
        match self.kind.as_str() {
            KIND_COMMITTEE_JOINED => format!("A rejoint le comité {}", self.committee_name),
            KIND_COMMITTEE_MESSAGE => {
                format!("A publié un message dans le comité {}", self.committee_name)
            }
            _ => self.committee_name.clone(),
        }
    }
}

/// Committees joined and committee messages posted, newest first
#[tracing::instrument(skip(pool))]
pub async fn recent_activities_for_adherent(
    pool: &PgPool,
    adherent_id: Uuid,
    limit: i64,
) -> Result<Vec<Activity>, sqlx::Error> {
    sqlx::query_as::<_, Activity>(
        r#"
        SELECT * FROM (
            SELECT $2 AS kind, c.name AS committee_name, c.slug AS committee_slug,
                   NULL::TEXT AS content, m.joined_at AS occurred_at
            FROM committee_memberships m
            JOIN committees c ON c.id = m.committee_id
            WHERE m.adherent_id = $1
            UNION ALL
            SELECT $3 AS kind, c.name, c.slug, f.content, f.created_at
            FROM committee_feed_items f
            JOIN committees c ON c.id = f.committee_id
            WHERE f.author_id = $1 AND f.published
        ) activities
        ORDER BY occurred_at DESC
        LIMIT $4
        "#,
    )
    .bind(adherent_id)
    .bind(KIND_COMMITTEE_JOINED)
    .bind(KIND_COMMITTEE_MESSAGE)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let activity = Activity {
            kind: KIND_COMMITTEE_JOINED.to_string(),
            committee_name: "En Marche Paris 8".to_string(),
            committee_slug: "en-marche-paris-8".to_string(),
            content: None,
            occurred_at: Utc::now(),
        };
        assert_eq!(activity.describe(), "A rejoint le comité En Marche Paris 8");

        let message = Activity {
            kind: KIND_COMMITTEE_MESSAGE.to_string(),
            content: Some("Réunion mardi soir".to_string()),
            ..activity
        };
        assert_eq!(
            message.describe(),
            "A publié un message dans le comité En Marche Paris 8"
        );
    }
}
