use sqlx::PgPool;
use uuid::Uuid;

pub const KIND_COMMITTEE_CREATION_CONFIRMATION: &str = "committee_creation_confirmation";
pub const KIND_ADHERENT_CONTACT: &str = "adherent_contact";

/// An outgoing e-mail
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: &'static str,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn committee_creation_confirmation(
        host_email: &str,
        host_first_name: &str,
        committee_name: &str,
        committee_url: &str,
    ) -> Self {
        Self {
            kind: KIND_COMMITTEE_CREATION_CONFIRMATION,
            sender: None,
            recipients: vec![host_email.to_string()],
            subject: "Votre comité sera bientôt en ligne".to_string(),
            body: format!(
                "Bonjour {},\n\nVotre comité « {} » a bien été créé. Il sera visible dès sa validation par notre équipe : {}",
                host_first_name, committee_name, committee_url
            ),
        }
    }

    pub fn adherent_contact(
        sender_email: &str,
        sender_name: &str,
        recipient_email: &str,
        content: &str,
    ) -> Self {
        Self {
            kind: KIND_ADHERENT_CONTACT,
            sender: Some(sender_email.to_string()),
            recipients: vec![recipient_email.to_string()],
            subject: format!("{} vous a envoyé un message", sender_name),
            body: content.to_string(),
        }
    }
}

/// Records outgoing messages in `email_log`; delivery happens out of process
#[derive(Clone)]
pub struct Mailer {
    pool: PgPool,
}

impl Mailer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, message), fields(kind = message.kind))]
    pub async fn send(&self, message: &Message) -> Result<Uuid, sqlx::Error> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO email_log (message_kind, sender, recipients, subject, body)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(message.kind)
        .bind(&message.sender)
        .bind(&message.recipients)
        .bind(&message.subject)
        .bind(&message.body)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(email_id = %id, recipients = message.recipients.len(), "E-mail queued");

        Ok(id)
    }

    /// Messages of one kind sent to `recipient`, newest first
    pub async fn sent_to(&self, kind: &str, recipient: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT subject FROM email_log
            WHERE message_kind = $1 AND $2 = ANY(recipients)
            ORDER BY created_at DESC
            "#,
        )
        .bind(kind)
        .bind(recipient)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_message() {
        let message = Message::adherent_contact(
            "carl999@example.fr",
            "Carl Mirabeau",
            "jacques.picard@en-marche.fr",
            "A message I would like to send to you",
        );

        assert_eq!(message.kind, KIND_ADHERENT_CONTACT);
        assert_eq!(message.recipients, vec!["jacques.picard@en-marche.fr"]);
        assert_eq!(message.subject, "Carl Mirabeau vous a envoyé un message");
    }

    #[test]
    fn test_committee_confirmation_mentions_committee() {
        let message = Message::committee_creation_confirmation(
            "carl999@example.fr",
            "Carl",
            "En Marche Lyon",
            "http://localhost:3000/comites/en-marche-lyon",
        );

        assert!(message.body.contains("« En Marche Lyon »"));
        assert!(message.body.starts_with("Bonjour Carl,"));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL"]
    async fn test_send_records_message(pool: PgPool) {
        let mailer = Mailer::new(pool);
        let message = Message::adherent_contact("a@example.fr", "A", "b@example.fr", "Bonjour");

        mailer.send(&message).await.unwrap();

        assert_eq!(
            mailer.sent_to(KIND_ADHERENT_CONTACT, "b@example.fr").await.unwrap(),
            vec!["A vous a envoyé un message".to_string()]
        );
    }
}
