use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::api::middleware::session::SESSION_KEY_FLASHES;
use crate::error::Result;

/// A one-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: String,
    pub message: String,
}

pub async fn add_flash(session: &Session, level: &str, message: &str) -> Result<()> {
    let mut flashes: Vec<Flash> = session.get(SESSION_KEY_FLASHES).await?.unwrap_or_default();
    flashes.push(Flash {
        level: level.to_string(),
        message: message.to_string(),
    });
    session.insert(SESSION_KEY_FLASHES, flashes).await?;

    Ok(())
}

pub async fn info(session: &Session, message: &str) -> Result<()> {
    add_flash(session, "info", message).await
}

/// Returns pending flashes and clears them
pub async fn take_flashes(session: &Session) -> Result<Vec<Flash>> {
    Ok(session
        .remove::<Vec<Flash>>(SESSION_KEY_FLASHES)
        .await?
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    #[tokio::test]
    async fn test_flashes_are_consumed_once() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        info(&session, "Vos informations ont été mises à jour avec succès.")
            .await
            .unwrap();
        add_flash(&session, "error", "Oups").await.unwrap();

        let flashes = take_flashes(&session).await.unwrap();
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].level, "info");
        assert_eq!(flashes[1].message, "Oups");

        assert!(take_flashes(&session).await.unwrap().is_empty());
    }
}
