// Models module - Database entity representations

pub mod adherent;
pub mod committee;
pub mod oauth_client;
pub mod social_share;
pub mod summary;

pub use adherent::Adherent;
pub use committee::{Committee, CommitteeMembership, CommitteeMessage};
pub use oauth_client::OAuthClient;
pub use social_share::{SocialShare, SocialShareCategory};
pub use summary::{JobExperience, Language, Skill, Summary, Training};
