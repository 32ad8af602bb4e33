// Services module - Business logic

pub mod activity_tracker;
pub mod mailer;
pub mod password;
pub mod signature;
pub mod slugify;
pub mod summary_manager;
pub mod validation;
