use secrecy::Secret;
use serde::Deserialize;
use std::str::FromStr;

/// Deployment environment, mirrors the `app_env` variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Dev,
    Test,
    Production,
}

impl FromStr for AppEnv {
    type Err = config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Production),
            other => Err(config::ConfigError::Message(format!(
                "unknown app_env \"{}\"",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    pub app_env: AppEnv,

    // Signs asset URLs (profile photos)
    pub app_secret: Secret<String>,

    // Storage roots
    pub assets_dir: String,
    pub documents_dir: String,

    // Cookies flagged Secure; disable for plain-HTTP local development
    pub session_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        let app_env = match config.get::<String>("app_env") {
            Ok(value) => value.parse()?,
            Err(_) => AppEnv::Dev,
        };

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            app_env,

            app_secret: Secret::new(config.get("app_secret")?),

            assets_dir: config
                .get("assets_dir")
                .unwrap_or_else(|_| "var/assets".to_string()),
            documents_dir: config
                .get("documents_dir")
                .unwrap_or_else(|_| "var/documents".to_string()),

            session_secure: config.get("session_secure").unwrap_or(true),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }
}
