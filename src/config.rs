use std::path::PathBuf;

use rocket::data::{Limits, ToByteUnit};
use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

use crate::verification::MAX_DOCUMENT_BYTES;

/// Application settings read from `Rocket.toml` and `ROCKET_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub document_dir: PathBuf,
    pub document_url_prefix: String,
    pub session_hours: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            document_dir: PathBuf::from("data/documents"),
            document_url_prefix: "/documents".to_string(),
            session_hours: 1,
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        let config: AppConfig = figment.extract()?;

        if config.session_hours <= 0 {
            return Err(rocket::figment::Error::from(format!(
                "session_hours must be positive, got {}",
                config.session_hours
            )));
        }

        Ok(config)
    }
}

/// Rocket's figment with upload limits raised above the document size cap,
/// so oversized documents reach validation instead of being truncated.
pub fn figment() -> Figment {
    let upload_limit = (MAX_DOCUMENT_BYTES as u64 + 1024 * 1024).bytes();

    let limits = Limits::default()
        .limit("file", upload_limit)
        .limit("data-form", upload_limit);

    rocket::Config::figment().merge(("limits", limits))
}
