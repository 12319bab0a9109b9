use std::path::Path;

use tracing::{info, warn};

/// Env files applied in order, later files overriding earlier ones.
pub fn env_files(profile: &str) -> [&'static str; 3] {
    match profile {
        "production" | "release" => ["config/common.env", "config/prod.env", ".secrets.env"],
        _ => ["config/common.env", "config/dev.env", ".secrets.env"],
    }
}

/// Loads the layered env files for the current `ROCKET_PROFILE`. Missing
/// files are skipped; returns the files that were applied.
pub fn load_environment() -> Result<Vec<&'static str>, dotenvy::Error> {
    let profile = dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

    let mut loaded = Vec::new();
    for env_file in env_files(&profile) {
        if load_env_file(env_file)? {
            loaded.push(env_file);
        }
    }

    Ok(loaded)
}

fn load_env_file(path: &str) -> Result<bool, dotenvy::Error> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(false);
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_profile_uses_prod_env() {
        assert_eq!(env_files("production")[1], "config/prod.env");
        assert_eq!(env_files("release")[1], "config/prod.env");
    }

    #[test]
    fn other_profiles_use_dev_env() {
        assert_eq!(env_files("development")[1], "config/dev.env");
        assert_eq!(env_files("debug")[1], "config/dev.env");
        assert_eq!(env_files("anything")[0], "config/common.env");
    }
}
