#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serial_test::serial;

    use crate::config::{self, AppConfig};

    #[test]
    #[serial]
    fn test_defaults_match_rocket_toml() {
        temp_env::with_vars_unset(
            ["ROCKET_SESSION_HOURS", "ROCKET_DOCUMENT_DIR", "ROCKET_PROFILE"],
            || {
                let config = AppConfig::from_figment(&config::figment()).unwrap();
                assert_eq!(config, AppConfig::default());
            },
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides_document_dir() {
        temp_env::with_var("ROCKET_DOCUMENT_DIR", Some("/tmp/achievement-docs"), || {
            let config = AppConfig::from_figment(&config::figment()).unwrap();
            assert_eq!(config.document_dir, PathBuf::from("/tmp/achievement-docs"));
            assert_eq!(config.document_url_prefix, "/documents");
        });
    }

    #[test]
    #[serial]
    fn test_non_positive_session_hours_rejected() {
        temp_env::with_var("ROCKET_SESSION_HOURS", Some("0"), || {
            let result = AppConfig::from_figment(&config::figment());
            assert!(result.is_err());
        });

        temp_env::with_var("ROCKET_SESSION_HOURS", Some("8"), || {
            let config = AppConfig::from_figment(&config::figment()).unwrap();
            assert_eq!(config.session_hours, 8);
        });
    }

    #[test]
    #[serial]
    fn test_upload_limits_exceed_document_cap() {
        use rocket::data::{Limits, ToByteUnit};

        use crate::verification::MAX_DOCUMENT_BYTES;

        let limits: Limits = config::figment().extract_inner("limits").unwrap();
        let cap = (MAX_DOCUMENT_BYTES as u64).bytes();

        assert!(limits.get("file").unwrap() > cap);
        assert!(limits.get("data-form").unwrap() > cap);
    }
}
