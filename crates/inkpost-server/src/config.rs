use std::path::PathBuf;
use std::time::Duration;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("INKPOST_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Server settings, read from `INKPOST_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub media_dir: PathBuf,
    pub cache_ttl: Duration,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("INKPOST_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(value) => match value.trim().parse() {
                    Ok(n) => Ok(n),
                    Err(_) => Err(ConfigError::Invalid { name, value }),
                },
            }
        };

        let port = number("INKPOST_PORT", 8000)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            name: "INKPOST_PORT",
            value: port.to_string(),
        })?;

        Ok(Self {
            host: lookup("INKPOST_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: lookup("INKPOST_DB_PATH")
                .unwrap_or_else(|| "inkpost.db".into())
                .into(),
            jwt_secret,
            media_dir: lookup("INKPOST_MEDIA_DIR")
                .unwrap_or_else(|| "./media".into())
                .into(),
            cache_ttl: Duration::from_secs(number("INKPOST_CACHE_TTL_SECS", 60)?),
            access_token_ttl: chrono::Duration::minutes(
                number("INKPOST_ACCESS_TOKEN_MINUTES", 60)? as i64,
            ),
            refresh_token_ttl: chrono::Duration::days(
                number("INKPOST_REFRESH_TOKEN_DAYS", 1)? as i64,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = config(&[("INKPOST_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.access_token_ttl, chrono::Duration::minutes(60));
        assert_eq!(config.refresh_token_ttl, chrono::Duration::days(1));
    }

    #[test]
    fn placeholder_secrets_are_refused() {
        assert!(matches!(config(&[]), Err(ConfigError::MissingSecret)));
        assert!(matches!(
            config(&[("INKPOST_JWT_SECRET", "dev-secret-change-me")]),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config(&[("INKPOST_JWT_SECRET", "s"), ("INKPOST_PORT", "70000")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "INKPOST_PORT", .. }));

        let err = config(&[("INKPOST_JWT_SECRET", "s"), ("INKPOST_CACHE_TTL_SECS", "soon")]).unwrap_err();
        assert_eq!(err.to_string(), "INKPOST_CACHE_TTL_SECS has an invalid value \"soon\"");
    }
}
