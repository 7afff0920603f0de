use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_DATABASE_URL: &str = "sqlite://vocab_planner.db";
const DEFAULT_LOG_DIR: &str = "./logs";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log: LogSettings,
    pub database_url: String,
    pub db_max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info,sqlx=warn`.
    pub filter: String,
    /// Daily rolling log files go here when set.
    pub file_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or unparsable values
    /// fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = lookup("HOST")
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(5);

        Self {
            host,
            port,
            log: LogSettings::from_lookup(&lookup),
            database_url,
            db_max_connections,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl LogSettings {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("RUST_LOG")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        let file_logs = lookup("ENABLE_FILE_LOGS")
            .map(|value| matches!(value.trim(), "true" | "1"))
            .unwrap_or(false);
        let file_dir = file_logs.then(|| {
            lookup("LOG_DIR")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
        });

        Self { filter, file_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_addr().to_string(), "0.0.0.0:3000");
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(
            cfg.log,
            LogSettings {
                filter: "info".to_string(),
                file_dir: None,
            }
        );
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = config(&[("PORT", "http"), ("DB_MAX_CONNECTIONS", "0"), ("DATABASE_URL", " ")]);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn file_logs_need_the_flag() {
        let cfg = config(&[("LOG_DIR", "/var/log/planner")]);
        assert_eq!(cfg.log.file_dir, None);

        let cfg = config(&[("ENABLE_FILE_LOGS", "1")]);
        assert_eq!(cfg.log.file_dir, Some(PathBuf::from(DEFAULT_LOG_DIR)));

        let cfg = config(&[("ENABLE_FILE_LOGS", "true"), ("LOG_DIR", "/var/log/planner"), ("RUST_LOG", "debug")]);
        assert_eq!(cfg.log.file_dir, Some(PathBuf::from("/var/log/planner")));
        assert_eq!(cfg.log.filter, "debug");
    }
}
