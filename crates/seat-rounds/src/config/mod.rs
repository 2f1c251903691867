use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const ENV_STAGE: &str = "APP_ENV";
const ENV_HOST: &str = "APP_HOST";
const ENV_PORT: &str = "APP_PORT";
const ENV_LOG_LEVEL: &str = "APP_LOG_LEVEL";
const ENV_LOG_TARGETS: &str = "APP_LOG_TARGETS";
const ENV_STORE: &str = "SEAT_ROUNDS_STORE";
const ENV_MAX_ROUNDS: &str = "SEAT_ROUNDS_MAX_ROUNDS";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STORE_PATH: &str = "seat_rounds.json";
/// Upper bound on round numbers offered by the admissions office.
const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Deployment stage the service runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Everything the binary needs to start: where to listen, how to log and
/// which season store to open.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub store: StoreConfig,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl AppConfig {
    /// Reads `.env` if present, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = var(ENV_STAGE)
            .map(|raw| AppEnvironment::parse(&raw))
            .unwrap_or(AppEnvironment::Development);

        Ok(Self {
            environment,
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig::from_env(),
            store: StoreConfig::from_env()?,
        })
    }
}

/// HTTP listener settings for `serve`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = var(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match var(ENV_PORT) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort { value: raw })?,
            None => DEFAULT_PORT,
        };
        Ok(Self { host, port })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .trim()
            .parse()
            .map_err(|source| ConfigError::InvalidHost {
                value: self.host.clone(),
                source,
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    pub include_targets: bool,
}

impl TelemetryConfig {
    fn from_env() -> Self {
        Self {
            log_level: var(ENV_LOG_LEVEL).unwrap_or_else(|| "info".to_string()),
            include_targets: var(ENV_LOG_TARGETS)
                .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

/// Season store location and the highest round number accepted.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub max_rounds: u32,
}

impl StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let path = var(ENV_STORE)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
        let max_rounds = match var(ENV_MAX_ROUNDS) {
            Some(raw) => parse_max_rounds(&raw)?,
            None => DEFAULT_MAX_ROUNDS,
        };
        Ok(Self { path, max_rounds })
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

fn parse_max_rounds(raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidMaxRounds {
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort {
        value: String,
    },
    InvalidHost {
        value: String,
        source: std::net::AddrParseError,
    },
    InvalidMaxRounds {
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort { value } => {
                write!(f, "{ENV_PORT} '{value}' is not a port number")
            }
            ConfigError::InvalidHost { value, .. } => {
                write!(f, "{ENV_HOST} '{value}' is neither an IP address nor 'localhost'")
            }
            ConfigError::InvalidMaxRounds { value } => {
                write!(f, "{ENV_MAX_ROUNDS} '{value}' is not a positive round count")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source, .. } => Some(source),
            ConfigError::InvalidPort { .. } | ConfigError::InvalidMaxRounds { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const KEYS: [&str; 7] = [
        ENV_STAGE,
        ENV_HOST,
        ENV_PORT,
        ENV_LOG_LEVEL,
        ENV_LOG_TARGETS,
        ENV_STORE,
        ENV_MAX_ROUNDS,
    ];

    /// Serialises tests that touch the process environment and clears every
    /// key this module reads.
    fn clean_env() -> std::sync::MutexGuard<'static, ()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        let guard = GUARD
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for key in KEYS {
            env::remove_var(key);
        }
        guard
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let _env = clean_env();
        let config = AppConfig::load().expect("defaults load");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.store.path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(config.store.max_rounds, DEFAULT_MAX_ROUNDS);
    }

    #[test]
    fn store_settings_come_from_the_environment() {
        let _env = clean_env();
        env::set_var(ENV_STORE, "/var/lib/admissions/season.json");
        env::set_var(ENV_MAX_ROUNDS, " 6 ");
        let store = StoreConfig::from_env();
        for key in KEYS {
            env::remove_var(key);
        }

        let store = store.expect("store settings load");
        assert_eq!(store.path, PathBuf::from("/var/lib/admissions/season.json"));
        assert_eq!(store.max_rounds, 6);
    }

    #[test]
    fn zero_round_bound_is_rejected() {
        let _env = clean_env();
        env::set_var(ENV_MAX_ROUNDS, "0");
        let result = AppConfig::load();
        env::remove_var(ENV_MAX_ROUNDS);
        assert!(matches!(result, Err(ConfigError::InvalidMaxRounds { .. })));
    }

    #[test]
    fn bad_port_names_the_value() {
        let _env = clean_env();
        env::set_var(ENV_PORT, "70000");
        let result = ServerConfig::from_env();
        env::remove_var(ENV_PORT);
        let err = result.expect_err("port out of range");
        assert_eq!(err.to_string(), "APP_PORT '70000' is not a port number");
    }

    #[test]
    fn stage_names_are_lenient() {
        assert_eq!(AppEnvironment::parse(" PROD "), AppEnvironment::Production);
        assert_eq!(AppEnvironment::parse("ci"), AppEnvironment::Test);
        assert_eq!(AppEnvironment::parse("staging"), AppEnvironment::Development);
    }

    #[test]
    fn localhost_binds_loopback() {
        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 8080,
        };
        let addr = server.socket_addr().expect("loopback address");
        assert_eq!(addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn unparseable_host_names_the_value() {
        let server = ServerConfig {
            host: "admissions box".to_string(),
            port: 8080,
        };
        let err = server.socket_addr().expect_err("not an address");
        assert!(err.to_string().contains("'admissions box'"));
    }
}
