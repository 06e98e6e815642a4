use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.ecent.online";
pub const DEFAULT_APP_ORIGIN: &str = "https://ignition.ecent.online";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// Value of the `session` cookie; unauthenticated when unset
    pub session: Option<String>,
    /// Sent as `Origin` on mutations
    pub app_origin: String,
    /// Directory holding the local store
    pub state_dir: PathBuf,
    pub timeout: Duration,
    /// Try the settings socket before falling back to polling
    pub prefer_websocket: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            api_url: env::var("IGNITION_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            session: env::var("IGNITION_SESSION").ok().filter(|s| !s.is_empty()),
            app_origin: env::var("IGNITION_ORIGIN")
                .map(|origin| origin.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_APP_ORIGIN.to_string()),
            state_dir: env::var("IGNITION_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_state_dir()),
            timeout: Duration::from_millis(
                env::var("IGNITION_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
            prefer_websocket: env::var("IGNITION_PREFER_WEBSOCKET")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join("store")
    }
}

fn default_state_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".ignition"))
        .unwrap_or_else(|_| PathBuf::from(".ignition"))
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(" OFF "));
        assert!(!parse_flag("0"));
    }

    #[test]
    fn store_lives_in_state_dir() {
        let config = Config {
            api_url: DEFAULT_API_URL.to_string(),
            session: None,
            app_origin: DEFAULT_APP_ORIGIN.to_string(),
            state_dir: PathBuf::from("/tmp/ignition"),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            prefer_websocket: true,
        };
        assert_eq!(config.store_path(), PathBuf::from("/tmp/ignition/store"));
    }
}
