use std::env;
use std::time::Duration;

const DEFAULT_UPSTREAM: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub per_second: u64,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base URLs of the backend instances, at most `MAX_INSTANCES`
    pub upstream_urls: Vec<String>,
    /// Interval between keep-alive pings; `None` disables them
    pub keep_alive: Option<Duration>,
    pub upstream_timeout: Duration,
    /// Per-IP limit; `None` disables rate limiting
    pub rate_limit: Option<RateLimit>,
    /// Reported by the health endpoint
    pub service_name: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let max_instances = parsed("MAX_INSTANCES").unwrap_or(3);
        let keep_alive_secs: u64 = parsed("KEEP_ALIVE_SECS").unwrap_or(300);

        Self {
            port: parsed("PORT").unwrap_or(8787),
            upstream_urls: parse_upstreams(
                &env::var("UPSTREAM_URLS").unwrap_or_default(),
                max_instances,
            ),
            keep_alive: (keep_alive_secs > 0).then(|| Duration::from_secs(keep_alive_secs)),
            upstream_timeout: Duration::from_secs(parsed("UPSTREAM_TIMEOUT_SECS").unwrap_or(30)),
            rate_limit: parsed("RATE_LIMIT_PER_SECOND").map(|per_second| RateLimit {
                per_second,
                burst: parsed("RATE_LIMIT_BURST").unwrap_or(5),
            }),
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "ignition-api".to_string()),
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Split a comma separated URL list, dropping blanks and trailing slashes,
/// and keep the first `max`. Falls back to the local default when empty.
fn parse_upstreams(raw: &str, max: usize) -> Vec<String> {
    let mut urls: Vec<String> = raw
        .split(',')
        .map(|url| url.trim().trim_end_matches('/'))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        urls.push(DEFAULT_UPSTREAM.to_string());
    }
    urls.truncate(max.max(1));
    urls
}
