use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub utm_source: Option<String>,
    pub prefill_delay: Duration,
    pub keepalive_interval: Duration,
}

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_PREFILL_DELAY_MS: u64 = 1500;
const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Derive the socket base URL from the REST base URL.
pub fn ws_url_from(api_base_url: &str) -> String {
    if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_base_url.to_string()
    }
}

impl AppConfig {
    /// Build the config from any key lookup, e.g. the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base_url = lookup("LANDING_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let ws_base_url = lookup("LANDING_WS_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| ws_url_from(&api_base_url));
        let utm_source = lookup("LANDING_UTM_SOURCE").filter(|s| !s.trim().is_empty());
        let prefill_delay_ms = lookup("LANDING_PREFILL_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PREFILL_DELAY_MS);
        // A zero interval would spin the keepalive timer
        let keepalive_secs = lookup("LANDING_KEEPALIVE_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_KEEPALIVE_SECS)
            .max(1);

        Self {
            api_base_url,
            ws_base_url,
            utm_source,
            prefill_delay: Duration::from_millis(prefill_delay_ms),
            keepalive_interval: Duration::from_secs(keepalive_secs),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn it_uses_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.ws_base_url, "ws://localhost:8000");
        assert_eq!(config.utm_source, None);
        assert_eq!(config.prefill_delay, Duration::from_millis(1500));
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
    }

    #[test]
    fn it_derives_the_socket_url() {
        let config = config_from(&[("LANDING_API_URL", "https://api.example.com/")]);
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.ws_base_url, "wss://api.example.com");

        let config = config_from(&[
            ("LANDING_API_URL", "https://api.example.com"),
            ("LANDING_WS_URL", "wss://chat.example.com/"),
        ]);
        assert_eq!(config.ws_base_url, "wss://chat.example.com");
    }

    #[test]
    fn it_falls_back_on_bad_numbers() {
        let config = config_from(&[
            ("LANDING_PREFILL_DELAY_MS", "soon"),
            ("LANDING_KEEPALIVE_SECS", "0"),
            ("LANDING_UTM_SOURCE", "  "),
        ]);
        assert_eq!(config.prefill_delay, Duration::from_millis(1500));
        assert_eq!(config.keepalive_interval, Duration::from_secs(1));
        assert_eq!(config.utm_source, None);
    }
}
