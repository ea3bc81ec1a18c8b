//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::message::Destination;

/// Runtime toggles the relay consults on every routing episode.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Master switch. When off, nothing is routed or polled.
    pub service_enabled: bool,
    /// Reply to every inbound sender from the device itself.
    pub auto_reply_enabled: bool,
    pub auto_reply_text: String,
    pub whitelist_enabled: bool,
    pub blacklist_enabled: bool,
    /// Poll destinations for outgoing-message tasks.
    pub task_check_enabled: bool,
    /// Confirm task uuids with the destination before sending them.
    pub message_results_api_enabled: bool,
    /// Send messages returned in a POST response as SMS.
    pub reply_from_server_enabled: bool,
    /// Block delivery of messages that fail a destination's keyword filter.
    /// Off by default: keyword matches are evaluated and logged only.
    pub enforce_keyword_filter: bool,
    /// Apply the phone-number lists to recipients of outgoing tasks.
    pub filter_outgoing_tasks: bool,
    /// Failed episodes before a message is marked failed (0 = never).
    pub max_delivery_attempts: u32,
    /// Unique device identifier posted with every message.
    pub device_id: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            service_enabled: true,
            auto_reply_enabled: false,
            auto_reply_text: String::new(),
            whitelist_enabled: false,
            blacklist_enabled: false,
            task_check_enabled: false,
            message_results_api_enabled: false,
            reply_from_server_enabled: false,
            enforce_keyword_filter: false,
            filter_outgoing_tasks: false,
            max_delivery_attempts: 10,
            device_id: String::new(),
        }
    }
}

impl RelaySettings {
    /// Build from environment variables (`RELAY_*`), falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    ///
    /// Unrecognised flag values keep the default; a malformed attempt limit
    /// is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|v| parse_bool(&v))
                .unwrap_or(default)
        };

        let max_delivery_attempts = match lookup("RELAY_MAX_DELIVERY_ATTEMPTS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "RELAY_MAX_DELIVERY_ATTEMPTS".to_string(),
                message: format!("expected a whole number, got '{raw}'"),
            })?,
            None => defaults.max_delivery_attempts,
        };

        Ok(Self {
            service_enabled: flag("RELAY_SERVICE_ENABLED", defaults.service_enabled),
            auto_reply_enabled: flag("RELAY_AUTO_REPLY_ENABLED", defaults.auto_reply_enabled),
            auto_reply_text: lookup("RELAY_AUTO_REPLY_TEXT").unwrap_or_default(),
            whitelist_enabled: flag("RELAY_WHITELIST_ENABLED", defaults.whitelist_enabled),
            blacklist_enabled: flag("RELAY_BLACKLIST_ENABLED", defaults.blacklist_enabled),
            task_check_enabled: flag("RELAY_TASK_CHECK_ENABLED", defaults.task_check_enabled),
            message_results_api_enabled: flag(
                "RELAY_MESSAGE_RESULTS_API_ENABLED",
                defaults.message_results_api_enabled,
            ),
            reply_from_server_enabled: flag(
                "RELAY_REPLY_FROM_SERVER_ENABLED",
                defaults.reply_from_server_enabled,
            ),
            enforce_keyword_filter: flag(
                "RELAY_ENFORCE_KEYWORD_FILTER",
                defaults.enforce_keyword_filter,
            ),
            filter_outgoing_tasks: flag(
                "RELAY_FILTER_OUTGOING_TASKS",
                defaults.filter_outgoing_tasks,
            ),
            max_delivery_attempts,
            device_id: lookup("RELAY_DEVICE_ID").unwrap_or_default(),
        })
    }
}

/// Daemon wiring: where state lives and how often background work runs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub db_path: PathBuf,
    pub task_check_interval: Duration,
    pub pending_sync_interval: Duration,
    /// Directory for daily-rolling log files; console only when unset.
    pub log_dir: Option<PathBuf>,
    /// `host:port` probed to decide whether the network is reachable.
    pub connectivity_probe: String,
    pub connectivity_timeout: Duration,
    /// Destination registered at startup if no destination has that URL yet.
    pub seed_destination: Option<Destination>,
    pub settings: RelaySettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/sms-relay.db"),
            task_check_interval: Duration::from_secs(300), // 5 minutes
            pending_sync_interval: Duration::from_secs(600), // 10 minutes
            log_dir: None,
            connectivity_probe: "1.1.1.1:53".to_string(),
            connectivity_timeout: Duration::from_secs(3),
            seed_destination: None,
            settings: RelaySettings::default(),
        }
    }
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(raw) => {
                    let n: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("expected seconds, got '{raw}'"),
                    })?;
                    if n == 0 {
                        return Err(ConfigError::InvalidValue {
                            key: key.to_string(),
                            message: "interval must be at least 1 second".into(),
                        });
                    }
                    Ok(Duration::from_secs(n))
                }
                None => Ok(default),
            }
        };

        let seed_destination = lookup("RELAY_DESTINATION_URL")
            .filter(|u| !u.trim().is_empty())
            .map(|url| {
                let url = url.trim().to_string();
                let title = lookup("RELAY_DESTINATION_TITLE").unwrap_or_else(|| url.clone());
                let mut dest = Destination::new(title, url);
                if let Some(secret) = lookup("RELAY_DESTINATION_SECRET") {
                    dest = dest.with_secret(secret);
                }
                if let Some(keywords) = lookup("RELAY_DESTINATION_KEYWORDS") {
                    dest = dest.with_keywords(keywords);
                }
                dest
            });

        let mut settings = RelaySettings::from_lookup(&lookup)?;
        if settings.device_id.is_empty() {
            settings.device_id = lookup("HOSTNAME").unwrap_or_else(|| "sms-relay".to_string());
        }

        Ok(Self {
            db_path: lookup("RELAY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            task_check_interval: secs(
                "RELAY_TASK_CHECK_INTERVAL_SECS",
                defaults.task_check_interval,
            )?,
            pending_sync_interval: secs(
                "RELAY_PENDING_SYNC_INTERVAL_SECS",
                defaults.pending_sync_interval,
            )?,
            log_dir: lookup("RELAY_LOG_DIR").map(PathBuf::from),
            connectivity_probe: lookup("RELAY_CONNECTIVITY_PROBE")
                .unwrap_or(defaults.connectivity_probe),
            connectivity_timeout: defaults.connectivity_timeout,
            seed_destination,
            settings,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn settings_default_when_unset() {
        let s = RelaySettings::from_lookup(lookup(&[])).unwrap();
        assert!(s.service_enabled);
        assert!(!s.task_check_enabled);
        assert!(!s.enforce_keyword_filter);
        assert_eq!(s.max_delivery_attempts, 10);
    }

    #[test]
    fn settings_parse_flags() {
        let s = RelaySettings::from_lookup(lookup(&[
            ("RELAY_SERVICE_ENABLED", "off"),
            ("RELAY_BLACKLIST_ENABLED", "yes"),
            ("RELAY_MESSAGE_RESULTS_API_ENABLED", "1"),
            ("RELAY_AUTO_REPLY_TEXT", "Thanks!"),
            ("RELAY_MAX_DELIVERY_ATTEMPTS", "0"),
        ]))
        .unwrap();
        assert!(!s.service_enabled);
        assert!(s.blacklist_enabled);
        assert!(s.message_results_api_enabled);
        assert_eq!(s.auto_reply_text, "Thanks!");
        assert_eq!(s.max_delivery_attempts, 0);
    }

    #[test]
    fn unparseable_flag_keeps_default() {
        let s = RelaySettings::from_lookup(lookup(&[("RELAY_SERVICE_ENABLED", "maybe")])).unwrap();
        assert!(s.service_enabled);
    }

    #[test]
    fn malformed_attempt_limit_is_rejected() {
        let err = RelaySettings::from_lookup(lookup(&[("RELAY_MAX_DELIVERY_ATTEMPTS", "ten")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "RELAY_MAX_DELIVERY_ATTEMPTS"
        ));

        let err = RelayConfig::from_lookup(lookup(&[("RELAY_MAX_DELIVERY_ATTEMPTS", "-1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn config_reads_seed_destination() {
        let c = RelayConfig::from_lookup(lookup(&[
            ("RELAY_DESTINATION_URL", "https://hooks.example/sms"),
            ("RELAY_DESTINATION_SECRET", "abc"),
            ("RELAY_DESTINATION_KEYWORDS", "alert,down"),
            ("RELAY_DEVICE_ID", "phone-7"),
        ]))
        .unwrap();
        let dest = c.seed_destination.unwrap();
        assert_eq!(dest.url, "https://hooks.example/sms");
        assert_eq!(dest.title, "https://hooks.example/sms");
        assert_eq!(dest.secret(), Some("abc"));
        assert!(dest.keyword_filter);
        assert_eq!(c.settings.device_id, "phone-7");
    }

    #[test]
    fn config_rejects_bad_interval() {
        let err = RelayConfig::from_lookup(lookup(&[("RELAY_TASK_CHECK_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = RelayConfig::from_lookup(lookup(&[("RELAY_PENDING_SYNC_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn device_id_falls_back_to_hostname() {
        let c = RelayConfig::from_lookup(lookup(&[("HOSTNAME", "pixel")])).unwrap();
        assert_eq!(c.settings.device_id, "pixel");
        assert_eq!(c.task_check_interval, Duration::from_secs(300));
    }
}
