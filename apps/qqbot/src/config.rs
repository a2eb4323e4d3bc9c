//! Environment configuration.

use std::{collections::HashSet, fmt::Display, str::FromStr, time::Duration};

use qqbot_dispatch::DispatcherConfig;
use qqbot_gateway::{GatewayConfig, Intents, Shard};
use qqbot_handlers::GeminiConfig;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Default OpenAPI base URL.
pub const DEFAULT_BOT_URL: &str = "https://api.sgroup.qq.com";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid {name}={value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the binary reads at startup.
pub struct AppConfig {
    pub bot_id: String,
    pub bot_token: String,
    pub bot_url: String,
    pub gemini_key: String,
    pub gemini: GeminiConfig,
    pub gateway: GatewayConfig,
    pub dispatcher: DispatcherConfig,
    /// Groups allowed to rotate the generative API key.
    pub admin_groups: HashSet<String>,
}

impl AppConfig {
    /// Read the process environment.
    ///
    /// # Errors
    /// Returns error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read variables through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    /// Returns error if a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let gemini_defaults = GeminiConfig::default();
        let dispatcher_defaults = DispatcherConfig::default();

        Ok(Self {
            bot_id: required("BOT_ID")?,
            bot_token: required("BOT_TOKEN")?,
            bot_url: get("BOT_URL").unwrap_or_else(|| DEFAULT_BOT_URL.to_string()),
            gemini_key: required("GEMINI_PRO_KEY")?,
            gemini: GeminiConfig {
                pro_url: get("GEMINI_PRO_URL").unwrap_or(gemini_defaults.pro_url),
                pro_vision_url: get("GEMINI_PRO_VISION_URL")
                    .unwrap_or(gemini_defaults.pro_vision_url),
            },
            gateway: GatewayConfig {
                intents: parse(&get, "QQBOT_INTENTS")?.map_or_else(Intents::default, Intents),
                shard: get("QQBOT_SHARD")
                    .map(|value| parse_shard(&value))
                    .transpose()?
                    .unwrap_or_default(),
                reconnect_delay: parse(&get, "QQBOT_RECONNECT_DELAY_MS")?
                    .map_or(Duration::ZERO, Duration::from_millis),
            },
            dispatcher: DispatcherConfig {
                max_in_flight: parse::<usize>(&get, "QQBOT_MAX_IN_FLIGHT")?
                    .map(max_in_flight)
                    .transpose()?
                    .unwrap_or(dispatcher_defaults.max_in_flight),
                handler_deadline: parse(&get, "QQBOT_HANDLER_TIMEOUT_SECS")?
                    .map_or(dispatcher_defaults.handler_deadline, Duration::from_secs),
            },
            admin_groups: get("QQBOT_ADMIN_GROUPS")
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|group| !group.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    get(name)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

/// Handler ceiling, bounded by what a semaphore can hold.
fn max_in_flight(value: usize) -> Result<usize, ConfigError> {
    let reason = if value == 0 {
        "must be positive".to_string()
    } else if value > Semaphore::MAX_PERMITS {
        format!("must be at most {}", Semaphore::MAX_PERMITS)
    } else {
        return Ok(value);
    };
    Err(ConfigError::Invalid {
        name: "QQBOT_MAX_IN_FLIGHT",
        value: value.to_string(),
        reason,
    })
}

/// `index,count`
fn parse_shard(value: &str) -> Result<Shard, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name: "QQBOT_SHARD",
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (index, count) = value
        .split_once(',')
        .ok_or_else(|| invalid("expected index,count"))?;
    let index: u32 = index.trim().parse().map_err(|_| invalid("index is not a number"))?;
    let count: u32 = count.trim().parse().map_err(|_| invalid("count is not a number"))?;
    if index >= count {
        return Err(invalid("index must be below count"));
    }
    Ok(Shard { index, count })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [("BOT_ID", "1"), ("BOT_TOKEN", "t"), ("GEMINI_PRO_KEY", "g")];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.bot_url, DEFAULT_BOT_URL);
        assert_eq!(config.gateway.intents, Intents::default());
        assert_eq!(config.gateway.shard, Shard { index: 0, count: 1 });
        assert_eq!(config.gateway.reconnect_delay, Duration::ZERO);
        assert_eq!(config.dispatcher.max_in_flight, 1000);
        assert_eq!(config.dispatcher.handler_deadline, Duration::from_secs(295));
        assert!(config.gemini.pro_url.ends_with("gemini-pro:generateContent"));
        assert!(config.admin_groups.is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("BOT_URL", "https://sandbox.api.sgroup.qq.com"),
            ("GEMINI_PRO_URL", "http://localhost/pro"),
            ("QQBOT_INTENTS", "33554432"),
            ("QQBOT_SHARD", "1, 4"),
            ("QQBOT_RECONNECT_DELAY_MS", "250"),
            ("QQBOT_MAX_IN_FLIGHT", "8"),
            ("QQBOT_HANDLER_TIMEOUT_SECS", "30"),
            ("QQBOT_ADMIN_GROUPS", "a, b,,"),
        ]);
        let config = AppConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.bot_url, "https://sandbox.api.sgroup.qq.com");
        assert_eq!(config.gemini.pro_url, "http://localhost/pro");
        assert_eq!(config.gateway.intents, Intents::GROUP_AND_C2C_EVENT);
        assert_eq!(config.gateway.shard, Shard { index: 1, count: 4 });
        assert_eq!(config.gateway.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.dispatcher.max_in_flight, 8);
        assert_eq!(config.dispatcher.handler_deadline, Duration::from_secs(30));
        assert_eq!(
            config.admin_groups,
            HashSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_max_in_flight_bounds() {
        assert_eq!(max_in_flight(1).unwrap(), 1);
        assert_eq!(
            max_in_flight(Semaphore::MAX_PERMITS).unwrap(),
            Semaphore::MAX_PERMITS
        );
        let err = max_in_flight(Semaphore::MAX_PERMITS + 1).unwrap_err();
        assert!(err.to_string().contains("must be at most"), "{err}");
    }

    #[test]
    fn test_missing_and_invalid_values() {
        let err = AppConfig::from_lookup(lookup(&[("BOT_ID", "1"), ("BOT_TOKEN", " ")])).err();
        assert!(matches!(err, Some(ConfigError::Missing("BOT_TOKEN"))));

        for (name, value) in [
            ("QQBOT_INTENTS", "all"),
            ("QQBOT_SHARD", "2,2"),
            ("QQBOT_SHARD", "1"),
            ("QQBOT_MAX_IN_FLIGHT", "0"),
            ("QQBOT_MAX_IN_FLIGHT", "18446744073709551615"),
            ("QQBOT_HANDLER_TIMEOUT_SECS", "-1"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((name, value));
            let err = AppConfig::from_lookup(lookup(&vars)).err();
            assert!(
                matches!(err, Some(ConfigError::Invalid { name: n, .. }) if n == name),
                "{name}={value}"
            );
        }
    }
}
