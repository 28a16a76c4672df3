use std::time::Duration;

use crate::protocol::AgentError;

pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 600_000;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_FETCH_SIZE: usize = 100;

/// Connection properties sent with, or governing, a connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectProperties {
    pub user: Option<String>,
    pub password: Option<String>,
    /// Server-side idle threshold after which the session is reaped
    pub idle_timeout: Duration,
    /// How long a single call may wait for its response
    pub call_timeout: Duration,
    pub lookup_timeout: Duration,
    /// Rows requested per batch when iterating a result set
    pub fetch_size: usize,
}

impl Default for ConnectProperties {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

impl ConnectProperties {
    /// Build from `key=value` style pairs (`user`, `password`, `timeout`,
    /// `callTimeout`, `lookupTimeout`, `fetchSize`; times in milliseconds).
    /// Unknown keys are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, AgentError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut props = Self::default();
        for (key, value) in pairs {
            match key {
                "user" => props.user = Some(value.to_string()),
                "password" => props.password = Some(value.to_string()),
                "timeout" => props.idle_timeout = Duration::from_millis(parse_number(key, value)?),
                "callTimeout" => {
                    props.call_timeout = Duration::from_millis(parse_number(key, value)?)
                }
                "lookupTimeout" => {
                    props.lookup_timeout = Duration::from_millis(parse_number(key, value)?)
                }
                "fetchSize" => props.fetch_size = parse_number(key, value)?.max(1) as usize,
                other => tracing::debug!("Ignoring unknown connection property '{}'", other),
            }
        }
        Ok(props)
    }

    pub(crate) fn idle_timeout_ms(&self) -> i64 {
        i64::try_from(self.idle_timeout.as_millis()).unwrap_or(i64::MAX)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, AgentError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| AgentError::InvalidUrl(format!("property '{}' is not a number: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs() {
        let props = ConnectProperties::from_pairs([
            ("user", "root"),
            ("password", "secret"),
            ("timeout", "600000"),
            ("fetchSize", "250"),
            ("unknown", "x"),
        ])
        .unwrap();

        assert_eq!(props.user.as_deref(), Some("root"));
        assert_eq!(props.password.as_deref(), Some("secret"));
        assert_eq!(props.idle_timeout, Duration::from_millis(600_000));
        assert_eq!(props.fetch_size, 250);
        assert_eq!(props.call_timeout, Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS));
    }

    #[test]
    fn test_bad_number_rejected() {
        assert!(ConnectProperties::from_pairs([("timeout", "soon")]).is_err());
    }
}
