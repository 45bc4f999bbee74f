//! Authentication settings.

use chrono::Duration;
use tracing::warn;

pub const ENV_TOKEN_TTL_SECS: &str = "RECOGNITION_TOKEN_TTL_SECS";
pub const ENV_CLOCK_SKEW_SECS: &str = "RECOGNITION_CLOCK_SKEW_SECS";
pub const ENV_BIND_CLIENT_ADDR: &str = "RECOGNITION_BIND_CLIENT_ADDR";
pub const ENV_ALLOW_ANONYMOUS: &str = "RECOGNITION_ALLOW_ANONYMOUS";
pub const ENV_GUEST_USERNAME: &str = "RECOGNITION_GUEST_USERNAME";

/// Upper bound for durations read from the environment (ten years).
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Authentication configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Lifetime of freshly minted tokens
    pub token_ttl: Duration,
    /// Tolerated drift between token issue time and request time
    pub max_clock_skew: Duration,
    /// Bind minted tokens to the request's client address
    pub bind_to_client_addr: bool,
    /// Accept anonymous (guest) tokens
    pub allow_anonymous: bool,
    /// Username carried by guest tokens
    pub guest_username: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::hours(2),
            max_clock_skew: Duration::seconds(30),
            bind_to_client_addr: true,
            allow_anonymous: true,
            guest_username: "guest".to_string(),
        }
    }
}

impl AuthConfig {
    /// Read overrides from `RECOGNITION_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their default;
    /// unparsable values and durations outside `0..=MAX_DURATION_SECS` are
    /// logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ttl) = parse_secs(&lookup, ENV_TOKEN_TTL_SECS) {
            config.token_ttl = ttl;
        }
        if let Some(skew) = parse_secs(&lookup, ENV_CLOCK_SKEW_SECS) {
            config.max_clock_skew = skew;
        }
        if let Some(flag) = parse_var::<bool, _>(&lookup, ENV_BIND_CLIENT_ADDR) {
            config.bind_to_client_addr = flag;
        }
        if let Some(flag) = parse_var::<bool, _>(&lookup, ENV_ALLOW_ANONYMOUS) {
            config.allow_anonymous = flag;
        }
        if let Some(name) = lookup(ENV_GUEST_USERNAME).filter(|n| !n.trim().is_empty()) {
            config.guest_username = name;
        }

        config
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_max_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    pub fn with_client_binding(mut self, bind: bool) -> Self {
        self.bind_to_client_addr = bind;
        self
    }

    pub fn with_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    pub fn with_guest_username(mut self, name: impl Into<String>) -> Self {
        self.guest_username = name.into();
        self
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_var::<i64, _>(lookup, key)?;
    let duration = (0..=MAX_DURATION_SECS)
        .contains(&secs)
        .then(|| Duration::try_seconds(secs))
        .flatten();
    if duration.is_none() {
        warn!(key, secs, "ignoring out-of-range auth setting");
    }
    duration
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: core::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable auth setting");
            None
        }
    }
}
