use std::{fmt, time::Duration};
use tracing::warn;

use crate::poller::DEFAULT_POLL_PERIOD;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Runtime settings, read from the environment.
///
/// | Variable | Default |
/// | --- | --- |
/// | `GOOGLE_API_KEY`, then `GEMINI_API_KEY` | empty, with a warning |
/// | `GOOGLE_BASE_URL` | provider default |
/// | `FORGE_RESEARCH_MODEL` | [`DEFAULT_MODEL`] |
/// | `FORGE_SYNTHESIS_MODEL` | [`DEFAULT_MODEL`] |
/// | `FORGE_CHAT_MODEL` | [`DEFAULT_MODEL`] |
/// | `FORGE_FEED_MODEL` | [`DEFAULT_MODEL`] |
/// | `FORGE_POLL_INTERVAL_SECS` | 15 |
#[derive(Clone)]
pub struct WorkbenchConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub research_model: String,
    pub synthesis_model: String,
    pub chat_model: String,
    pub feed_model: String,
    pub poll_period: Duration,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            research_model: DEFAULT_MODEL.to_string(),
            synthesis_model: DEFAULT_MODEL.to_string(),
            chat_model: DEFAULT_MODEL.to_string(),
            feed_model: DEFAULT_MODEL.to_string(),
            poll_period: DEFAULT_POLL_PERIOD,
        }
    }
}

impl WorkbenchConfig {
    /// Load a `.env` file if there is one, then read the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let api_key = get("GOOGLE_API_KEY")
            .or_else(|| get("GEMINI_API_KEY"))
            .unwrap_or_else(|| {
                warn!("no GOOGLE_API_KEY or GEMINI_API_KEY set, model calls will be rejected");
                String::new()
            });

        let poll_period = match get("FORGE_POLL_INTERVAL_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(value = %raw, "invalid FORGE_POLL_INTERVAL_SECS, using default");
                    defaults.poll_period
                }
            },
            None => defaults.poll_period,
        };

        Self {
            api_key,
            base_url: get("GOOGLE_BASE_URL"),
            research_model: get("FORGE_RESEARCH_MODEL").unwrap_or(defaults.research_model),
            synthesis_model: get("FORGE_SYNTHESIS_MODEL").unwrap_or(defaults.synthesis_model),
            chat_model: get("FORGE_CHAT_MODEL").unwrap_or(defaults.chat_model),
            feed_model: get("FORGE_FEED_MODEL").unwrap_or(defaults.feed_model),
            poll_period,
        }
    }
}

impl fmt::Debug for WorkbenchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbenchConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("research_model", &self.research_model)
            .field("synthesis_model", &self.synthesis_model)
            .field("chat_model", &self.chat_model)
            .field("feed_model", &self.feed_model)
            .field("poll_period", &self.poll_period)
            .finish()
    }
}
