//! Startup configuration read from the environment.

use std::fmt;

use thiserror::Error;
use travel_assistant_core::{DEFAULT_TRAVELER_MODEL, DEFAULT_VERIFIER_MODEL};
use travel_assistant_core::history::DEFAULT_MAX_EXCHANGES;

/// An error that makes the configuration unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("environment variable `{0}` is not set")]
    Missing(&'static str),
    /// A variable is set to something that can't be used.
    #[error("environment variable `{name}` has an invalid value {value:?}")]
    Invalid {
        /// Name of the variable.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Everything the assistant needs to start.
#[derive(Clone)]
pub struct AppConfig {
    /// Key of the Gemini API.
    pub google_api_key: String,
    /// Key of the OpenWeatherMap API.
    pub openweather_api_key: String,
    /// Key of the OpenTripMap API.
    pub open_trip_map_api_key: String,
    /// Key of ExchangeRate-API.
    pub exchange_rate_api_key: String,
    /// Overrides the Gemini API endpoint.
    pub gemini_base_url: Option<String>,
    /// The model that answers the user.
    pub traveler_model: String,
    /// The model that reviews the answers.
    pub verifier_model: String,
    /// How many recent exchanges are sent to the model.
    pub max_history: usize,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration from the given variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| {
            lookup(name).filter(|value| !value.trim().is_empty())
        };
        let required = |name: &'static str| {
            optional(name).ok_or(ConfigError::Missing(name))
        };

        let max_history = match optional("MAX_HISTORY") {
            Some(value) => match value.trim().parse() {
                Ok(max_history) if max_history > 0 => max_history,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "MAX_HISTORY",
                        value,
                    });
                }
            },
            None => DEFAULT_MAX_EXCHANGES,
        };

        Ok(Self {
            google_api_key: required("GOOGLE_API_KEY")?,
            openweather_api_key: required("OPENWEATHER_API_KEY")?,
            open_trip_map_api_key: required("OPEN_TRIP_MAP_API_KEY")?,
            exchange_rate_api_key: required("EXCHANGERATE_API_KEY")?,
            gemini_base_url: optional("GEMINI_BASE_URL"),
            traveler_model: optional("TRAVELER_MODEL")
                .unwrap_or_else(|| DEFAULT_TRAVELER_MODEL.to_owned()),
            verifier_model: optional("VERIFIER_MODEL")
                .unwrap_or_else(|| DEFAULT_VERIFIER_MODEL.to_owned()),
            max_history,
        })
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("AppConfig")
            .field("google_api_key", &REDACTED)
            .field("openweather_api_key", &REDACTED)
            .field("open_trip_map_api_key", &REDACTED)
            .field("exchange_rate_api_key", &REDACTED)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("traveler_model", &self.traveler_model)
            .field("verifier_model", &self.verifier_model)
            .field("max_history", &self.max_history)
            .finish()
    }
}
