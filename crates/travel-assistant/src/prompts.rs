//! System instructions of the assistant and the reviewer.

use std::fmt::Write;

use chrono::{Local, NaiveDateTime};
use reqwest::Client;

use crate::tools::fetch_currency_codes;

const TRAVEL_TEMPLATE: &str = include_str!("prompts/travel.md");
const VERIFIER_TEMPLATE: &str = include_str!("prompts/verifier.md");

/// Template of the system instruction for corrections, with the
/// `{{SYSTEM_PROMPT}}` and `{{FEEDBACK}}` placeholders.
pub const CORRECTION_TEMPLATE: &str = include_str!("prompts/correction.md");

/// Facts about the present that both models are told.
#[derive(Clone, Debug)]
pub struct PromptMetadata {
    now: NaiveDateTime,
    currency_codes: Result<Vec<(String, String)>, String>,
}

impl PromptMetadata {
    /// Creates the metadata from the current time and the supported
    /// currencies, or the reason why they are unknown.
    pub fn new(
        now: NaiveDateTime,
        currency_codes: Result<Vec<(String, String)>, String>,
    ) -> Self {
        Self {
            now,
            currency_codes,
        }
    }

    /// Collects the metadata, fetching the currency codes.
    ///
    /// A failed fetch is written into the metadata instead of being
    /// returned.
    pub async fn fetch(client: &Client, exchange_rate_api_key: &str) -> Self {
        let currency_codes = fetch_currency_codes(client, exchange_rate_api_key)
            .await
            .map_err(|err| {
                warn!("failed to fetch currency codes: {err}");
                err.reason().into_owned()
            });
        Self::new(Local::now().naive_local(), currency_codes)
    }

    /// Renders the metadata section of the system instructions.
    pub fn render(&self) -> String {
        let mut text = format!(
            "Today is {}, and this is the relative time for the user questions.\n",
            self.now.format("%A, %B %-d, %Y %H:%M")
        );
        text.push_str("Currency codes: ");
        match &self.currency_codes {
            Ok(codes) => {
                for (idx, (code, name)) in codes.iter().enumerate() {
                    if idx > 0 {
                        text.push_str(", ");
                    }
                    _ = write!(text, "{code} ({name})");
                }
            }
            Err(err) => {
                _ = write!(text, "unavailable ({err})");
            }
        }
        text
    }
}

/// Builds the system instruction of the assistant.
pub fn travel_instruction(metadata: &PromptMetadata) -> String {
    TRAVEL_TEMPLATE.replace("{{METADATA}}", &metadata.render())
}

/// Builds the system instruction of the reviewer.
pub fn verifier_instruction(metadata: &PromptMetadata) -> String {
    VERIFIER_TEMPLATE.replace("{{METADATA}}", &metadata.render())
}
