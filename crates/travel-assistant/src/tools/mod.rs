//! Tools that let the model look up live travel data.

mod attractions;
mod currency;
mod travel_date;
mod weather;

use reqwest::{Client, Url};
use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde::de::DeserializeOwned;
use serde_json::Value;
use travel_assistant_core::tool::Error as ToolError;

pub use attractions::{ALLOWED_KINDS, AttractionsTool};
pub use currency::{CurrencyTool, fetch_currency_codes};
pub use travel_date::TravelDate;
pub use weather::WeatherTool;

/// What the model should do when a tool finds nothing.
pub const NOT_FOUND_GUIDANCE: &str = "Try to answer without it. If you can't, \
    ask the user to provide more information in their question.";

/// Generates the parameter schema of a tool with nested types inlined.
fn parameter_schema<T: JsonSchema>() -> Value {
    SchemaSettings::draft2020_12()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>()
        .to_value()
}

fn make_url<I, K, V>(base: &str, query: I) -> Result<Url, ToolError>
where
    I: IntoIterator,
    I::Item: std::borrow::Borrow<(K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    Url::parse_with_params(base, query).map_err(|err| {
        ToolError::execution_error().with_reason(format!("Bad URL: {err}"))
    })
}

/// Sends a GET request and decodes the JSON body.
///
/// The status code is not checked, the APIs report errors in the body.
async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    url: Url,
) -> Result<T, reqwest::Error> {
    // API keys are part of the URL, only the host is logged.
    trace!("sending a request to {}", url.host_str().unwrap_or_default());
    client.get(url).send().await?.json().await
}
