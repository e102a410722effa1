use std::collections::HashMap;
use std::sync::Arc;

use reqwest::{Client, Url};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use travel_assistant_core::tool::{Error as ToolError, Tool, ToolResult};

use super::{NOT_FOUND_GUIDANCE, fetch_json, parameter_schema};

const BASE_URL: &str = "https://v6.exchangerate-api.com/v6";

#[derive(Deserialize, JsonSchema)]
pub struct CurrencyToolParameters {
    #[schemars(description = "ISO 4217 code of the currency to convert from, e.g. \"USD\".")]
    from_currency: String,
    #[schemars(description = "ISO 4217 code of the currency to convert to, e.g. \"EUR\".")]
    to_currency: String,
    #[serde(default = "default_amount")]
    #[schemars(description = "The amount of money to convert.")]
    amount: f64,
}

fn default_amount() -> f64 {
    1.0
}

/// A tool for converting money between currencies with ExchangeRate-API.
pub struct CurrencyTool {
    client: Client,
    api_key: Arc<str>,
    parameter_schema: Value,
}

impl CurrencyTool {
    /// Creates a new currency tool.
    pub fn new<S: Into<String>>(client: Client, api_key: S) -> Self {
        CurrencyTool {
            client,
            api_key: Arc::from(api_key.into()),
            parameter_schema: parameter_schema::<CurrencyToolParameters>(),
        }
    }
}

impl Tool for CurrencyTool {
    type Input = CurrencyToolParameters;

    fn name(&self) -> &str {
        "get_currency_exchange"
    }

    fn description(&self) -> &str {
        r#"
Get the latest exchange rate between two currencies and convert an amount of money.
Use the currency codes listed in the instructions."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: CurrencyToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let api_key = Arc::clone(&self.api_key);
        async move {
            let from = currency_code(&input.from_currency)?;
            let to = currency_code(&input.to_currency)?;
            if !input.amount.is_finite() {
                return Err(ToolError::invalid_input()
                    .with_reason("`amount` must be a finite number"));
            }

            let url = api_url(&api_key, &["latest", &from])?;
            let rates: LatestRates =
                fetch_json(&client, url).await.map_err(api_error)?;
            convert(rates, &from, &to, input.amount)
        }
    }
}

/// Fetches the `(code, name)` pairs of all supported currencies.
pub async fn fetch_currency_codes(
    client: &Client,
    api_key: &str,
) -> Result<Vec<(String, String)>, ToolError> {
    let url = api_url(api_key, &["codes"])?;
    let codes: SupportedCodes =
        fetch_json(client, url).await.map_err(api_error)?;
    match codes.error_type {
        Some(error_type) => Err(api_error(error_type)),
        None => Ok(codes.supported_codes),
    }
}

fn currency_code(code: &str) -> Result<String, ToolError> {
    let code = code.trim();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(ToolError::invalid_input()
            .with_reason(format!("'{code}' is not a currency code"))
            .with_guidance("Use a three-letter ISO 4217 code."));
    }
    Ok(code.to_ascii_uppercase())
}

fn api_url(api_key: &str, segments: &[&str]) -> Result<Url, ToolError> {
    let mut url = Url::parse(BASE_URL).map_err(|err| {
        ToolError::execution_error().with_reason(format!("Bad URL: {err}"))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            ToolError::execution_error().with_reason("Bad URL: cannot be a base")
        })?
        .push(api_key)
        .extend(segments);
    Ok(url)
}

fn api_error(err: impl std::fmt::Display) -> ToolError {
    ToolError::execution_error()
        .with_reason(format!("Currency API error: {err}"))
        .with_guidance(NOT_FOUND_GUIDANCE)
}

fn convert(rates: LatestRates, from: &str, to: &str, amount: f64) -> ToolResult {
    match rates.error_type.as_deref() {
        None => {}
        Some("unsupported-code") => {
            return Err(ToolError::not_found()
                .with_reason(format!("Currency '{from}' not found")));
        }
        Some(error_type) => return Err(api_error(error_type)),
    }
    let Some(&rate) = rates.conversion_rates.get(to) else {
        return Err(
            ToolError::not_found().with_reason(format!("Currency '{to}' not found"))
        );
    };

    Ok(json!({
        "from_currency": from,
        "to_currency": to,
        "exchange_rate": rate,
        "original_amount": amount,
        "converted_amount": round_cents(amount * rate),
        "time_last_update_utc": rates.time_last_update_utc,
    }))
}

#[inline]
fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    conversion_rates: HashMap<String, f64>,
    time_last_update_utc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SupportedCodes {
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    supported_codes: Vec<(String, String)>,
}
