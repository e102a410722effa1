use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate};
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use travel_assistant_core::tool::{Error as ToolError, Tool, ToolResult};

use super::{
    NOT_FOUND_GUIDANCE, TravelDate, fetch_json, make_url, parameter_schema,
};

const GEOCODING_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// How many days after the travel date are covered.
const FORECAST_DAYS: i64 = 5;

const NO_FORECAST_NOTE: &str = "No forecast is available for these dates, \
    forecasts only cover the next 5 days. Answer based on your knowledge \
    about the climate of the destination.";

#[derive(Deserialize, JsonSchema)]
pub struct WeatherToolParameters {
    #[schemars(description = "The destination, e.g. \"Paris, France\".")]
    destination: String,
    #[schemars(description = "The first day of the trip.")]
    travel_date: TravelDate,
}

/// A tool for getting the weather forecast of a destination with
/// OpenWeatherMap.
pub struct WeatherTool {
    client: Client,
    api_key: Arc<str>,
    parameter_schema: Value,
}

impl WeatherTool {
    /// Creates a new weather tool.
    pub fn new<S: Into<String>>(client: Client, api_key: S) -> Self {
        WeatherTool {
            client,
            api_key: Arc::from(api_key.into()),
            parameter_schema: parameter_schema::<WeatherToolParameters>(),
        }
    }
}

impl Tool for WeatherTool {
    type Input = WeatherToolParameters;

    fn name(&self) -> &str {
        "get_destination_weather_forecast"
    }

    fn description(&self) -> &str {
        r#"
Get the weather forecast of a destination for the 5 days starting at the travel date.
Returns temperatures in Celsius, weather conditions, humidity and wind speed in meters per second."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: WeatherToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let api_key = Arc::clone(&self.api_key);
        async move {
            let travel_date = input.travel_date.to_naive_date()?;
            get_forecast(&client, &api_key, &input.destination, travel_date)
                .await
        }
    }
}

async fn get_forecast(
    client: &Client,
    api_key: &str,
    destination: &str,
    travel_date: NaiveDate,
) -> ToolResult {
    let url = make_url(
        GEOCODING_URL,
        [("q", destination), ("limit", "1"), ("appid", api_key)],
    )?;
    let reply = fetch_json::<GeocodingReply>(client, url)
        .await
        .map_err(api_error)?;
    let location = match reply {
        GeocodingReply::Locations(locations) => locations.into_iter().next(),
        GeocodingReply::Failure(failure) => {
            return Err(api_error(failure.message));
        }
    };
    let Some(location) = location else {
        return Err(ToolError::not_found()
            .with_reason(format!(
                "Location '{destination}' not found, assume the weather is \
                 based on your knowledge about the location."
            ))
            .with_guidance(NOT_FOUND_GUIDANCE));
    };

    let url = make_url(
        FORECAST_URL,
        [
            ("lat", location.lat.to_string()),
            ("lon", location.lon.to_string()),
            ("appid", api_key.to_owned()),
            ("units", "metric".to_owned()),
        ],
    )?;
    let response: ForecastResponse =
        fetch_json(client, url).await.map_err(api_error)?;
    if response.list.is_empty() {
        if let Some(message) = response.message.as_str() {
            return Err(api_error(message));
        }
    }

    let timezone = response.city.map(|city| city.timezone).unwrap_or_default();
    let forecasts = select_forecasts(&response.list, timezone, travel_date);
    debug!(
        "{} of {} forecasts fall on the trip to {}",
        forecasts.len(),
        response.list.len(),
        location.name
    );

    let no_forecasts = forecasts.is_empty();
    let mut result = serde_json::json!({
        "destination": destination,
        "forecasts": forecasts,
        "city_info": {
            "name": location.name,
            "country": location.country,
            "coordinates": { "lat": location.lat, "lon": location.lon },
        },
    });
    if no_forecasts {
        result["note"] = NO_FORECAST_NOTE.into();
    }
    Ok(result)
}

fn api_error(err: impl std::fmt::Display) -> ToolError {
    ToolError::execution_error()
        .with_reason(format!("Weather API error: {err}"))
        .with_guidance(NOT_FOUND_GUIDANCE)
}

/// Keeps the forecasts whose local date lies within the trip, which starts
/// at `travel_date` and spans [`FORECAST_DAYS`] more days.
fn select_forecasts(
    items: &[ForecastItem],
    timezone: i64,
    travel_date: NaiveDate,
) -> Vec<ForecastEntry> {
    let last_date = travel_date + Duration::days(FORECAST_DAYS);
    items
        .iter()
        .filter_map(|item| {
            let local = DateTime::from_timestamp(item.dt + timezone, 0)?
                .naive_utc();
            let date = local.date();
            if date < travel_date || date > last_date {
                return None;
            }
            Some(ForecastEntry {
                date: date.format("%Y-%m-%d").to_string(),
                time: local.format("%H:%M").to_string(),
                temperature: Temperature {
                    temp: item.main.temp,
                    feels_like: item.main.feels_like,
                    min: item.main.temp_min,
                    max: item.main.temp_max,
                },
                weather: item
                    .weather
                    .first()
                    .map(|condition| condition.description.clone())
                    .unwrap_or_default(),
                humidity: item.main.humidity,
                wind_speed: item.wind.as_ref().map(|wind| wind.speed),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeocodingReply {
    Locations(Vec<GeoLocation>),
    Failure(ApiFailure),
}

#[derive(Debug, Deserialize)]
struct ApiFailure {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GeoLocation {
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastItem>,
    city: Option<ForecastCity>,
    #[serde(default)]
    message: Value,
}

#[derive(Debug, Deserialize)]
struct ForecastCity {
    /// Shift from UTC in seconds.
    #[serde(default)]
    timezone: i64,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    main: MainReadings,
    #[serde(default)]
    weather: Vec<Condition>,
    wind: Option<Wind>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

#[derive(Debug, PartialEq, Serialize)]
struct ForecastEntry {
    date: String,
    time: String,
    temperature: Temperature,
    weather: String,
    humidity: f64,
    wind_speed: Option<f64>,
}

#[derive(Debug, PartialEq, Serialize)]
struct Temperature {
    temp: f64,
    feels_like: f64,
    min: f64,
    max: f64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use travel_assistant_core::tool::ErrorKind;

    use super::*;

    fn timestamp(day: u32, hour: u32) -> i64 {
        NaiveDate::from_ymd_opt(2025, 8, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp()
    }

    fn item(dt: i64, temp: f64, description: &str) -> Value {
        json!({
            "dt": dt,
            "main": {
                "temp": temp,
                "feels_like": temp - 0.5,
                "temp_min": temp - 1.0,
                "temp_max": temp + 1.0,
                "pressure": 1015,
                "humidity": 55
            },
            "weather": [
                {"id": 802, "main": "Clouds", "description": description, "icon": "03d"}
            ],
            "wind": {"speed": 3.6, "deg": 250}
        })
    }

    #[test]
    fn test_select_forecasts() {
        let response: ForecastResponse = serde_json::from_value(json!({
            "cod": "200",
            "message": 0,
            "cnt": 5,
            "list": [
                item(timestamp(19, 21), 18.0, "clear sky"),
                item(timestamp(19, 23), 17.0, "clear sky"),
                item(timestamp(22, 12), 25.0, "scattered clouds"),
                item(timestamp(25, 21), 20.0, "light rain"),
                item(timestamp(25, 22), 19.0, "light rain")
            ],
            "city": {"name": "Paris", "country": "FR", "timezone": 7200}
        }))
        .unwrap();
        let travel_date = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();

        let timezone = response.city.as_ref().unwrap().timezone;
        let forecasts = select_forecasts(&response.list, timezone, travel_date);
        let dates: Vec<_> = forecasts
            .iter()
            .map(|forecast| (forecast.date.as_str(), forecast.time.as_str()))
            .collect();
        assert_eq!(
            dates,
            [
                ("2025-08-20", "01:00"),
                ("2025-08-22", "14:00"),
                ("2025-08-25", "23:00"),
            ]
        );
        assert_eq!(
            forecasts[1],
            ForecastEntry {
                date: "2025-08-22".to_owned(),
                time: "14:00".to_owned(),
                temperature: Temperature {
                    temp: 25.0,
                    feels_like: 24.5,
                    min: 24.0,
                    max: 26.0,
                },
                weather: "scattered clouds".to_owned(),
                humidity: 55.0,
                wind_speed: Some(3.6),
            }
        );
    }

    #[test]
    fn test_forecast_out_of_range() {
        let items: Vec<ForecastItem> =
            serde_json::from_value(json!([item(timestamp(20, 12), 22.0, "")]))
                .unwrap();
        let travel_date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        assert!(select_forecasts(&items, 0, travel_date).is_empty());
    }

    #[test]
    fn test_geocoding_reply() {
        let reply: GeocodingReply = serde_json::from_value(json!([{
            "name": "Paris",
            "local_names": {"fr": "Paris"},
            "lat": 48.8588897,
            "lon": 2.3200410217200766,
            "country": "FR",
            "state": "Ile-de-France"
        }]))
        .unwrap();
        let GeocodingReply::Locations(locations) = reply else {
            panic!("expected locations");
        };
        assert_eq!(locations[0].name, "Paris");
        assert_eq!(locations[0].country, "FR");

        let reply: GeocodingReply = serde_json::from_value(json!({
            "cod": 401,
            "message": "Invalid API key."
        }))
        .unwrap();
        let GeocodingReply::Failure(failure) = reply else {
            panic!("expected a failure");
        };
        assert_eq!(failure.message, "Invalid API key.");
    }

    #[tokio::test]
    async fn test_invalid_travel_date() {
        let tool = WeatherTool::new(Client::new(), "key");
        let input: WeatherToolParameters = serde_json::from_value(json!({
            "destination": "Paris, France",
            "travel_date": {"day": 31, "month": 6, "year": 2025}
        }))
        .unwrap();
        let err = tool.execute(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_parameter_schema_inlines_travel_date() {
        let tool = WeatherTool::new(Client::new(), "key");
        let schema = tool.parameter_schema();
        let travel_date = &schema["properties"]["travel_date"];
        assert_eq!(travel_date["type"], "object");
        assert_eq!(travel_date["properties"]["year"]["minimum"], 2025);
        assert!(schema.get("$defs").is_none());
    }
}
