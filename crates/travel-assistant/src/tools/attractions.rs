use std::sync::Arc;

use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use travel_assistant_core::tool::{Error as ToolError, Tool, ToolResult};

use super::{NOT_FOUND_GUIDANCE, fetch_json, make_url, parameter_schema};

const BASE_URL: &str = "https://api.opentripmap.com/0.1/en/places";

const DEFAULT_RADIUS: u32 = 10_000;
const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 20;

/// Attraction categories the tool accepts.
pub const ALLOWED_KINDS: &[&str] = &[
    "restaurants",
    "cafes",
    "pubs",
    "bars",
    "malls",
    "natural",
    "beaches",
    "waterfalls",
    "nature_reserves",
    "volcanoes",
    "caves",
    "mountain_peaks",
    "museums",
    "art_galleries",
    "theatres_and_entertainments",
    "sculptures",
    "gardens_and_parks",
    "aquariums",
    "zoos",
    "castles",
    "historic_districts",
    "monuments",
    "archaeology",
    "pyramids",
    "battlefields",
    "churches",
    "mosques",
    "synagogues",
    "hindu_temples",
    "monasteries",
    "towers",
    "bridges",
    "lighthouses",
    "skyscrapers",
    "palaces",
    "amusement_parks",
    "water_parks",
    "cinemas",
    "nightclubs",
    "view_points",
    "sundials",
    "unclassified_objects",
];

#[derive(Deserialize, JsonSchema)]
pub struct AttractionsToolParameters {
    #[schemars(description = "The destination to search around, e.g. \"Rome, Italy\".")]
    destination: String,
    #[schemars(description = "The category of attractions, one of the allowed kinds.")]
    kind: String,
    #[serde(default = "default_radius")]
    #[schemars(description = "Search radius in meters around the destination.")]
    radius: u32,
    #[serde(default = "default_limit")]
    #[schemars(description = "Maximum number of attractions to return.")]
    limit: u32,
}

fn default_radius() -> u32 {
    DEFAULT_RADIUS
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// A tool for finding attractions around a destination with OpenTripMap.
pub struct AttractionsTool {
    client: Client,
    api_key: Arc<str>,
    description: String,
    parameter_schema: Value,
}

impl AttractionsTool {
    /// Creates a new attractions tool.
    pub fn new<S: Into<String>>(client: Client, api_key: S) -> Self {
        let description = format!(
            r#"
Find local attractions around a destination, like restaurants, museums or beaches.
Returns the name, kinds, a short description and a Wikipedia link of each attraction.
Allowed kinds: {}."#,
            ALLOWED_KINDS.join(", ")
        );
        AttractionsTool {
            client,
            api_key: Arc::from(api_key.into()),
            description,
            parameter_schema: parameter_schema::<AttractionsToolParameters>(),
        }
    }
}

impl Tool for AttractionsTool {
    type Input = AttractionsToolParameters;

    fn name(&self) -> &str {
        "get_local_attractions_opentripmap"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: AttractionsToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let api_key = Arc::clone(&self.api_key);
        async move {
            if !ALLOWED_KINDS.contains(&input.kind.as_str()) {
                return Err(ToolError::invalid_input()
                    .with_reason(format!("Unknown kind '{}'", input.kind))
                    .with_guidance(format!(
                        "Use one of: {}.",
                        ALLOWED_KINDS.join(", ")
                    )));
            }
            find_attractions(&client, &api_key, input).await
        }
    }
}

async fn find_attractions(
    client: &Client,
    api_key: &str,
    input: AttractionsToolParameters,
) -> ToolResult {
    let url = make_url(
        &format!("{BASE_URL}/geoname"),
        [("name", input.destination.as_str()), ("apikey", api_key)],
    )?;
    let geoname: Geoname = fetch_json(client, url).await.map_err(api_error)?;
    let Some((lat, lon)) = geoname.coordinates() else {
        return Err(ToolError::not_found()
            .with_reason(format!("Destination '{}' not found.", input.destination))
            .with_guidance(NOT_FOUND_GUIDANCE));
    };

    let limit = input.limit.clamp(1, MAX_LIMIT);
    let url = make_url(
        &format!("{BASE_URL}/radius"),
        [
            ("kinds", input.kind),
            ("radius", input.radius.to_string()),
            ("lon", lon.to_string()),
            ("lat", lat.to_string()),
            ("limit", limit.to_string()),
            ("rate", "3".to_owned()),
            ("format", "json".to_owned()),
            ("apikey", api_key.to_owned()),
        ],
    )?;
    let places: Vec<Place> = fetch_json(client, url).await.map_err(api_error)?;
    debug!("found {} places around {lat},{lon}", places.len());

    let mut attractions = Vec::with_capacity(places.len());
    for xid in places.iter().filter_map(|place| place.xid.as_deref()) {
        let url =
            make_url(&format!("{BASE_URL}/xid/{xid}"), [("apikey", api_key)])?;
        match fetch_json::<PlaceDetail>(client, url).await {
            Ok(detail) => attractions.push(Attraction::from(detail)),
            Err(err) => warn!("failed to fetch details of {xid}: {err}"),
        }
    }
    Ok(json!({ "attractions": attractions }))
}

fn api_error(err: reqwest::Error) -> ToolError {
    ToolError::execution_error()
        .with_reason(format!("Attractions API error: {err}"))
        .with_guidance(NOT_FOUND_GUIDANCE)
}

#[derive(Debug, Deserialize)]
struct Geoname {
    lat: Option<f64>,
    lon: Option<f64>,
}

impl Geoname {
    fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    xid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlaceDetail {
    name: String,
    kinds: String,
    wikipedia: Option<String>,
    wikipedia_extracts: Option<WikipediaExtracts>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WikipediaExtracts {
    text: String,
}

#[derive(Debug, PartialEq, Serialize)]
struct Attraction {
    name: String,
    kind: String,
    description: String,
    url: String,
}

impl From<PlaceDetail> for Attraction {
    fn from(detail: PlaceDetail) -> Self {
        Attraction {
            name: detail.name,
            kind: detail.kinds,
            description: detail
                .wikipedia_extracts
                .map(|extracts| extracts.text)
                .unwrap_or_default(),
            url: detail.wikipedia.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use travel_assistant_core::tool::ErrorKind;

    use super::*;

    #[test]
    fn test_parameter_schema() {
        let tool = AttractionsTool::new(Client::new(), "key");
        let schema = tool.parameter_schema();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("destination"));
        assert!(properties.contains_key("kind"));
        assert!(properties.contains_key("radius"));
        assert!(properties.contains_key("limit"));
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert!(required.contains(&json!("destination")));
        assert!(required.contains(&json!("kind")));
        assert!(tool.description().contains("nature_reserves"));
    }

    #[test]
    fn test_default_arguments() {
        let input: AttractionsToolParameters = serde_json::from_value(
            json!({"destination": "Rome, Italy", "kind": "museums"}),
        )
        .unwrap();
        assert_eq!(input.radius, 10_000);
        assert_eq!(input.limit, 5);
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let tool = AttractionsTool::new(Client::new(), "key");
        let err = tool
            .execute(AttractionsToolParameters {
                destination: "Rome, Italy".to_owned(),
                kind: "spaceports".to_owned(),
                radius: DEFAULT_RADIUS,
                limit: DEFAULT_LIMIT,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.reason(), "Unknown kind 'spaceports'");
        assert!(err.guidance().unwrap().contains("museums"));
    }

    #[test]
    fn test_geoname() {
        let found: Geoname = serde_json::from_value(json!({
            "name": "Rome",
            "country": "IT",
            "lat": 41.89193,
            "lon": 12.51133,
            "population": 2318895,
            "timezone": "Europe/Rome",
            "status": "OK"
        }))
        .unwrap();
        assert_eq!(found.coordinates(), Some((41.89193, 12.51133)));

        let missing: Geoname = serde_json::from_value(
            json!({"error": "Not found", "status": "NOT_FOUND"}),
        )
        .unwrap();
        assert_eq!(missing.coordinates(), None);
    }

    #[test]
    fn test_attraction_from_detail() {
        let detail: PlaceDetail = serde_json::from_value(json!({
            "xid": "W123",
            "name": "Colosseum",
            "kinds": "historic,architecture,amphitheatres",
            "wikipedia": "https://en.wikipedia.org/wiki/Colosseum",
            "wikipedia_extracts": {
                "title": "en:Colosseum",
                "text": "The Colosseum is an elliptical amphitheatre."
            }
        }))
        .unwrap();
        assert_eq!(
            Attraction::from(detail),
            Attraction {
                name: "Colosseum".to_owned(),
                kind: "historic,architecture,amphitheatres".to_owned(),
                description: "The Colosseum is an elliptical amphitheatre."
                    .to_owned(),
                url: "https://en.wikipedia.org/wiki/Colosseum".to_owned(),
            }
        );

        let sparse: PlaceDetail =
            serde_json::from_value(json!({"name": "Fontana"})).unwrap();
        let attraction = Attraction::from(sparse);
        assert_eq!(attraction.name, "Fontana");
        assert!(attraction.description.is_empty());
        assert!(attraction.url.is_empty());
    }
}
