//! A model provider for the Gemini API.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};
use travel_assistant_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};

pub use config::{GeminiConfig, GeminiConfigBuilder};
use io::{Chunks, Sse};
pub use response::GeminiResponse;

/// Error type for [`GeminiProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Gemini model provider.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given configuration.
    #[inline]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for GeminiProvider {
    type Error = Error;
    type Response = GeminiResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let stream = req.stream;
        let gemini_req = proto::create_request(req);
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        debug!(model = %req.model, stream, "sending gemini request");
        let resp_fut = self
            .client
            .post(self.config.endpoint(&req.model, stream))
            .header("x-goog-api-key", &self.config.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, accept)
            .json(&gemini_req)
            .send();

        async move {
            let resp = match resp_fut.await {
                Ok(resp) => resp,
                Err(err) => {
                    return Err(Error::new(format!("{err}"), ErrorKind::Other));
                }
            };
            let resp = check_status(resp).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let mime = content_type.and_then(|v| v.parse::<Mime>().ok());
            let expected = if stream {
                mime::TEXT_EVENT_STREAM
            } else {
                mime::APPLICATION_JSON
            };
            let is_valid_content_type = mime
                .map(|m| m.essence_str() == expected.essence_str())
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::InvalidResponse,
                ));
            }

            // Here we got a successful response.
            if stream {
                let chunks = Chunks::from_response(resp);
                let sse = Sse::new(chunks);
                return Ok(GeminiResponse::from_sse(sse));
            }
            let body = resp.json().await.map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::InvalidResponse)
            })?;
            Ok(GeminiResponse::from_body(body))
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let kind = error_kind(status);
    // Prefer the message from the error body, it is far more helpful than
    // the status line.
    let message = match resp.text().await {
        Ok(text) => error_message(&text)
            .unwrap_or_else(|| format!("HTTP status {status}")),
        Err(_) => format!("HTTP status {status}"),
    };
    warn!(%status, "gemini request failed: {message}");
    Err(Error::new(message, kind))
}

fn error_kind(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ErrorKind::Unauthorized
        }
        _ => ErrorKind::Other,
    }
}

fn error_message(body: &str) -> Option<String> {
    let body: proto::ErrorBody = serde_json::from_str(body).ok()?;
    Some(body.error.message)
}
