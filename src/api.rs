//! HTTP transport for one-shot flag checks and event ingestion.
use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};

use crate::context::EvaluationContext;
use crate::events::Event;
use crate::flags::{CheckFlagEnvelope, CheckFlagsEnvelope, FlagCheckResult};
use crate::{Error, Result};

/// Default base URL for flag check API calls.
pub(crate) const DEFAULT_API_URL: &str = "https://api.schematichq.com";
/// Default base URL for event ingestion.
pub(crate) const DEFAULT_EVENTS_URL: &str = "https://c.schematichq.com";
/// Default WebSocket URL for flag bootstrapping.
pub(crate) const DEFAULT_WEBSOCKET_URL: &str = "wss://api.schematichq.com/flags/bootstrap";

const API_KEY_HEADER: &str = "X-Schematic-Api-Key";

pub(crate) struct ApiConfig {
    pub api_url: String,
    pub events_url: String,
    pub api_key: String,
    pub additional_headers: HashMap<String, String>,
}

/// REST transport for the flag check endpoints and the event ingestion endpoint.
pub(crate) struct ApiTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    config: ApiConfig,
    /// `X-Schematic-Api-Key` plus any configured additional headers, prebuilt once.
    api_headers: HeaderMap,
}

impl ApiTransport {
    pub(crate) fn new(config: ApiConfig) -> ApiTransport {
        let mut api_headers = header_map(&config.additional_headers);
        match HeaderValue::from_str(&config.api_key) {
            Ok(value) => {
                api_headers.insert(HeaderName::from_static("x-schematic-api-key"), value);
            }
            Err(_) => {
                log::warn!(target: "schematic", "api_key is not a valid {API_KEY_HEADER} header value");
            }
        }

        ApiTransport {
            client: reqwest::Client::new(),
            config,
            api_headers,
        }
    }

    /// One-shot check of a single flag against `context`.
    pub(crate) async fn check_flag(
        &self,
        flag: &str,
        context: &EvaluationContext,
    ) -> Result<FlagCheckResult> {
        let url = Url::parse(&format!("{}/flags/{}/check", self.config.api_url, flag))
            .map_err(Error::InvalidUrl)?;

        log::debug!(target: "schematic", "checking flag {flag}");
        let response = self
            .client
            .post(url)
            .headers(self.api_headers.clone())
            .json(context)
            .send()
            .await?;
        let response = self.error_for_status(response)?;

        let envelope: CheckFlagEnvelope = response.json().await?;
        Ok(envelope.data)
    }

    /// One-shot check of all flags against `context`.
    pub(crate) async fn check_flags(
        &self,
        context: &EvaluationContext,
    ) -> Result<Vec<FlagCheckResult>> {
        let url = Url::parse(&format!("{}/flags/check", self.config.api_url))
            .map_err(Error::InvalidUrl)?;

        log::debug!(target: "schematic", "checking all flags");
        let response = self
            .client
            .post(url)
            .headers(self.api_headers.clone())
            .json(context)
            .send()
            .await?;
        let response = self.error_for_status(response)?;

        let envelope: CheckFlagsEnvelope = response.json().await?;
        Ok(envelope.data.flags)
    }

    /// Fire one event at the ingestion endpoint. No auth header; the API key is embedded
    /// in the event body.
    pub(crate) async fn post_event(&self, event: &Event) -> Result<()> {
        let url =
            Url::parse(&format!("{}/e", self.config.events_url)).map_err(Error::InvalidUrl)?;

        let response = self
            .client
            .post(url)
            .headers(header_map(&self.config.additional_headers))
            .json(event)
            .send()
            .await?;
        response.error_for_status().map_err(Error::from)?;
        Ok(())
    }

    fn error_for_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        response.error_for_status().map_err(|err| {
            if err.status() == Some(StatusCode::UNAUTHORIZED) {
                log::warn!(target: "schematic", "client is not authorized. Check your API key");
                Error::Unauthorized
            } else {
                log::warn!(target: "schematic", "received non-200 response: {:?}", err);
                Error::from(err)
            }
        })
    }
}

fn header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => {
                log::warn!(target: "schematic", "skipping invalid additional header {name:?}");
            }
        }
    }
    map
}
