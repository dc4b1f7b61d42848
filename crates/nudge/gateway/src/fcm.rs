//! FCM legacy HTTP client.

use std::collections::HashMap;
use std::time::Duration;

use color_eyre::eyre::WrapErr as _;
use nudge_core::{Delivery, DeliveryReport};
use serde::{Deserialize, Serialize};

use crate::{PushGateway, WakeupRequest};

const FCM_SEND_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the FCM legacy HTTP send endpoint.
#[derive(Debug, Clone)]
pub struct FcmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl FcmClient {
    /// Create a new client authenticating with the given server API key.
    pub fn new(api_key: impl Into<String>) -> color_eyre::eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build gateway HTTP client")?;

        Ok(Self {
            http,
            endpoint: FCM_SEND_ENDPOINT.to_string(),
            api_key: api_key.into(),
        })
    }

    /// Point the client at a different send endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn send_request(
        &self,
        request: &WakeupRequest,
    ) -> color_eyre::eyre::Result<DeliveryReport> {
        let body = SendBody {
            to: &request.destination,
            priority: request.priority.as_str(),
            data: HashMap::from([(request.data_key, "")]),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", self.api_key),
            )
            .json(&body)
            .send()
            .await
            .wrap_err("gateway request failed")?;

        let status = response.status();
        if !status.is_success() {
            color_eyre::eyre::bail!("gateway returned status {status}");
        }

        let parsed: SendResponse = response
            .json()
            .await
            .wrap_err("failed to decode gateway response")?;

        Ok(interpret(parsed))
    }
}

impl<C: Send + 'static> PushGateway<C> for FcmClient {
    async fn submit(&self, request: WakeupRequest, context: C) -> Delivery<C> {
        let report = match self.send_request(&request).await {
            Ok(report) => report,
            Err(e) => DeliveryReport::TransportFailure {
                cause: format!("{e:#}"),
            },
        };

        Delivery { context, report }
    }

    async fn shutdown(&self) {
        // reqwest clients release their connections on drop.
        tracing::debug!("gateway client shut down");
    }
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    to: &'a str,
    priority: &'a str,
    data: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    results: Vec<SendResult>,
}

#[derive(Debug, Deserialize)]
struct SendResult {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    registration_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Map a per-message provider result onto a delivery report.
fn interpret(response: SendResponse) -> DeliveryReport {
    let Some(result) = response.results.into_iter().next() else {
        return DeliveryReport::TransportFailure {
            cause: "gateway response carried no result".into(),
        };
    };

    if let Some(error) = result.error {
        return match error.as_str() {
            "NotRegistered" => DeliveryReport::Unregistered,
            "InvalidRegistration" | "MissingRegistration" => DeliveryReport::InvalidToken,
            _ => DeliveryReport::ProviderError { code: error },
        };
    }

    if let Some(new_token) = result.registration_id {
        return DeliveryReport::CanonicalIdRotated { new_token };
    }

    if result.message_id.is_some() {
        return DeliveryReport::Delivered;
    }

    DeliveryReport::TransportFailure {
        cause: "gateway result carried neither an id nor an error".into(),
    }
}
