use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use sf_core::ScenarioError;

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointRequest {
    pub method: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl EndpointResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "status": self.status,
            "headers": self.headers,
            "body": self.body,
        })
    }
}

/// Issues one outbound request. The caller owns the deadline.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: EndpointRequest) -> Result<EndpointResponse, ScenarioError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn request_error(error: impl std::fmt::Display) -> ScenarioError {
    ScenarioError::evaluation("ENDPOINT_REQUEST", error.to_string())
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: EndpointRequest) -> Result<EndpointResponse, ScenarioError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                ScenarioError::evaluation(
                    "ENDPOINT_METHOD",
                    format!("Unsupported HTTP method \"{}\".", request.method),
                )
            })?;

        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(request_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let text = response.text().await.map_err(request_error)?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(EndpointResponse {
            status,
            headers,
            body,
        })
    }
}
