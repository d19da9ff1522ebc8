//! HTTP endpoint invocation for the workflow engine.
//!
//! This crate owns the request/response capability the engine drives stages
//! through. The engine resolves every template in a stage first and hands an
//! already-concrete [`ResolvedRequest`] to an [`EndpointInvoker`]; the
//! invoker returns status, body, headers, and the parsed JSON payload when
//! the body is JSON. Tests substitute scripted invokers, production wires in
//! [`HttpEndpointInvoker`].

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method, header};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// RFC3986 unreserved bytes stay as-is in path placeholder values.
const PATH_VALUE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Default timeout applied to every endpoint invocation.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully resolved request, ready to send. All templates have already been
/// expanded by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    /// HTTP method name (`GET`, `POST`, ...), case-insensitive.
    pub method: String,
    /// Absolute request URL including the resolved endpoint path.
    pub url: String,
    /// Header name/value pairs in authoring order.
    pub headers: IndexMap<String, String>,
    /// Query parameter pairs in authoring order.
    pub query: IndexMap<String, String>,
    /// Optional request body.
    pub body: Option<String>,
}

/// Outcome of one endpoint invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
    /// Response headers.
    pub headers: IndexMap<String, String>,
    /// Parsed response body when it is valid JSON.
    pub json: Option<Value>,
    /// The URL the request was actually sent to.
    pub request_url: String,
    /// The method the request was sent with.
    pub method: String,
    /// Echo of the request body, for verbose diagnostics.
    pub request_body: Option<String>,
}

/// Synchronous-in-shape request/response capability the stage executor
/// drives. Implementations may be real HTTP clients or scripted fakes.
#[async_trait]
pub trait EndpointInvoker: Send + Sync {
    /// Sends the request and returns the observed response.
    ///
    /// Transport-level failures (connect errors, timeouts) surface as `Err`;
    /// any received HTTP response, including 4xx/5xx, is an `Ok` result.
    async fn invoke(&self, request: ResolvedRequest) -> Result<InvocationResult>;
}

/// Production invoker backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpEndpointInvoker {
    http: Client,
    user_agent: String,
}

impl HttpEndpointInvoker {
    /// Builds an invoker with default headers and a 30s timeout.
    pub fn new() -> Result<Self> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            user_agent: format!("flowctl/0.1; {}", std::env::consts::OS),
        })
    }
}

#[async_trait]
impl EndpointInvoker for HttpEndpointInvoker {
    async fn invoke(&self, request: ResolvedRequest) -> Result<InvocationResult> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| anyhow!("unsupported HTTP method '{}'", request.method))?;

        debug!(method = %method, url = %request.url, "sending endpoint request");

        let mut builder = self.http.request(method.clone(), &request.url).header(header::USER_AGENT, &self.user_agent);
        if !request.query.is_empty() {
            let pairs: Vec<(&str, &str)> = request.query.iter().map(|(key, value)| (key.as_str(), value.as_str())).collect();
            builder = builder.query(&pairs);
        }

        let mut has_content_type = false;
        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            if !has_content_type {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.with_context(|| format!("request to {} failed", request.url))?;

        let status = response.status().as_u16();
        let request_url = response.url().to_string();
        let mut headers = IndexMap::new();
        for (name, value) in response.headers() {
            headers.insert(name.as_str().to_string(), value.to_str().unwrap_or_default().to_string());
        }

        let body = response.text().await.unwrap_or_default();
        let json = serde_json::from_str::<Value>(&body).ok();

        Ok(InvocationResult {
            status,
            body,
            headers,
            json,
            request_url,
            method: request.method.clone(),
            request_body: request.body,
        })
    }
}

/// Combines a catalog base URL with an optional base path, validating the
/// result parses as an absolute URL.
pub fn combine_base_url(base_url: &str, base_path: Option<&str>) -> Result<String> {
    let mut combined = base_url.trim_end_matches('/').to_string();
    if let Some(path) = base_path {
        let path = path.trim();
        if !path.is_empty() {
            combined.push('/');
            combined.push_str(path.trim_matches('/'));
        }
    }

    Url::parse(&combined).map_err(|error| anyhow!("invalid base URL '{}': {}", combined, error))?;
    Ok(combined)
}

/// Joins a base URL and an endpoint path into a request URL.
pub fn join_endpoint(base_url: &str, endpoint: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

/// Percent-encodes a path placeholder value, preserving unreserved bytes.
pub fn encode_path_value(value: &str) -> String {
    utf8_percent_encode(value, PATH_VALUE_ENCODE_SET).to_string()
}
