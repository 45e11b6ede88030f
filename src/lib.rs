// src/lib.rs
use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use thiserror::Error;

pub mod flag;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod widget;
mod server_tests;

use crate::flag::{ErrorBody, SubscribeRequest, SubscriptionFlag};

const BASE_URL: &str = "http://localhost:3001";
const SUBSCRIBE_PATH: &str = "/subscribe";

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: StatusCode, message: String },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// HTTP client for the flag service's `/subscribe` endpoint.
///
/// No call is ever retried: a bodyless `POST` flips the flag, so a retry after
/// a lost response would flip it a second time.
pub struct Client {
    base_url: String,
    http_client: reqwest::Client,
    timeout: Option<Duration>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn debug_info(&self) -> String {
        format!(
            "Client {{ base_url: {}, timeout: {:?} }}",
            self.base_url, self.timeout
        )
    }

    /// Flips the server's flag and returns the new value.
    pub async fn toggle(&self) -> Result<bool, SubscriptionError> {
        let response = self.http_client
            .post(self.subscribe_url())
            .send()
            .await?;

        let is_subscribed = read_flag(response).await?;
        debug!("Toggled subscription flag to {}", is_subscribed);
        Ok(is_subscribed)
    }

    /// Sets the server's flag to `subscribed` and returns the value it now holds.
    pub async fn set(&self, subscribed: bool) -> Result<bool, SubscriptionError> {
        let response = self.http_client
            .post(self.subscribe_url())
            .json(&SubscribeRequest { subscribe: Some(subscribed) })
            .send()
            .await?;

        let is_subscribed = read_flag(response).await?;
        debug!("Set subscription flag to {}", is_subscribed);
        Ok(is_subscribed)
    }

    /// Reads the server's flag without changing it.
    pub async fn status(&self) -> Result<bool, SubscriptionError> {
        let response = self.http_client
            .get(self.subscribe_url())
            .send()
            .await?;

        read_flag(response).await
    }

    fn subscribe_url(&self) -> String {
        format!("{}{}", self.base_url, SUBSCRIBE_PATH)
    }
}

async fn read_flag(response: reqwest::Response) -> Result<bool, SubscriptionError> {
    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("Unexpected status code: {}", status),
        };
        return Err(SubscriptionError::ApiError { status, message });
    }

    let flag = response.json::<SubscriptionFlag>().await?;
    Ok(flag.is_subscribed)
}

pub struct ClientBuilder {
    base_url: String,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            timeout: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Bounds every request. Without one, calls wait for the transport to resolve or fail.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Client, SubscriptionError> {
        let mut headers = HeaderMap::new();
        headers.insert("User-Agent", HeaderValue::from_static("Subscription-Flag-Rust"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let mut http_client = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            http_client = http_client.timeout(timeout);
        }

        Ok(Client {
            base_url: self.base_url,
            http_client: http_client.build()?,
            timeout: self.timeout,
        })
    }
}
