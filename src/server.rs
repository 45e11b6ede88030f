//! The flag service: one boolean behind `/subscribe`.
//!
//! The flag lives in a [`FlagState`] handed to the router, so every router
//! built from a fresh state starts from `false` independently of any other.

use std::env;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, DefaultBodyLimit, Form, FromRequest, Request, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{debug, error, info};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use crate::flag::{ErrorBody, SubscribeRequest, SubscriptionFlag};
use crate::SubscriptionError;

pub const PORT_ENV: &str = "FLAG_SERVICE_PORT";
pub const DEFAULT_PORT: u16 = 3001;
const DEFAULT_HOST: &str = "0.0.0.0";
const MAX_BODY_BYTES: usize = 100 * 1024;
const INTERNAL_ERROR_MESSAGE: &str = "서버 오류";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::MalformedPayload(rejection.body_text())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            AppError::InternalError(detail) => {
                error!("Failed to handle /subscribe: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE.to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Process-wide subscription flag. Clones share the same flag.
#[derive(Clone, Default)]
pub struct FlagState {
    pub(crate) flag: Arc<Mutex<bool>>,
}

impl FlagState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(is_subscribed: bool) -> Self {
        Self {
            flag: Arc::new(Mutex::new(is_subscribed)),
        }
    }

    pub fn current(&self) -> Result<bool, AppError> {
        Ok(*self.lock()?)
    }

    pub fn toggle(&self) -> Result<bool, AppError> {
        let mut flag = self.lock()?;
        *flag = !*flag;
        debug!("Subscription flag toggled to {}", *flag);
        Ok(*flag)
    }

    pub fn set(&self, is_subscribed: bool) -> Result<bool, AppError> {
        let mut flag = self.lock()?;
        *flag = is_subscribed;
        debug!("Subscription flag set to {}", *flag);
        Ok(*flag)
    }

    // The guard is never held across an await, so the mutex only ever
    // serializes the flip itself.
    fn lock(&self) -> Result<MutexGuard<'_, bool>, AppError> {
        self.flag
            .lock()
            .map_err(|_| AppError::InternalError("subscription flag lock poisoned".to_string()))
    }
}

/// What a `POST /subscribe` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Toggle,
    Set(bool),
}

impl From<SubscribeRequest> for Intent {
    fn from(request: SubscribeRequest) -> Self {
        match request.subscribe {
            Some(subscribe) => Intent::Set(subscribe),
            None => Intent::Toggle,
        }
    }
}

impl<S> FromRequest<S> for Intent
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type_header = req.headers().get(CONTENT_TYPE).cloned();
        let content_type = content_type_header
            .as_ref()
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();

        // Bounded by the router's DefaultBodyLimit.
        let bytes = Bytes::from_request(req, state).await?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Intent::Toggle);
        }

        if content_type.starts_with("application/json") {
            let request: SubscribeRequest = serde_json::from_slice(&bytes)
                .map_err(|e| AppError::MalformedPayload(e.to_string()))?;
            return Ok(request.into());
        }

        if let Some(content_type_header) = content_type_header
            .filter(|_| content_type.starts_with("application/x-www-form-urlencoded"))
        {
            let mut req = Request::new(Body::from(bytes));
            *req.method_mut() = Method::POST;
            req.headers_mut().insert(CONTENT_TYPE, content_type_header);
            let Form(request) = Form::<SubscribeRequest>::from_request(req, state)
                .await
                .map_err(|e| AppError::MalformedPayload(e.body_text()))?;
            return Ok(request.into());
        }

        // Any other body is accepted and ignored.
        Ok(Intent::Toggle)
    }
}

async fn get_subscribe(State(state): State<FlagState>) -> Result<Json<SubscriptionFlag>, AppError> {
    let is_subscribed = state.current()?;
    Ok(Json(SubscriptionFlag { is_subscribed }))
}

async fn post_subscribe(
    State(state): State<FlagState>,
    intent: Intent,
) -> Result<Json<SubscriptionFlag>, AppError> {
    let is_subscribed = match intent {
        Intent::Toggle => state.toggle()?,
        Intent::Set(subscribe) => state.set(subscribe)?,
    };
    Ok(Json(SubscriptionFlag { is_subscribed }))
}

pub fn router(state: FlagState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/subscribe", get(get_subscribe).post(post_subscribe))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Reads the port from `FLAG_SERVICE_PORT`, falling back to 3001 when unset.
    pub fn from_env() -> Result<Self, SubscriptionError> {
        let port = match env::var(PORT_ENV) {
            Ok(value) => value.trim().parse().map_err(|e| {
                SubscriptionError::ConfigError(format!("Invalid {} value {:?}: {}", PORT_ENV, value, e))
            })?,
            Err(_) => {
                info!("{} not set, using default: {}", PORT_ENV, DEFAULT_PORT);
                DEFAULT_PORT
            }
        };

        Ok(Self {
            port,
            ..Self::default()
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serves `state` on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: FlagState, shutdown: F) -> Result<(), SubscriptionError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn start_server(config: ServerConfig) -> Result<(), SubscriptionError> {
    let address = config.address();
    info!("Binding to {}", address);

    let listener = TcpListener::bind(&address).await?;
    info!("서버 ON: http://localhost:{}", config.port);

    serve(listener, FlagState::new(), shutdown_signal()).await?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
