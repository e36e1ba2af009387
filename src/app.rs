use crate::catalog::{Catalog, Language};
use crate::config::FormsConfig;
use crate::error::SubmissionError;
use crate::limiter::RateLimiter;
use crate::mail::{confirm_url, confirmation_message, contact_message};
use crate::notify::{build_sink, dispatch, NotificationSink};
use crate::submission::{FormKind, FormSubmission, MAX_BODY_BYTES};
use crate::subscription::{NotifyingStore, SubscriptionStore};
use crate::validator::validate;
use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const CLIENT_IP_HEADERS: [&str; 2] = ["x-forwarded-for", "x-nf-client-connection-ip"];
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FormsConfig>,
    pub contact_limiter: Arc<RateLimiter>,
    pub newsletter_limiter: Arc<RateLimiter>,
    pub sink: Arc<dyn NotificationSink>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    /// Fresh limiters, the built-in catalog, and a subscription store that
    /// notifies staff through `sink`.
    pub fn new(config: FormsConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let subscriptions: Arc<dyn SubscriptionStore> = Arc::new(NotifyingStore::new(
            sink.clone(),
            config.email_from.clone(),
            config.email_to.clone(),
            config.dispatch_timeout,
        ));
        Self {
            contact_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            newsletter_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            config: Arc::new(config),
            sink,
            subscriptions,
            catalog: Arc::new(Catalog::builtin()),
        }
    }

    pub fn with_subscriptions(mut self, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    fn limiter(&self, kind: FormKind) -> &RateLimiter {
        match kind {
            FormKind::Contact => self.contact_limiter.as_ref(),
            FormKind::Newsletter => self.newsletter_limiter.as_ref(),
        }
    }
}

pub async fn run_server(config: FormsConfig) -> Result<()> {
    let addr = config.bind_addr;
    let sink = build_sink(&config.transport);
    info!(
        "Mail transport: {}, limit {} submissions per {}s",
        config.transport.name(),
        config.rate_limit.max_submissions,
        config.rate_limit.window_secs
    );

    let app = build_router(AppState::new(config, sink));

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/contact", any(handle_contact))
        .route("/.netlify/functions/contact", any(handle_contact))
        .route("/api/newsletter", any(handle_newsletter))
        .route("/.netlify/functions/newsletter", any(handle_newsletter))
        .route("/api/newsletter/confirm", get(confirm_newsletter))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_contact(State(state): State<AppState>, request: Request) -> Response {
    respond(FormKind::Contact, accept(&state, FormKind::Contact, request).await)
}

async fn handle_newsletter(State(state): State<AppState>, request: Request) -> Response {
    respond(
        FormKind::Newsletter,
        accept(&state, FormKind::Newsletter, request).await,
    )
}

fn respond(kind: FormKind, outcome: Result<(), SubmissionError>) -> Response {
    match outcome {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": kind.success_message() })),
        )
            .into_response(),
        Err(err) => err.into_response_for(kind),
    }
}

async fn accept(state: &AppState, kind: FormKind, request: Request) -> Result<(), SubmissionError> {
    if request.method() != Method::POST {
        return Err(SubmissionError::MethodNotAllowed);
    }

    let identity = client_identity(request.headers());
    if !state.limiter(kind).admit(&identity, Utc::now()).await {
        warn!("Rate limit exceeded for {} on {} form", identity, kind.name());
        return Err(SubmissionError::RateLimited);
    }

    let language = Language::from_referer(referer(request.headers()));
    let submission = match FormSubmission::from_request(request).await {
        Ok(submission) => submission,
        Err(SubmissionError::PayloadTooLarge) => {
            warn!("Rejecting {} submission from {}: body too large", kind.name(), identity);
            return Err(SubmissionError::PayloadTooLarge);
        }
        Err(e) => return Err(e),
    };

    let result = validate(kind, &submission);
    if !result.is_valid() {
        info!(
            form = kind.name(),
            errors = result.errors().len(),
            "Rejected submission from {}",
            identity
        );
        return Err(SubmissionError::ValidationFailed(result.into_errors()));
    }

    match kind {
        FormKind::Contact => send_contact(state, &submission).await,
        FormKind::Newsletter => subscribe(state, &submission, language).await,
    }
}

async fn send_contact(state: &AppState, submission: &FormSubmission) -> Result<(), SubmissionError> {
    let config = &state.config;
    let message = contact_message(&config.email_from, &config.email_to, submission);
    let receipt = dispatch(state.sink.as_ref(), &message, config.dispatch_timeout).await?;
    info!(
        transport = receipt.transport,
        message_id = ?receipt.message_id,
        "Contact message delivered"
    );
    Ok(())
}

async fn subscribe(
    state: &AppState,
    submission: &FormSubmission,
    language: Language,
) -> Result<(), SubmissionError> {
    let config = &state.config;
    let email = submission.get("email").unwrap_or_default().trim();

    let token = config.token.issue(email, Utc::now())?;
    let url = confirm_url(&config.site_url, &token);
    let message = confirmation_message(
        &config.email_from,
        email,
        state.catalog.bundle(language),
        &url,
    );
    let receipt = dispatch(state.sink.as_ref(), &message, config.dispatch_timeout).await?;
    info!(
        transport = receipt.transport,
        message_id = ?receipt.message_id,
        language = language.code(),
        "Newsletter confirmation delivered"
    );

    state.subscriptions.record(email, language).await?;
    Ok(())
}

#[derive(Deserialize)]
struct ConfirmQuery {
    #[serde(default)]
    token: String,
}

async fn confirm_newsletter(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Response {
    match state.config.token.verify(&query.token, Utc::now()) {
        Ok(email) => {
            info!("Newsletter confirmation for {}", email);
            (StatusCode::OK, Json(json!({ "success": true, "email": email }))).into_response()
        }
        Err(e) => {
            warn!("Rejected newsletter confirmation token: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid or expired confirmation token" })),
            )
                .into_response()
        }
    }
}

/// First hop of the forwarded-for chain, then the platform header, then a
/// shared `unknown` bucket.
pub fn client_identity(headers: &HeaderMap) -> String {
    CLIENT_IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim())
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn referer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::REFERER)
        .or_else(|| headers.get("referrer"))
        .and_then(|v| v.to_str().ok())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
