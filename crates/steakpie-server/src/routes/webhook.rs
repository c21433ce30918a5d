use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use steakpie_core::event::{ping_zen, RegistryPackageEvent};
use tracing::{debug, info, warn};

use crate::dispatch::Dispatch;
use crate::error::AppError;
use crate::signature::verify_signature;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

const FORM_ENCODED: &str = "application/x-www-form-urlencoded";

/// POST /version/1: receive a GitHub `registry_package` webhook.
pub async fn receive(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), AppError> {
    if content_type(&headers).is_some_and(|ct| ct.starts_with(FORM_ENCODED)) {
        warn!("rejected form-encoded webhook payload");
        return Err(AppError::form_encoded());
    }

    let Some(signature) = header_str(&headers, SIGNATURE_HEADER) else {
        warn!("webhook without signature header");
        return Err(AppError::forbidden("missing signature"));
    };
    if !verify_signature(&body, signature, &app.secret) {
        warn!("webhook signature mismatch");
        return Err(AppError::forbidden("invalid signature"));
    }

    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("invalid JSON: {e}")))?;

    if let Some(zen) = ping_zen(&value) {
        info!(zen, "received ping");
        return Ok((StatusCode::OK, "pong"));
    }

    let event: RegistryPackageEvent = serde_json::from_value(value)
        .map_err(|e| AppError::bad_request(format!("invalid registry_package payload: {e}")))?;

    let delivery_id = header_str(&headers, DELIVERY_HEADER).filter(|id| !id.is_empty());
    match app.dispatcher.dispatch(&event, delivery_id).await? {
        Dispatch::Started(_) => debug!(package = event.package_name(), "run started"),
        Dispatch::Duplicate | Dispatch::Unconfigured => {}
    }
    Ok((StatusCode::OK, "ok"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}
