//! Dispatch handler
//!
//! Handles POST / for both challenge issuance and trace submission.

use attestrace_core::{ConversationTrace, DeploymentTier};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::dispatch::{Route, ATTESTATION_OBJECT_FIELD, KEY_ID_FIELD};
use crate::error::{ApiError, FailureResponse, OUTCOME_SUCCESS};
use crate::state::AppState;

/// Request for a fresh challenge
#[derive(Deserialize, ToSchema)]
pub struct ChallengeRequest {
    /// base64 App Attest key identifier
    #[schema(example = "abc123")]
    pub key_id: String,
}

/// One conversation turn
#[derive(Deserialize, ToSchema)]
pub struct TraceMessage {
    /// "system", "user" or "assistant"
    #[schema(example = "user")]
    pub role: String,
    pub content: String,
}

/// Attested trace submission
#[derive(Deserialize, ToSchema)]
pub struct TraceRequest {
    pub key_id: String,
    /// base64 CBOR App Attest object
    pub attestation_object: String,
    /// Unix seconds
    #[schema(example = 1700000000)]
    pub created: i64,
    #[schema(example = "olmoe-1b-7b")]
    pub model: String,
    pub messages: Vec<TraceMessage>,
    /// Defaults to a random UUID
    pub id: Option<String>,
    /// Defaults to "chat.trace"
    pub object: Option<String>,
    /// Defaults to `model`
    pub system_fingerprint: Option<String>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub choices: Option<Vec<Value>>,
    #[schema(value_type = Option<Object>)]
    pub usage: Option<Value>,
}

/// Either operation; the presence of `attestation_object` selects it
#[derive(Deserialize, ToSchema)]
#[serde(untagged)]
pub enum DispatchRequest {
    SubmitTrace(TraceRequest),
    IssueChallenge(ChallengeRequest),
}

#[derive(Serialize, ToSchema)]
pub struct ChallengeResponse {
    #[schema(example = "success")]
    pub outcome: String,
    /// base64 challenge to attest the key against
    #[schema(example = "VOPwwDSqrE43n87c9vfxB1QVDL1JOuB8e7tjt70lYJ4=")]
    pub challenge: String,
}

#[derive(Serialize, ToSchema)]
pub struct TraceResponse {
    #[schema(example = "success")]
    pub outcome: String,
    /// Public URL of the rendered share page
    pub url: String,
}

/// Success body of either operation
#[derive(Serialize, ToSchema)]
#[serde(untagged)]
pub enum DispatchResponse {
    Challenge(ChallengeResponse),
    Trace(TraceResponse),
}

/// Issue a challenge or submit an attested trace
///
/// A body without `attestation_object` requests a challenge for `key_id`.
/// A body with it is a trace submission: the attestation is verified
/// (skipped in the test tier), then the trace is written as JSON and as a
/// rendered share page, and the page URL is returned.
#[utoipa::path(
    post,
    path = "/",
    tag = "Dispatch",
    request_body = DispatchRequest,
    responses(
        (status = 200, description = "Challenge issued or trace stored", body = DispatchResponse),
        (status = 400, description = "Invalid request body, key_id or trace", body = FailureResponse),
        (status = 403, description = "Attestation verification failed", body = FailureResponse),
        (status = 413, description = "Request exceeds the size ceiling", body = FailureResponse),
        (status = 500, description = "Challenge generation or internal failure", body = FailureResponse),
        (status = 503, description = "Blob store write failed", body = FailureResponse)
    )
)]
pub async fn dispatch_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let max = state.max_request_size_bytes;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge { max }
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })?;
    if body.len() > max {
        return Err(ApiError::PayloadTooLarge { max });
    }

    let request: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Body is not valid JSON: {}", e)))?;
    let Value::Object(fields) = request else {
        return Err(ApiError::bad_request("Body is not a JSON object"));
    };

    let response = match Route::for_body(&fields) {
        Route::IssueChallenge => DispatchResponse::Challenge(issue_challenge(&state, &fields)?),
        Route::SubmitTrace => DispatchResponse::Trace(submit_trace(&state, fields).await?),
    };
    Ok(Json(response))
}

fn issue_challenge(
    state: &AppState,
    fields: &Map<String, Value>,
) -> Result<ChallengeResponse, ApiError> {
    let key_id = match fields.get(KEY_ID_FIELD) {
        Some(Value::String(key_id)) if !key_id.is_empty() => key_id,
        _ => return Err(ApiError::InvalidKeyId),
    };

    let challenge = state.challenges.generate_challenge(key_id)?;
    tracing::info!(key_id_len = key_id.len(), "Challenge issued");

    Ok(ChallengeResponse {
        outcome: OUTCOME_SUCCESS.to_string(),
        challenge: challenge.as_base64(),
    })
}

async fn submit_trace(
    state: &AppState,
    mut fields: Map<String, Value>,
) -> Result<TraceResponse, ApiError> {
    let key_id = fields.remove(KEY_ID_FIELD);
    let attestation = fields.remove(ATTESTATION_OBJECT_FIELD);

    if state.tier() == DeploymentTier::Test {
        tracing::debug!("Test tier, attestation verification skipped");
    } else {
        let (Some(Value::String(key_id)), Some(Value::String(attestation))) =
            (&key_id, &attestation)
        else {
            return Err(ApiError::malformed_attestation(
                "key_id and attestation_object must both be strings",
            ));
        };
        state.verifier.verify_at(key_id, attestation, Utc::now())?;
    }

    let trace = ConversationTrace::from_value(Value::Object(fields))?;
    let json = trace.to_json()?;
    let html = state.template.render(&json);

    let log_key = trace.log_key(&state.log_prefix);
    let share_key = trace.share_key(&state.share_prefix);

    state
        .store
        .put(&log_key, json.into_bytes(), "application/json")
        .await?;
    state
        .store
        .put(&share_key, html.into_bytes(), "text/html")
        .await?;

    tracing::info!(
        id = %trace.id,
        system_fingerprint = %trace.system_fingerprint,
        messages = trace.messages.len(),
        "Trace stored"
    );

    Ok(TraceResponse {
        outcome: OUTCOME_SUCCESS.to_string(),
        url: state.store.public_url(&share_key),
    })
}
