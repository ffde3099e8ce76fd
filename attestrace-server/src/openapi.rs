//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 document served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::error::FailureResponse;
use crate::handlers::{
    ChallengeRequest, ChallengeResponse, DispatchRequest, DispatchResponse, HealthResponse,
    TraceMessage, TraceRequest, TraceResponse,
};

/// Attestrace API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attestrace API",
        version = "0.1.0",
        description = r#"
## Attested Conversation Traces

Attestrace accepts chat transcripts from iOS apps whose keys are attested by
Apple App Attest, stores them, and publishes a shareable page for each one.

### How It Works

1. `POST /` with `{"key_id": ...}` returns a challenge derived from the key id
2. The app attests its key against that challenge with App Attest
3. `POST /` with the trace plus `key_id` and `attestation_object` verifies
   the attestation, stores the trace JSON and returns the share page URL

Every response carries `outcome`: `"success"` or `"failure"`.
"#,
        license(
            name = "MIT OR Apache-2.0",
            url = "https://github.com/attestrace/attestrace/blob/main/LICENSE"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Dispatch", description = "Challenge issuance and attested trace submission"),
        (name = "Health", description = "Service health endpoint")
    ),
    paths(
        crate::handlers::dispatch::dispatch_handler,
        crate::handlers::health::health,
    ),
    components(
        schemas(
            DispatchRequest,
            DispatchResponse,
            ChallengeRequest,
            ChallengeResponse,
            TraceRequest,
            TraceMessage,
            TraceResponse,
            FailureResponse,
            HealthResponse,
        )
    )
)]
pub struct ApiDoc;
