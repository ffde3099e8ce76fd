//! HTTP request handlers

pub mod dispatch;
pub mod health;

pub use crate::state::AppState;
pub use dispatch::{
    dispatch_handler, ChallengeRequest, ChallengeResponse, DispatchRequest, DispatchResponse,
    TraceMessage, TraceRequest, TraceResponse,
};
pub use health::{health, HealthResponse};
