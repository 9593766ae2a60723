//! Non-blocking client for slow text/vision completion backends.
//!
//! The render loop runs at frame rate while the model answers in
//! seconds. The client bridges the two: one background call at a time,
//! paced by a throttle interval, with the latest completed answer
//! available to every frame without waiting.

use thiserror::Error;

pub mod client;
pub mod request;

pub use client::InferenceClient;
pub use request::{InferenceRequest, ResponseCallback};

/// Inference failures. Recorded on the client state and surfaced only
/// through [`InferenceClient::last_error`], never thrown into the
/// per-frame call path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// The endpoint configuration could not be turned into a client.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// The backend call failed: timeout, refused connection, or a
    /// malformed response.
    #[error("backend call failed: {0}")]
    Backend(String),
}
