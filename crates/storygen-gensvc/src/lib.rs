//! HTTP client for the external generation service.
//!
//! One POST per stage invocation, with a strict mapping from transport and
//! HTTP failures into the retryable/fatal taxonomy. Deliberately no internal
//! retry loop: the worker's retry policy owns backoff, so attempts are
//! counted in exactly one place.

pub mod client;
pub mod error;
pub mod types;

pub use client::{GenClient, GenClientConfig};
pub use error::{GenError, GenResult};
pub use types::{GenerateRequest, GenerateResponse};
