use std::error::Error;
use std::fmt;

use crate::api_connection::connection::ApiConnectionError;

/// Failure taxonomy of the estimation core. Only `InvalidProfileInput` and
/// `EmptyRequest` ever reach a caller of the public entry points; the others are
/// absorbed by the deterministic fallbacks and logged.
#[derive(Debug)]
pub enum EstimationError {
    /// A phrase that no table key, substring or synonym resolves.
    UnresolvedIngredient(String),
    /// Remote output that is not JSON or does not match the expected shape.
    MalformedExternalResponse(String),
    InvalidProfileInput(String),
    /// Nothing to work from, e.g. no dishes or no fridge items.
    EmptyRequest(String),
    /// The configured backend cannot serve this kind of input (e.g. images).
    CapabilityUnavailable(String),
    Api(ApiConnectionError),
}

impl fmt::Display for EstimationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationError::UnresolvedIngredient(phrase) => write!(f, "Unresolved ingredient: {}", phrase),
            EstimationError::MalformedExternalResponse(detail) => {
                write!(f, "Malformed external response: {}", detail)
            }
            EstimationError::InvalidProfileInput(detail) => write!(f, "Invalid profile input: {}", detail),
            EstimationError::EmptyRequest(detail) => write!(f, "Empty request: {}", detail),
            EstimationError::CapabilityUnavailable(detail) => write!(f, "Capability unavailable: {}", detail),
            EstimationError::Api(err) => write!(f, "Text completion failed: {}", err),
        }
    }
}

impl Error for EstimationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EstimationError::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ApiConnectionError> for EstimationError {
    fn from(err: ApiConnectionError) -> Self {
        EstimationError::Api(err)
    }
}
