//! Error types for the interceptor

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use thiserror::Error;

use crate::classify::OPAQUE_PANIC_MESSAGE;
use crate::collector::CollectorError;

/// Raised while building the interceptor; never retried
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Service address cannot be empty")]
    MissingServiceAddress,

    #[error("Sample rate must be between 0.0 and 1.0, got {0}")]
    InvalidSampleRate(f32),

    #[error("Error collector initialization failed: {0}")]
    Initialization(#[source] CollectorError),
}

/// A recovered panic, coerced into an error for the fallback handler.
///
/// Error payloads keep their original value (reachable through
/// [`PanicError::downcast_ref`]); anything else becomes an error whose message
/// is the payload's text.
pub struct PanicError {
    inner: Box<dyn StdError + Send + Sync + 'static>,
}

impl PanicError {
    /// Take ownership of a panic payload
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<io::Error>() {
            Ok(error) => return Self { inner: error },
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<Box<dyn StdError + Send + Sync>>() {
            Ok(error) => return Self { inner: *error },
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<anyhow::Error>() {
            Ok(error) => return Self { inner: (*error).into() },
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<&'static str>() {
            Ok(message) => return Self::message(*message),
            Err(payload) => payload,
        };
        match payload.downcast::<String>() {
            Ok(message) => Self::message(*message),
            Err(_) => Self::message(OPAQUE_PANIC_MESSAGE),
        }
    }

    fn message(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self { inner: message.into() }
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
        self.inner
    }
}

impl fmt::Debug for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicError").field(&self.inner).finish()
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for PanicError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}
