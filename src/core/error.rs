//! Error types for the dispatch collaborators.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors from acquiring a position fix.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location permission not granted")]
    PermissionDenied,

    #[error("No position fix available")]
    Unavailable,

    #[error("Location lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("Location provider failed: {0}")]
    Provider(String),
}

/// Errors from reverse geocoding.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("No address found for {latitude}, {longitude}")]
    NotFound { latitude: f64, longitude: f64 },

    #[error("Reverse geocoding unavailable")]
    Unavailable,

    #[error("Reverse geocoding timed out after {0:?}")]
    Timeout(Duration),

    #[error("Geocoder failed: {0}")]
    Backend(String),
}

/// Errors from submitting segments to the messaging transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Transport rejected message for {destination}: {reason}")]
    Rejected { destination: String, reason: String },
}

/// Errors from reading the stored contact list.
#[derive(Debug, Error)]
pub enum ContactStoreError {
    #[error("Failed to read contacts: {0}")]
    Io(#[from] io::Error),

    #[error("Contact store error: {0}")]
    Backend(String),
}
