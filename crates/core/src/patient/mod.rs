//! Patient directory collaborator.
//!
//! Resolves an opaque patient reference to the name shown on displays and
//! spoken in announcements. Lookups are read-only and never block a queue
//! transition.

mod http;

pub use http::HttpPatientDirectory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from patient lookups.
#[derive(Debug, Error)]
pub enum PatientError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Unknown patient reference.
    #[error("patient not found: {0}")]
    NotFound(String),

    /// Directory returned an error status.
    #[error("directory error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("failed to parse response: {0}")]
    ParseError(String),
}

/// What the directory knows about a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientInfo {
    pub display_name: String,
    /// Medical record number.
    pub record_number: String,
}

/// Patient directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientsConfig {
    /// Base URL of the directory service. Without it, announcements carry no name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    5
}

impl Default for PatientsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Trait for patient lookup backends.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// Resolve a patient reference.
    async fn resolve(&self, patient_ref: &str) -> Result<PatientInfo, PatientError>;
}
