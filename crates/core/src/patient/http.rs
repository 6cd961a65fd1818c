//! HTTP patient directory client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{PatientDirectory, PatientError, PatientInfo, PatientsConfig};

/// Looks patients up with `GET {base_url}/patients/{ref}`.
pub struct HttpPatientDirectory {
    client: Client,
    base_url: String,
}

impl HttpPatientDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PatientError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Build a client from config; `None` when no directory is configured.
    pub fn from_config(config: &PatientsConfig) -> Result<Option<Self>, PatientError> {
        match &config.base_url {
            Some(url) => Self::new(url.clone(), Duration::from_secs(config.timeout_secs)).map(Some),
            None => Ok(None),
        }
    }

    fn patient_url(&self, patient_ref: &str) -> String {
        format!("{}/patients/{}", self.base_url, patient_ref)
    }
}

#[async_trait]
impl PatientDirectory for HttpPatientDirectory {
    async fn resolve(&self, patient_ref: &str) -> Result<PatientInfo, PatientError> {
        let url = self.patient_url(patient_ref);
        debug!("Patient lookup: {}", url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PatientError::NotFound(patient_ref.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PatientError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<PatientInfo>()
            .await
            .map_err(|e| PatientError::ParseError(e.to_string()))
    }
}
