//! In-memory patient directory.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::patient::{PatientDirectory, PatientError, PatientInfo};

/// Patient directory backed by a map; unknown references are `NotFound`.
#[derive(Debug, Default)]
pub struct MockPatientDirectory {
    patients: Mutex<HashMap<String, PatientInfo>>,
    lookups: Mutex<Vec<String>>,
}

impl MockPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, patient_ref: &str, display_name: &str) {
        self.patients.lock().unwrap().insert(
            patient_ref.to_string(),
            PatientInfo {
                display_name: display_name.to_string(),
                record_number: patient_ref.to_string(),
            },
        );
    }

    /// References looked up so far.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl PatientDirectory for MockPatientDirectory {
    async fn resolve(&self, patient_ref: &str) -> Result<PatientInfo, PatientError> {
        self.lookups.lock().unwrap().push(patient_ref.to_string());
        self.patients
            .lock()
            .unwrap()
            .get(patient_ref)
            .cloned()
            .ok_or_else(|| PatientError::NotFound(patient_ref.to_string()))
    }
}
