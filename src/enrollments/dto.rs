use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::EnrollmentRecord;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub event_id: Option<Uuid>,
    #[serde(default)]
    pub invite_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnenrollRequest {
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct EnrolledResponse {
    pub success: bool,
    pub enrollment_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub enrollments: Vec<EnrollmentRecord>,
}
