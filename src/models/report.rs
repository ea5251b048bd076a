use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::utils::is_valid_report_code;

/// Free-text fields filled in on the completion form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportForm {
    pub offense_id: String,
    pub description: String,
    #[serde(default)]
    pub anonymous: bool,
}

/// Body of the report-submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub offense_id: String,
    pub description: String,
    pub address: String,
    #[serde(default)]
    pub anonymous: bool,
    pub evidence_urls: Vec<String>,
}

/// Public reference handed back to the reporter, e.g. `QWER-4821`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportCode(String);

impl ReportCode {
    pub fn parse(code: &str) -> Option<Self> {
        if is_valid_report_code(code) {
            Some(Self(code.to_string()))
        } else {
            None
        }
    }

    /// Callers must only pass strings produced by the code generator.
    pub(crate) fn from_generated(code: String) -> Self {
        debug_assert!(is_valid_report_code(&code));
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ReportCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_report_code(&value) {
            Ok(Self(value))
        } else {
            Err(format!("invalid report code '{}'", value))
        }
    }
}

impl From<ReportCode> for String {
    fn from(code: ReportCode) -> Self {
        code.0
    }
}

impl fmt::Display for ReportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intake only ever files reports as pending; review happens elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
}

/// Stored report as seen by moderators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub code: ReportCode,
    pub offense_id: String,
    pub description: String,
    pub address: String,
    pub anonymous: bool,
    pub evidence_urls: Vec<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReportCreate {
    pub code: ReportCode,
    pub payload: ReportPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportReceipt {
    pub code: ReportCode,
}
