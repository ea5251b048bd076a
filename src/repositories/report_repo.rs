use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Report, ReportCode, ReportCreate, ReportStatus},
};

#[async_trait]
pub trait ReportRepository {
    /// Insert a report. Fails with a conflict when the code is already taken.
    async fn create(&self, report: &ReportCreate) -> Result<Report, ApiError>;
    async fn get_by_code(&self, code: &ReportCode) -> Result<Option<Report>, ApiError>;
    async fn code_exists(&self, code: &ReportCode) -> Result<bool, ApiError>;
    async fn count(&self) -> Result<usize, ApiError>;
}

/// Process-local report store keyed by public code.
#[derive(Default)]
pub struct InMemoryReportRepository {
    reports: RwLock<HashMap<ReportCode, Report>>,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn create(&self, report: &ReportCreate) -> Result<Report, ApiError> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.code) {
            return Err(ApiError::Conflict(format!(
                "Report code {} is already in use",
                report.code
            )));
        }

        let payload = &report.payload;
        let stored = Report {
            id: Uuid::new_v4(),
            code: report.code.clone(),
            offense_id: payload.offense_id.clone(),
            description: payload.description.clone(),
            address: payload.address.clone(),
            anonymous: payload.anonymous,
            evidence_urls: payload.evidence_urls.clone(),
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        };
        reports.insert(stored.code.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_by_code(&self, code: &ReportCode) -> Result<Option<Report>, ApiError> {
        Ok(self.reports.read().await.get(code).cloned())
    }

    async fn code_exists(&self, code: &ReportCode) -> Result<bool, ApiError> {
        Ok(self.reports.read().await.contains_key(code))
    }

    async fn count(&self) -> Result<usize, ApiError> {
        Ok(self.reports.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportPayload;

    fn create(code: &str) -> ReportCreate {
        ReportCreate {
            code: ReportCode::parse(code).unwrap(),
            payload: ReportPayload {
                offense_id: "speeding".to_string(),
                description: "Way over the limit".to_string(),
                address: "Jl. Diponegoro".to_string(),
                anonymous: false,
                evidence_urls: vec!["https://cdn/1.jpg".to_string()],
            },
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let repo = InMemoryReportRepository::new();
        let report = repo.create(&create("ABCD-0001")).await.unwrap();

        assert_eq!(report.status, ReportStatus::Pending);
        let fetched = repo.get_by_code(&report.code).await.unwrap().unwrap();
        assert_eq!(fetched, report);
        assert!(repo.code_exists(&report.code).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_code_conflicts() {
        let repo = InMemoryReportRepository::new();
        repo.create(&create("ABCD-0001")).await.unwrap();

        let result = repo.create(&create("ABCD-0001")).await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
