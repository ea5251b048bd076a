use std::sync::Arc;

use crate::{
    error::ApiError,
    models::{Report, ReportCode, ReportCreate, ReportPayload},
    repositories::ReportRepository,
    utils::{generate_report_code, validate_report_payload},
};

pub type CodeGenerator = Arc<dyn Fn() -> ReportCode + Send + Sync>;

/// Accepts submitted reports and hands out their public codes.
pub struct ReportIntakeService {
    repository: Arc<dyn ReportRepository + Send + Sync>,
    max_attempts: u32,
    generate: CodeGenerator,
}

impl ReportIntakeService {
    pub fn new(repository: Arc<dyn ReportRepository + Send + Sync>, max_attempts: u32) -> Self {
        Self::with_generator(
            repository,
            max_attempts,
            Arc::new(|| generate_report_code(&mut rand::thread_rng())),
        )
    }

    pub fn with_generator(
        repository: Arc<dyn ReportRepository + Send + Sync>,
        max_attempts: u32,
        generate: CodeGenerator,
    ) -> Self {
        Self {
            repository,
            max_attempts: max_attempts.max(1),
            generate,
        }
    }

    /// Validate and store a report under a fresh code. Codes are regenerated on
    /// collision, up to the configured number of attempts.
    pub async fn submit(&self, payload: ReportPayload) -> Result<Report, ApiError> {
        validate_report_payload(&payload)?;

        for attempt in 1..=self.max_attempts {
            let code = (self.generate)();
            if self.repository.code_exists(&code).await? {
                tracing::debug!(code = %code, attempt, "report code collision");
                continue;
            }

            let create = ReportCreate {
                code,
                payload: payload.clone(),
            };
            match self.repository.create(&create).await {
                Ok(report) => {
                    tracing::info!(
                        code = %report.code,
                        evidence = report.evidence_urls.len(),
                        anonymous = report.anonymous,
                        "report accepted"
                    );
                    return Ok(report);
                }
                // Lost a race for the same code between the check and the insert.
                Err(ApiError::Conflict(_)) => {
                    tracing::debug!(code = %create.code, attempt, "report code taken during insert");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(attempts = self.max_attempts, "could not allocate a unique report code");
        Err(ApiError::conflict("Could not allocate a unique report code, please retry"))
    }

    pub async fn get(&self, code: &str) -> Result<Report, ApiError> {
        let code = ReportCode::parse(code)
            .ok_or_else(|| ApiError::validation(format!("Invalid report code '{}'", code)))?;
        self.repository
            .get_by_code(&code)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Report {} not found", code)))
    }
}
