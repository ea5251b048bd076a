use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    error::ApiError,
    models::{Report, ReportPayload, ReportReceipt},
    AppState,
};

pub async fn create_report(
    State(app_state): State<AppState>,
    payload: Result<Json<ReportPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ReportReceipt>), ApiError> {
    let Json(payload) =
        payload.map_err(|e| ApiError::Validation(format!("Invalid report body: {}", e.body_text())))?;

    let report = app_state.report_intake.submit(payload).await?;
    Ok((StatusCode::CREATED, Json(ReportReceipt { code: report.code })))
}

pub async fn get_report(
    State(app_state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Report>, ApiError> {
    let report = app_state.report_intake.get(&code).await?;
    Ok(Json(report))
}
