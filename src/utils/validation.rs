use crate::error::ApiError;
use crate::models::{Coordinates, EvidenceKind, ReportPayload};

pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_EVIDENCE_PER_REPORT: usize = 20;

/// Leading-byte signatures per accepted MIME type. MP4 is checked separately
/// because its `ftyp` box starts at offset 4.
const MAGIC_NUMBERS: &[(&str, &[u8])] = &[
    ("image/jpeg", &[0xFF, 0xD8, 0xFF]),
    ("image/png", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
    ("video/webm", &[0x1A, 0x45, 0xDF, 0xA3]),
];

/// Strip parameters and normalise case: `Video/WebM; codecs=vp9` -> `video/webm`.
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

pub fn matches_magic_number(mime: &str, data: &[u8]) -> bool {
    let mime = mime_essence(mime);
    if mime == "video/mp4" {
        return data.len() >= 8 && &data[4..8] == b"ftyp";
    }
    MAGIC_NUMBERS
        .iter()
        .find(|(candidate, _)| *candidate == mime)
        .map(|(_, signature)| data.starts_with(signature))
        .unwrap_or(false)
}

/// Validate an uploaded file against the allow-list, per-kind size ceilings and the
/// magic-number table. Returns the normalised MIME type and the evidence kind.
pub fn validate_upload(
    content_type: &str,
    data: &[u8],
    allowed_types: &[String],
    max_image_bytes: u64,
    max_video_bytes: u64,
) -> Result<(String, EvidenceKind), ApiError> {
    let mime = mime_essence(content_type);

    if !allowed_types.iter().any(|allowed| allowed.eq_ignore_ascii_case(&mime)) {
        return Err(ApiError::Validation(format!(
            "File type '{}' is not allowed. Allowed types: {}",
            mime,
            allowed_types.join(", ")
        )));
    }

    let kind = EvidenceKind::from_mime(&mime)
        .ok_or_else(|| ApiError::Validation(format!("File type '{}' is not evidence", mime)))?;

    if data.is_empty() {
        return Err(ApiError::Validation("File is empty".to_string()));
    }

    let limit = match kind {
        EvidenceKind::Photo => max_image_bytes,
        EvidenceKind::Video => max_video_bytes,
    };
    if data.len() as u64 > limit {
        return Err(ApiError::Validation(format!(
            "File size {} exceeds maximum allowed size of {} bytes",
            data.len(),
            limit
        )));
    }

    if !matches_magic_number(&mime, data) {
        return Err(ApiError::Validation(format!(
            "File content does not match declared type '{}'",
            mime
        )));
    }

    Ok((mime, kind))
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<Coordinates, ApiError> {
    let coords = Coordinates::new(latitude, longitude);
    if !coords.is_valid() {
        return Err(ApiError::Validation(
            "Latitude must be within [-90, 90] and longitude within [-180, 180]".to_string(),
        ));
    }
    Ok(coords)
}

/// Shared by the completion form (client) and the report endpoint (server).
pub fn validate_report_fields(offense_id: &str, description: &str) -> Result<(), String> {
    if offense_id.trim().is_empty() {
        return Err("Offense type is required".to_string());
    }
    if description.trim().is_empty() {
        return Err("Description is required".to_string());
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_CHARS
        ));
    }
    Ok(())
}

pub fn validate_report_payload(payload: &ReportPayload) -> Result<(), ApiError> {
    validate_report_fields(&payload.offense_id, &payload.description).map_err(ApiError::Validation)?;

    if payload.address.trim().is_empty() {
        return Err(ApiError::Validation("Address is required".to_string()));
    }

    if payload.evidence_urls.is_empty() {
        return Err(ApiError::Validation(
            "At least one evidence file is required".to_string(),
        ));
    }

    if payload.evidence_urls.len() > MAX_EVIDENCE_PER_REPORT {
        return Err(ApiError::Validation(format!(
            "At most {} evidence files can be attached",
            MAX_EVIDENCE_PER_REPORT
        )));
    }

    if let Some(bad) = payload
        .evidence_urls
        .iter()
        .find(|url| !(url.starts_with("https://") || url.starts_with("http://")))
    {
        return Err(ApiError::Validation(format!("Invalid evidence URL '{}'", bad)));
    }

    Ok(())
}
