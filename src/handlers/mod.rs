pub mod geocode_handlers;
pub mod health_handlers;
pub mod report_handlers;
pub mod upload_handlers;

pub use geocode_handlers::reverse_geocode;
pub use health_handlers::{health_check, health_check_simple, liveness_check, readiness_check};
pub use report_handlers::{create_report, get_report};
pub use upload_handlers::{serve_upload, upload_evidence};
