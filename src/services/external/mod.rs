pub mod geocoding;
pub mod report_client;
pub mod upload_client;

pub use geocoding::{GeocodeApiClient, NominatimGeocoder};
pub use report_client::HttpReportClient;
pub use upload_client::HttpEvidenceUploader;
