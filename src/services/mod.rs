pub mod evidence_store;
pub mod external;
pub mod location_service;
pub mod media;
pub mod report_intake;
pub mod report_service;
pub mod session_cache;
pub mod storage_service;
pub mod submission_gate;
pub mod upload_coordinator;

pub use evidence_store::{EvidenceStore, SharedEvidenceStore};
pub use location_service::{AddressResolver, LocationConfig, LocationService, PositionProvider};
pub use media::{CaptureConfig, Facing, MediaCapture, MediaDevice, MediaStream, MediaTrack, RecordingHandle, VideoRecording};
pub use report_intake::ReportIntakeService;
pub use report_service::{build_payload, FlowState, PipelineConfig, ReportApi, ReportFlow};
pub use session_cache::{InMemorySessionCache, SessionCache};
pub use storage_service::{EvidenceStorage, LocalEvidenceStorage};
pub use submission_gate::{can_submit, GateStatus, SubmissionGate};
pub use upload_coordinator::{EvidenceUploader, UploadConfig, UploadCoordinator, UploadSummary};
