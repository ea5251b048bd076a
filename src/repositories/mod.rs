pub mod report_repo;

pub use report_repo::{InMemoryReportRepository, ReportRepository};
