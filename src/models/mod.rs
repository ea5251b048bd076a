pub mod evidence;
pub mod location;
pub mod report;

// Re-export commonly used types
pub use evidence::*;
pub use location::*;
pub use report::*;
