pub mod report_code;
pub mod validation;

pub use report_code::*;
pub use validation::*;
