pub mod cors;
pub mod logging;
pub mod auth;
pub mod security;
pub mod rate_limit;

pub use cors::*;
pub use logging::*;
pub use auth::*;
pub use security::*;
pub use rate_limit::*;