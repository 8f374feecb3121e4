//! Tracker REST API: transport abstraction, endpoint calls, and the error
//! taxonomy shared by both.

pub mod error;
pub mod tracker;
pub mod transport;

// Re-export commonly used types
pub use error::ApiError;
pub use transport::{ApiResponse, HttpTransport, MockTransport, Transport};
