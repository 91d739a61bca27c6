//! # session-guard-api
//!
//! Shared wire types for the session-guard service.
//! Kept free of server dependencies so clients (including WASM frontends)
//! can reuse the exact request and response shapes.
//!
//! ## Example
//!
//! ```rust
//! use session_guard_api::LoginRequest;
//!
//! let request = LoginRequest {
//!     email: "user@example.com".to_string(),
//!     password: "password123".to_string(),
//! };
//! ```

pub mod error;
pub mod requests;
pub mod responses;

// Re-exports for convenient access
pub use error::ErrorResponse;
pub use requests::*;
pub use responses::*;
