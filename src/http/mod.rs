//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request id, trace, timeout, body limit)
//!     → middleware/auth.rs (credential → Caller)
//!     → rides.rs / drivers.rs (JSON in, validated, dispatched)
//!     → websocket.rs (driver channel)
//!     → response.rs (errors → status + JSON body)
//! ```

pub mod drivers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod rides;
pub mod server;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use response::{ApiError, ErrorBody};
pub use server::{AppState, HttpServer};
