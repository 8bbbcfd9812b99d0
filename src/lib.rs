//! Ride dispatch engine library.

pub mod admin;
pub mod config;
pub mod http;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod location;
pub mod matching;
pub mod net;
pub mod notify;
pub mod observability;
pub mod pricing;
pub mod resilience;
pub mod security;
pub mod storage;

pub use config::schema::DispatchConfig;
pub use http::HttpServer;
pub use lifecycle::{Services, Shutdown};
pub use matching::{Dispatcher, MatchOutcome};
