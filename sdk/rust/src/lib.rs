//! HTTP client for the ride dispatch API.

pub mod client;

pub use client::{
    AssignedDriver, Assignment, Coordinates, DispatchClient, DriverView, RideOutcome, RideView,
    SdkError,
};
