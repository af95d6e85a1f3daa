//! HTTP server for the parking-violation lookup service.
//!
//! Exposed as a library so integration tests can assemble the router with
//! mock pipeline components.

pub mod api;
pub mod metrics;
pub mod state;
