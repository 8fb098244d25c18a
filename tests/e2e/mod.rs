//! End-to-end tests for the bridge.
//!
//! Real TCP clients talk to a bridge whose serial side is a mock device,
//! covering command round-trips, keepalive and idle reaping, concurrent
//! clients and device failures.

pub mod concurrency_tests;
pub mod failure_tests;
pub mod keepalive_tests;
pub mod round_trip_tests;
