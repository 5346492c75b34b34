//! Integration test suite for maestro.
//!
//! These tests drive the public API end to end: workflow parsing,
//! batch resolution, concurrent dispatch and the HTTP control surface.
//!
//! # Test Categories
//!
//! - `engine_e2e`: Full workflow execution against scripted agents
//! - `resolver_properties`: Batch invariants over generated graphs
//! - `api`: Control API through the axum router
//! - `http_agent`: Worker protocol against a real local HTTP worker
//!
//! # CI Compatibility
//!
//! Agents are in-process or bound to 127.0.0.1; nothing leaves the machine.

mod fixtures;

mod api;
mod resolver_properties;
