//! OTel Switchboard Workspace - Integration tests for live telemetry destination swapping.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crates:
//!
//! - `otel-switchboard`: the telemetry SDK with live destination swapping
//! - `otel-switchboard-config`: endpoint, credential, and export configuration
