//! Test suites for the lifecycle orchestrator.

pub(crate) mod support;
