// Common test utilities

#[allow(dead_code)]
pub mod fake_shell;
#[allow(dead_code)]
pub mod harness;
