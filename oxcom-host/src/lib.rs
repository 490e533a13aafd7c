//! oxcom host library
//!
//! Configuration, JSON conversion and the late-bound session used by the
//! `oxcom-host` binary, exported for testing.

pub mod config;
pub mod convert;
pub mod session;
