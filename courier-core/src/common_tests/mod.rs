//! Container test suites shared by every guard implementation.
//!
//! Each suite is generic over the container (and so over its guard) and is
//! instantiated from the `tests/` directories of this crate and of the
//! guard crates.

pub mod container_core_tests;
