//! Shared plumbing for the serialmod command line tools.

pub mod common;
