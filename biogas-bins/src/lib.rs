//! Shared code for the biogas binaries

pub mod common;
