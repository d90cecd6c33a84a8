//! Testability harness utilities.
//!
//! Synthetic array signals and inference engine doubles, shared by unit
//! tests, integration tests and the CLI `simulate` command so the whole
//! pipeline can run without a microphone array or a trained model.

pub mod engines;
pub mod synth;
