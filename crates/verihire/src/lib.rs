//! Candidate background verification for recruiters.
//!
//! Documents go through a language-model extraction stage, a combined
//! comparison/fraud/scoring stage, and land in candidate records that the
//! auto-shortlist evaluator watches.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod verification;
