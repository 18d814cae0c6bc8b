//! Core of the `assize` LLM-as-judge evaluator.
//!
//! A run generates one completion per dataset sample, scores it against every
//! guideline with a judge model and aggregates the scores per guideline.
//! [`engine::Orchestrator`] is the entry point.

pub mod completion;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod guideline;
pub mod judge;
pub mod model;
pub mod providers;
pub mod report;
pub mod scale;
pub mod storage;
pub mod summary;
