//! Application, task and payment lifecycle engine for a job marketplace.
//!
//! Candidates apply to postings, employers approve the candidacy, candidates report
//! time-tracked tasks, employers approve them and approved work is settled into
//! immutable payment batches. Profiles, postings, notifications and identity live in
//! external collaborators reached through the ports in [`engagement::repository`].

pub mod config;
pub mod engagement;
pub mod error;
pub mod telemetry;
