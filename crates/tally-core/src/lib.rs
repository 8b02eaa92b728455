//! tally-core library.
//!
//! Tracks when a work item first reaches a closed stage, derives a reporting
//! period (year/quarter) from that moment, and rolls items up into
//! per-assignee/project/period KPI rows.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types; domain failures are
//!   raised as [`error::TallyError`] so callers can downcast them.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod drilldown;
pub mod error;
pub mod kpi;
pub mod model;
pub mod rules;
pub mod tracker;

pub use db::store::{Store, WriteMode};
