//! Aquahealth - health scoring for aquariums, pools, spas and ponds.
//!
//! # Overview
//!
//! Aquahealth combines four independently maintained kinds of records for a
//! single water body (water tests, livestock, maintenance tasks and alerts)
//! into one 0-100 score with a per-component breakdown, a short-term trend,
//! and counts of open alerts and overdue tasks.
//!
//! Missing or malformed data never fails a computation. Each component has a
//! documented fallback, unknown statuses score as neutral, and a data source
//! that cannot be reached is scored as empty. Only when nothing at all can be
//! fetched is the result reported as unavailable.
//!
//! # Modules
//!
//! - [`model`]: Records, results and API response types
//! - [`status`]: Normalization of free-form status strings
//! - [`scoring`]: Component scorers and the trend estimator
//! - [`aggregation`]: Weighted overall score and labels
//! - [`engine`]: Concurrent fetching and result caching
//! - [`data_sources`]: Data provider contract and the hosted backend client
//! - [`storage`]: SQLite data provider
//! - [`clock`]: Injectable evaluation clock
//! - [`config`]: Environment configuration
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod clock;
pub mod config;
pub mod data_sources;
pub mod engine;
pub mod model;
pub mod scoring;
pub mod status;
pub mod storage;
