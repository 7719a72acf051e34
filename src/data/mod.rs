//! Domain model, persistence, and the dashboard query pipeline.

pub mod batch;
pub mod catalog;
pub mod dashboard;
pub mod dashboard_cache;
pub mod filter;
mod json;
pub mod memory;
pub mod models;
pub mod pg;
pub mod region;
pub mod store;
