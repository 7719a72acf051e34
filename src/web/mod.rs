//! HTTP API for the dashboard and catalogue management.

pub mod auth;
pub mod chart_titles;
pub mod dashboard;
pub mod error;
pub mod facilities;
pub mod facility_types;
pub mod middleware;
pub mod routes;
pub mod sports;
pub mod status;

pub use routes::*;
