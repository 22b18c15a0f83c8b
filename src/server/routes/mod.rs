//! HTTP routes, grouped by the resource they operate on (§6).

pub mod executions;
pub mod health;
pub mod languages;
pub mod sessions;
