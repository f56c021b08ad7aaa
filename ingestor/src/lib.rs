//! Sensor reading ingestion and history queries.
//!
//! Readings arrive over MQTT on `sensor/<device>/<metric>` topics, are
//! normalized into [`model::Reading`] records, stored per device in time
//! order and served back through [`history::HistoryService`] and the HTTP
//! routes in [`rest`].

pub mod config;
pub mod db;
pub mod errors;
pub mod history;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod normalize;
pub mod rest;
pub mod store;
pub mod topic;
