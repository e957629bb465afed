//! Water-quality monitoring service.
//!
//! Polls a sensor bridge for live water readings, classifies them into a
//! pollution category and keeps a history of saved readings in a store.

pub mod acquisition;
pub mod analysis;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod dev_mode;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod manual;
pub mod model;
pub mod notify;
pub mod parameters;
pub mod store;
pub mod verify;
