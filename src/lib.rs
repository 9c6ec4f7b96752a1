pub mod auth;
pub mod calendar;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod files;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod service;
pub mod wal;
