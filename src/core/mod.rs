pub mod api;
pub mod batch;
pub mod config;
pub mod error_log;
pub mod models;
pub mod view;
