pub mod broadcast;
pub mod client;
pub mod config;
pub mod connections;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod models;
pub mod parser;
pub mod ring;
pub mod sniff;
pub mod state;
pub mod stats;
pub mod viewers;

pub use error::MonitorError;
