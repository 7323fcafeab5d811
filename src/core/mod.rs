pub mod alerts;
pub mod config;
pub mod error;
pub mod location;
pub mod model;
pub mod monitor;
pub mod orchestrator;
pub mod platform;
pub mod service;
pub mod tracker;
pub mod transport;
