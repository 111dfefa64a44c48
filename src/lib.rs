//! ledbridge - LED driver state bridge
//!
//! Receives hello and status messages from LED drivers over MQTT, reconciles
//! them against a persisted device table and relays setup and settings
//! requests back to the right driver.

pub mod config;
pub mod dispatcher;
pub mod paths;
pub mod service;
pub mod state;
pub mod store;
pub mod transport;
