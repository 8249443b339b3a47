//! Framekeeper: first-boot Wi-Fi provisioning daemon for networked
//! picture frames.
//!
//! Exposes every module so the integration tests and the fuzz targets can
//! drive the core and the adapters directly.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod fsm;
pub mod scheduler;
