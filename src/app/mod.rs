//! Application core: provisioning logic behind port traits.
//!
//! The mode machine, the submit/apply split, reset and the display
//! watchdog live in [`service`].  Everything that touches the outside
//! world (disk, processes, sockets) goes through the traits in [`ports`],
//! so the core is testable with in-memory mocks.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
