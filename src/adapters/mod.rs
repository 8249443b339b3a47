//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements         | Connects to                   |
//! |-----------------|--------------------|-------------------------------|
//! | `ble`           | CredentialIntake   | GATT semantics                |
//! | `ble_transport` |                    | GATT helper (Unix socket)     |
//! | `connectivity`  | ConnectivityPort   | TCP reachability probe        |
//! | `device_id`     |                    | Board serial number           |
//! | `file_store`    | CredentialStore    | JSON record on disk           |
//! | `http`          | CredentialIntake   | Captive portal (tiny_http)    |
//! | `log_sink`      | EventSink          | `log` facade                  |
//! | `shell`         | ProcessRunner      | External helper commands      |

pub mod ble;
#[cfg(unix)]
pub mod ble_transport;
pub mod connectivity;
pub mod device_id;
pub mod file_store;
pub mod http;
pub mod log_sink;
mod pages;
pub mod shell;
pub(super) mod utils;
