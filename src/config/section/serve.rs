//! `[dev_server]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [dev_server]
//! enabled = true
//! static_dir = "dist"         # defaults to output_dir
//! interface = "127.0.0.1"     # 0.0.0.0 makes the server reachable from LAN
//! port = 8080
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevServerConfig {
    pub enabled: bool,
    pub static_dir: Option<PathBuf>,
    pub interface: IpAddr,
    pub port: u16,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            static_dir: None,
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 8080,
        }
    }
}
