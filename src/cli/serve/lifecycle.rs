//! Server lifecycle management.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use tiny_http::Server;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Request handler threads.
const REQUEST_THREADS: usize = 4;

/// Bind to the specified interface and port, trying the next ports when
/// the port is in use.
pub fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    crate::log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    let last_port = base_port.saturating_add(MAX_PORT_RETRIES - 1);
    Err(anyhow!(
        "failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        last_port,
        last_error.map_or_else(String::new, |e| e.to_string())
    ))
}

/// Request loop running on its own thread.
pub struct RunningServer {
    server: Arc<Server>,
    handle: JoinHandle<()>,
    pub addr: SocketAddr,
}

impl RunningServer {
    /// Start serving `serve_root` on a background thread.
    pub fn start(server: Server, addr: SocketAddr, serve_root: PathBuf) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(REQUEST_THREADS)
            .thread_name(|i| format!("kiln-http-{i}"))
            .build()
            .context("failed to create request thread pool")?;

        let server = Arc::new(server);
        let handle = thread::spawn({
            let server = Arc::clone(&server);
            move || super::run_request_loop(&server, &pool, &serve_root)
        });

        Ok(Self {
            server,
            handle,
            addr,
        })
    }

    /// Stop accepting requests and wait for the loop to exit.
    pub fn shutdown(self) {
        self.server.unblock();
        if self.handle.join().is_err() {
            crate::log!("serve"; "request loop panicked");
        }
    }
}
