//! `kiln serve`: development server next to the watch loop.
//!
//! ```text
//! main thread:    initial build ──▶ watch loop (scoped rebuilds)
//! request thread: tiny_http ──▶ rayon pool (4) ──▶ static_dir
//! ```
//!
//! Files are served straight from disk, so a request always sees the last
//! emitted output. There is no live reload.

mod lifecycle;
mod path;
mod response;

use std::path::Path;

use anyhow::Result;
use rayon::ThreadPool;
use tiny_http::{Request, Server};

use super::build::{Session, initial_build, watcher_for};
use crate::config::KilnConfig;
use crate::core::{BuildMode, shutdown_token};
use crate::logger::status_detach;
use lifecycle::{RunningServer, bind_with_retry};

/// Run the serve command until Ctrl+C.
pub fn serve_command(config: KilnConfig, mode: BuildMode) -> Result<bool> {
    let cancel = shutdown_token();
    let mut watcher = watcher_for(&config)?;

    let server = if config.dev_server.enabled {
        let (server, addr) = bind_with_retry(config.dev_server.interface, config.dev_server.port)?;
        let running = RunningServer::start(server, addr, config.static_dir())?;
        crate::log!("serve"; "http://{}", running.addr);
        Some(running)
    } else {
        crate::debug!("serve"; "dev server disabled, watching only");
        None
    };

    let mut session = Session::new(config, mode)?.with_cancel(cancel.clone());
    initial_build(&mut session);
    status_detach();

    crate::log!("watch"; "waiting for changes, Ctrl+C to stop");
    super::watch::run(&mut session, &mut watcher, &cancel);

    if let Some(server) = server {
        server.shutdown();
    }
    Ok(true)
}

fn run_request_loop(server: &Server, pool: &ThreadPool, serve_root: &Path) {
    for request in server.incoming_requests() {
        let serve_root = serve_root.to_path_buf();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &serve_root) {
                crate::log!("serve"; "request error: {e}");
            }
        });
    }
    crate::debug!("serve"; "request loop stopped");
}

/// Handle a single HTTP request
fn handle_request(request: Request, serve_root: &Path) -> Result<()> {
    if shutdown_token().is_cancelled() {
        return response::respond_unavailable(request);
    }
    if !response::is_read_request(&request) {
        return response::respond_method_not_allowed(request);
    }

    match path::resolve_route(request.url(), serve_root) {
        Some(path) => response::respond_file(request, &path),
        None => response::respond_not_found(request, serve_root),
    }
}
