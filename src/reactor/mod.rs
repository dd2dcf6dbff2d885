// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The reactor core: one acceptor reactor plus `reactor_nums - 1` worker
//! reactors, each edge-triggered over `mio`. The acceptor owns the
//! listening socket and hands each accepted connection to the least-loaded
//! worker; a worker owns its connections' readiness, a `FrameReader` per
//! connection, and its own bounded task executor.

mod acceptor;
mod worker;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::*;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ConfigError;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Installs a `SIGINT` handler that requests a graceful shutdown: reactor
/// loops poll this flag once per wakeup, so shutdown latency is bounded by
/// `epoll_wait_time`. Idempotent.
///
/// # Safety
/// Calls `sigaction(2)`, replacing any previously installed `SIGINT`
/// disposition for the process.
pub fn install_sigint_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGINT, &action) }?;
    Ok(())
}

/// A running RPC server: a single acceptor plus a fixed pool of worker
/// reactors.
pub struct RpcServer {
    config: ServerConfig,
    dispatcher: Dispatcher,
}

impl RpcServer {
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, dispatcher })
    }

    /// Seals the procedure registry, starts every worker reactor, then runs
    /// the acceptor loop on the calling thread until shutdown is requested.
    /// Returns once every worker reactor has drained and exited.
    pub fn run(mut self) -> io::Result<()> {
        self.dispatcher.seal();
        let dispatcher = Arc::new(self.dispatcher);

        let listener = acceptor::bind_listener(&self.config)?;
        listener.set_nonblocking(true)?;

        let worker_count = self.config.worker_reactor_count();
        let mut handles = Vec::with_capacity(worker_count);
        let mut joins = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let (handle, join) = worker::spawn(id, &self.config, Arc::clone(&dispatcher))?;
            handles.push(handle);
            joins.push(join);
        }

        info!(
            "rpc server listening on {}:{} ({worker_count} worker reactor(s))",
            self.config.host, self.config.port
        );
        let result = acceptor::run(&self.config, listener, &handles);

        for join in joins {
            if join.join().is_err() {
                error!("a worker reactor thread panicked during shutdown");
            }
        }

        result
    }
}
