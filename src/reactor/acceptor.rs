// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The single acceptor reactor: binds the listening socket with
//! `SO_REUSEADDR` (mirroring `TCPSocket::bindAndListen`), then accepts
//! connections and hands each one to the least-loaded worker.

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::os::fd::AsRawFd;
use std::time::Duration;

use log::*;
use mio::net::TcpListener as MioTcpListener;
use mio::{Events, Interest, Poll, Token};
use nix::sys::socket::{bind, listen, setsockopt, socket, sockopt::ReuseAddr};
use nix::sys::socket::{AddressFamily, Backlog, SockFlag, SockType, SockaddrIn};

use super::shutdown_requested;
use super::worker::WorkerHandle;
use crate::config::ServerConfig;

const LISTENER_TOKEN: Token = Token(0);

/// Builds the listening socket by hand, rather than via `TcpListener::bind`,
/// so `SO_REUSEADDR` can be set before `bind(2)`, permitting fast restart.
pub fn bind_listener(config: &ServerConfig) -> io::Result<StdTcpListener> {
    let SocketAddr::V4(addr) = SocketAddr::new(config.host, config.port) else {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "only IPv4 listening addresses are supported",
        ));
    };

    let fd = socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), None)
        .map_err(io::Error::from)?;
    setsockopt(&fd, ReuseAddr, &true).map_err(io::Error::from)?;
    bind(fd.as_raw_fd(), &SockaddrIn::from(addr)).map_err(io::Error::from)?;

    let backlog = Backlog::new(config.backlog)
        .unwrap_or_else(|_| Backlog::new(1024).expect("1024 is a valid listen backlog"));
    listen(&fd, backlog).map_err(io::Error::from)?;

    Ok(StdTcpListener::from(fd))
}

pub fn run(config: &ServerConfig, listener: StdTcpListener, workers: &[WorkerHandle]) -> io::Result<()> {
    let mut listener = MioTcpListener::from_std(listener);
    let mut poll = Poll::new()?;
    poll.registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut events = Events::with_capacity(config.epoll_buffer_size);
    let wait_timeout = Duration::from_millis(config.epoll_wait_time_ms);

    while !shutdown_requested() {
        if let Err(e) = poll.poll(&mut events, Some(wait_timeout)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }

        for event in events.iter() {
            if event.token() != LISTENER_TOKEN {
                continue;
            }
            loop {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {peer}");
                        dispatch_to_least_loaded(workers, stream);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        break;
                    }
                }
            }
        }
    }

    info!("acceptor shutting down");
    Ok(())
}

fn dispatch_to_least_loaded(workers: &[WorkerHandle], stream: mio::net::TcpStream) {
    let target = workers
        .iter()
        .min_by_key(|w| w.load())
        .expect("at least one worker reactor is configured");
    target.dispatch(stream);
}
