// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A small, synchronous-handler RPC framework: a text-based wire codec, a
//! length-prefixed frame transport, a type-erased procedure dispatcher, a
//! multi-reactor server core built on `mio`, and a blocking client.
//!
//! Callers register procedures against a [`dispatcher::Dispatcher`], hand it
//! to a [`reactor::RpcServer`] along with a [`config::ServerConfig`], and
//! call [`reactor::RpcServer::run`]. Clients connect with [`client::Client`]
//! and call [`client::Client::remote_call`].
//!
//! This crate only depends on the [`log`] facade; wiring up a subscriber
//! (e.g. `env_logger`) is left to the binary that embeds it.

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod frame;
pub mod packet;
pub mod reactor;

pub use client::Client;
pub use codec::{Decode, Encode};
pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use error::{ClientError, ConfigError, DecodeError, ExecutorError, FrameError};
pub use packet::{ProcedurePacket, ReturnPacket, StatusCode, Void};
pub use reactor::{install_sigint_handler, RpcServer};

/// An in-memory duplex pipe built on `socketpair(2)`, used in this crate's
/// own tests to exercise [`client::Client`] and [`dispatcher::Dispatcher`]
/// without binding a real socket.
pub mod pipe {
    use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

    pub struct Endpoint {
        fd: std::os::fd::OwnedFd,
    }

    pub fn pipe() -> std::io::Result<(Endpoint, Endpoint)> {
        let (a, b) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::empty(),
        )?;

        Ok((Endpoint { fd: a }, Endpoint { fd: b }))
    }

    impl std::io::Read for Endpoint {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(nix::unistd::read(&self.fd, buf)?)
        }
    }

    impl std::io::Write for Endpoint {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(nix::unistd::write(&self.fd, buf)?)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
