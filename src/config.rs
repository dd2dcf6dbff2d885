// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Server configuration: a plain struct with documented defaults; parsing
//! it from a CLI or a config file is out of scope for this crate.

use std::net::IpAddr;

use crate::error::ConfigError;

pub const DEFAULT_BACKLOG: i32 = i32::MAX;
pub const DEFAULT_REACTOR_NUMS: usize = 2;
pub const DEFAULT_TASK_THREAD_NUMS: usize = 8;
pub const DEFAULT_TASK_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_EPOLL_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_EPOLL_WAIT_TIME_MS: u64 = 5000;
pub const DEFAULT_PROCEDURE_CRITICAL_TIME_MS: i64 = 3000;

/// Server configuration. Construct with
/// [`ServerConfig::new`] and [`ServerConfig::validate`] before starting a
/// server; the reactor assumes an already-validated config.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub backlog: i32,
    pub reactor_nums: usize,
    pub task_thread_nums: usize,
    pub task_queue_capacity: usize,
    pub epoll_buffer_size: usize,
    pub epoll_wait_time_ms: u64,
    pub procedure_critical_time_ms: i64,
}

impl ServerConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            backlog: DEFAULT_BACKLOG,
            reactor_nums: DEFAULT_REACTOR_NUMS,
            task_thread_nums: DEFAULT_TASK_THREAD_NUMS,
            task_queue_capacity: DEFAULT_TASK_QUEUE_CAPACITY,
            epoll_buffer_size: DEFAULT_EPOLL_BUFFER_SIZE,
            epoll_wait_time_ms: DEFAULT_EPOLL_WAIT_TIME_MS,
            procedure_critical_time_ms: DEFAULT_PROCEDURE_CRITICAL_TIME_MS,
        }
    }

    /// Number of worker reactors, i.e. every reactor except the single
    /// acceptor.
    pub fn worker_reactor_count(&self) -> usize {
        self.reactor_nums - 1
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidField("port must be nonzero"));
        }
        if self.backlog < 1 {
            return Err(ConfigError::InvalidField("backlog must be >= 1"));
        }
        if self.reactor_nums < 2 {
            return Err(ConfigError::InvalidField("reactor_nums must be >= 2"));
        }
        if self.task_thread_nums < 1 {
            return Err(ConfigError::InvalidField("task_thread_nums must be >= 1"));
        }
        if self.task_queue_capacity < 1 {
            return Err(ConfigError::InvalidField("task_queue_capacity must be >= 1"));
        }
        if self.epoll_buffer_size < 1 {
            return Err(ConfigError::InvalidField("epoll_buffer_size must be >= 1"));
        }
        if self.procedure_critical_time_ms < -1 {
            return Err(ConfigError::InvalidField(
                "procedure_critical_time_ms must be >= -1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn defaults_validate() {
        let config = ServerConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000);
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_reactor_count(), 1);
    }

    #[test]
    fn rejects_too_few_reactors() {
        let mut config = ServerConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000);
        config.reactor_nums = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_port() {
        let config = ServerConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn minus_one_critical_time_disables_and_is_valid() {
        let mut config = ServerConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000);
        config.procedure_critical_time_ms = -1;
        assert!(config.validate().is_ok());
    }
}
