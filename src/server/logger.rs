//! Per-connection logging.
//!
//! Records go to whatever `log` implementation the embedding program installed.
//! Every record is prefixed with the connection id and peer address, plus the
//! method and path once a request has been parsed, so interleaved output from
//! concurrent connections can be told apart.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use log::Level;

use crate::parser::Method;

const TARGET: &str = "clawhttp::connection";

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A logger scoped to a connection or an exchange.
pub trait ScopedLog {
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }
}

/// Logger owned by one connection for its whole lifetime.
#[derive(Debug)]
pub struct ConnectionLog {
    id: u64,
    remote: SocketAddr,
}

impl ConnectionLog {
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            remote,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// A logger that also identifies the exchange being served.
    pub fn exchange<'a>(&'a self, method: &'a Method, path: &'a str) -> ExchangeLog<'a> {
        ExchangeLog {
            connection: self,
            method,
            path,
        }
    }
}

impl ScopedLog for ConnectionLog {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: TARGET, level, "#{} ({}) {}", self.id, self.remote, args);
    }
}

/// Logger for a single request/response exchange.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeLog<'a> {
    connection: &'a ConnectionLog,
    method: &'a Method,
    path: &'a str,
}

impl ScopedLog for ExchangeLog<'_> {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(
            target: TARGET,
            level,
            "#{} ({} {} {}) {}",
            self.connection.id,
            self.connection.remote,
            self.method,
            self.path,
            args
        );
    }
}
