use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Log output format
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Single-line human-readable events
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "pgprobe", version, about = "Run batches of SQL queries and report every attempt")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "PGPROBE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Deadline shared by all queries of one batch, in milliseconds
    #[arg(long, env = "PGPROBE_GLOBAL_TIMEOUT_MS", default_value_t = 14_000)]
    pub global_timeout_ms: u64,

    /// Prefix of the `exitnode` identifier reported in every record
    #[arg(long, env = "PGPROBE_EXITNODE_PREFIX", default_value = "local")]
    pub exitnode_prefix: String,

    #[arg(long, env = "PGPROBE_LOG_FORMAT", value_enum, default_value = "compact")]
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("unable to resolve bind address for {addr}"))
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    /// e.g. `local-rust-pgprobe-0.1.0`
    pub fn exitnode(&self) -> String {
        format!(
            "{}-rust-{}-{}",
            self.exitnode_prefix,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
    }
}
