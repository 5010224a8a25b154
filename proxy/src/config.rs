use std::net::SocketAddr;
use std::path::PathBuf;

use crate::cli::CliArguments;
use crate::proxy::{AllowList, DemoPasswordGate};

/// Runtime configuration handed to the listener and every connection.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub downstream: SocketAddr,
    pub upstream: SocketAddr,
    pub allow_list: AllowList,
    pub password_gate: Option<DemoPasswordGate>,
    pub max_connections: Option<usize>,
    pub event_queue: usize,
    pub data_dir: PathBuf,
}

impl ProxyConfig {
    #[cfg(test)]
    pub fn new(downstream: SocketAddr, upstream: SocketAddr) -> Self {
        Self {
            downstream,
            upstream,
            allow_list: AllowList::default(),
            password_gate: None,
            max_connections: None,
            event_queue: 10_000,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl From<CliArguments> for ProxyConfig {
    fn from(args: CliArguments) -> Self {
        Self {
            downstream: args.downstream,
            upstream: args.upstream,
            allow_list: AllowList::new(args.allow_ips),
            password_gate: DemoPasswordGate::new(&args.proxy_password),
            max_connections: args.max_connections.filter(|&n| n > 0),
            event_queue: args.event_queue,
            data_dir: args.data_dir,
        }
    }
}
