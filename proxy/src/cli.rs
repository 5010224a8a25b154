use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::fmt;
use std::path::PathBuf;

#[derive(Parser, Clone)]
#[command(
    author = "Ilya Rozhnev",
    version = env!("CARGO_PKG_VERSION"),
    about = "MySQL Proxy Server",
    long_about = "A MySQL proxy that relays traffic unchanged and audits queries, results and connection lifecycle"
)]
pub struct CliArguments {
    /// MySQL server address (upstream)
    ///
    /// Example: 127.0.0.1:3306
    #[arg(short = 'u', long, env = "PROXY_UPSTREAM")]
    pub upstream: SocketAddr,

    /// Proxy listen address (downstream)
    ///
    /// Example: 0.0.0.0:3307
    #[arg(short = 'd', long, env = "PROXY_DOWNSTREAM")]
    pub downstream: SocketAddr,

    /// Client IPs allowed to connect, comma separated. Empty allows all.
    #[arg(long = "allow-ip", env = "PROXY_ALLOW_IPS", value_delimiter = ',')]
    pub allow_ips: Vec<IpAddr>,

    /// Demo password gate: the client handshake must contain this string.
    /// Not a security boundary.
    #[arg(long, env = "PROXY_PASSWORD", default_value = "", hide_env_values = true)]
    pub proxy_password: String,

    /// Maximum concurrently proxied connections (unbounded if unset)
    #[arg(long, env = "PROXY_MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,

    /// Capacity of each event queue; producers wait when it is full
    #[arg(long, env = "PROXY_EVENT_QUEUE", default_value_t = 10_000)]
    pub event_queue: usize,

    /// Directory for the SQLite audit log
    #[arg(long, env = "PROXY_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,
}

impl fmt::Debug for CliArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.proxy_password.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("CliArguments")
            .field("upstream", &self.upstream)
            .field("downstream", &self.downstream)
            .field("allow_ips", &self.allow_ips)
            .field("proxy_password", &password)
            .field("max_connections", &self.max_connections)
            .field("event_queue", &self.event_queue)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}
