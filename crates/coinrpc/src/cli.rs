use std::path::PathBuf;

use clap::Parser;

/// coinrpc: call a JSON-RPC method on a Bitcoin-family node and print the result.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Node RPC address as host:port, optionally with a path.
    #[arg(long, default_value = "127.0.0.1:8332", env = "COINRPC_HOST")]
    pub host: String,

    /// RPC username.
    #[arg(long, env = "COINRPC_USER")]
    pub rpc_user: Option<String>,

    /// RPC password.
    #[arg(long, env = "COINRPC_PASS")]
    pub rpc_pass: Option<String>,

    /// Bitcoin Core cookie file, used when no username/password is given.
    #[arg(long, env = "COINRPC_COOKIE_FILE")]
    pub cookie_file: Option<PathBuf>,

    /// Use HTTPS instead of plain HTTP.
    #[arg(long)]
    pub tls: bool,

    /// PEM certificate bundle to trust instead of the system roots.
    #[arg(long, requires = "tls")]
    pub cert_file: Option<PathBuf>,

    /// SOCKS5 proxy, e.g. socks5://127.0.0.1:9050.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Give up on the call after this many seconds.
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Method name, e.g. getblockcount.
    pub method: String,

    /// Positional parameters. Each is parsed as JSON, falling back to a
    /// plain string.
    pub params: Vec<String>,
}
