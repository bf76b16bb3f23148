use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::state::vault::encryption::Argon2Params;

/// The `wallet-lockd` daemon guards a wallet secret and serves lock
/// operations over RPC.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// The data directory that contains the wallet file
    ///
    /// The default varies by operating system, e.g.
    ///
    /// Linux:   /home/alice/.local/share/wallet-lock
    ///
    /// Windows: C:\Users\Alice\AppData\Roaming\wallet-lock\data
    ///
    /// macOS:   /Users/Alice/Library/Application Support/wallet-lock
    #[clap(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port on which to listen for RPC connections.
    #[clap(long, default_value = "9899", value_name = "PORT")]
    pub rpc_port: u16,

    /// IP on which to listen for RPC connections.
    ///
    /// Anyone who can reach the RPC port can lock and unlock the wallet, so
    /// only change this with care.
    #[clap(long, default_value = "127.0.0.1")]
    pub listen_addr: IpAddr,

    /// Max number of simultaneous RPC connections per client IP.
    #[clap(long, default_value = "5")]
    pub max_rpc_connections_per_ip: u32,

    /// Argon2id memory cost in KiB, used when a new wallet file is created.
    #[clap(long, default_value = "262144", value_name = "KIB")]
    pub kdf_memory_kib: u32,

    /// Argon2id number of passes, used when a new wallet file is created.
    #[clap(long, default_value = "4")]
    pub kdf_iterations: u32,

    /// Argon2id degree of parallelism, used when a new wallet file is created.
    #[clap(long, default_value = "4")]
    pub kdf_parallelism: u32,

    /// Keep the wallet in memory only. Nothing is written to disk and the
    /// wallet is gone when the process exits.
    #[clap(long)]
    pub in_memory: bool,

    /// Enable tokio tracing for consumption by the tokio-console application
    /// note: this will attempt to connect to localhost:6669
    #[clap(long, name = "tokio-console", default_value = "false")]
    pub tokio_console: bool,
}

impl Default for Args {
    fn default() -> Self {
        let empty: Vec<String> = vec![];
        Self::parse_from(empty)
    }
}

impl Args {
    pub fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.rpc_port)
    }

    pub fn kdf_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.kdf_memory_kib,
            iterations: self.kdf_iterations,
            parallelism: self.kdf_parallelism,
        }
    }
}
