use tarpc::client;
use tarpc::tokio_serde::formats::Json;
use tempfile::TempDir;
use wallet_lock::application::config::cli_args::Args;
use wallet_lock::application::rpc::server::RPCClient;
use wallet_lock::state::vault::encryption::Argon2Params;
use wallet_lock::ServerHandle;

pub struct TestDaemon;

impl TestDaemon {
    /// Args for a daemon with its own data directory, an OS-assigned RPC
    /// port and the cheapest Argon2 parameters.
    pub fn args(data_dir: &TempDir) -> Args {
        let kdf = Argon2Params::minimal();
        let mut args = Args::default();
        args.data_dir = Some(data_dir.path().to_path_buf());
        args.rpc_port = 0;
        args.kdf_memory_kib = kdf.memory_kib;
        args.kdf_iterations = kdf.iterations;
        args.kdf_parallelism = kdf.parallelism;
        args
    }

    /// Start a daemon and wait until its wallet file is loaded.
    pub async fn start(args: Args) -> anyhow::Result<ServerHandle> {
        let mut handle = wallet_lock::initialize(args).await?;
        handle.wait_until_loaded().await?;
        Ok(handle)
    }

    pub async fn client(handle: &ServerHandle) -> anyhow::Result<RPCClient> {
        let transport = tarpc::serde_transport::tcp::connect(handle.rpc_addr(), Json::default);
        Ok(RPCClient::new(client::Config::default(), transport.await?).spawn())
    }
}
