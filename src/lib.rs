#![deny(clippy::shadow_unrelated)]
//
// enables nightly feature async_fn_track_caller for crate feature track-lock-location.
// to enable: cargo +nightly build --features log-lock_events
#![cfg_attr(feature = "track-lock-location", feature(async_fn_track_caller))]
//
// If code coverage tool `cargo-llvm-cov` is running with the nightly toolchain,
// enable the unstable “coverage” attribute. This allows using the annotation
// `#[coverage(off)]` to explicitly exclude certain parts of the code from
// being considered as “code under test.” The annotation is added to every
// `#[cfg(test)]` module as `#[cfg_attr(coverage_nightly, coverage(off))]`.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod application;
pub mod macros;
pub mod state;


use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;

use anyhow::Context;
use anyhow::Result;
use application::config::cli_args;
use application::config::data_directory::DataDirectory;
use application::rpc::server::WalletLockRpcServer;
use application::rpc::server::RPC;
use futures::future;
use futures::Future;
use futures::StreamExt;
use state::lock::ModeKind;
use state::lock::WalletLockCoordinator;
use state::lock::WalletLockError;
use state::vault::LocalKeyVault;
use tarpc::server;
use tarpc::server::incoming::Incoming;
use tarpc::server::Channel;
use tarpc::tokio_serde::formats::Json;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

/// Max number of RPC channels served at once, across all clients.
const MAX_RPC_CHANNELS: usize = 10;

/// A running daemon: the lock coordinator and the tasks serving it.
#[derive(Debug)]
pub struct ServerHandle {
    rpc_addr: SocketAddr,
    coordinator: WalletLockCoordinator<LocalKeyVault>,
    vault_loader: Option<JoinHandle<Result<ModeKind, WalletLockError>>>,
    rpc_join_handle: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the RPC server is bound to.
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn coordinator(&self) -> &WalletLockCoordinator<LocalKeyVault> {
        &self.coordinator
    }

    /// Wait for the wallet file to be loaded. The wallet is `Unavailable`
    /// until then.
    pub async fn wait_until_loaded(&mut self) -> Result<ModeKind> {
        match self.vault_loader.take() {
            Some(loader) => Ok(loader.await??),
            None => Ok(self.coordinator.mode_kind().await),
        }
    }

    /// Stop serving RPC and relock a timed unlock.
    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down");
        self.rpc_join_handle.abort();
        if let Some(loader) = self.vault_loader {
            loader.abort();
        }
        self.coordinator
            .shutdown()
            .await
            .context("could not relock wallet on shutdown")
    }
}

pub async fn initialize(cli_args: cli_args::Args) -> Result<ServerHandle> {
    async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
        tokio::spawn(fut);
    }

    info!("Starting wallet-lockd");

    let vault = if cli_args.in_memory {
        info!("Wallet is kept in memory only");
        LocalKeyVault::in_memory(cli_args.kdf_params())
    } else {
        // Get data directory, create one if none exists
        let data_directory = DataDirectory::get(cli_args.data_dir.clone())?;
        DataDirectory::create_dir_if_not_exists(&data_directory.root_dir_path()).await?;
        info!("Data directory is {}", data_directory);
        LocalKeyVault::new(data_directory.wallet_file_path(), cli_args.kdf_params())
    };
    let coordinator = WalletLockCoordinator::new(vault);

    let mut rpc_listener =
        tarpc::serde_transport::tcp::listen(cli_args.rpc_addr(), Json::default)
            .await
            .with_context(|| {
                format!(
                    "Failed to bind RPC port {}. Is an instance of this program already running?",
                    cli_args.rpc_addr()
                )
            })?;
    rpc_listener.config_mut().max_frame_length(usize::MAX);
    let rpc_addr = rpc_listener.local_addr();

    let max_channels_per_ip = cli_args.max_rpc_connections_per_ip;
    let rpc_coordinator = coordinator.clone();
    let rpc_join_handle = tokio::spawn(async move {
        rpc_listener
            // Ignore accept errors.
            .filter_map(|r| future::ready(r.ok()))
            .map(server::BaseChannel::with_defaults)
            .max_channels_per_key(max_channels_per_ip, |t| {
                t.transport()
                    .peer_addr()
                    .map(|addr| addr.ip())
                    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            })
            // serve is generated by the service attribute. It takes as input any type implementing
            // the generated RPC trait.
            .map(move |channel| {
                let server = WalletLockRpcServer::new(rpc_coordinator.clone());
                channel.execute(server.serve()).for_each(spawn)
            })
            .buffer_unordered(MAX_RPC_CHANNELS)
            .for_each(|_| async {})
            .await;
    });
    info!("Started RPC server on {}", rpc_addr);

    // Requests that reach the coordinator before loading starts see an
    // unavailable wallet. Those arriving during the load wait for it.
    let loader_coordinator = coordinator.clone();
    let vault_loader = tokio::spawn(async move {
        let loaded = loader_coordinator.load_vault().await;
        match &loaded {
            Ok(mode) => info!("Wallet loaded, mode {}", mode),
            Err(e) => error!("Could not load wallet: {}", e),
        }
        loaded
    });

    Ok(ServerHandle {
        rpc_addr,
        coordinator,
        vault_loader: Some(vault_loader),
        rpc_join_handle,
    })
}

/// Serve until ctrl-c, then relock and exit.
pub async fn run(cli_args: cli_args::Args) -> Result<()> {
    let handle = initialize(cli_args).await?;
    tokio::signal::ctrl_c()
        .await
        .context("could not listen for ctrl-c")?;
    info!("Received ctrl-c");
    handle.shutdown().await
}
