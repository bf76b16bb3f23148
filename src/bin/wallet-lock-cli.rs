use std::io::stdout;
use std::net::SocketAddr;

use anyhow::bail;
use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;
use clap_complete::Shell;
use rpassword::prompt_password;
use tarpc::client;
use tarpc::context;
use tarpc::tokio_serde::formats::Json;
use wallet_lock::application::rpc::server::RPCClient;
use wallet_lock::application::rpc::server::RpcReply;
use zeroize::Zeroizing;

/// Environment variable holding the current wallet password.
const PASSWORD_ENV: &str = "WALLET_LOCK_PASSWORD";

/// Environment variable holding the new wallet password.
const NEW_PASSWORD_ENV: &str = "WALLET_LOCK_NEW_PASSWORD";

#[derive(Debug, Parser)]
enum Command {
    /// Show the lock mode and the time left until automatic relock.
    Status,

    /// Show the spendable balance. Fails while the wallet is locked.
    Balance,

    /// Encrypt an unencrypted wallet with a password.
    SetPassword,

    /// Change the password of an encrypted wallet.
    ChangePassword,

    /// Decrypt the wallet permanently.
    RemovePassword,

    /// Decrypt the wallet for a limited time.
    Unlock {
        /// seconds until the wallet locks itself again
        #[clap(long, short, default_value = "60")]
        timeout: i64,
    },

    /// Lock a timed-unlocked wallet now.
    Lock,

    /// Dump shell completions.
    Completions,
}

#[derive(Debug, Parser)]
#[clap(name = "wallet-lock-cli", about = "An RPC client for wallet-lockd")]
struct Config {
    /// Sets the server address to connect to.
    #[clap(long, default_value = "127.0.0.1:9899")]
    server_addr: SocketAddr,

    #[clap(subcommand)]
    command: Command,
}

/// Read a password from `env_var`, or prompt for it.
fn read_password(env_var: &str, prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(env_var) {
        return Ok(Zeroizing::new(password));
    }
    Ok(Zeroizing::new(prompt_password(prompt)?))
}

/// Read a new password from `env_var`, or prompt for it twice.
fn read_new_password(env_var: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(env_var) {
        return Ok(Zeroizing::new(password));
    }
    let password = Zeroizing::new(prompt_password("Enter new wallet password: ")?);
    if password.is_empty() {
        bail!("Password cannot be empty.");
    }
    let confirm = Zeroizing::new(prompt_password("Confirm new wallet password: ")?);
    if *password != *confirm {
        bail!("Passwords do not match.");
    }
    Ok(password)
}

fn check<T>(reply: RpcReply<T>) -> Result<Option<T>> {
    if !reply.ok {
        bail!(
            "{}: {}",
            reply.status,
            reply.message.unwrap_or_else(|| "request failed".to_string())
        );
    }
    Ok(reply.payload)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Config = Config::parse();

    // Check for completions command before establishing server connection.
    if let Command::Completions = args.command {
        let Some(shell) = Shell::from_env() else {
            bail!("Unknown shell.  Shell completions not available.")
        };
        generate(shell, &mut Config::command(), "wallet-lock-cli", &mut stdout());
        return Ok(());
    }

    let transport = tarpc::serde_transport::tcp::connect(args.server_addr, Json::default);
    let client = RPCClient::new(client::Config::default(), transport.await?).spawn();

    match args.command {
        Command::Status => {
            let status = client.lock_status(context::current()).await?;
            match status.relock_in_secs {
                Some(secs) => println!("{} (relocks in {} seconds)", status.mode, secs),
                None => println!("{}", status.mode),
            }
        }
        Command::Balance => {
            let balance = check(client.get_balance(context::current()).await?)?;
            if let Some(balance) = balance {
                println!("{}", balance);
            }
        }
        Command::SetPassword => {
            let password = read_new_password(PASSWORD_ENV)?;
            check(
                client
                    .set_password(context::current(), password.to_string(), None)
                    .await?,
            )?;
            println!("Wallet encrypted. It is now locked.");
        }
        Command::ChangePassword => {
            let old = read_password(PASSWORD_ENV, "Enter current wallet password: ")?;
            let new = read_new_password(NEW_PASSWORD_ENV)?;
            check(
                client
                    .set_password(context::current(), old.to_string(), Some(new.to_string()))
                    .await?,
            )?;
            println!("Wallet password changed. It is now locked.");
        }
        Command::RemovePassword => {
            let password = read_password(PASSWORD_ENV, "Enter wallet password: ")?;
            check(
                client
                    .remove_password(context::current(), password.to_string())
                    .await?,
            )?;
            println!("Wallet password removed. The wallet is no longer encrypted.");
        }
        Command::Unlock { timeout } => {
            let password = read_password(PASSWORD_ENV, "Enter wallet password: ")?;
            check(
                client
                    .unlock_wallet(context::current(), password.to_string(), timeout)
                    .await?,
            )?;
            println!("Wallet unlocked for {} seconds.", timeout);
        }
        Command::Lock => {
            check(client.lock_wallet(context::current()).await?)?;
            println!("Wallet locked.");
        }
        Command::Completions => {} // handled before server connection.
    }

    Ok(())
}
