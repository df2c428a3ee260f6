//! Command-line front end for the counter zkApp
//!
//! Runs the orchestrator against the configured Mina node. The wallet is the
//! node-managed account named by `MINA_WALLET_ADDRESS`; without it the session
//! runs with no wallet.
//!
//! Usage examples:
//! ```shell
//! # Show setup and account status
//! cli status
//!
//! # Wait until the account is funded, then send one update
//! cli send
//!
//! # Read the current counter
//! cli refresh
//!
//! # Interactive session
//! cli run
//! ```

use clap::{Parser, Subcommand};
use eyre::{bail, Result};
use ledger_client::{Config, GraphQLLedger, MinaGraphQLClient};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use url::Url;
use zkapp_lib::{MinaNetwork, PublicKey};
use zkapp_orchestrator::{
    ComputeHandle, LocalRuntime, NodeWallet, Orchestrator, OrchestratorConfig, PollOutcome,
    RefreshOutcome, SetupOutcome, SubmitOutcome,
};

#[derive(Parser)]
#[command(name = "cli")]
#[command(about = "Interact with the Add counter zkApp")]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Target network
    #[arg(long, global = true, value_enum)]
    network: Option<MinaNetwork>,

    /// GraphQL endpoint of the Mina node
    #[arg(long, global = true)]
    graphql_url: Option<Url>,

    /// Address of the deployed counter zkApp
    #[arg(long, global = true)]
    zkapp_address: Option<PublicKey>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run setup and print the session status
    Status,
    /// Wait for the account to be funded, then send one update transaction
    Send,
    /// Read the counter from fresh ledger state
    Refresh,
    /// Interactive session: send, refresh, status, quit
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| {
            format!(
                "cli={0},zkapp_orchestrator={0},ledger_client={0}",
                cli.log_level
            )
        }))
        .init();

    let mut config = Config::from_env_with_network(cli.network)?;
    if let Some(url) = cli.graphql_url {
        config.network.graphql_url = url;
    }
    if let Some(address) = cli.zkapp_address {
        config.contract.zkapp_address = address;
    }
    config.validate()?;

    info!(
        "Network: {} ({}), zkApp: {}",
        config.network.name, config.network.graphql_url, config.contract.zkapp_address
    );

    let orchestrator = Arc::new(build_orchestrator(&config)?);

    let result = match cli.command {
        Commands::Status => status(&orchestrator).await,
        Commands::Send => send(&orchestrator).await,
        Commands::Refresh => refresh(&orchestrator).await,
        Commands::Run => run(&orchestrator).await,
    };

    orchestrator.shutdown();
    result
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let client = MinaGraphQLClient::from_config(config)?;
    let ledger = Arc::new(GraphQLLedger::new(client.clone()));
    let compute = ComputeHandle::spawn(LocalRuntime::new(), ledger)?;

    let mut builder = Orchestrator::builder().config(OrchestratorConfig::from(config));
    match &config.wallet.address {
        Some(address) => {
            let wallet = NodeWallet::new(PublicKey::from_base58(address)?, client);
            info!("Using node wallet {}", wallet.address());
            builder = builder.wallet(Arc::new(wallet));
        }
        None => warn!("MINA_WALLET_ADDRESS not set; running without a wallet"),
    }

    Ok(builder.build(compute))
}

/// Run setup; `Ok(true)` once the session has a wallet and a local account.
async fn setup(orchestrator: &Orchestrator) -> Result<bool> {
    match orchestrator.setup().await {
        SetupOutcome::Ready { funded, counter } => {
            info!("✅ Setup complete (funded: {}, counter: {:?})", funded, counter);
            Ok(true)
        }
        SetupOutcome::AlreadyComplete => Ok(orchestrator.session().is_ready()),
        SetupOutcome::WalletAbsent => {
            warn!("⚠️ No wallet available");
            Ok(false)
        }
        SetupOutcome::Incomplete(reason) => {
            error!("❌ Setup incomplete: {}", reason);
            Ok(false)
        }
        SetupOutcome::AlreadyRunning => bail!("setup already running"),
    }
}

async fn wait_for_funding(orchestrator: &Orchestrator) -> Result<bool> {
    if orchestrator.session().account_confirmed_funded {
        return Ok(true);
    }
    println!("{}", orchestrator.status());

    tokio::select! {
        outcome = orchestrator.poll_account_funding() => match outcome {
            PollOutcome::Funded { attempts } => {
                info!("✅ Account funded after {} lookup(s)", attempts);
                Ok(true)
            }
            PollOutcome::AlreadyFunded => Ok(true),
            other => {
                warn!("Funding poll ended: {:?}", other);
                Ok(false)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            orchestrator.shutdown();
            Ok(false)
        }
    }
}

async fn status(orchestrator: &Orchestrator) -> Result<()> {
    setup(orchestrator).await?;
    println!("{}", orchestrator.status());
    Ok(())
}

async fn send(orchestrator: &Orchestrator) -> Result<()> {
    if !setup(orchestrator).await? {
        println!("{}", orchestrator.status());
        bail!("session not ready");
    }
    if !wait_for_funding(orchestrator).await? {
        return Ok(());
    }
    submit(orchestrator).await
}

async fn submit(orchestrator: &Orchestrator) -> Result<()> {
    match orchestrator.submit_transaction().await {
        SubmitOutcome::Submitted { hash, explorer_url } => {
            info!("✅ Transaction sent: {}", hash);
            match explorer_url {
                Some(url) => println!("See transaction at {url}"),
                None => println!("Transaction {hash}"),
            }
            Ok(())
        }
        SubmitOutcome::WalletDisconnected => bail!("wallet is not connected"),
        SubmitOutcome::AlreadyInFlight => {
            warn!("A transaction is already in flight");
            Ok(())
        }
        SubmitOutcome::NotReady => bail!("account not funded yet"),
        SubmitOutcome::Failed { stage, reason } => {
            bail!("transaction failed while {stage}: {reason}")
        }
    }
}

async fn refresh(orchestrator: &Orchestrator) -> Result<()> {
    if !setup(orchestrator).await? {
        println!("{}", orchestrator.status());
        bail!("session not ready");
    }
    match orchestrator.refresh_observed_value().await {
        RefreshOutcome::Updated(value) => {
            println!("Current Number in zkApp {value}");
            Ok(())
        }
        RefreshOutcome::Failed(reason) => bail!("refresh failed: {reason}"),
        other => bail!("refresh not possible: {other:?}"),
    }
}

async fn run(orchestrator: &Arc<Orchestrator>) -> Result<()> {
    let ready = setup(orchestrator).await?;
    println!("{}", orchestrator.status());

    let poll = (ready && !orchestrator.session().account_confirmed_funded)
        .then(|| orchestrator.spawn_funding_poll());

    println!("Commands: send, refresh, status, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => {}
            "send" => {
                if let Err(e) = submit(orchestrator).await {
                    error!("❌ {}", e);
                }
            }
            "refresh" => match orchestrator.refresh_observed_value().await {
                RefreshOutcome::Updated(value) => println!("Current Number in zkApp {value}"),
                other => warn!("Refresh: {:?}", other),
            },
            "status" => println!("{}", orchestrator.status()),
            "quit" | "exit" => break,
            other => println!("Unknown command '{other}'. Commands: send, refresh, status, quit"),
        }
    }

    orchestrator.shutdown();
    if let Some(poll) = poll {
        let outcome = poll.await?;
        info!("Funding poll finished: {:?}", outcome);
    }
    Ok(())
}
