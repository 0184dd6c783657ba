//! Price Reporter
//!
//! Keeps on-chain price feeds in line with market quotes.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use price_reporter::{
    chain::{ChainClient, RpcChainClient},
    config::Config,
    controller::{spawn_feed_tasks, ConfirmPolicy, CycleOutcome, TransmissionController, TransmitOutcome},
    decision::UpdateDecisionEngine,
    keyring::KeyRing,
    quote::{HttpQuoteSource, QuoteSource},
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "price-reporter")]
#[command(about = "Reports market prices to on-chain aggregator feeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start reporting every configured feed
    Run {
        /// Run a single cycle per target and exit
        #[arg(long)]
        once: bool,
        /// Decide updates but never sign or submit
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the latest on-chain round of every target
    Status,
    /// Show the reporter addresses
    Accounts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config))?;

    // RUST_LOG wins over debug_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_directive()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { once, dry_run } => run_reporter(config, once, dry_run).await,
        Commands::Status => show_status(config).await,
        Commands::Accounts => show_accounts(config),
    }
}

fn load_keyring(config: &Config) -> anyhow::Result<KeyRing> {
    let passphrase = match &config.keystore.passphrase {
        Some(passphrase) => passphrase.clone(),
        None => rpassword::prompt_password("Keystore passphrase: ")
            .context("failed to read keystore passphrase")?,
    };

    Ok(KeyRing::load(
        &config.keystore.paths,
        &passphrase,
        config.keystore.selection,
    )?)
}

/// Connect to every configured chain, checking chain ids where configured
async fn connect_chains(config: &Config) -> anyhow::Result<HashMap<String, Arc<dyn ChainClient>>> {
    let mut chains: HashMap<String, Arc<dyn ChainClient>> = HashMap::new();

    for chain_config in &config.chains {
        let client = RpcChainClient::new(chain_config)?;

        if let Some(expected) = chain_config.chain_id {
            let actual = client
                .chain_id()
                .await
                .with_context(|| format!("chain {} is unreachable", chain_config.name))?;
            if actual != expected {
                bail!(
                    "chain {} reports chain id {}, expected {}",
                    chain_config.name,
                    actual,
                    expected
                );
            }
        }

        tracing::info!(chain = %client.name(), rpc = %chain_config.rpc_url, "Connected");
        chains.insert(chain_config.name.clone(), Arc::new(client));
    }

    Ok(chains)
}

fn build_controllers(
    config: &Config,
    chains: &HashMap<String, Arc<dyn ChainClient>>,
    keyring: Arc<KeyRing>,
    dry_run: bool,
) -> anyhow::Result<Vec<TransmissionController>> {
    let confirm = ConfirmPolicy {
        interval: config.policy.confirm_interval(),
        attempts: config.policy.confirm_attempts,
    };

    let mut controllers = Vec::new();
    for feed in &config.feeds {
        let source = HttpQuoteSource::new(&feed.url, feed.price.clone(), config.policy.request_timeout())?;
        tracing::debug!(feed = %feed.name, url = %source.url(), targets = feed.targets.len(), "Quote source ready");
        let quotes: Arc<dyn QuoteSource> = Arc::new(source);
        let engine = UpdateDecisionEngine::for_feed(&config.policy, feed);

        for target in &feed.targets {
            let chain = chains
                .get(&target.chain)
                .with_context(|| format!("feed {} targets unknown chain {}", feed.name, target.chain))?;

            let controller = TransmissionController::new(
                feed.name.clone(),
                target.chain.clone(),
                target.contract_address()?,
                Arc::clone(&quotes),
                Arc::clone(chain),
                Arc::clone(&keyring),
                engine.clone(),
            )
            .with_confirm_policy(confirm)
            .with_dry_run(dry_run);

            controllers.push(controller);
        }
    }

    Ok(controllers)
}

async fn run_reporter(config: Config, once: bool, dry_run: bool) -> anyhow::Result<()> {
    tracing::info!("Starting price reporter");

    if dry_run {
        tracing::warn!("Running in DRY RUN mode - no transactions will be sent");
    }

    let keyring = Arc::new(load_keyring(&config)?);
    tracing::info!(
        keys = keyring.len(),
        selection = ?keyring.selection(),
        "Key ring loaded"
    );

    let chains = connect_chains(&config).await?;
    let controllers = build_controllers(&config, &chains, keyring, dry_run)?;

    if once {
        return run_once(controllers).await;
    }

    tracing::info!(targets = controllers.len(), "Starting feed tasks");
    let mut tasks = spawn_feed_tasks(controllers, config.policy.tick_interval());

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("Shutting down");
                tasks.shutdown().await;
                return Ok(());
            }
            joined = tasks.join_next() => match joined {
                Some(Err(e)) => tracing::error!(error = %e, "Feed task died"),
                Some(Ok(())) => {}
                None => return Ok(()),
            },
        }
    }
}

/// One cycle per target, all targets concurrently
async fn run_once(controllers: Vec<TransmissionController>) -> anyhow::Result<()> {
    let mut cycles = JoinSet::new();
    for mut controller in controllers {
        cycles.spawn(async move {
            let outcome = controller.run_cycle().await;
            (controller.label(), outcome)
        });
    }

    println!("\nCycle results:\n");
    while let Some(joined) = cycles.join_next().await {
        let (label, outcome) = joined.context("feed cycle panicked")?;
        println!("  {:<32} {}", label, describe(&outcome));
    }

    Ok(())
}

fn describe(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::StateUnavailable(e) => format!("state unavailable: {}", e),
        CycleOutcome::QuoteUnavailable(e) => format!("quote unavailable: {}", e),
        CycleOutcome::InvalidQuote(e) => format!("invalid quote: {}", e),
        CycleOutcome::NoUpdate(decision) => {
            format!("no update (answer {})", decision.new_answer)
        }
        CycleOutcome::DryRun(decision) => format!(
            "would submit round {} answer {} ({:?})",
            decision.target_round,
            decision.new_answer,
            decision.trigger
        ),
        CycleOutcome::Transmitted { reports, .. } => reports
            .iter()
            .map(|report| {
                let status = match &report.outcome {
                    TransmitOutcome::Confirmed => "confirmed".to_string(),
                    TransmitOutcome::Reverted => "reverted".to_string(),
                    TransmitOutcome::Deferred => "pending".to_string(),
                    TransmitOutcome::SubmitFailed(e) => format!("failed: {}", e),
                };
                format!("round {} from {:?}: {}", report.round_id, report.from, status)
            })
            .collect::<Vec<_>>()
            .join("; "),
    }
}

async fn show_status(config: Config) -> anyhow::Result<()> {
    let chains = connect_chains(&config).await?;
    let now = Utc::now();

    println!("\nFeed Status\n");
    println!("{:<32} {:>8} {:>28} {:>10}", "Target", "Round", "Answer", "Age");
    println!("{}", "-".repeat(81));

    for feed in &config.feeds {
        let decimals = feed.decimals.unwrap_or(config.policy.decimals);
        for target in &feed.targets {
            let label = format!("{}@{}", feed.name, target.chain);
            let Some(chain) = chains.get(&target.chain) else {
                continue;
            };

            match chain.latest_round(target.contract_address()?).await {
                Ok(state) => {
                    let age = now - state.started_at;
                    println!(
                        "{:<32} {:>8} {:>28} {:>9}m",
                        label,
                        state.round_id,
                        format!("{} (1e-{})", state.answer, decimals),
                        age.num_minutes()
                    );
                }
                Err(e) => println!("{:<32} error: {}", label, e),
            }
        }
    }

    Ok(())
}

fn show_accounts(config: Config) -> anyhow::Result<()> {
    let keyring = load_keyring(&config)?;

    println!("\nReporter Accounts ({:?})\n", keyring.selection());
    for (index, address) in keyring.addresses().iter().enumerate() {
        println!("  {}. {:?}", index + 1, address);
    }

    Ok(())
}
