//! Node for the Ferry bridge.

use anyhow::Result;
use colored::Colorize;
use ferry_bridge::storage::StateStore;
use ferry_bridge::{AccountingBackend, BridgeEvent};
use ferry_core::{types::short_hex, Address};
use ferry_node::{metrics, Devnet, NodeConfig, NodeError, Side};
use rand::Rng;
use std::net::SocketAddr;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command line arguments for the node.
#[derive(Debug, StructOpt)]
#[structopt(name = "ferry-node", about = "Runs both sides of a Ferry bridge")]
struct Opt {
    /// Path to the configuration file
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[structopt(subcommand)]
    cmd: Command,
}

/// Subcommands for the node.
#[derive(Debug, StructOpt)]
enum Command {
    /// Send transfers back and forth between the two ledgers
    #[structopt(name = "simulate")]
    Simulate {
        /// Number of transfers per direction
        #[structopt(long, default_value = "3")]
        transfers: usize,

        /// Persist bridge state under this directory
        #[structopt(long, parse(from_os_str))]
        data_dir: Option<PathBuf>,

        /// Enable metrics server and keep running after the simulation
        #[structopt(long)]
        metrics: bool,

        /// Metrics server address
        #[structopt(long)]
        metrics_addr: Option<String>,
    },

    /// Print the persisted state of one bridge
    #[structopt(name = "inspect")]
    Inspect {
        /// Path to the bridge data directory
        #[structopt(long, parse(from_os_str))]
        data_dir: Option<PathBuf>,
    },

    /// Write the default configuration to a file
    #[structopt(name = "init-config")]
    InitConfig {
        /// Output path
        #[structopt(long, parse(from_os_str))]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let opt = Opt::from_args();

    // Load configuration
    let mut config = match &opt.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };

    let result = match opt.cmd {
        Command::Simulate {
            transfers,
            data_dir,
            metrics,
            metrics_addr,
        } => {
            if let Some(dir) = data_dir {
                std::fs::create_dir_all(&dir)?;
                config = config.with_data_dir(dir);
            }
            if metrics {
                config.metrics.enabled = true;
            }
            if let Some(addr) = metrics_addr {
                config.metrics.listen_addr = addr;
            }
            simulate(config, transfers).await
        }
        Command::Inspect { data_dir } => {
            let data_dir = data_dir.unwrap_or_else(|| {
                let mut dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
                dir.push("ferry");
                dir.push("local");
                dir
            });
            inspect(data_dir)
        }
        Command::InitConfig { output } => {
            config.to_file(&output)?;
            println!("{} {}", "Wrote configuration to".green(), output.display());
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

/// Runs transfers from the local side to the remote side and back.
async fn simulate(config: NodeConfig, transfers: usize) -> Result<()> {
    if config.metrics.enabled {
        let addr: SocketAddr = config.metrics.listen_addr.parse().map_err(|e| {
            NodeError::MetricsError(format!("invalid listen address {}: {}", config.metrics.listen_addr, e))
        })?;
        metrics::start_metrics_server(addr).await?;
    }

    let holder = config.devnet.holder;
    let fee = config.devnet.transport_fee;
    let mut devnet = Devnet::new(&config)?;
    let mut rng = rand::thread_rng();

    let beneficiaries: Vec<Address> = (0..transfers).map(|_| rng.gen()).collect();

    println!("{}", "Local -> remote".bold());
    for beneficiary in &beneficiaries {
        let amount = rng.gen_range(1..=100u128) * 10;
        let dest = devnet.prepare(Side::Local, &holder, amount, beneficiary).await?;
        println!("  {} {} for {} ({} backing)", "prepared".cyan(), amount, short_hex(beneficiary), dest);
    }
    round_trip(&mut devnet, Side::Local, fee).await?;

    println!("{}", "Remote -> local".bold());
    for beneficiary in &beneficiaries {
        let balance = devnet.endpoint(Side::Remote).accounting.balance_of(beneficiary);
        if balance < 2 {
            continue;
        }
        let dest = devnet.prepare(Side::Remote, beneficiary, balance / 2, &holder).await?;
        println!("  {} {} from {} ({} backing)", "prepared".cyan(), balance / 2, short_hex(beneficiary), dest);
    }
    round_trip(&mut devnet, Side::Remote, fee).await?;

    summary(&devnet, &holder, &beneficiaries).await;

    if config.metrics.enabled {
        info!("Simulation done, serving metrics until interrupted");
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

/// Flushes `from`, delivers the envelope and claims everything on the other side.
async fn round_trip(devnet: &mut Devnet, from: Side, fee: u128) -> Result<()> {
    let to = from.other();
    let ready = {
        let endpoint = devnet.endpoint(from);
        let bridge = endpoint.bridge.lock().await;
        bridge.pending_balance_of(&endpoint.token) > 0 || bridge.queue_of(&endpoint.token).map_or(false, |q| !q.is_empty())
    };
    if ready {
        devnet.flush(from, fee).await?;
    }

    let delivered = devnet.relay().await?;
    let claimed = devnet.claim_ready(to).await?;
    println!(
        "  {} {} envelopes, {} {} leaves on {}",
        "relayed".yellow(),
        delivered,
        "claimed".green(),
        claimed,
        to
    );
    Ok(())
}

async fn summary(devnet: &Devnet, holder: &Address, beneficiaries: &[Address]) {
    println!("{}", "Summary".bold());
    for side in [Side::Local, Side::Remote] {
        let endpoint = devnet.endpoint(side);
        let bridge = endpoint.bridge.lock().await;
        let inbox = bridge.inbox_of(&endpoint.token);
        println!(
            "  {}: holder {}, surplus {}, inbox nonce {}, pending credit {}",
            side.to_string().bold(),
            endpoint.accounting.balance_of(holder),
            endpoint.accounting.current_surplus(&endpoint.token),
            inbox.nonce,
            bridge.pending_credit_of(&endpoint.token)
        );
        if !bridge.storage_healthy() {
            println!("    {}", "storage is behind memory, see logs".red());
        }
        for beneficiary in beneficiaries {
            println!(
                "    {} {}",
                short_hex(beneficiary),
                endpoint.accounting.balance_of(beneficiary)
            );
        }
    }

    let claims = devnet
        .events()
        .iter()
        .filter(|(_, event)| matches!(event, BridgeEvent::Claimed { .. } | BridgeEvent::BatchSettled { .. }))
        .count();
    println!("  {} events, {} settlements", devnet.events().len(), claims);
}

/// Prints the persisted state of one bridge.
fn inspect(data_dir: PathBuf) -> Result<()> {
    let store = StateStore::open_read_only(&data_dir)?;
    let (state, replay) = store.load()?;

    println!("{} {}", "Bridge state at".bold(), data_dir.display());
    for (token, token_state) in state.iter() {
        println!("{}", short_hex(token).cyan());
        match &token_state.mapping {
            Some(mapping) => println!("  mapping:        {}", mapping),
            None => println!("  mapping:        {}", "none".red()),
        }
        println!(
            "  outbox:         nonce {}, {} leaves, balance {}, root {}",
            token_state.outbox.nonce,
            token_state.outbox.count(),
            token_state.outbox.balance,
            short_hex(&token_state.outbox.root())
        );
        println!(
            "  queue:          {} entries, total {}",
            token_state.queue.len(),
            token_state.queue.total
        );
        println!(
            "  inbox:          nonce {}, root {}",
            token_state.inbox.nonce,
            short_hex(&token_state.inbox.root)
        );
        println!("  pending credit: {}", token_state.pending_credit);
        println!(
            "  executed:       {}",
            replay.set_of(token).map(|set| set.count()).unwrap_or(0)
        );
    }
    Ok(())
}
