//! # hubd
//!
//! Single-node development chain for the Hub application.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use node_runtime::genesis::{read_genesis, write_genesis, GenesisBuilder, GenesisConfig};
use node_runtime::{init_tracing, DevChain, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "hubd")]
#[command(about = "Hub application node with a single-node development driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a development genesis document.
    Init {
        #[arg(long, default_value_t = 1)]
        validators: u8,
        /// Protocol version the chain starts under.
        #[arg(long, default_value_t = 0)]
        genesis_version: u64,
        #[arg(long, default_value = "genesis.json")]
        output: PathBuf,
        #[arg(long)]
        chain_id: Option<String>,
    },
    /// Run the chain.
    Start(StartArgs),
}

#[derive(Args, Debug)]
struct StartArgs {
    #[arg(long)]
    chain_id: Option<String>,
    #[arg(long)]
    genesis: Option<PathBuf>,
    #[arg(long)]
    validators: Option<u8>,
    #[arg(long)]
    block_interval_ms: Option<u64>,
    /// Stop after this many blocks; 0 runs until Ctrl+C.
    #[arg(long)]
    blocks: Option<u64>,
    /// Export the final state to this file.
    #[arg(long)]
    export: Option<PathBuf>,
    #[arg(long)]
    zero_height: bool,
    #[arg(long)]
    log: Option<String>,
}

impl StartArgs {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(v) = self.chain_id {
            config.chain_id = v;
        }
        if self.genesis.is_some() {
            config.genesis_path = self.genesis;
        }
        if let Some(v) = self.validators {
            config.dev_validators = v;
        }
        if let Some(v) = self.block_interval_ms {
            config.block_interval_ms = v;
        }
        if let Some(v) = self.blocks {
            config.blocks = v;
        }
        if self.export.is_some() {
            config.export_path = self.export;
        }
        config.zero_height |= self.zero_height;
        if let Some(v) = self.log {
            config.log_level = v;
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn genesis_bytes(config: &NodeConfig) -> Result<Vec<u8>> {
    if let Some(path) = &config.genesis_path {
        return read_genesis(path);
    }
    info!("[node] no genesis file given, generating {} dev validators", config.dev_validators);
    let state = GenesisBuilder::new(GenesisConfig {
        chain_id: config.chain_id.clone(),
        validators: config.dev_validators,
        ..Default::default()
    })
    .build()?;
    Ok(state.to_canonical_bytes()?)
}

async fn run(config: NodeConfig) -> Result<()> {
    let genesis = genesis_bytes(&config)?;
    let mut chain = DevChain::init(&config.app, &config.chain_id, genesis, now()).context("InitChain failed")?;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.block_interval_ms.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("[node] Ctrl+C received, stopping at height {}", chain.height());
                break;
            }
        }
        let (summary, _) = chain.produce_block().inspect_err(|e| {
            error!("[node] halted at height {}: {}", chain.height() + 1, e);
        })?;
        info!(
            "[node] block {} app_hash={} txs={} protocol=v{}",
            summary.height,
            hex::encode(summary.app_hash),
            summary.txs,
            summary.app_version
        );
        if config.blocks > 0 && summary.height >= config.blocks {
            break;
        }
    }

    if let Some(path) = &config.export_path {
        let (bytes, validators) = chain.export(config.zero_height).context("export failed")?;
        write_genesis(path, &bytes)?;
        info!(
            "[node] exported height {} with {} validators (zero height: {})",
            chain.height(),
            validators.len(),
            config.zero_height
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = NodeConfig::from_env().context("loading configuration")?;

    match cli.command {
        Command::Init {
            validators,
            genesis_version,
            output,
            chain_id,
        } => {
            init_tracing(&config.log_level)?;
            let state = GenesisBuilder::new(GenesisConfig {
                chain_id: chain_id.unwrap_or(config.chain_id),
                validators,
                genesis_version,
                ..Default::default()
            })
            .build()?;
            write_genesis(&output, &state.to_canonical_bytes()?)
        }
        Command::Start(args) => {
            args.apply(&mut config);
            init_tracing(&config.log_level)?;
            config.validate()?;
            info!(
                "[node] chain {} invariant_level={} keep_recent={}",
                config.chain_id, config.app.invariant_level, config.app.keep_recent
            );
            run(config).await
        }
    }
}
