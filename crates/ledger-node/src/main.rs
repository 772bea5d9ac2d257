mod api;
mod constants;
mod error;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use ledger_core::{
    chain::{audit_blocks, load_or_init, ChainStore},
    constants::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY, MAX_TRANSACTION_LEN, MIN_DIFFICULTY, NONCE_BATCH},
    Chain, Ledger, LedgerConfig,
};
use ledger_storage::SledStore;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn, Level};

use crate::api::AppState;
use crate::constants::{DEFAULT_CORS_ORIGIN, DEFAULT_LISTEN};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Data directory for sled. Without it the chain lives in memory only.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Initial mining difficulty (leading zero hex digits)
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    #[arg(long, default_value_t = MIN_DIFFICULTY)]
    min_difficulty: u32,

    #[arg(long, default_value_t = MAX_DIFFICULTY)]
    max_difficulty: u32,

    /// Maximum transaction length in characters
    #[arg(long, default_value_t = MAX_TRANSACTION_LEN)]
    max_tx_len: usize,

    /// Nonces tried per parallel mining batch
    #[arg(long, default_value_t = NONCE_BATCH)]
    nonce_batch: u64,

    /// Origin allowed to call the API from a browser
    #[arg(long, default_value = DEFAULT_CORS_ORIGIN)]
    cors_origin: String,
}

impl Args {
    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            default_difficulty: self.difficulty,
            min_difficulty: self.min_difficulty,
            max_difficulty: self.max_difficulty,
            max_transaction_len: self.max_tx_len,
            nonce_batch: self.nonce_batch,
        }
    }
}

/// Open the store and load its chain, logging every fault if it is corrupt.
fn open_store(dir: &Path) -> anyhow::Result<(Arc<SledStore>, Chain)> {
    let store = Arc::new(SledStore::open(dir)?);
    match load_or_init(store.as_ref()) {
        Ok(chain) => Ok((store, chain)),
        Err(err) => {
            if let Ok(blocks) = store.load_all() {
                for fault in audit_blocks(&blocks) {
                    error!("stored chain: {fault}");
                }
            }
            Err(err)
        }
    }
}

async fn shutdown_signal(ledger: Arc<Ledger>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    if ledger.cancel_mining() {
        warn!("cancelled in-flight mining, its transactions stay pending");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.ledger_config();
    config.validate()?;

    let (store, chain) = match &args.data_dir {
        Some(dir) => {
            let (store, chain) = open_store(dir)?;
            (Some(store), chain)
        }
        None => (None, Chain::new()),
    };
    info!("chain ready with {} blocks", chain.len());

    let mut ledger = Ledger::with_chain(config, chain)?;
    if let Some(store) = &store {
        ledger = ledger.with_store(Arc::clone(store) as Arc<dyn ChainStore>);
    }
    let ledger = Arc::new(ledger);
    let config = ledger.config();
    info!(
        "mining at difficulty {} (admin range {}..={}), {} nonces per batch",
        config.default_difficulty, config.min_difficulty, config.max_difficulty, config.nonce_batch
    );
    let state = AppState {
        ledger: Arc::clone(&ledger),
    };

    let origin: HeaderValue = args
        .cors_origin
        .parse()
        .with_context(|| format!("invalid CORS origin {}", args.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(ledger))
        .await?;

    if let Some(store) = store {
        store.close()?;
    }
    info!("ledger-node stopped");
    Ok(())
}
