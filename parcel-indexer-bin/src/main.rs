//! Binary runner for the parcel indexer.
//!
//! Replays a JSON event journal against an in-memory dataset, reading
//! per-license chain state over RPC, and reports what was built. The
//! journal is a JSON array of events in canonical order.

use std::sync::Arc;

use alloy::primitives::Address;
use parcel_runtime::adapter::{LicenseSource, VersionAdapter};
use parcel_runtime::chain::{ChainClient, ChainLicenseSource};
use parcel_runtime::config::IndexerConfig;
use parcel_runtime::entities::EntityKind;
use parcel_runtime::indexer::LoggingRegistry;
use parcel_runtime::repo::MemoryRepository;
use parcel_runtime::{Event, Indexer, IndexerError};

#[tokio::main]
async fn main() -> Result<(), IndexerError> {
    setup_log();

    let journal_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PARCEL_EVENT_LOG").ok())
        .ok_or_else(|| {
            IndexerError::ConfigError("usage: parcel-indexer <event-log.json>".into())
        })?;

    let rpc_url =
        std::env::var("PARCEL_RPC_URL").unwrap_or_else(|_| "http://localhost:8545".into());
    let registry: Address = std::env::var("PARCEL_REGISTRY_ADDRESS")
        .map_err(|_| IndexerError::ConfigError("PARCEL_REGISTRY_ADDRESS is required".into()))?
        .parse()
        .map_err(|e| IndexerError::ConfigError(format!("Invalid registry address: {e}")))?;

    let config = IndexerConfig::load();
    tracing::info!(
        lng_cells = config.grid.lng_cells,
        lat_cells = config.grid.lat_cells,
        mode = ?config.geometry_mode,
        journal = %journal_path,
        "starting replay"
    );

    let events = load_events(&journal_path)?;

    let client = ChainClient::new(&rpc_url)?;
    let source: Arc<dyn LicenseSource> = Arc::new(ChainLicenseSource::new(client, registry));
    let mut indexer = Indexer::new(
        config,
        VersionAdapter::new(source),
        Box::new(MemoryRepository::new()),
        Arc::new(LoggingRegistry),
    );

    let summary = indexer.replay(&events).await;

    for kind in [
        EntityKind::Parcel,
        EntityKind::GridCoordinate,
        EntityKind::GeoPoint,
        EntityKind::Bid,
        EntityKind::Bidder,
        EntityKind::License,
    ] {
        tracing::info!(?kind, count = indexer.repo().count(kind), "dataset");
    }

    println!(
        "replayed {} events: {} applied, {} skipped, {} failed",
        events.len(),
        summary.applied,
        summary.skipped,
        summary.failed
    );
    Ok(())
}

fn load_events(path: &str) -> Result<Vec<Event>, IndexerError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| IndexerError::Storage(format!("read {path}: {e}")))?;
    Ok(serde_json::from_str(&raw)?)
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}
