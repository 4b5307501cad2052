mod addresses;
mod changelog;
mod classify;
mod config;
mod engine;
mod frame;
mod models;
mod oui;
mod pipeline;
mod store;
mod web;

use crate::addresses::AddressFilter;
use crate::changelog::UpdateSink;
use crate::config::AppConfig;
use crate::pipeline::{PipelineStats, WorkerContext};
use crate::store::TopologyStore;
use crate::web::AppState;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Arc::new(AppConfig::from_env());

    match &config.replay_file {
        Some(path) => tracing::info!("starting wavemap on {} (replay: {path})", config.http_bind),
        None => tracing::info!(
            "starting wavemap on {} (interface: {})",
            config.http_bind,
            config.capture_interface
        ),
    }

    // The store starts empty every run; there is no cross-run persistence.
    let store = Arc::new(TopologyStore::new());
    let filter = Arc::new(AddressFilter::new(config.deny_macs.iter().copied()));
    let sink = UpdateSink::new(256);
    let stats = Arc::new(PipelineStats::default());
    let done = Arc::new(AtomicBool::new(false));

    let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
    let replay = config.replay_file.is_some();
    let _producer = match &config.replay_file {
        Some(path) => {
            pipeline::spawn_replay(path.clone(), frame_tx, Arc::clone(&done), Arc::clone(&stats))
        }
        None => pipeline::spawn_capture(
            config.capture_interface.clone(),
            frame_tx,
            Arc::clone(&done),
            Arc::clone(&stats),
        ),
    };

    let ctx = WorkerContext {
        store: Arc::clone(&store),
        filter,
        sink: sink.clone(),
        stats: Arc::clone(&stats),
    };
    let worker_count = pipeline::worker_count(config.worker_threads, replay);
    let workers = pipeline::spawn_workers(frame_rx, Arc::clone(&done), ctx, worker_count);
    tracing::info!("spawned {worker_count} workers");

    web::serve(AppState {
        config: config.clone(),
        store,
        sink,
        stats: stats.clone(),
        done: done.clone(),
    })
    .await?;

    // Serve returned, so the completion flag is set; wait for the workers to
    // finish draining before reporting final counters.
    for worker in workers {
        let _ = worker.join();
    }
    let view = stats.view();
    tracing::info!(
        frames = view.frames_seen,
        preamble_drops = view.preamble_drops,
        decode_drops = view.decode_drops,
        classify_drops = view.classify_drops,
        batches = view.batches_published,
        "pipeline stopped"
    );
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}
