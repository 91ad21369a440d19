// src/main.rs
//
// Replay driver: feeds recorded detector + pose output through the pipeline,
// optionally with the matching frame images for evidence capture.

use anyhow::{Context, Result};
use boundary_watch::evidence::{EventLog, EvidenceRecorder, FsEvidenceSink};
use boundary_watch::pipeline::{FrameInput, PipelineEvent, PipelineMetrics, ViolationPipeline};
use boundary_watch::replay;
use boundary_watch::types::IdentityStatus;
use boundary_watch::{BoundaryModel, Config};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "boundary-watch", about = "Replay detections against a boundary and log violations")]
struct Args {
    /// YAML configuration
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Per-frame detector + pose output (JSONL)
    #[arg(short, long)]
    observations: PathBuf,

    /// Directory of frame images, paired with records in sorted order
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Override session.boundary_path
    #[arg(short, long)]
    boundary: Option<PathBuf>,

    /// Override evidence.output_dir
    #[arg(long)]
    output: Option<PathBuf>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        Config::default()
    };
    if let Some(output) = &args.output {
        config.evidence.output_dir = output.to_string_lossy().into_owned();
    }

    init_tracing(&config.logging.level);
    info!("🏁 Boundary watch starting");
    if !args.config.exists() {
        warn!("{} not found, using defaults", args.config.display());
    }

    let boundary_path = args
        .boundary
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.session.boundary_path));
    let boundary = BoundaryModel::load(&boundary_path)
        .with_context(|| format!("loading boundary {}", boundary_path.display()))?;

    let records = replay::read_observations(&args.observations)?;
    let images = match &args.frames {
        Some(dir) => replay::find_frame_images(dir)?,
        None => Vec::new(),
    };
    if !images.is_empty() && images.len() != records.len() {
        warn!(
            "{} frame images for {} frame records; evidence stops at the shorter",
            images.len(),
            records.len()
        );
    }

    let metrics = PipelineMetrics::new();
    let output_dir = PathBuf::from(&config.evidence.output_dir);
    let log = EventLog::open(output_dir.join("violations.jsonl"))?;
    let recorder = EvidenceRecorder::spawn(
        config.evidence.clone(),
        Arc::new(FsEvidenceSink::new(config.evidence.jpeg_quality)),
        log,
        metrics.clone(),
    );
    let mut pipeline =
        ViolationPipeline::with_metrics(&config, boundary, metrics.clone()).with_recorder(recorder);

    for (i, record) in records.iter().enumerate() {
        let timestamp_ms = record.timestamp_ms_or(config.session.fps);
        let mut input = FrameInput::new(record.frame_index, timestamp_ms, record.observations.clone());
        if let Some(path) = images.get(i) {
            match replay::load_frame(path, record.frame_index, timestamp_ms) {
                Ok(frame) => input = input.with_frame(Arc::new(frame)),
                Err(e) => warn!("Frame {} image unusable: {:#}", record.frame_index, e),
            }
        }

        pipeline.process_frame(input);

        for event in pipeline.drain_events() {
            report(&event);
        }

        if i > 0 && i % 300 == 0 {
            let m = metrics.summary();
            info!(
                "Progress: {}/{} frames, {} violations, {:.1} fps",
                i,
                records.len(),
                m.violations_logged,
                m.fps
            );
        }
        // Let the recorder worker run between frames on busy replays
        tokio::task::yield_now().await;
    }

    if let Err(e) = pipeline.shutdown().await {
        error!("Evidence recorder shutdown failed: {}", e);
    }

    print_summary(&pipeline, &output_dir);
    Ok(())
}

fn report(event: &PipelineEvent) {
    match event {
        PipelineEvent::IdentityEliminated { id, violations, .. } => {
            info!("⛔ P{} eliminated ({} violations)", id, violations)
        }
        PipelineEvent::IdentityBound { id, created, .. } => {
            info!("P{} bound by operator (new={})", id, created)
        }
        _ => {}
    }
}

fn print_summary(pipeline: &ViolationPipeline, output_dir: &Path) {
    let m = pipeline.metrics().summary();
    info!("\n========================================");
    info!("Session summary");
    info!("========================================");
    info!("  Frames: {} ({:.1} fps)", m.total_frames, m.fps);
    info!("  Identities created: {}", m.identities_created);
    info!("  Violations logged: {}", m.violations_logged);
    info!("  Eliminated: {}", m.identities_eliminated);
    info!(
        "  Evidence: {} stills, {} clips, {} failures, {} dropped frames",
        m.evidence_stills, m.evidence_clips, m.evidence_failures, m.handoff_dropped
    );
    if m.incomplete_evidence > 0 {
        warn!("  Incomplete evidence episodes: {}", m.incomplete_evidence);
    }
    for (id, count) in pipeline.violation_counts() {
        let status = pipeline
            .identity_status(id)
            .unwrap_or(IdentityStatus::Lost);
        info!("  P{}: {} violation(s) [{}]", id, count, status.as_str());
    }
    info!("  Log: {}", output_dir.join("violations.jsonl").display());

    match serde_json::to_string_pretty(&m) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Could not serialize summary: {}", e),
    }
}
