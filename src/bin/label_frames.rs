//! label_frames - run the on-device classifier over a directory of still frames.
//!
//! Frames are read in file-name order (the output of a video-to-images step),
//! so background learning behaves as it would on the live stream.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use cage_monitor::detect::ActivityLabel;
use cage_monitor::history::ActivityHistory;
use cage_monitor::ingest::{FrameSource, ImageDirSource};
use cage_monitor::{CameraId, LocalClassifier, MonitorConfig};

const PROGRESS_EVERY: u64 = 30;

#[derive(Parser, Debug)]
#[command(author, version, about = "Label still frames with the on-device classifier")]
struct Args {
    /// Directory of .jpg/.jpeg/.png frames.
    dir: PathBuf,

    /// Config file supplying zones and thresholds.
    #[arg(long, env = "CAGE_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Emit one JSON object per frame instead of tab-separated text.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FrameLabel<'a> {
    file: &'a str,
    label: ActivityLabel,
    confidence: f32,
    scores: &'a BTreeMap<ActivityLabel, f32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = MonitorConfig::load_from(args.config.as_deref())?;
    let mut classifier = LocalClassifier::new(
        cfg.pipeline.rules(),
        cfg.pipeline.zones.clone(),
        cfg.background.clone(),
    );
    let mut source = ImageDirSource::open(CameraId::new("replay"), &args.dir)?;
    if source.is_empty() {
        return Err(anyhow!("no frames found in {}", args.dir.display()));
    }
    log::info!("labelling {} frames from {}", source.len(), args.dir.display());

    // Sized to the whole directory so the final pattern covers every frame.
    let mut history = ActivityHistory::new(source.len());
    let mut counts: BTreeMap<ActivityLabel, u64> = BTreeMap::new();
    let started = Instant::now();
    let mut processed = 0u64;
    let mut failed = 0u64;
    loop {
        let file = source
            .peek_path()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned());
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                log::warn!("skipping frame: {:#}", err);
                failed += 1;
                continue;
            }
        };
        let file = file.unwrap_or_default();
        let result = classifier.classify_frame(&frame);
        if args.json {
            let line = FrameLabel {
                file: &file,
                label: result.label,
                confidence: result.confidence,
                scores: &result.scores,
            };
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("{}\t{}\t{:.3}", file, result.label, result.confidence);
        }

        *counts.entry(result.label).or_default() += 1;
        history.record(result);
        processed += 1;
        if processed % PROGRESS_EVERY == 0 {
            log::info!("processed {}/{} frames", processed, source.len());
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    log::info!(
        "done: {} frames labelled, {} skipped in {:.1}s ({:.1} fps)",
        processed,
        failed,
        elapsed,
        processed as f64 / elapsed.max(1e-6)
    );
    for (label, count) in &counts {
        log::info!(
            "  {:<16} {:>6} ({:.1}%)",
            label.as_str(),
            count,
            *count as f64 * 100.0 / processed.max(1) as f64
        );
    }
    log::info!("activity pattern:");
    for (label, average) in history.snapshot().iter() {
        log::info!("  {:<16} {:.3}", label.as_str(), average);
    }
    Ok(())
}
