use anyhow::{Context, Result};
use error::Error;
use indicatif::{ProgressBar, ProgressStyle};
use labels::{AnnotationSet, MatchPolicy};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use structopt::StructOpt;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;

mod config;
mod enrich;
mod error;
mod extract;
mod labels;
mod landmarks;
mod reconcile;
mod source;
mod table;

#[derive(Debug, StructOpt)]
struct Opt {
    /// Label Studio export with per-video annotation intervals.
    #[structopt(short, long, default_value = "project-label-studio.json")]
    annotations: PathBuf,

    /// Directory holding one pose stream sidecar per video.
    #[structopt(short, long, default_value = "Videos APO")]
    input_dir: PathBuf,

    /// Per-frame output table.
    #[structopt(long, default_value = "mediapipe_labels_dataset.csv")]
    frames_csv: PathBuf,

    /// Enriched output table.
    #[structopt(long, default_value = "mediapipe_labels_dataset_enriched.csv")]
    enriched_csv: PathBuf,

    /// Worker threads for per-video extraction.
    #[structopt(short, long, default_value = "4")]
    workers: usize,

    /// Overlapping-interval resolution: first-match or most-specific.
    #[structopt(short, long, default_value = "first-match")]
    match_policy: MatchPolicy,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(short, long)]
    show_progress: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Turn pose streams into the labeled per-frame table.
    Extract,
    /// Derive velocities, joint angles and segments from an existing per-frame table.
    Enrich,
    /// Extract and enrich in one pass.
    Run,
    /// Print summary statistics for an existing enriched table.
    Stats,
}

/// Report every missing required input, not just the first.
fn preflight(paths: &[&Path]) -> Result<(), Error> {
    let mut missing = 0;
    for path in paths {
        if !path.exists() {
            error!("{}", Error::MissingInput(path.to_path_buf()));
            missing += 1;
        }
    }
    if missing > 0 {
        Err(Error::Preflight(missing))
    } else {
        Ok(())
    }
}

/// Extract every mapped video, in parallel, and merge the results in
/// `video_id` order so output is deterministic regardless of which worker
/// finishes first.
fn extract_all(
    opt: &Opt,
    annotations: &AnnotationSet,
    config: &config::FeatureConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<extract::FrameRecord>> {
    let mut tasks = Vec::new();
    for video in annotations.videos() {
        match video.expected_file.as_deref() {
            Some(file) => {
                let stream = source::sidecar_path(&opt.input_dir, file);
                if stream.exists() {
                    info!(video_id = video.video_id, file, "video mapped");
                    tasks.push((video.video_id, stream));
                } else {
                    warn!(
                        video_id = video.video_id,
                        file,
                        stream = ?stream,
                        "no pose stream on disk, skipping video"
                    );
                }
            }
            None => warn!(
                video_id = video.video_id,
                "annotation entry names no upload file, skipping video"
            ),
        }
    }

    let progress = if opt.show_progress {
        Some(
            ProgressBar::new(tasks.len() as u64).with_style(
                ProgressStyle::default_bar()
                    .template("{prefix:.bold.dim} {bar:40} {pos}/{len} {wide_msg}"),
            ),
        )
    } else {
        None
    };

    let workers = opt.workers.max(1);
    let (task_tx, task_rx) = crossbeam::channel::unbounded();
    for task in tasks {
        task_tx.send(task).expect("queue outlives senders");
    }
    drop(task_tx);

    let (done_tx, done_rx) = crossbeam::channel::unbounded();

    crossbeam::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let progress = progress.clone();
            handles.push(scope.spawn(move |_| {
                for (video_id, stream) in task_rx.iter() {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let mut stream_source = source::JsonlSource::open(&stream)?;
                    let records = extract::extract_video(
                        video_id,
                        &mut stream_source,
                        annotations,
                        config,
                        cancel,
                    )?;
                    if let Some(progress) = &progress {
                        progress.inc(1);
                    }
                    done_tx
                        .send((video_id, records))
                        .expect("collector outlives workers");
                }
                Ok::<_, Error>(())
            }));
        }
        drop(done_tx);

        for handle in handles {
            handle
                .join()
                .expect("extraction worker panicked")
                .context("failed extracting video")?;
        }
        Ok::<_, anyhow::Error>(())
    })
    .expect("worker scope panicked")?;

    if let Some(progress) = &progress {
        progress.finish_and_clear();
    }

    let mut per_video: Vec<(i64, Vec<extract::FrameRecord>)> = done_rx.iter().collect();
    per_video.sort_by_key(|(video_id, _)| *video_id);

    let mut all = Vec::new();
    for (_, records) in per_video {
        all.extend(records);
    }
    Ok(all)
}

fn log_label_distribution(records: &[extract::FrameRecord]) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.label.as_str()).or_default() += 1;
    }
    for (label, count) in counts {
        info!(label, frames = count, "label distribution");
    }
}

fn log_enriched_summary(records: &[enrich::EnrichedRecord]) {
    let mut videos = BTreeSet::new();
    let mut segments = BTreeSet::new();
    let mut labels: BTreeMap<&str, usize> = BTreeMap::new();
    let mut low_quality = 0usize;
    for record in records {
        videos.insert(record.frame.video_id);
        segments.insert((record.frame.video_id, record.segment_id));
        *labels.entry(record.frame.label.as_str()).or_default() += 1;
        if record.low_quality {
            low_quality += 1;
        }
    }
    info!(
        rows = records.len(),
        videos = videos.len(),
        segments = segments.len(),
        "enriched table summary"
    );
    if !records.is_empty() {
        info!(
            frames = low_quality,
            pct = 100.0 * low_quality as f64 / records.len() as f64,
            "low quality frames"
        );
    }
    for (label, count) in labels {
        info!(label, frames = count, "label distribution");
    }
}

fn run_extract(
    opt: &Opt,
    config: &config::FeatureConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<extract::FrameRecord>> {
    preflight(&[&opt.annotations, &opt.input_dir])?;

    let annotations =
        AnnotationSet::load(&opt.annotations).context("failed loading annotation export")?;
    info!(videos = annotations.videos().len(), "annotations loaded");

    let records = extract_all(opt, &annotations, config, cancel)?;
    table::write_frame_table(&opt.frames_csv, &records)
        .context("failed writing per-frame table")?;
    info!(rows = records.len(), path = ?opt.frames_csv, "per-frame table written");
    log_label_distribution(&records);
    Ok(records)
}

fn run_enrich(
    opt: &Opt,
    config: &config::FeatureConfig,
    records: Vec<extract::FrameRecord>,
) -> Result<()> {
    let enriched = enrich::enrich(records, config);
    let low_quality = enriched.iter().filter(|e| e.low_quality).count();
    table::write_enriched_table(&opt.enriched_csv, &enriched, config)
        .context("failed writing enriched table")?;
    info!(
        rows = enriched.len(),
        low_quality,
        path = ?opt.enriched_csv,
        "enriched table written"
    );
    Ok(())
}

fn main() -> Result<()> {
    let mut opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(std::mem::take(&mut opt.log_level)),
    )?;

    let mut config = config::FeatureConfig::default();
    config.match_policy = opt.match_policy;
    config
        .validate(landmarks::NUM_LANDMARKS)
        .context("feature configuration does not fit the skeleton")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_ctrl_c = cancel.clone();
    ctrlc::set_handler(move || {
        cancel_ctrl_c.store(true, Ordering::SeqCst);
    })
    .context("failed setting Ctrl-C handler")?;

    match opt.command {
        Command::Extract => {
            run_extract(&opt, &config, &cancel)?;
        }
        Command::Enrich => {
            preflight(&[&opt.frames_csv])?;
            let records = table::read_frame_table(&opt.frames_csv)
                .context("failed reading per-frame table")?;
            info!(rows = records.len(), path = ?opt.frames_csv, "per-frame table loaded");
            run_enrich(&opt, &config, records)?;
        }
        Command::Run => {
            let records = run_extract(&opt, &config, &cancel)?;
            run_enrich(&opt, &config, records)?;
        }
        Command::Stats => {
            preflight(&[&opt.enriched_csv])?;
            let enriched = table::read_enriched_table(&opt.enriched_csv, &config)
                .context("failed reading enriched table")?;
            log_enriched_summary(&enriched);
        }
    }

    Ok(())
}
