// THEORY:
// Batch processing of a directory of videos. Videos share no mutable state, so
// each one is an independent task for a fixed-size worker pool.
//
// Key architectural principles:
// 1.  **Single Dispatcher**: tasks enter one unbounded channel; a dispatcher
//     hands them to the workers round-robin.
// 2.  **Bounded Work**: a worker runs one video at a time on tokio's blocking
//     pool, so at most `worker_count` analyses are in flight.
// 3.  **One Collection Point**: every result comes back through its own
//     `oneshot` channel and the batch accumulates `{video: average_snr}` in one
//     map. A failed video is logged and skipped; it never aborts the batch.

use crate::core_modules::preprocess::{subtract_reference, sum_frames};
use crate::core_modules::utils::image_helper::image_helper::{
    load_reference, load_stack, save_gray_stack, save_rgb_stack,
};
use crate::core_modules::utils::report_writer::{
    BATCH_SUMMARY_FILE, FLICKER_DATA_FILE, SNR_DATA_FILE, write_batch_summary, write_flicker_data,
    write_snr_data,
};
use crate::error::{FlickerError, Result};
use crate::pipeline::{FlickerPipeline, PipelineConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub const BINARY_MASK_FILE: &str = "binary_mask.tif";
pub const ANNOTATED_FILE: &str = "annotated.tif";

/// What the batch keeps from one analyzed video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSummary {
    /// File name of the source video, used as the batch summary key.
    pub name: String,
    pub output_dir: PathBuf,
    pub flicker_count: usize,
    /// Threshold of the final detection attempt.
    pub threshold: u8,
    pub attempts: usize,
    /// `None` when no flicker validated.
    pub average_snr: Option<f64>,
}

/// True for `.tif`/`.tiff` files, case-insensitively.
fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lists the TIFF videos directly inside `dir`, sorted by path.
pub fn discover_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_tiff(&path) {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

/// Analyzes one video and writes its artifacts to `<stem>_new/` next to it.
pub fn process_video_file(path: &Path, pipeline: &FlickerPipeline) -> Result<VideoSummary> {
    let raw = load_stack(path)?;
    let report = pipeline.generate_report(&raw)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let output_dir = parent.join(format!("{}_new", file_stem(path)));
    std::fs::create_dir_all(&output_dir)?;

    save_gray_stack(&output_dir.join(BINARY_MASK_FILE), &report.detection.binary_masks)?;
    save_rgb_stack(&output_dir.join(ANNOTATED_FILE), &report.detection.annotated_frames)?;
    write_flicker_data(&output_dir.join(FLICKER_DATA_FILE), &report.summaries())?;
    write_snr_data(&output_dir.join(SNR_DATA_FILE), &report.snr)?;

    let summary = VideoSummary {
        name: file_name(path),
        output_dir,
        flicker_count: report.detection.flickers.len(),
        threshold: report.detection.threshold,
        attempts: report.detection.attempts,
        average_snr: report.average_snr(),
    };
    tracing::info!(
        "{}: {} flickers at threshold {} ({} attempts), average SNR {:?}",
        summary.name,
        summary.flicker_count,
        summary.threshold,
        summary.attempts,
        summary.average_snr
    );
    Ok(summary)
}

pub struct VideoTask {
    pub path: PathBuf,
    pub result_sender: oneshot::Sender<Result<VideoSummary>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<VideoTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<FlickerPipeline>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<VideoTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<VideoTask>())
            .unzip();

        // Dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(failed) = worker_senders[worker_idx].send(task) {
                    let _ = failed.0.result_sender.send(Err(FlickerError::WorkerPool(
                        format!("worker {worker_idx} is no longer running"),
                    )));
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let mut workers = Vec::with_capacity(worker_count);
        for mut worker_receiver in worker_receivers {
            let worker_pipeline = Arc::clone(&pipeline);
            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let result = Self::process_video_worker(&worker_pipeline, task.path).await;
                    let _ = task.result_sender.send(result);
                }
            });
            workers.push(worker);
        }

        Self {
            task_sender,
            workers,
        }
    }

    async fn process_video_worker(pipeline: &Arc<FlickerPipeline>, path: PathBuf) -> Result<VideoSummary> {
        let pipeline = Arc::clone(pipeline);
        tokio::task::spawn_blocking(move || process_video_file(&path, &pipeline))
            .await
            .map_err(|e| FlickerError::WorkerPool(format!("analysis task failed: {e}")))?
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn process_video(&self, path: PathBuf) -> Result<VideoSummary> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = VideoTask {
            path,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| FlickerError::WorkerPool("failed to send task to worker pool".to_string()))?;

        result_receiver
            .await
            .map_err(|_| FlickerError::WorkerPool("failed to receive result from worker".to_string()))?
    }
}

/// Runs the pipeline over every video of a directory.
pub struct BatchRunner {
    pipeline: Arc<FlickerPipeline>,
    worker_count: usize,
}

impl BatchRunner {
    /// `workers` defaults to the number of logical CPUs.
    pub fn new(config: PipelineConfig, workers: Option<usize>) -> Result<Self> {
        if workers == Some(0) {
            return Err(FlickerError::InvalidParameter(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            pipeline: Arc::new(FlickerPipeline::new(config)?),
            worker_count: workers.unwrap_or_else(num_cpus::get),
        })
    }

    /// Analyzes every video in `input_dir` and writes the batch summary there.
    /// Returns `{video_name: average_snr}` for the videos that produced flickers.
    pub async fn run(&self, input_dir: &Path) -> Result<BTreeMap<String, f64>> {
        let videos = discover_videos(input_dir)?;
        let pool = WorkerPool::new(Arc::clone(&self.pipeline), self.worker_count);
        tracing::info!(
            "analyzing {} videos in {} with {} workers, starting threshold {}",
            videos.len(),
            input_dir.display(),
            pool.worker_count(),
            self.pipeline.config().threshold
        );

        let results =
            futures::future::join_all(videos.iter().map(|path| pool.process_video(path.clone()))).await;

        let mut averages = BTreeMap::new();
        for (path, result) in videos.iter().zip(results) {
            match result {
                Ok(VideoSummary {
                    name,
                    average_snr: Some(average),
                    ..
                }) => {
                    averages.insert(name, average);
                }
                Ok(summary) => {
                    tracing::warn!("skipping {}: no flickers validated", summary.name);
                }
                Err(e) => {
                    tracing::warn!("skipping {}: {e}", path.display());
                }
            }
        }

        write_batch_summary(&input_dir.join(BATCH_SUMMARY_FILE), &averages)?;
        tracing::info!("{} of {} videos contributed to the summary", averages.len(), videos.len());
        Ok(averages)
    }
}

/// Subtracts one reference image from every video of `input_dir`, writing
/// `<stem>_8bit.tif` files into `output_dir`. The reference is loaded before
/// any video is touched.
pub fn subtract_reference_dir(input_dir: &Path, reference: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let reference = load_reference(reference)?;
    std::fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for path in discover_videos(input_dir)? {
        let stack = load_stack(&path)?;
        let corrected = subtract_reference(&stack, &reference)?;
        let output = output_dir.join(format!("{}_8bit.tif", file_stem(&path)));
        save_gray_stack(&output, &corrected)?;
        tracing::info!("saved {}", output.display());
        written.push(output);
    }
    Ok(written)
}

/// Sums groups of `frames_per_sum` frames for every video of `input_dir`,
/// writing `<stem>_summed.tif` files into `output_dir`.
pub fn sum_frames_dir(input_dir: &Path, output_dir: &Path, frames_per_sum: usize) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for path in discover_videos(input_dir)? {
        let stack = load_stack(&path)?;
        let summed = sum_frames(&stack, frames_per_sum)?;
        let output = output_dir.join(format!("{}_summed.tif", file_stem(&path)));
        save_gray_stack(&output, &summed)?;
        tracing::info!("saved {} ({} frames)", output.display(), summed.len());
        written.push(output);
    }
    Ok(written)
}
