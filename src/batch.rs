//! Batch driver
//!
//! Enumerates images in a directory, restores each one and writes it to the
//! output directory under the same file name. A failing file is logged and
//! counted; the rest of the batch carries on.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

use crate::deconv::{Backend, CancelToken, DeconvError, DeconvOptions, Psf};
use crate::image_io::{self, ImageIoError};
use crate::pipeline::ChannelPipeline;
use crate::progress::{BatchSummary, ProgressCallback};

/// Batch error types
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Input directory not found: {0}")]
    InputNotFound(PathBuf),

    #[error("No image files found in {0}")]
    NoImages(PathBuf),

    #[error("Deconvolution failed: {0}")]
    Deconv(#[from] DeconvError),

    #[error("Image I/O failed: {0}")]
    ImageIo(#[from] ImageIoError),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;

/// Collect supported image files directly inside `input_dir`, sorted.
pub fn collect_images(input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Err(BatchError::InputNotFound(input_dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_file() && image_io::is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Restores every image of a directory with shared PSF and backend
#[derive(Debug)]
pub struct BatchProcessor {
    pipeline: ChannelPipeline,
    psf: Psf,
    threads: usize,
    cancel: CancelToken,
}

impl BatchProcessor {
    /// The backend is fixed here for the whole batch.
    pub fn new(backend: Backend, options: DeconvOptions, psf: Psf) -> Result<Self> {
        Ok(Self {
            pipeline: ChannelPipeline::new(backend, options)?,
            psf,
            threads: 1,
            cancel: CancelToken::new(),
        })
    }

    /// Number of images processed concurrently (0 means one per CPU)
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = if threads == 0 { num_cpus::get() } else { threads };
        self
    }

    /// Deconvolve the channels of each image concurrently
    #[must_use]
    pub fn with_parallel_channels(mut self, parallel: bool) -> Self {
        self.pipeline = self.pipeline.with_parallel_channels(parallel);
        self
    }

    /// Token that stops the batch between iterations when set
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Restore one file
    pub fn process_file(&self, input: &Path, output: &Path) -> Result<()> {
        let image = image_io::load_image_rgb(input)?;
        tracing::debug!(
            "Loaded {} ({}x{})",
            input.display(),
            image.width(),
            image.height()
        );
        let restored = self
            .pipeline
            .process_with_cancel(&image, &self.psf, &self.cancel)?;
        image_io::save_image(output, &restored)?;
        tracing::info!("Saved: {}", output.display());
        Ok(())
    }

    /// Restore every supported image in `input_dir` into `output_dir`.
    pub fn run(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        progress: &dyn ProgressCallback,
    ) -> Result<BatchSummary> {
        let files = collect_images(input_dir)?;
        if files.is_empty() {
            return Err(BatchError::NoImages(input_dir.to_path_buf()));
        }
        std::fs::create_dir_all(output_dir)?;

        progress.on_start(files.len());
        let failed = AtomicUsize::new(0);

        let process = |input: &PathBuf| {
            let Some(name) = input.file_name() else {
                return;
            };
            let output = output_dir.join(name);
            let ok = match self.process_file(input, &output) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("Error processing {}: {}", input.display(), e);
                    failed.fetch_add(1, Ordering::Relaxed);
                    false
                }
            };
            progress.on_file_complete(input, ok);
        };

        if self.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| BatchError::ThreadPool(e.to_string()))?;
            pool.install(|| files.par_iter().for_each(process));
        } else {
            files.iter().for_each(process);
        }

        progress.on_finish();

        let failed = failed.into_inner();
        Ok(BatchSummary {
            total: files.len(),
            succeeded: files.len() - failed,
            failed,
        })
    }
}
