//! Channel pipeline
//!
//! Splits a multi-channel image into independent planes, deconvolves each
//! one with the same PSF and options, and merges them back in order.

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;

use crate::deconv::{Backend, CancelToken, DeconvError, DeconvOptions, Psf, Result, RichardsonLucy};

// ============================================================
// Image
// ============================================================

/// Multi-channel float image with shape (height, width, channels)
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Array3<f32>,
}

impl Image {
    /// Wrap a (height, width, channels) array
    pub fn new(data: Array3<f32>) -> Result<Self> {
        let (h, w, ch) = data.dim();
        if h == 0 || w == 0 || ch == 0 {
            return Err(DeconvError::InvalidParameter(format!(
                "image must be non-empty, got {}x{}x{}",
                h, w, ch
            )));
        }
        Ok(Self { data })
    }

    /// Merge planes back into an image, preserving their order
    pub fn from_channels(channels: Vec<Array2<f32>>) -> Result<Self> {
        let first = channels.first().ok_or_else(|| {
            DeconvError::InvalidParameter("at least one channel is required".to_string())
        })?;
        let shape = first.dim();
        if let Some(bad) = channels.iter().find(|c| c.dim() != shape) {
            return Err(DeconvError::InvalidParameter(format!(
                "channel shape mismatch: {:?} vs {:?}",
                bad.dim(),
                shape
            )));
        }

        let views: Vec<_> = channels.iter().map(|c| c.view()).collect();
        let data = ndarray::stack(Axis(2), &views)
            .map_err(|e| DeconvError::InvalidParameter(e.to_string()))?;
        Self::new(data)
    }

    /// Split into one owned plane per channel
    pub fn split_channels(&self) -> Vec<Array2<f32>> {
        self.data
            .axis_iter(Axis(2))
            .map(|plane| plane.to_owned())
            .collect()
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn into_data(self) -> Array3<f32> {
        self.data
    }
}

// ============================================================
// Pipeline
// ============================================================

/// Drives the Richardson-Lucy engine over every channel of an image
#[derive(Debug)]
pub struct ChannelPipeline {
    engine: RichardsonLucy,
    parallel_channels: bool,
}

impl ChannelPipeline {
    /// Build a pipeline for one backend; options are validated here.
    pub fn new(backend: Backend, options: DeconvOptions) -> Result<Self> {
        Ok(Self {
            engine: RichardsonLucy::new(backend, options)?,
            parallel_channels: false,
        })
    }

    /// Process channels concurrently on the rayon pool
    #[must_use]
    pub fn with_parallel_channels(mut self, parallel: bool) -> Self {
        self.parallel_channels = parallel;
        self
    }

    pub fn engine(&self) -> &RichardsonLucy {
        &self.engine
    }

    /// Deconvolve every channel of `image`
    pub fn process(&self, image: &Image, psf: &Psf) -> Result<Image> {
        self.process_inner(image, psf, None)
    }

    /// Deconvolve every channel, honoring `cancel` between iterations
    pub fn process_with_cancel(
        &self,
        image: &Image,
        psf: &Psf,
        cancel: &CancelToken,
    ) -> Result<Image> {
        self.process_inner(image, psf, Some(cancel))
    }

    fn process_inner(
        &self,
        image: &Image,
        psf: &Psf,
        cancel: Option<&CancelToken>,
    ) -> Result<Image> {
        let channels = image.split_channels();
        let run = |(idx, channel): (usize, &Array2<f32>)| {
            tracing::debug!("Deconvolving channel {}/{}", idx + 1, channels.len());
            match cancel {
                Some(token) => {
                    self.engine
                        .deconvolve_channel_with_cancel(channel.view(), psf, token)
                }
                None => self.engine.deconvolve_channel(channel.view(), psf),
            }
        };

        let restored: Result<Vec<Array2<f32>>> = if self.parallel_channels {
            channels.par_iter().enumerate().map(run).collect()
        } else {
            channels.iter().enumerate().map(run).collect()
        };

        Image::from_channels(restored?)
    }
}
