use std::path::Path;

use crate::utils::error_handling::BackendError;

/// Geometry and channel list of the input image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSpec {
    pub width: usize,
    pub height: usize,
    /// Channel names in the order of the interleaved pixel tuple.
    pub channel_names: Vec<String>,
}

impl SourceSpec {
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }

    /// Position of a channel in the interleaved pixel tuple.
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channel_names.iter().position(|c| c == name)
    }

    /// Number of samples in one interleaved scanline.
    #[inline]
    pub fn scanline_len(&self) -> usize {
        self.width * self.channel_count()
    }
}

/// What an output sink is opened with. Samples are always `f32`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaneSpec {
    pub width: usize,
    pub height: usize,
    /// Output channel names in the order of the interleaved row buffer.
    pub channel_names: Vec<String>,
}

impl PlaneSpec {
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }

    #[inline]
    pub fn scanline_len(&self) -> usize {
        self.width * self.channel_count()
    }
}

/// Read side of the image container: an opened multi-channel image that hands out
/// interleaved `f32` scanlines, top to bottom.
pub trait SourceImage {
    fn spec(&self) -> &SourceSpec;

    /// Fills `row` (exactly `spec().scanline_len()` samples) with scanline `y`.
    /// Rows are requested in increasing order; a streaming source may reject going back.
    fn read_scanline(&mut self, y: usize, row: &mut [f32]) -> Result<(), BackendError>;

    /// Releases the image. Closing an already closed source is a no-op.
    fn close(&mut self) -> Result<(), BackendError>;
}

/// Write side of the image container: one single-layer output image.
///
/// Lifecycle: `open` once, `write_scanline` once per row in increasing row order,
/// then `close`. `abort` releases the sink without finishing the file.
pub trait PlaneSink {
    fn open(&mut self, spec: &PlaneSpec) -> Result<(), BackendError>;

    fn write_scanline(&mut self, y: usize, row: &[f32]) -> Result<(), BackendError>;

    fn close(&mut self) -> Result<(), BackendError>;

    fn abort(&mut self) {}
}

/// Creates output sinks for file paths.
pub trait SinkFactory {
    type Sink: PlaneSink;

    fn create(&self, path: &Path) -> Result<Self::Sink, BackendError>;
}
