use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io::image_io::{PlaneSink, PlaneSpec, SinkFactory, SourceImage, SourceSpec};
use crate::processing::channel_classification::{classify_channels, ComponentRole, Plane, PlaneLayout};
use crate::utils::error_handling::{Result, SplitError};
use crate::utils::logging::LogMessage;
use crate::utils::progress::ProgressSink;
use crate::utils::splitter_config::SplitterConfig;

/// How the components of a plane are placed in its output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelPacking {
    /// Only the present components, in R, G, B, A order. An R,A plane has 2 channels.
    #[default]
    Compact,
    /// Always four channels R, G, B, A; missing components are zero.
    FixedRgba,
}

/// Copies one source channel into one slot of a plane pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMove {
    pub source_index: usize,
    pub slot: usize,
}

/// Buffer layout of one output plane. Row size and scatter slots both come from here,
/// so they always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanePacking {
    moves: Vec<ChannelMove>,
    channel_names: Vec<String>,
}

impl PlanePacking {
    pub fn new(plane: &Plane, packing: ChannelPacking) -> Self {
        match packing {
            ChannelPacking::Compact => Self {
                moves: plane
                    .channels()
                    .iter()
                    .enumerate()
                    .map(|(slot, ch)| ChannelMove { source_index: ch.source_index, slot })
                    .collect(),
                channel_names: plane.channels().iter().map(|ch| ch.role.as_str().to_string()).collect(),
            },
            ChannelPacking::FixedRgba => Self {
                moves: plane
                    .channels()
                    .iter()
                    .map(|ch| ChannelMove { source_index: ch.source_index, slot: ch.role.slot() })
                    .collect(),
                channel_names: ComponentRole::ALL.iter().map(|r| r.as_str().to_string()).collect(),
            },
        }
    }

    /// Samples per output pixel.
    #[inline]
    pub fn stride(&self) -> usize {
        self.channel_names.len()
    }

    #[inline]
    pub fn row_len(&self, width: usize) -> usize {
        width * self.stride()
    }

    pub fn moves(&self) -> &[ChannelMove] {
        &self.moves
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn plane_spec(&self, width: usize, height: usize) -> PlaneSpec {
        PlaneSpec { width, height, channel_names: self.channel_names.clone() }
    }
}

/// Scatters the samples of every channel of one plane from an interleaved source row
/// into the plane's row buffer:
/// `dest[slot + x * stride] = source_row[source_index + x * source_channels]`.
pub fn scatter_row(
    source_row: &[f32],
    source_channels: usize,
    width: usize,
    packing: &PlanePacking,
    dest: &mut [f32],
) {
    debug_assert_eq!(source_row.len(), width * source_channels);
    debug_assert_eq!(dest.len(), packing.row_len(width));

    if width == 0 {
        return;
    }
    let stride = packing.stride();
    for m in packing.moves() {
        let src = source_row[m.source_index..].iter().step_by(source_channels);
        let dst = dest[m.slot..].iter_mut().step_by(stride);
        for (d, s) in dst.zip(src).take(width) {
            *d = *s;
        }
    }
}

/// Builds `<dir>/<input stem>_<plane label>.<ext>`. The directory is the input's own
/// unless the config names one.
pub fn generate_output_path(input: &Path, plane: &Plane, config: &SplitterConfig) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let label = plane.output_label(&config.default_plane_label);
    let sanitized_label = label.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");

    let dir = match &config.output_dir {
        Some(dir) => dir.clone(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(format!("{}_{}.{}", stem, sanitized_label, config.output_extension))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPlane {
    pub name: String,
    pub channel_names: Vec<String>,
    pub path: PathBuf,
}

/// Outcome of a successful split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub planes: Vec<WrittenPlane>,
    pub discarded: Vec<String>,
    pub rows: usize,
}

struct OutputPlane<S> {
    name: String,
    packing: PlanePacking,
    path: PathBuf,
    sink: S,
    closed: bool,
}

/// Splits a layered image into one output image per plane, scanline by scanline.
pub struct LayerExporter<'a> {
    config: &'a SplitterConfig,
}

impl<'a> LayerExporter<'a> {
    pub fn new(config: &'a SplitterConfig) -> Self {
        Self { config }
    }

    /// Runs the whole split. On failure the source and every opened sink are released
    /// and, if configured, the files created by this run are removed.
    pub fn export_planes<S, F>(
        &self,
        input: &Path,
        source: &mut S,
        factory: &F,
        progress: &dyn ProgressSink,
    ) -> Result<SplitReport>
    where
        S: SourceImage,
        F: SinkFactory,
    {
        let mut outputs: Vec<OutputPlane<F::Sink>> = Vec::new();
        let result = self.run(input, source, factory, progress, &mut outputs);
        if let Err(e) = &result {
            self.abort(e, source, &mut outputs);
        }
        result
    }

    fn run<S, F>(
        &self,
        input: &Path,
        source: &mut S,
        factory: &F,
        progress: &dyn ProgressSink,
        outputs: &mut Vec<OutputPlane<F::Sink>>,
    ) -> Result<SplitReport>
    where
        S: SourceImage,
        F: SinkFactory,
    {
        let spec = source.spec().clone();
        let layout = classify_channels(spec.channel_names.iter().map(String::as_str), |name| {
            spec.channel_index(name)
        })?;

        if layout.is_empty() {
            return Err(SplitError::NoPlanes { path: input.to_path_buf() });
        }
        LogMessage::debug(format!(
            "{} plane(s) from {} of {} channel(s)",
            layout.len(),
            layout.retained_channel_count(),
            spec.channel_count()
        ))
        .with_context("split")
        .send();
        if !layout.discarded().is_empty() {
            LogMessage::info(format!(
                "{} channel(s) without an R/G/B/A component skipped: {}",
                layout.discarded().len(),
                layout.discarded().join(", ")
            ))
            .with_context("split")
            .send();
        }

        // Wszystkie pliki wyjściowe muszą być otwarte przed pierwszym wierszem
        self.open_outputs(input, &spec, &layout, factory, outputs)?;
        self.pump_rows(&spec, source, outputs, progress)?;

        source.close().map_err(|e| SplitError::SourceClose { path: input.to_path_buf(), source: e })?;
        for output in outputs.iter_mut() {
            output.sink.close().map_err(|e| SplitError::SinkClose {
                plane: output.name.clone(),
                path: output.path.clone(),
                source: e,
            })?;
            output.closed = true;
        }
        progress.finish(Some(&format!("{} plane(s) written", outputs.len())));

        Ok(SplitReport {
            planes: outputs
                .iter()
                .map(|o| WrittenPlane {
                    name: o.name.clone(),
                    channel_names: o.packing.channel_names().to_vec(),
                    path: o.path.clone(),
                })
                .collect(),
            discarded: layout.discarded().to_vec(),
            rows: spec.height,
        })
    }

    fn open_outputs<F: SinkFactory>(
        &self,
        input: &Path,
        spec: &SourceSpec,
        layout: &PlaneLayout,
        factory: &F,
        outputs: &mut Vec<OutputPlane<F::Sink>>,
    ) -> Result<()> {
        // Najpierw wszystkie ścieżki, żeby kolizja nie zostawiła połowy plików
        let mut targets: Vec<(&Plane, PathBuf)> = Vec::with_capacity(layout.len());
        let mut seen: HashMap<PathBuf, &str> = HashMap::with_capacity(layout.len());
        for plane in layout.planes() {
            let path = generate_output_path(input, plane, self.config);
            if let Some(first) = seen.insert(path.clone(), plane.name()) {
                return Err(SplitError::OutputCollision {
                    path,
                    first: first.to_string(),
                    second: plane.name().to_string(),
                });
            }
            targets.push((plane, path));
        }

        for (plane, path) in targets {
            let packing = PlanePacking::new(plane, self.config.packing);
            let mut sink = factory.create(&path).map_err(|e| SplitError::SinkCreate {
                plane: plane.name().to_string(),
                path: path.clone(),
                source: e,
            })?;
            sink.open(&packing.plane_spec(spec.width, spec.height)).map_err(|e| SplitError::SinkOpen {
                plane: plane.name().to_string(),
                path: path.clone(),
                source: e,
            })?;

            LogMessage::info(format!(
                "{} -> {} ({})",
                plane.output_label(&self.config.default_plane_label),
                path.display(),
                packing.channel_names().join(",")
            ))
            .with_context("split")
            .send();

            outputs.push(OutputPlane {
                name: plane.name().to_string(),
                packing,
                path,
                sink,
                closed: false,
            });
        }
        Ok(())
    }

    fn pump_rows<S: SourceImage, K: PlaneSink>(
        &self,
        spec: &SourceSpec,
        source: &mut S,
        outputs: &mut [OutputPlane<K>],
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let width = spec.width;
        let source_channels = spec.channel_count();
        let mut source_row = vec![0.0f32; spec.scanline_len()];

        for y in 0..spec.height {
            source
                .read_scanline(y, &mut source_row)
                .map_err(|e| SplitError::ScanlineRead { row: y, source: e })?;

            let mut plane_rows: Vec<Vec<f32>> = outputs
                .iter()
                .map(|o| vec![0.0f32; o.packing.row_len(width)])
                .collect();

            for (output, plane_row) in outputs.iter().zip(plane_rows.iter_mut()) {
                scatter_row(&source_row, source_channels, width, &output.packing, plane_row);
            }

            for (output, plane_row) in outputs.iter_mut().zip(plane_rows.iter()) {
                output.sink.write_scanline(y, plane_row).map_err(|e| SplitError::ScanlineWrite {
                    plane: output.name.clone(),
                    row: y,
                    source: e,
                })?;
            }

            progress.set((y + 1) as f32 / spec.height as f32, None);
        }
        Ok(())
    }

    fn abort<S: SourceImage, K: PlaneSink>(&self, error: &SplitError, source: &mut S, outputs: &mut [OutputPlane<K>]) {
        if let Some(plane) = error.plane() {
            LogMessage::error(format!("plane '{}' failed, aborting {} output(s)", plane, outputs.len()))
                .with_context("cleanup")
                .send();
        }
        if let Err(e) = source.close() {
            LogMessage::warning(format!("closing input failed: {}", e)).with_context("cleanup").send();
        }
        for output in outputs.iter_mut().filter(|o| !o.closed) {
            output.sink.abort();
        }

        if !self.config.cleanup_on_failure {
            return;
        }
        for output in outputs.iter() {
            match fs::remove_file(&output.path) {
                Ok(()) => {
                    LogMessage::info(format!("removed {}", output.path.display()))
                        .with_context("cleanup")
                        .send();
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    LogMessage::warning(format!("could not remove {}: {}", output.path.display(), e))
                        .with_context("cleanup")
                        .send();
                }
            }
        }
    }
}
