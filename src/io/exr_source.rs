use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exr::block::reader::{ChunksReader, FilteredChunksReader, SequentialBlockDecompressor};
use exr::block::UncompressedBlock;
use exr::math::Vec2;
use exr::meta::attribute::{ChannelList, SampleType};
use exr::prelude::f16;

use crate::io::image_io::{SourceImage, SourceSpec};
use crate::utils::error_handling::{BackendError, Result, SplitError};

type BlockStream = SequentialBlockDecompressor<FilteredChunksReader<BufReader<File>>>;

/// Row being assembled from decoded lines. Scanline blocks fill a row at once,
/// tiles fill it piece by piece.
struct PendingRow {
    samples: Vec<f32>,
    filled: usize,
}

/// Input EXR image. Reads the first layer (part) of the file block by block; every
/// channel is delivered as `f32` regardless of how it is stored.
///
/// Rows must be requested in increasing order. Only the rows of the blocks decoded so
/// far and not yet requested are kept in memory.
pub struct ExrSource {
    spec: SourceSpec,
    channels: ChannelList,
    blocks: Option<BlockStream>,
    pending: BTreeMap<usize, PendingRow>,
    next_row: usize,
}

impl ExrSource {
    pub fn open(path: &Path) -> Result<Self> {
        let open_error = |source: BackendError| SplitError::SourceOpen { path: path.to_path_buf(), source };

        let file = File::open(path).map_err(|e| open_error(Box::new(e)))?;
        let reader = exr::block::read(BufReader::new(file), false).map_err(|e| open_error(Box::new(e)))?;

        let part_count = reader.headers().len();
        let header = reader.headers().first().ok_or_else(|| open_error("file contains no layers".into()))?;
        if part_count > 1 {
            log::warn!("[open] {} has {} parts, only the first one is split", path.display(), part_count);
        }
        if header.deep {
            return Err(open_error("deep data is not supported".into()));
        }

        let mut channel_names: Vec<String> = Vec::with_capacity(header.channels.list.len());
        for ch in header.channels.list.iter() {
            let name = ch.name.to_string();
            // Kanały z subsamplingiem mają mniej próbek niż pikseli
            if ch.sampling != Vec2(1, 1) {
                return Err(SplitError::Subsampled {
                    channel: name,
                    sampling: (ch.sampling.x(), ch.sampling.y()),
                });
            }
            channel_names.push(name);
        }

        let spec = SourceSpec {
            width: header.layer_size.width(),
            height: header.layer_size.height(),
            channel_names,
        };
        let channels = header.channels.clone();

        let blocks = reader
            .filter_chunks(false, |_, _, block| block.layer == 0 && block.level == Vec2(0, 0))
            .map_err(|e| open_error(Box::new(e)))?
            .sequential_decompressor(false);

        log::info!(
            "[open] {}: {}x{}, {} channels",
            path.display(),
            spec.width,
            spec.height,
            spec.channel_count()
        );

        Ok(Self { spec, channels, blocks: Some(blocks), pending: BTreeMap::new(), next_row: 0 })
    }

    /// Spreads the lines of a decoded block over the pending rows.
    fn insert_block(&mut self, block: UncompressedBlock) -> std::result::Result<(), BackendError> {
        let num_channels = self.spec.channel_count();
        let scanline_len = self.spec.scanline_len();

        for line in block.lines(&self.channels) {
            let y = line.location.position.y();
            if y < self.next_row || y >= self.spec.height {
                continue;
            }
            let x0 = line.location.position.x();
            let count = line.location.sample_count;
            if x0 + count > self.spec.width {
                return Err(format!("line at row {} runs past the image width", y).into());
            }

            let pending = self
                .pending
                .entry(y)
                .or_insert_with(|| PendingRow { samples: vec![0.0; scanline_len], filled: 0 });
            let channel = line.location.channel;
            // Linia to jeden kanał, wynik jest przeplatany
            let targets = pending.samples[x0 * num_channels + channel..].iter_mut().step_by(num_channels);

            match self.channels.list[channel].sample_type {
                SampleType::F16 => {
                    for (target, sample) in targets.zip(line.read_samples::<f16>()) {
                        *target = sample?.to_f32();
                    }
                },
                SampleType::F32 => {
                    for (target, sample) in targets.zip(line.read_samples::<f32>()) {
                        *target = sample?;
                    }
                },
                SampleType::U32 => {
                    for (target, sample) in targets.zip(line.read_samples::<u32>()) {
                        *target = sample? as f32;
                    }
                },
            }
            pending.filled += count;
        }
        Ok(())
    }

    #[cfg(test)]
    fn buffered_rows(&self) -> usize {
        self.pending.len()
    }
}

impl SourceImage for ExrSource {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    fn read_scanline(&mut self, y: usize, row: &mut [f32]) -> std::result::Result<(), BackendError> {
        if self.blocks.is_none() {
            return Err("input image is already closed".into());
        }
        if y >= self.spec.height {
            return Err(format!("row {} is outside of image height {}", y, self.spec.height).into());
        }
        if row.len() != self.spec.scanline_len() {
            return Err(format!(
                "scanline buffer holds {} samples, expected {}",
                row.len(),
                self.spec.scanline_len()
            )
            .into());
        }
        if y < self.next_row {
            return Err(format!("row {} was already read, rows must be read in order", y).into());
        }

        loop {
            if self.pending.get(&y).is_some_and(|p| p.filled == self.spec.scanline_len()) {
                if let Some(done) = self.pending.remove(&y) {
                    row.copy_from_slice(&done.samples);
                }
                // Wiersze pominięte przez wywołującego nie będą już potrzebne
                self.pending.retain(|&pending_y, _| pending_y > y);
                self.next_row = y + 1;
                return Ok(());
            }

            let block = match self.blocks.as_mut().and_then(Iterator::next) {
                Some(block) => block?,
                None => return Err(format!("input ended before row {} was complete", y).into()),
            };
            self.insert_block(block)?;
        }
    }

    fn close(&mut self) -> std::result::Result<(), BackendError> {
        self.blocks = None;
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ::exr::compression::Compression;
    use ::exr::prelude::{
        AnyChannel, AnyChannels, Encoding, FlatSamples, Image, Layer, LayerAttributes, WritableImage,
    };
    use smallvec::SmallVec;

    /// Writes a single-layer uncompressed EXR whose channel `i` holds `value(i, pixel_index)`.
    pub(crate) fn write_test_exr(
        path: &Path,
        width: usize,
        height: usize,
        names: &[&str],
        value: impl Fn(usize, usize) -> f32,
    ) {
        write_test_exr_encoded(path, Encoding::UNCOMPRESSED, width, height, names, value);
    }

    fn write_test_exr_encoded(
        path: &Path,
        encoding: Encoding,
        width: usize,
        height: usize,
        names: &[&str],
        value: impl Fn(usize, usize) -> f32,
    ) {
        let channels: SmallVec<[AnyChannel<FlatSamples>; 4]> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let samples = (0..width * height).map(|p| value(i, p)).collect();
                AnyChannel::new(*name, FlatSamples::F32(samples))
            })
            .collect();

        let layer = Layer::new(Vec2(width, height), LayerAttributes::default(), encoding, AnyChannels::sort(channels));
        Image::from_layer(layer).write().to_file(path).expect("failed to write test EXR");
    }

    #[test]
    fn test_open_reports_sorted_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.exr");
        write_test_exr(&path, 3, 2, &["beauty.R", "beauty.G", "beauty.B"], |_, _| 0.0);

        let source = ExrSource::open(&path).unwrap();
        let spec = source.spec();
        assert_eq!((spec.width, spec.height), (3, 2));
        assert_eq!(spec.channel_names, vec!["beauty.B", "beauty.G", "beauty.R"]);
        assert_eq!(spec.channel_index("beauty.R"), Some(2));
    }

    #[test]
    fn test_read_scanline_interleaves_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.exr");
        // Po sortowaniu: A (indeks 0), B (indeks 1)
        write_test_exr(&path, 2, 2, &["A", "B"], |ch, p| (ch * 100 + p) as f32);

        let mut source = ExrSource::open(&path).unwrap();
        let mut row = vec![0.0; source.spec().scanline_len()];
        source.read_scanline(0, &mut row).unwrap();
        assert_eq!(row, vec![0.0, 100.0, 1.0, 101.0]);
        source.read_scanline(1, &mut row).unwrap();
        assert_eq!(row, vec![2.0, 102.0, 3.0, 103.0]);
    }

    #[test]
    fn test_compressed_rows_stream_one_block_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zip.exr");
        let (width, height) = (8, 64);
        let encoding = Encoding { compression: Compression::ZIP16, ..Encoding::UNCOMPRESSED };
        write_test_exr_encoded(&path, encoding, width, height, &["G", "R"], |ch, p| (ch * 10_000 + p) as f32);

        let mut source = ExrSource::open(&path).unwrap();
        let mut row = vec![0.0; source.spec().scanline_len()];
        for y in 0..height {
            source.read_scanline(y, &mut row).unwrap();
            assert!(source.buffered_rows() < 16, "row {} left {} rows decoded", y, source.buffered_rows());
            let p = y * width + 5;
            assert_eq!(&row[10..12], &[p as f32, (10_000 + p) as f32]);
        }
    }

    #[test]
    fn test_rows_must_be_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.exr");
        write_test_exr(&path, 1, 4, &["R"], |_, p| p as f32);

        let mut source = ExrSource::open(&path).unwrap();
        let mut row = vec![0.0; 1];
        source.read_scanline(2, &mut row).unwrap();
        assert_eq!(row, vec![2.0]);
        assert!(source.read_scanline(1, &mut row).is_err());
        source.read_scanline(3, &mut row).unwrap();
        assert_eq!(row, vec![3.0]);
    }

    #[test]
    fn test_read_past_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.exr");
        write_test_exr(&path, 2, 1, &["R"], |_, _| 1.0);

        let mut source = ExrSource::open(&path).unwrap();
        let mut row = vec![0.0; 2];
        assert!(source.read_scanline(1, &mut row).is_err());
        source.close().unwrap();
        assert!(source.read_scanline(0, &mut row).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ExrSource::open(&dir.path().join("missing.exr"));
        assert!(matches!(result, Err(SplitError::SourceOpen { .. })));
    }

    #[test]
    fn test_subsampled_channel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.exr");
        write_test_exr(&path, 2, 2, &["R"], |_, _| 1.0);

        // exr nie zapisze kanału z subsamplingiem, więc nagłówek jest poprawiany ręcznie.
        // Wpis chlist: nazwa\0, typ (i32), pLinear, 3 bajty zarezerwowane, xSampling, ySampling
        let mut bytes = std::fs::read(&path).unwrap();
        let chlist = bytes.windows(6).position(|w| w == b"chlist").unwrap();
        let entry = chlist
            + bytes[chlist..].windows(6).position(|w| w == b"R\0\x02\0\0\0").unwrap();
        bytes[entry + 10..entry + 14].copy_from_slice(&2i32.to_le_bytes());
        bytes[entry + 14..entry + 18].copy_from_slice(&2i32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        // exr itself refuses subsampled headers, so the rejection can surface as either error
        match ExrSource::open(&path) {
            Err(SplitError::Subsampled { channel, sampling }) => {
                assert_eq!(channel, "R");
                assert_eq!(sampling, (2, 2));
            },
            Err(SplitError::SourceOpen { .. }) => {},
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("a subsampled channel was accepted"),
        }
    }
}
