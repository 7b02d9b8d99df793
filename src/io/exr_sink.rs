use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use exr::block::writer::ChunksWriter;
use exr::block::{BlockIndex, UncompressedBlock};
use exr::compression::Compression;
use exr::math::Vec2;
use exr::meta::attribute::{ChannelDescription, LineOrder, SampleType, Text};
use exr::meta::header::Header;
use exr::meta::{BlockDescription, Headers};
use smallvec::{smallvec, SmallVec};

use crate::io::image_io::{PlaneSink, PlaneSpec, SinkFactory};
use crate::utils::error_handling::BackendError;
use crate::utils::splitter_config::OutputCompression;

impl From<OutputCompression> for Compression {
    fn from(value: OutputCompression) -> Self {
        match value {
            OutputCompression::None => Compression::Uncompressed,
            OutputCompression::Rle => Compression::RLE,
            OutputCompression::Zip1 => Compression::ZIP1,
            OutputCompression::Zip16 => Compression::ZIP16,
            OutputCompression::Piz => Compression::PIZ,
        }
    }
}

/// Creates single-layer EXR outputs with `f32` channels, stored as scanline blocks
/// in increasing line order.
pub struct ExrSinkFactory {
    compression: OutputCompression,
}

impl ExrSinkFactory {
    pub fn new(compression: OutputCompression) -> Self {
        Self { compression }
    }
}

impl SinkFactory for ExrSinkFactory {
    type Sink = ExrPlaneSink;

    fn create(&self, path: &Path) -> Result<ExrPlaneSink, BackendError> {
        if path.as_os_str().is_empty() {
            return Err("output path is empty".into());
        }
        Ok(ExrPlaneSink {
            path: path.to_path_buf(),
            compression: self.compression.into(),
            state: SinkState::Created,
        })
    }
}

/// Packs interleaved rows into uncompressed scanline blocks.
///
/// Block data is laid out the way `exr` expects it: line by line, and within a line
/// all samples of one channel (in sorted channel order) before the next channel,
/// native endian.
struct BlockAssembler {
    width: usize,
    height: usize,
    lines_per_block: usize,
    channel_count: usize,
    // Pozycja kanału w wierszu, w kolejności alfabetycznej nazw
    sorted_channels: Vec<usize>,
    data: Vec<u8>,
    block_start: usize,
    next_row: usize,
}

impl BlockAssembler {
    fn new(spec: &PlaneSpec, sorted_channels: Vec<usize>, lines_per_block: usize) -> Self {
        let lines_per_block = lines_per_block.max(1);
        Self {
            width: spec.width,
            height: spec.height,
            lines_per_block,
            channel_count: spec.channel_count(),
            sorted_channels,
            data: Vec::with_capacity(Self::block_bytes(spec, lines_per_block)),
            block_start: 0,
            next_row: 0,
        }
    }

    fn block_bytes(spec: &PlaneSpec, lines: usize) -> usize {
        spec.scanline_len() * lines.min(spec.height) * std::mem::size_of::<f32>()
    }

    /// Adds row `y`. Returns the finished block, with its index in increasing y
    /// order, once the block is full or the image is complete.
    fn push_row(&mut self, y: usize, row: &[f32]) -> Result<Option<(usize, UncompressedBlock)>, BackendError> {
        if y != self.next_row || y >= self.height {
            return Err(format!("expected row {}, got row {}", self.next_row, y).into());
        }
        if row.len() != self.width * self.channel_count {
            return Err(format!(
                "scanline holds {} samples, expected {}",
                row.len(),
                self.width * self.channel_count
            )
            .into());
        }

        for &channel in &self.sorted_channels {
            for sample in row[channel..].iter().step_by(self.channel_count).take(self.width) {
                self.data.extend_from_slice(&sample.to_ne_bytes());
            }
        }
        self.next_row += 1;

        if self.buffered_rows() == self.lines_per_block || self.is_complete() {
            Ok(Some(self.take_block()))
        } else {
            Ok(None)
        }
    }

    fn take_block(&mut self) -> (usize, UncompressedBlock) {
        let rows = self.buffered_rows();
        let index = BlockIndex {
            layer: 0,
            pixel_position: Vec2(0, self.block_start),
            pixel_size: Vec2(self.width, rows),
            level: Vec2(0, 0),
        };
        let capacity = self.data.capacity();
        let block = UncompressedBlock { index, data: std::mem::replace(&mut self.data, Vec::with_capacity(capacity)) };
        let block_number = self.block_start / self.lines_per_block;
        self.block_start = self.next_row;
        (block_number, block)
    }

    /// Rows accepted but not yet handed out as a block.
    fn buffered_rows(&self) -> usize {
        self.next_row - self.block_start
    }

    fn is_complete(&self) -> bool {
        self.next_row == self.height
    }
}

enum BlockCmd {
    Data(usize, UncompressedBlock),
    EOF,
}

/// Background `exr` writer. The chunk writer only exists inside `exr::block::write`,
/// so it runs on its own thread and pulls blocks from a zero-capacity channel.
struct BlockEncoder {
    sender: SyncSender<BlockCmd>,
    worker: JoinHandle<exr::error::UnitResult>,
}

impl BlockEncoder {
    fn spawn(writer: BufWriter<File>, header: Header) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<BlockCmd>(0);
        let worker = thread::Builder::new()
            .name("exr-encoder".to_string())
            .spawn(move || Self::encoder_loop(writer, header, receiver))?;
        Ok(Self { sender, worker })
    }

    fn encoder_loop(writer: BufWriter<File>, header: Header, receiver: Receiver<BlockCmd>) -> exr::error::UnitResult {
        let headers: Headers = smallvec![header];
        exr::block::write(writer, headers, true, move |meta, chunk_writer| {
            let mut compressor = chunk_writer.sequential_blocks_compressor(&meta);
            loop {
                match receiver.recv() {
                    Ok(BlockCmd::Data(index, block)) => compressor.compress_block(index, block)?,
                    Ok(BlockCmd::EOF) => return Ok(()),
                    // Nadawca zniknął bez EOF: zapis przerwany
                    Err(_) => return Err(exr::error::Error::Aborted),
                }
            }
        })
    }

    /// Hands a block to the worker. On failure the worker has stopped; its own error
    /// is returned when there is one.
    fn send(self, cmd: BlockCmd) -> Result<Self, BackendError> {
        match self.sender.send(cmd) {
            Ok(()) => Ok(self),
            Err(_) => Err(self.join().err().unwrap_or_else(|| "encoder stopped early".into())),
        }
    }

    fn finish(self) -> Result<(), BackendError> {
        self.send(BlockCmd::EOF)?.join()
    }

    fn join(self) -> Result<(), BackendError> {
        let Self { sender, worker } = self;
        drop(sender);
        match worker.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err("encoder thread panicked".into()),
        }
    }
}

enum SinkState {
    Created,
    Open { assembler: BlockAssembler, encoder: BlockEncoder },
    Closed,
}

/// One output EXR file. The file is created by `open`; rows are packed into
/// compression blocks and every full block is encoded and written right away, so at
/// most one block of rows is held here.
pub struct ExrPlaneSink {
    path: PathBuf,
    compression: Compression,
    state: SinkState,
}

impl ExrPlaneSink {
    #[cfg(test)]
    fn buffered_rows(&self) -> usize {
        match &self.state {
            SinkState::Open { assembler, .. } => assembler.buffered_rows(),
            SinkState::Created | SinkState::Closed => 0,
        }
    }
}

/// Channels sorted by name, as EXR stores them.
fn sorted_channel_order(spec: &PlaneSpec) -> Vec<usize> {
    let mut order: Vec<usize> = (0..spec.channel_count()).collect();
    order.sort_by(|&a, &b| spec.channel_names[a].as_bytes().cmp(spec.channel_names[b].as_bytes()));
    order
}

fn plane_header(spec: &PlaneSpec, sorted_channels: &[usize], compression: Compression) -> Result<Header, BackendError> {
    let channels = sorted_channels
        .iter()
        .map(|&c| -> Result<_, BackendError> {
            let name = &spec.channel_names[c];
            let name = Text::new_or_none(name).ok_or_else(|| format!("channel name {} is not valid in EXR", name))?;
            Ok(ChannelDescription::named(name, SampleType::F32))
        })
        .collect::<Result<SmallVec<[ChannelDescription; 5]>, BackendError>>()?;

    let mut header = Header::new(Text::default(), Vec2(spec.width, spec.height), channels).with_encoding(
        compression,
        BlockDescription::ScanLines,
        LineOrder::Increasing,
    );
    header.own_attributes.layer_name = None;
    Ok(header)
}

impl PlaneSink for ExrPlaneSink {
    fn open(&mut self, spec: &PlaneSpec) -> Result<(), BackendError> {
        if !matches!(self.state, SinkState::Created) {
            return Err(format!("{} is already open", self.path.display()).into());
        }
        if spec.channel_names.is_empty() {
            return Err("an output image needs at least one channel".into());
        }
        if spec.width == 0 || spec.height == 0 {
            return Err(format!("cannot write an empty {}x{} image", spec.width, spec.height).into());
        }

        let sorted_channels = sorted_channel_order(spec);
        let header = plane_header(spec, &sorted_channels, self.compression)?;
        let file = File::create(&self.path)?;
        let encoder = BlockEncoder::spawn(BufWriter::new(file), header)?;

        self.state = SinkState::Open {
            assembler: BlockAssembler::new(spec, sorted_channels, self.compression.scan_lines_per_block()),
            encoder,
        };
        Ok(())
    }

    fn write_scanline(&mut self, y: usize, row: &[f32]) -> Result<(), BackendError> {
        let SinkState::Open { assembler, .. } = &mut self.state else {
            return Err(format!("{} is not open for writing", self.path.display()).into());
        };
        let Some((index, block)) = assembler.push_row(y, row)? else {
            return Ok(());
        };

        let SinkState::Open { assembler, encoder } = std::mem::replace(&mut self.state, SinkState::Closed) else {
            return Err(format!("{} is not open for writing", self.path.display()).into());
        };
        let encoder = encoder.send(BlockCmd::Data(index, block))?;
        self.state = SinkState::Open { assembler, encoder };
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        let (assembler, encoder) = match std::mem::replace(&mut self.state, SinkState::Closed) {
            SinkState::Open { assembler, encoder } => (assembler, encoder),
            SinkState::Created | SinkState::Closed => return Ok(()),
        };

        if !assembler.is_complete() {
            // Błąd wątku nieistotny, brakujące wiersze są przyczyną
            let _ = encoder.join();
            return Err(format!("only {} of {} rows were written", assembler.next_row, assembler.height).into());
        }
        encoder.finish()
    }

    fn abort(&mut self) {
        // Porzuca niezapisane bloki; plik zostaje niedokończony
        if let SinkState::Open { encoder, .. } = std::mem::replace(&mut self.state, SinkState::Closed) {
            let _ = encoder.join();
        }
    }
}
