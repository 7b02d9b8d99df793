use std::path::PathBuf;

/// Error type produced by the image I/O backends. The backends are black boxes to the
/// splitter, so their failures are carried opaquely and classified by the caller.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can abort a split run.
#[derive(Debug)]
pub enum SplitError {
    /// The input file could not be opened or decoded.
    SourceOpen {
        path: PathBuf,
        source: BackendError,
    },
    /// A channel uses x/y subsampling, which scanline demultiplexing cannot express.
    Subsampled {
        channel: String,
        sampling: (usize, usize),
    },
    /// A retained channel name has no index in the source image.
    UnknownChannel {
        channel: String,
    },
    /// Two channels resolved to the same component of the same plane.
    DuplicateComponent {
        plane: String,
        component: &'static str,
        first: String,
        second: String,
    },
    /// No channel in the input carries an R/G/B/A component.
    NoPlanes {
        path: PathBuf,
    },
    /// Two planes would be written to the same output file.
    OutputCollision {
        path: PathBuf,
        first: String,
        second: String,
    },
    ScanlineRead {
        row: usize,
        source: BackendError,
    },
    SourceClose {
        path: PathBuf,
        source: BackendError,
    },
    SinkCreate {
        plane: String,
        path: PathBuf,
        source: BackendError,
    },
    SinkOpen {
        plane: String,
        path: PathBuf,
        source: BackendError,
    },
    ScanlineWrite {
        plane: String,
        row: usize,
        source: BackendError,
    },
    SinkClose {
        plane: String,
        path: PathBuf,
        source: BackendError,
    },
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Io(std::io::Error),
}

impl SplitError {
    /// Name of the output plane the error is attributed to, if any.
    pub fn plane(&self) -> Option<&str> {
        match self {
            Self::SinkCreate { plane, .. }
            | Self::SinkOpen { plane, .. }
            | Self::ScanlineWrite { plane, .. }
            | Self::SinkClose { plane, .. }
            | Self::DuplicateComponent { plane, .. } => Some(plane),
            _ => None,
        }
    }
}

impl std::error::Error for SplitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SourceOpen { source, .. }
            | Self::ScanlineRead { source, .. }
            | Self::SourceClose { source, .. }
            | Self::SinkCreate { source, .. }
            | Self::SinkOpen { source, .. }
            | Self::ScanlineWrite { source, .. }
            | Self::SinkClose { source, .. } => Some(source.as_ref()),
            Self::ConfigRead { source, .. } => Some(source),
            Self::ConfigParse { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceOpen { path, .. } => {
                write!(f, "failed to open input image {}", path.display())
            },
            Self::Subsampled { channel, sampling } => {
                write!(
                    f,
                    "channel {} is subsampled ({}x{}), only full resolution channels are supported",
                    channel, sampling.0, sampling.1
                )
            },
            Self::UnknownChannel { channel } => {
                write!(f, "channel {} has no index in the input image", channel)
            },
            Self::DuplicateComponent { plane, component, first, second } => {
                write!(
                    f,
                    "plane '{}' has two {} channels: {} and {}",
                    plane, component, first, second
                )
            },
            Self::NoPlanes { path } => {
                write!(f, "no R/G/B/A channels found in {}", path.display())
            },
            Self::OutputCollision { path, first, second } => {
                write!(
                    f,
                    "planes '{}' and '{}' would both be written to {}",
                    first, second, path.display()
                )
            },
            Self::ScanlineRead { row, .. } => {
                write!(f, "failed to read scanline {}", row)
            },
            Self::SourceClose { path, .. } => {
                write!(f, "failed to close input image {}", path.display())
            },
            Self::SinkCreate { plane, path, .. } => {
                write!(f, "failed to create image {} for plane '{}'", path.display(), plane)
            },
            Self::SinkOpen { plane, path, .. } => {
                write!(f, "failed to open image {} for plane '{}'", path.display(), plane)
            },
            Self::ScanlineWrite { plane, row, .. } => {
                write!(f, "failed to write scanline {} of plane '{}'", row, plane)
            },
            Self::SinkClose { plane, path, .. } => {
                write!(f, "failed to finish image {} for plane '{}'", path.display(), plane)
            },
            Self::ConfigRead { path, .. } => {
                write!(f, "failed to read config file {}", path.display())
            },
            Self::ConfigParse { path, .. } => {
                write!(f, "failed to parse config file {}", path.display())
            },
            Self::Io(e) => {
                write!(f, "I/O error: {}", e)
            },
        }
    }
}

impl From<std::io::Error> for SplitError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;
