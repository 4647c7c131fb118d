use camino::Utf8PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TomoError {
    #[error("invalid file pattern: {0}")]
    InvalidPattern(String),

    #[error("sampling rate must be positive, got {0}")]
    InvalidSamplingRate(f64),

    #[error("there are no files matching the pattern {0}")]
    PatternResolutionEmpty(String),

    #[error("unsupported container format: {0}")]
    #[diagnostic(help("supported extensions: .mrc .map .mrcs .st .ali .spi .vol .stk .em"))]
    UnsupportedFormat(Utf8PathBuf),

    #[error("failed to read header of {path}: {message}")]
    MetadataRead { path: Utf8PathBuf, message: String },

    #[error("failed to write {path}: {message}")]
    FilesystemWrite { path: Utf8PathBuf, message: String },

    #[error("destination already exists: {0}")]
    DestinationExists(Utf8PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("coordinates 3D and subtomograms should have the same size ({0} coordinates)")]
    CoordinateMismatch(usize),

    #[error("invalid coordinates on line {line}: {message}")]
    CoordinatesParse { line: usize, message: String },

    #[error("failed to read tilt angles for {path}: {message}")]
    TiltAngles { path: Utf8PathBuf, message: String },

    #[error("box size must be positive, got {0}")]
    InvalidBoxSize(u32),

    #[error("{kind} imports need {parameter}")]
    MissingParameter {
        kind: String,
        parameter: &'static str,
    },

    #[error("{run} has no {expected} output")]
    #[diagnostic(help("`tomo-import list` shows the output of every run"))]
    MissingOutput { run: String, expected: String },

    #[error("missing config file tomo-import.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("import run not found: {0}")]
    RunNotFound(String),
}
