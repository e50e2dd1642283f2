use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum FieldMapError {
    #[error("Failed to read field-map file: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Field-map body is {found} bytes, not a multiple of the {size}-byte node record", size = NODE_RECORD_BYTES)]
    BodySizeMismatch { found: u64 },
    #[error("Field-map header declares {declared} nodes but the body holds {found}")]
    NodeCountMismatch { declared: u64, found: u64 },
    #[error("Field-map node buffer has the wrong shape: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

#[derive(Debug, Error)]
pub enum HitFileError {
    #[error("Hit file failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Hit file {path:?} is missing required column {name}")]
    MissingColumn { name: &'static str, path: PathBuf },
    #[error("Hit file column {column} has {found} rows; expected {expected}")]
    ColumnLengthMismatch {
        column: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Hit file position column {column} must have shape (rows, 3)")]
    BadPositionShape { column: &'static str },
    #[error("Hit file string {0:?} is not valid HDF5 unicode")]
    BadString(String),
}

#[derive(Debug, Error)]
pub enum FilenameError {
    #[error("No iteration number found in filename {0:?}")]
    NoIterationNumber(PathBuf),
}

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("Unrecognized configuration tag: {0}")]
    UnknownConfigTag(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config worker count must be at least 1, got {0}")]
    BadWorkerCount(usize),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Archive failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Archive failed to convert config to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Archive attribute is not valid unicode: {0}")]
    BadUnicode(String),
    #[error("Archive failed to format timestamp: {0}")]
    TimeFormat(#[from] time::error::Format),
}

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("Shard worker failed due to field-map error: {0}")]
    FieldMapError(#[from] FieldMapError),
    #[error("Shard worker failed due to hit-file error: {0}")]
    HitFileError(#[from] HitFileError),
    #[error("Shard worker failed due to archive error: {0}")]
    ArchiveError(#[from] ArchiveError),
    #[error("Shard worker failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Shard worker failed due to send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("No shard files matching {0} were found; nothing to merge")]
    NoShards(String),
    #[error("Merge failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Merge failed due to archive error: {0}")]
    ArchiveError(#[from] ArchiveError),
    #[error("Merge failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Merge found dataset {0} with an unsupported element type")]
    UnsupportedDataset(String),
    #[error("Merge found attribute {0} with an unsupported element type")]
    UnsupportedAttribute(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Pipeline found no input files in {0:?}")]
    NoInputFiles(PathBuf),
    #[error("Pipeline worker {id} failed: {source}")]
    WorkerError { id: usize, source: ShardError },
    #[error("Pipeline worker {0} panicked")]
    WorkerPanic(usize),
    #[error("Pipeline timed out after {0} s; shard files are left in place")]
    Timeout(u64),
    #[error("Pipeline failed during merge: {0}")]
    MergeError(#[from] MergeError),
    #[error("Pipeline failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}
