//! Discovery of per-iteration input files.
//!
//! The simulator writes one output file per charging iteration, with the
//! iteration number embedded in the filename. Files are matched by
//! configuration-tag text plus extension, sorted lexically, and bounded by
//! the configured maximum iteration. A filename the iteration rule cannot
//! parse is logged and skipped, never fatal to the batch.

use std::path::{Path, PathBuf};

use super::error::FilenameError;

/// One discovered input file with its parsed iteration number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub iteration: u32,
    pub path: PathBuf,
}

/// The result of scanning an input directory.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    pub files: Vec<IndexedFile>,
    /// Files matching the pattern whose names could not be parsed
    pub skipped: usize,
}

/// Extract the iteration number from a filename.
///
/// Fixed rule: take the file stem, skip to the first `_` or `-` delimiter,
/// and read the first contiguous run of ASCII digits after it. So
/// `07_iteration7_onlyphotoemission` parses as 7 and
/// `map-42-photoemission` as 42. Anything else is a [`FilenameError`].
pub fn iteration_number(path: &Path) -> Result<u32, FilenameError> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let after_delim = stem
        .find(|c| c == '_' || c == '-')
        .map(|pos| &stem[pos + 1..])
        .ok_or_else(|| FilenameError::NoIterationNumber(path.to_path_buf()))?;

    let digits: String = after_delim
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits
        .parse()
        .map_err(|_| FilenameError::NoIterationNumber(path.to_path_buf()))
}

/// Scan `dir` for iteration files carrying `tag_text` in their name and the
/// given extension, sorted by filename.
pub fn collect_input_files(
    dir: &Path,
    tag_text: &str,
    extension: &str,
    max_iteration: Option<u32>,
) -> Result<FileIndex, std::io::Error> {
    let mut matches: Vec<PathBuf> = Vec::new();
    for item in dir.read_dir()? {
        let item_path = item?.path();
        let name = item_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext_matches = item_path
            .extension()
            .map(|e| e.to_string_lossy() == extension)
            .unwrap_or(false);
        if ext_matches && name.contains(tag_text) {
            matches.push(item_path);
        }
    }
    matches.sort();

    let mut index = FileIndex::default();
    for path in matches {
        match iteration_number(&path) {
            Ok(iteration) => {
                if max_iteration.map(|max| iteration <= max).unwrap_or(true) {
                    index.files.push(IndexedFile { iteration, path });
                }
            }
            Err(e) => {
                spdlog::warn!("Skipping unparseable input filename: {e}");
                index.skipped += 1;
            }
        }
    }
    Ok(index)
}
