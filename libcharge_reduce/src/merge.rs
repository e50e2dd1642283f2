//! Serial merge of worker shards into the final archive.
//!
//! The final archive is the only shared output of a run and it is written by
//! exactly one thread, after every worker has finished. No locking is needed
//! anywhere in the crate because of this single-writer discipline. Shards are
//! deleted only once the merge has completed without error, so a failed merge
//! leaves everything in place for inspection and retry.

use hdf5::types::{FloatSize, IntSize, TypeDescriptor};
use std::path::PathBuf;

use super::archive::ArchiveWriter;
use super::config::Config;
use super::constants::DEFLATE_LEVEL;
use super::error::MergeError;

/// What the merge step produced.
#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub shard_count: usize,
    /// Sorted iteration numbers covered by the archive
    pub iterations: Vec<u32>,
    pub archive_path: PathBuf,
}

/// Locate this run's shard files, sorted by name.
///
/// Returns [`MergeError::NoShards`] when none exist, which is also how a
/// re-run of an already-merged (and cleaned-up) run fails: cleanly, instead
/// of silently producing an empty archive.
pub fn find_shards(config: &Config) -> Result<Vec<PathBuf>, MergeError> {
    let archive = config.archive_path();
    let dir = archive.parent().map(PathBuf::from).unwrap_or_default();
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("output"));
    let prefix = format!("{stem}_shard_");

    let mut shards = Vec::new();
    for item in dir.read_dir()? {
        let item_path = item?.path();
        let name = item_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with(&prefix) && name.ends_with(".h5") {
            shards.push(item_path);
        }
    }
    if shards.is_empty() {
        return Err(MergeError::NoShards(config.shard_pattern()));
    }
    shards.sort();
    Ok(shards)
}

/// Merge every shard into the final archive and delete the shards.
pub fn merge_shards(config: &Config) -> Result<MergeSummary, MergeError> {
    let shards = find_shards(config)?;
    let archive_path = config.archive_path();
    spdlog::info!(
        "Merging {} shards into {:?}",
        shards.len(),
        archive_path.file_name().unwrap_or_default()
    );

    let writer = ArchiveWriter::create(&archive_path)?;
    let mut iterations: Vec<u32> = Vec::new();

    for (idx, shard_path) in shards.iter().enumerate() {
        spdlog::info!(
            "Merging shard {}/{}: {:?}",
            idx + 1,
            shards.len(),
            shard_path.file_name().unwrap_or_default()
        );
        let shard = hdf5::File::open(shard_path)?;
        iterations.extend(shard.attr("iterations")?.read_raw::<u32>()?);

        for group_name in shard.member_names()? {
            let src_group = shard.group(&group_name)?;
            let dst_group = match writer.file().group(&group_name) {
                Ok(group) => group,
                Err(_) => writer.file().create_group(&group_name)?,
            };
            copy_attributes(&src_group, &dst_group)?;
            for dataset_name in src_group.member_names()? {
                copy_dataset(&src_group, &dst_group, &dataset_name)?;
            }
        }
    }

    iterations.sort_unstable();
    writer.write_run_metadata(config, &iterations)?;
    drop(writer);

    // cleanup only after the archive is complete
    for shard_path in &shards {
        std::fs::remove_file(shard_path)?;
        spdlog::info!(
            "Deleted shard {:?}",
            shard_path.file_name().unwrap_or_default()
        );
    }

    let final_size = std::fs::metadata(&archive_path)?.len();
    spdlog::info!(
        "Merge complete: {:?} ({})",
        archive_path.file_name().unwrap_or_default(),
        human_bytes::human_bytes(final_size as f64)
    );

    Ok(MergeSummary {
        shard_count: shards.len(),
        iterations,
        archive_path,
    })
}

/// Copy one dataset between groups, dispatching on element type and rank.
/// Shard datasets are always 1-D or 2-D floats.
fn copy_dataset(
    src: &hdf5::Group,
    dst: &hdf5::Group,
    name: &str,
) -> Result<(), MergeError> {
    let dataset = src.dataset(name)?;
    let descriptor = dataset.dtype()?.to_descriptor()?;
    match (&descriptor, dataset.ndim()) {
        (TypeDescriptor::Float(FloatSize::U4), 1) => {
            let data = dataset.read_1d::<f32>()?;
            dst.new_dataset_builder()
                .deflate(DEFLATE_LEVEL)
                .with_data(&data)
                .create(name)?;
        }
        (TypeDescriptor::Float(FloatSize::U4), 2) => {
            let data = dataset.read_2d::<f32>()?;
            dst.new_dataset_builder()
                .deflate(DEFLATE_LEVEL)
                .with_data(&data)
                .create(name)?;
        }
        (TypeDescriptor::Float(FloatSize::U8), 1) => {
            let data = dataset.read_1d::<f64>()?;
            dst.new_dataset_builder()
                .deflate(DEFLATE_LEVEL)
                .with_data(&data)
                .create(name)?;
        }
        (TypeDescriptor::Float(FloatSize::U8), 2) => {
            let data = dataset.read_2d::<f64>()?;
            dst.new_dataset_builder()
                .deflate(DEFLATE_LEVEL)
                .with_data(&data)
                .create(name)?;
        }
        _ => return Err(MergeError::UnsupportedDataset(name.to_string())),
    }
    Ok(())
}

/// Copy scalar attributes between groups (the mesh metadata on fieldmap
/// iteration groups), dispatching on element type.
fn copy_attributes(src: &hdf5::Group, dst: &hdf5::Group) -> Result<(), MergeError> {
    for name in src.attr_names()? {
        if dst.attr(&name).is_ok() {
            continue; // already copied from an earlier shard
        }
        let attr = src.attr(&name)?;
        match attr.dtype()?.to_descriptor()? {
            TypeDescriptor::Unsigned(IntSize::U4) => {
                let value = attr.read_scalar::<u32>()?;
                dst.new_attr::<u32>().create(name.as_str())?.write_scalar(&value)?;
            }
            TypeDescriptor::Unsigned(IntSize::U8) => {
                let value = attr.read_scalar::<u64>()?;
                dst.new_attr::<u64>().create(name.as_str())?.write_scalar(&value)?;
            }
            TypeDescriptor::Integer(IntSize::U4) => {
                let value = attr.read_scalar::<i32>()?;
                dst.new_attr::<i32>().create(name.as_str())?.write_scalar(&value)?;
            }
            TypeDescriptor::Integer(IntSize::U8) => {
                let value = attr.read_scalar::<i64>()?;
                dst.new_attr::<i64>().create(name.as_str())?.write_scalar(&value)?;
            }
            TypeDescriptor::Float(FloatSize::U4) => {
                let value = attr.read_scalar::<f32>()?;
                dst.new_attr::<f32>().create(name.as_str())?.write_scalar(&value)?;
            }
            TypeDescriptor::Float(FloatSize::U8) => {
                let value = attr.read_scalar::<f64>()?;
                dst.new_attr::<f64>().create(name.as_str())?.write_scalar(&value)?;
            }
            _ => return Err(MergeError::UnsupportedAttribute(name)),
        }
    }
    Ok(())
}
