//! Worker-side processing: one thread, one contiguous chunk of input files,
//! one private shard archive.
//!
//! A worker is a pure function of its chunk plus the run configuration; it
//! holds no global state and never touches another worker's shard or the
//! final archive. Large per-file buffers live only for the duration of one
//! loop pass so a chunk of hundreds of iterations streams instead of
//! accumulating.

use std::path::Path;
use std::sync::mpsc::Sender;

use super::archive::ArchiveWriter;
use super::config::{Config, Pipeline};
use super::error::ShardError;
use super::fieldmap::read_field_map;
use super::fields::{field_magnitudes, radius_mask, scale_fields, select_masked, select_masked_1d};
use super::hits::read_hit_file;
use super::reduce::reduce;
use super::run_files::IndexedFile;
use super::worker_status::{Phase, WorkerStatus};

/// What one worker contributed to the run.
#[derive(Debug, Clone, Default)]
pub struct ShardSummary {
    pub processed: usize,
    pub iterations: Vec<u32>,
}

/// Process a chunk of input files into the shard archive at `shard_path`.
pub fn process_chunk(
    config: &Config,
    chunk: &[IndexedFile],
    shard_path: &Path,
    worker_id: usize,
    tx: &Sender<WorkerStatus>,
) -> Result<ShardSummary, ShardError> {
    spdlog::info!(
        "Worker {} starting shard {:?} ({} files)",
        worker_id,
        shard_path.file_name().unwrap_or_default(),
        chunk.len()
    );
    let writer = ArchiveWriter::create(shard_path)?;
    let mut summary = ShardSummary::default();

    tx.send(WorkerStatus::new(
        0.0,
        String::new(),
        worker_id,
        Phase::Processing,
    ))?;

    for (count, file) in chunk.iter().enumerate() {
        let file_name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match config.pipeline {
            Pipeline::FieldMaps => process_field_map_file(config, file, &writer)?,
            Pipeline::Events => process_event_file(config, file, &writer)?,
        }
        summary.processed += 1;
        summary.iterations.push(file.iteration);

        tx.send(WorkerStatus::new(
            (count + 1) as f32 / chunk.len() as f32,
            file_name,
            worker_id,
            Phase::Processing,
        ))?;
    }

    writer.write_shard_metadata(config.tag, &summary.iterations)?;
    tx.send(WorkerStatus::new(
        1.0,
        String::new(),
        worker_id,
        Phase::Finished,
    ))?;
    spdlog::info!(
        "Worker {} finished shard {:?}",
        worker_id,
        shard_path.file_name().unwrap_or_default()
    );
    Ok(summary)
}

/// Decode, scale, filter, and persist one field-map iteration.
fn process_field_map_file(
    config: &Config,
    file: &IndexedFile,
    writer: &ArchiveWriter,
) -> Result<(), ShardError> {
    let size = std::fs::metadata(&file.path)?.len();
    spdlog::info!(
        "Decoding {:?} ({})",
        file.path.file_name().unwrap_or_default(),
        human_bytes::human_bytes(size as f64)
    );

    let map = read_field_map(&file.path)?;
    let positions = map.positions().to_owned();
    let mut fields = map.fields().to_owned();
    let header = map.header;
    drop(map);

    if config.scale_fields {
        scale_fields(fields.view_mut());
    }
    let magnitudes = field_magnitudes(fields.view());
    let mask = radius_mask(positions.view(), config.target, config.radius_mm() as f32);

    let kept_positions = select_masked(positions.view(), &mask);
    let kept_fields = select_masked(fields.view(), &mask);
    let kept_magnitudes = select_masked_1d(magnitudes.view(), &mask);
    drop(positions);
    drop(fields);
    drop(magnitudes);

    spdlog::info!(
        "iter {}: kept {} of {} nodes within {} mm of the target",
        file.iteration,
        kept_positions.nrows(),
        header.total_nodes,
        config.radius_mm()
    );
    writer.write_fieldmap_iteration(
        file.iteration,
        kept_positions.view(),
        kept_fields.view(),
        kept_magnitudes.view(),
        &header,
    )?;
    Ok(())
}

/// Read, reduce, and persist one hit-table iteration.
fn process_event_file(
    config: &Config,
    file: &IndexedFile,
    writer: &ArchiveWriter,
) -> Result<(), ShardError> {
    let table = read_hit_file(&file.path, &config.target_volume)?;
    let reduced = reduce(&table, config.tag);
    reduced.log_summary(file.iteration);

    for (group_name, positions) in reduced.named_position_sets(&table) {
        writer.write_subset(group_name, file.iteration, positions.view())?;
    }
    Ok(())
}
