//! The run driver: index inputs, fan work out to worker threads, merge the
//! shards, report a summary.
//!
//! Workers are plain OS threads over contiguous chunks of the sorted file
//! index. Processing order is not observable in the output because the final
//! archive is keyed by iteration number and its global metadata is sorted, so
//! the archive contents are independent of the worker count.

use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use super::config::{Config, Pipeline};
use super::constants::{FIELD_MAP_EXTENSION, HIT_FILE_EXTENSION};
use super::error::PipelineError;
use super::merge::merge_shards;
use super::run_files::{collect_input_files, IndexedFile};
use super::shard::{process_chunk, ShardSummary};
use super::worker_status::WorkerStatus;

/// Final accounting of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub iterations: Vec<u32>,
    pub archive_path: std::path::PathBuf,
    pub elapsed: Duration,
}

/// Split the file index into contiguous chunks, one per worker. Workers
/// that would receive nothing are simply not created.
pub fn create_chunks(files: &[IndexedFile], n_workers: usize) -> Vec<Vec<IndexedFile>> {
    let chunk_size = files.len().div_ceil(n_workers.max(1));
    files
        .chunks(chunk_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Poll until every worker thread has finished or the deadline passes.
///
/// On expiry the threads are abandoned, not killed; their shards stay on
/// disk for retry.
fn wait_for_deadline<T>(
    handles: &[std::thread::JoinHandle<T>],
    deadline: Instant,
    timeout_s: u64,
) -> Result<(), PipelineError> {
    while !handles.iter().all(|handle| handle.is_finished()) {
        if Instant::now() > deadline {
            spdlog::error!("Run exceeded the {timeout_s} s deadline, aborting");
            return Err(PipelineError::Timeout(timeout_s));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}

/// Run the whole reduction: scan, process in parallel, merge.
///
/// Any worker failure aborts the run after the remaining workers finish;
/// their shards are left in place for diagnosis. The merge only runs when
/// every worker succeeded, so an archive on disk is never silently partial.
pub fn run(config: &Config, tx: Sender<WorkerStatus>) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    config.validate()?;

    let extension = match config.pipeline {
        Pipeline::Events => HIT_FILE_EXTENSION,
        Pipeline::FieldMaps => FIELD_MAP_EXTENSION,
    };
    let index = collect_input_files(
        &config.input_path,
        config.tag.as_str(),
        extension,
        config.max_iteration,
    )?;
    if index.files.is_empty() {
        return Err(PipelineError::NoInputFiles(config.input_path.clone()));
    }

    let total_size: u64 = index
        .files
        .iter()
        .filter_map(|f| std::fs::metadata(&f.path).ok())
        .map(|m| m.len())
        .sum();
    spdlog::info!(
        "Processing {} files ({}), skipping {} with unparseable names",
        index.files.len(),
        human_bytes::human_bytes(total_size as f64),
        index.skipped
    );

    let chunks = create_chunks(&index.files, config.n_workers);
    spdlog::info!("Spawning {} workers", chunks.len());

    let mut handles = Vec::with_capacity(chunks.len());
    for (worker_id, chunk) in chunks.into_iter().enumerate() {
        let worker_config = config.clone();
        let worker_tx = tx.clone();
        let shard_path = config.shard_path(worker_id);
        handles.push(std::thread::spawn(move || {
            process_chunk(&worker_config, &chunk, &shard_path, worker_id, &worker_tx)
        }));
    }
    drop(tx);

    if let Some(timeout_s) = config.timeout_s {
        wait_for_deadline(&handles, start + Duration::from_secs(timeout_s), timeout_s)?;
    }

    let mut summaries: Vec<ShardSummary> = Vec::with_capacity(handles.len());
    let mut failure: Option<PipelineError> = None;
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(summary)) => summaries.push(summary),
            Ok(Err(source)) => {
                spdlog::error!("Worker {worker_id} failed: {source}");
                failure.get_or_insert(PipelineError::WorkerError {
                    id: worker_id,
                    source,
                });
            }
            Err(_) => {
                spdlog::error!("Worker {worker_id} panicked");
                failure.get_or_insert(PipelineError::WorkerPanic(worker_id));
            }
        }
    }
    if let Some(error) = failure {
        spdlog::warn!("Shard files are preserved for inspection");
        return Err(error);
    }

    let merge = merge_shards(config)?;

    let summary = RunSummary {
        processed: summaries.iter().map(|s| s.processed).sum(),
        skipped: index.skipped,
        iterations: merge.iterations,
        archive_path: merge.archive_path,
        elapsed: start.elapsed(),
    };
    spdlog::info!(
        "Done: {} files processed, {} skipped, output {:?} in {:.1} s",
        summary.processed,
        summary.skipped,
        summary.archive_path,
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::error::{MergeError, ShardError};
    use crate::fieldmap::{write_field_map, FieldMapHeader};
    use crate::hits::{write_hit_file, RawHits};
    use crate::merge::merge_shards;
    use crate::reduce::ConfigTag;
    use ndarray::Array2;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc::channel;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "charge_reduce_{}_{}",
            std::process::id(),
            name
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn stage_field_maps(dir: &Path, count: u32) {
        for iteration in 0..count {
            let n = 4 + iteration as usize;
            let header = FieldMapHeader {
                max_depth: 8,
                min_step: 1.0e-6,
                total_nodes: n as u64,
                final_leaf_nodes: n as u64 - 1,
            };
            let nodes = Array2::from_shape_fn((n, 6), |(i, j)| {
                (iteration as f32) * 0.0625 + (i * 6 + j) as f32 * 0.125
            });
            write_field_map(
                &dir.join(format!("map_{iteration}_photoemission.bin")),
                &header,
                nodes.view(),
            )
            .unwrap();
        }
    }

    fn field_map_config(dir: &Path, output: &str, n_workers: usize) -> Config {
        Config {
            pipeline: Pipeline::FieldMaps,
            input_path: dir.to_path_buf(),
            output_path: dir.join(output),
            tag: ConfigTag::Photoemission,
            target: [0.0, 0.0, 0.0],
            radius_um: 1.0e9, // keep every node
            n_workers,
            ..Config::default()
        }
    }

    fn archive_snapshot(path: &Path) -> Vec<(String, String, Vec<f32>)> {
        let file = hdf5::File::open(path).unwrap();
        let mut snapshot = Vec::new();
        let mut groups = file.member_names().unwrap();
        groups.sort();
        for group_name in groups {
            let group = file.group(&group_name).unwrap();
            let mut members = group.member_names().unwrap();
            members.sort();
            for dataset_name in members {
                let data = group
                    .dataset(&dataset_name)
                    .unwrap()
                    .read_raw::<f32>()
                    .unwrap();
                snapshot.push((group_name.clone(), dataset_name, data));
            }
        }
        snapshot
    }

    #[test]
    fn test_parallel_serial_equivalence() {
        let dir = temp_dir("equivalence");
        stage_field_maps(&dir, 6);

        let serial = field_map_config(&dir, "serial", 1);
        let (tx, _rx) = channel();
        let serial_summary = run(&serial, tx).unwrap();

        let parallel = field_map_config(&dir, "parallel", 4);
        let (tx, _rx) = channel();
        let parallel_summary = run(&parallel, tx).unwrap();

        assert_eq!(serial_summary.processed, 6);
        assert_eq!(serial_summary.iterations, parallel_summary.iterations);
        assert_eq!(serial_summary.iterations, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            archive_snapshot(&serial_summary.archive_path),
            archive_snapshot(&parallel_summary.archive_path)
        );

        let serial_file = hdf5::File::open(&serial_summary.archive_path).unwrap();
        let parallel_file = hdf5::File::open(&parallel_summary.archive_path).unwrap();
        for file in [&serial_file, &parallel_file] {
            assert_eq!(
                file.attr("iterations").unwrap().read_raw::<u32>().unwrap(),
                vec![0, 1, 2, 3, 4, 5]
            );
            assert_eq!(
                file.attr("num_iterations")
                    .unwrap()
                    .read_scalar::<u64>()
                    .unwrap(),
                6
            );
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_merge_retry_fails_cleanly() {
        let dir = temp_dir("merge_retry");
        stage_field_maps(&dir, 2);
        let config = field_map_config(&dir, "retry", 2);
        let (tx, _rx) = channel();
        run(&config, tx).unwrap();

        // shards were deleted by the successful merge; a re-run must refuse
        match merge_shards(&config) {
            Err(MergeError::NoShards(pattern)) => {
                assert!(pattern.contains("retry_shard_"))
            }
            other => panic!("expected NoShards, got {other:?}"),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_worker_failure_preserves_shards() {
        let dir = temp_dir("worker_failure");
        stage_field_maps(&dir, 4);
        // truncate the map the second worker's chunk ends on
        let bad = dir.join("map_3_photoemission.bin");
        let full_len = std::fs::metadata(&bad).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&bad).unwrap();
        file.set_len(full_len - 5).unwrap();

        let config = field_map_config(&dir, "wounded", 2);
        let (tx, _rx) = channel();
        match run(&config, tx) {
            Err(PipelineError::WorkerError {
                id: 1,
                source: ShardError::FieldMapError(_),
            }) => (),
            other => panic!("expected WorkerError from worker 1, got {other:?}"),
        }
        // the healthy worker's shard is left for inspection; no merge ran
        assert!(config.shard_path(0).exists());
        assert!(!config.archive_path().exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let dir = temp_dir("deadline");
        let stale_shard = dir.join("stale_shard_0.h5");
        std::fs::write(&stale_shard, b"partial").unwrap();

        let (release_tx, release_rx) = channel::<()>();
        let handles = [std::thread::spawn(move || release_rx.recv())];
        let expired = Instant::now() - Duration::from_millis(10);
        match wait_for_deadline(&handles, expired, 3) {
            Err(PipelineError::Timeout(3)) => (),
            other => panic!("expected Timeout, got {other:?}"),
        }
        // the driver walked away without touching worker output
        assert!(stale_shard.exists());

        release_tx.send(()).unwrap();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_events_end_to_end() {
        let dir = temp_dir("events_e2e");
        for iteration in 1..=3_u32 {
            let mut raw = RawHits::default();
            raw.push(
                1,
                "gamma",
                0,
                "vacuum",
                "SiO2",
                0.1,
                [iteration as f64, 0.0, 1.0],
                [iteration as f64, 0.0, 0.5],
            );
            raw.push(
                1,
                "e-",
                1,
                "SiO2",
                "SiO2",
                0.0,
                [iteration as f64, 0.0, 0.5],
                [iteration as f64, 0.0, 0.4],
            );
            write_hit_file(
                &dir.join(format!("hits_iteration{iteration}_photoemission.h5")),
                &raw,
            )
            .unwrap();
        }

        let config = Config {
            pipeline: Pipeline::Events,
            input_path: dir.clone(),
            output_path: dir.join("events"),
            tag: ConfigTag::Photoemission,
            n_workers: 2,
            ..Config::default()
        };
        let (tx, _rx) = channel();
        let summary = run(&config, tx).unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.iterations, vec![1, 2, 3]);

        let file = hdf5::File::open(&summary.archive_path).unwrap();
        let stopped = file.group(GROUP_E_STOPPED).unwrap();
        for iteration in 1..=3_u32 {
            let data = stopped
                .dataset(&format!("iter_{iteration}"))
                .unwrap()
                .read_2d::<f64>()
                .unwrap();
            assert_eq!(data, ndarray::array![[iteration as f64, 0.0, 0.4]]);
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let dir = temp_dir("empty_input");
        let config = field_map_config(&dir, "nothing", 1);
        let (tx, _rx) = channel();
        match run(&config, tx) {
            Err(PipelineError::NoInputFiles(path)) => assert_eq!(path, dir),
            other => panic!("expected NoInputFiles, got {other:?}"),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_chunking_is_contiguous() {
        let files: Vec<IndexedFile> = (0..7)
            .map(|i| IndexedFile {
                iteration: i,
                path: PathBuf::from(format!("f_{i}.bin")),
            })
            .collect();
        let chunks = create_chunks(&files, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 3);
        assert_eq!(chunks[1].len(), 3);
        assert_eq!(chunks[2].len(), 1);
        // more workers than files: only as many chunks as files
        let chunks = create_chunks(&files[..2], 5);
        assert_eq!(chunks.len(), 2);
    }
}
