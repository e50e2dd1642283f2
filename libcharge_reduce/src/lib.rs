//! # charge_reduce
//!
//! charge_reduce is the post-processing toolkit for the spacecraft-charging Monte Carlo
//! simulations, written in Rust. It takes the raw per-iteration outputs of a simulation
//! campaign — adaptive-octree electric field maps in a compact binary format, and
//! per-event particle hit tables in HDF5 — and reduces them into a single structured
//! HDF5 archive per run, ready for plotting and analysis.
//!
//! Two pipelines are provided:
//!
//! - `fieldmaps`: decode every field-map file of a run, optionally rescale the field
//!   vectors to V/m, compute per-node magnitudes, and keep only the nodes inside a
//!   sphere around the region of interest.
//! - `events`: read every hit file of a run and reduce the step-level records to the
//!   event-level particle populations of interest (photoemission, solar wind, or both).
//!
//! Both pipelines split the input files of a run across worker threads. Each worker
//! writes its own shard archive; once all workers succeed the shards are merged
//! serially into the final archive and deleted. If any worker fails, the shards are
//! left on disk for inspection and no merge is attempted.
//!
//! ## Installation
//!
//! Install from source with `cargo install --path ./charge_reduce_cli` from the top
//! level of the repository. HDF5 must be installed first; if it lives outside the
//! normal library search path, point the build at it through `.cargo/config.toml`:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ## Configuration
//!
//! Runs are driven by a YAML configuration file (see [`config::Config`]). A template
//! can be generated with the CLI `new` subcommand. The format is:
//!
//! ```yml
//! pipeline: fieldmaps
//! input_path: /data/run42/
//! output_path: /data/run42/reduced.h5
//! tag: photoemission
//! target:
//! - -0.1
//! - 0.0
//! - 0.122
//! radius_um: 100.0
//! target_volume: SiO2
//! scale_fields: true
//! max_iteration: null
//! n_workers: 4
//! timeout_s: null
//! ```
//!
//! ## Output
//!
//! The archive layout for the fieldmaps pipeline is:
//!
//! ```text
//! reduced.h5 - config, iterations, num_iterations, target, radius_mm, version, parameters, created
//! |---- iter_# - grad_refinements, max_depth, min_step, total_nodes, final_leaf_nodes
//! |    |---- pos(dset)
//! |    |---- E(dset)
//! |    |---- E_mag(dset)
//! ```
//!
//! and for the events pipeline one group per particle population, each holding one
//! `iter_#` position dataset per input file.
pub mod archive;
pub mod config;
pub mod constants;
pub mod error;
pub mod fieldmap;
pub mod fields;
pub mod hits;
pub mod macros;
pub mod merge;
pub mod pipeline;
pub mod reduce;
pub mod run_files;
pub mod shard;
pub mod worker_status;
