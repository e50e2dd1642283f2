//! Writer for shard and final archives.
//!
//! Both share one layout so the merger can copy shard content verbatim:
//!
//! ```text
//! output.h5 - config, iterations, num_iterations, target, radius_mm,
//!             version, parameters, created
//! |---- <subset group>              (events pipeline)
//! |    |---- iter_<N>(dset)
//! |---- iter_<N>                    (fieldmap pipeline)
//! |    |---- pos(dset)
//! |    |---- E(dset)
//! |    |---- E_mag(dset)
//! |    (attrs: grad_refinements, max_depth, min_step, total_nodes,
//!      final_leaf_nodes)
//! ```
//!
//! Every dataset is deflate-compressed.

use hdf5::types::VarLenUnicode;
use ndarray::{ArrayView1, ArrayView2};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::config::Config;
use super::constants::*;
use super::error::ArchiveError;
use super::fieldmap::FieldMapHeader;
use super::reduce::ConfigTag;

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing reduced iteration data.
#[derive(Debug)]
pub struct ArchiveWriter {
    file_handle: hdf5::File,
    path: PathBuf,
}

/// Per-iteration dataset key, e.g. `iter_42`.
pub fn iter_key(iteration: u32) -> String {
    format!("{ITER_KEY_PREFIX}{iteration}")
}

impl ArchiveWriter {
    /// Create the writer, opening a file at path.
    pub fn create(path: &Path) -> Result<Self, ArchiveError> {
        Ok(Self {
            file_handle: hdf5::File::create(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying HDF5 handle, for structural copies during merging.
    pub fn file(&self) -> &hdf5::File {
        &self.file_handle
    }

    fn group_or_create(&self, name: &str) -> Result<hdf5::Group, ArchiveError> {
        match self.file_handle.group(name) {
            Ok(group) => Ok(group),
            Err(_) => Ok(self.file_handle.create_group(name)?),
        }
    }

    /// Write one physics subset's positions for one iteration.
    pub fn write_subset(
        &self,
        group_name: &str,
        iteration: u32,
        positions: ArrayView2<'_, f64>,
    ) -> Result<(), ArchiveError> {
        let group = self.group_or_create(group_name)?;
        group
            .new_dataset_builder()
            .deflate(DEFLATE_LEVEL)
            .with_data(&positions)
            .create(iter_key(iteration).as_str())?;
        Ok(())
    }

    /// Write one iteration's filtered field-map data and mesh attributes.
    pub fn write_fieldmap_iteration(
        &self,
        iteration: u32,
        positions: ArrayView2<'_, f32>,
        fields: ArrayView2<'_, f32>,
        magnitudes: ArrayView1<'_, f32>,
        header: &FieldMapHeader,
    ) -> Result<(), ArchiveError> {
        let group = self.file_handle.create_group(&iter_key(iteration))?;
        group
            .new_dataset_builder()
            .deflate(DEFLATE_LEVEL)
            .with_data(&positions)
            .create(DSET_POSITIONS)?;
        group
            .new_dataset_builder()
            .deflate(DEFLATE_LEVEL)
            .with_data(&fields)
            .create(DSET_FIELDS)?;
        group
            .new_dataset_builder()
            .deflate(DEFLATE_LEVEL)
            .with_data(&magnitudes)
            .create(DSET_MAGNITUDES)?;

        group
            .new_attr::<u64>()
            .create("grad_refinements")?
            .write_scalar(&header.gradient_refinements())?;
        group
            .new_attr::<u32>()
            .create("max_depth")?
            .write_scalar(&header.max_depth)?;
        group
            .new_attr::<f64>()
            .create("min_step")?
            .write_scalar(&header.min_step)?;
        group
            .new_attr::<u64>()
            .create("total_nodes")?
            .write_scalar(&header.total_nodes)?;
        group
            .new_attr::<u64>()
            .create("final_leaf_nodes")?
            .write_scalar(&header.final_leaf_nodes)?;
        Ok(())
    }

    /// Write the bookkeeping a shard carries for the merge step.
    pub fn write_shard_metadata(
        &self,
        tag: ConfigTag,
        iterations: &[u32],
    ) -> Result<(), ArchiveError> {
        self.write_string_attr("config", tag.as_str())?;
        self.file_handle
            .new_attr_builder()
            .with_data(&ArrayView1::from(iterations))
            .create("iterations")?;
        Ok(())
    }

    /// Write the global metadata of the final archive.
    pub fn write_run_metadata(
        &self,
        config: &Config,
        iterations: &[u32],
    ) -> Result<(), ArchiveError> {
        self.write_string_attr("config", config.tag.as_str())?;
        self.file_handle
            .new_attr_builder()
            .with_data(&ArrayView1::from(iterations))
            .create("iterations")?;
        self.file_handle
            .new_attr::<u64>()
            .create("num_iterations")?
            .write_scalar(&(iterations.len() as u64))?;
        self.file_handle
            .new_attr_builder()
            .with_data(&ArrayView1::from(&config.target[..]))
            .create("target")?;
        self.file_handle
            .new_attr::<f64>()
            .create("radius_mm")?
            .write_scalar(&config.radius_mm())?;

        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);
        self.write_string_attr("version", &version)?;
        // full run parameters, so an archive alone reproduces its run
        self.write_string_attr("parameters", &serde_yaml::to_string(config)?)?;
        let created = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)?;
        self.write_string_attr("created", &created)?;
        Ok(())
    }

    fn write_string_attr(&self, name: &str, value: &str) -> Result<(), ArchiveError> {
        let encoded = VarLenUnicode::from_str(value)
            .map_err(|_| ArchiveError::BadUnicode(value.to_string()))?;
        self.file_handle
            .new_attr::<VarLenUnicode>()
            .create(name)?
            .write_scalar(&encoded)?;
        Ok(())
    }
}
