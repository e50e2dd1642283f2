//! Columnar reader for per-iteration hit-event tables.
//!
//! The simulator records one row per particle step. The reducer only ever
//! needs a fixed handful of columns, so the reader requests exactly that set
//! by name to bound memory; a missing column is an error naming it. The
//! concrete carrier is an HDF5 group with one dataset per column, which keeps
//! the contract `read(path, columns) -> column arrays` while reusing the
//! archive technology already in the crate. Swapping in a different columnar
//! backend touches only this module.
//!
//! Categorical string columns (particle type, volume names) are interned into
//! closed enums on read so the hot filtering loops in the reducer never
//! compare strings.

use std::path::Path;
use std::str::FromStr;

use hdf5::types::VarLenUnicode;
use ndarray::Array2;

use super::constants::*;
use super::error::HitFileError;

/// Particle species appearing in the charging simulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Particle {
    Gamma,
    Electron,
    Proton,
    Other,
}

impl Particle {
    pub fn from_name(name: &str) -> Self {
        match name {
            "gamma" => Particle::Gamma,
            "e-" => Particle::Electron,
            "proton" => Particle::Proton,
            _ => Particle::Other,
        }
    }
}

/// Volumes the reducer distinguishes. `WorldBoundary` is the reserved
/// world-edge volume; `Target` is the configured target material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volume {
    WorldBoundary,
    Target,
    Other,
}

impl Volume {
    pub fn from_name(name: &str, target_volume: &str) -> Self {
        if name == WORLD_VOLUME_NAME {
            Volume::WorldBoundary
        } else if name == target_volume {
            Volume::Target
        } else {
            Volume::Other
        }
    }
}

/// One iteration's hit table with categoricals interned. Rows belonging to
/// one event id form that event's step sequence in recorded order; "first"
/// and "last" row per event are meaningful aggregates.
#[derive(Debug, Clone)]
pub struct HitTable {
    pub events: Vec<i32>,
    pub particles: Vec<Particle>,
    pub parent_ids: Vec<i32>,
    pub volumes_pre: Vec<Volume>,
    pub volumes_post: Vec<Volume>,
    pub ke_post: Vec<f64>,
    pub pos_pre: Array2<f64>,
    pub pos_post: Array2<f64>,
}

impl HitTable {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Hit columns in their raw string form, for staging synthetic tables.
#[derive(Debug, Clone, Default)]
pub struct RawHits {
    pub events: Vec<i32>,
    pub particles: Vec<String>,
    pub parent_ids: Vec<i32>,
    pub volumes_pre: Vec<String>,
    pub volumes_post: Vec<String>,
    pub ke_post: Vec<f64>,
    pub pos_pre: Vec<[f64; 3]>,
    pub pos_post: Vec<[f64; 3]>,
}

impl RawHits {
    /// Append one step row.
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        event: i32,
        particle: &str,
        parent_id: i32,
        volume_pre: &str,
        volume_post: &str,
        ke_post: f64,
        pos_pre: [f64; 3],
        pos_post: [f64; 3],
    ) {
        self.events.push(event);
        self.particles.push(particle.to_string());
        self.parent_ids.push(parent_id);
        self.volumes_pre.push(volume_pre.to_string());
        self.volumes_post.push(volume_post.to_string());
        self.ke_post.push(ke_post);
        self.pos_pre.push(pos_pre);
        self.pos_post.push(pos_post);
    }
}

/// Read the fixed column set from a hit file and intern the categoricals.
///
/// Position columns are stacked into dense `(rows, 3)` arrays on read.
/// All columns must agree on the row count.
pub fn read_hit_file(path: &Path, target_volume: &str) -> Result<HitTable, HitFileError> {
    let file = hdf5::File::open(path)?;
    let hits = file.group(HITS_GROUP)?;

    let events = read_i32_column(&hits, COL_EVENT, path)?;
    let rows = events.len();

    let particle_names = read_string_column(&hits, COL_PARTICLE, path)?;
    let parent_ids = read_i32_column(&hits, COL_PARENT, path)?;
    let pre_names = read_string_column(&hits, COL_VOLUME_PRE, path)?;
    let post_names = read_string_column(&hits, COL_VOLUME_POST, path)?;
    let ke_post = read_f64_column(&hits, COL_KE_POST, path)?;
    let pos_pre = read_position_column(&hits, COL_POS_PRE, path)?;
    let pos_post = read_position_column(&hits, COL_POS_POST, path)?;

    check_length(COL_PARTICLE, rows, particle_names.len())?;
    check_length(COL_PARENT, rows, parent_ids.len())?;
    check_length(COL_VOLUME_PRE, rows, pre_names.len())?;
    check_length(COL_VOLUME_POST, rows, post_names.len())?;
    check_length(COL_KE_POST, rows, ke_post.len())?;
    check_length(COL_POS_PRE, rows, pos_pre.nrows())?;
    check_length(COL_POS_POST, rows, pos_post.nrows())?;

    let particles = particle_names
        .iter()
        .map(|name| Particle::from_name(name))
        .collect();
    let volumes_pre = pre_names
        .iter()
        .map(|name| Volume::from_name(name, target_volume))
        .collect();
    let volumes_post = post_names
        .iter()
        .map(|name| Volume::from_name(name, target_volume))
        .collect();

    Ok(HitTable {
        events,
        particles,
        parent_ids,
        volumes_pre,
        volumes_post,
        ke_post,
        pos_pre,
        pos_post,
    })
}

/// Write a hit table in the column-per-dataset layout `read_hit_file` expects.
pub fn write_hit_file(path: &Path, raw: &RawHits) -> Result<(), HitFileError> {
    let file = hdf5::File::create(path)?;
    let hits = file.create_group(HITS_GROUP)?;

    hits.new_dataset_builder()
        .with_data(&raw.events)
        .create(COL_EVENT)?;
    write_string_column(&hits, COL_PARTICLE, &raw.particles)?;
    hits.new_dataset_builder()
        .with_data(&raw.parent_ids)
        .create(COL_PARENT)?;
    write_string_column(&hits, COL_VOLUME_PRE, &raw.volumes_pre)?;
    write_string_column(&hits, COL_VOLUME_POST, &raw.volumes_post)?;
    hits.new_dataset_builder()
        .with_data(&raw.ke_post)
        .create(COL_KE_POST)?;
    write_position_column(&hits, COL_POS_PRE, &raw.pos_pre)?;
    write_position_column(&hits, COL_POS_POST, &raw.pos_post)?;
    Ok(())
}

fn check_length(
    column: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), HitFileError> {
    if expected == found {
        Ok(())
    } else {
        Err(HitFileError::ColumnLengthMismatch {
            column,
            expected,
            found,
        })
    }
}

fn column_dataset(
    group: &hdf5::Group,
    name: &'static str,
    path: &Path,
) -> Result<hdf5::Dataset, HitFileError> {
    group.dataset(name).map_err(|_| HitFileError::MissingColumn {
        name,
        path: path.to_path_buf(),
    })
}

fn read_i32_column(
    group: &hdf5::Group,
    name: &'static str,
    path: &Path,
) -> Result<Vec<i32>, HitFileError> {
    Ok(column_dataset(group, name, path)?.read_raw::<i32>()?)
}

fn read_f64_column(
    group: &hdf5::Group,
    name: &'static str,
    path: &Path,
) -> Result<Vec<f64>, HitFileError> {
    Ok(column_dataset(group, name, path)?.read_raw::<f64>()?)
}

fn read_string_column(
    group: &hdf5::Group,
    name: &'static str,
    path: &Path,
) -> Result<Vec<String>, HitFileError> {
    let raw = column_dataset(group, name, path)?.read_raw::<VarLenUnicode>()?;
    Ok(raw.iter().map(|v| v.as_str().to_string()).collect())
}

fn read_position_column(
    group: &hdf5::Group,
    name: &'static str,
    path: &Path,
) -> Result<Array2<f64>, HitFileError> {
    let data = column_dataset(group, name, path)?.read_2d::<f64>()?;
    if data.ncols() != 3 && data.nrows() != 0 {
        return Err(HitFileError::BadPositionShape { column: name });
    }
    Ok(data)
}

fn write_string_column(
    group: &hdf5::Group,
    name: &'static str,
    values: &[String],
) -> Result<(), HitFileError> {
    let encoded = values
        .iter()
        .map(|v| {
            VarLenUnicode::from_str(v).map_err(|_| HitFileError::BadString(v.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    group
        .new_dataset_builder()
        .with_data(&encoded)
        .create(name)?;
    Ok(())
}

fn write_position_column(
    group: &hdf5::Group,
    name: &'static str,
    rows: &[[f64; 3]],
) -> Result<(), HitFileError> {
    let mut data = Array2::<f64>::zeros((rows.len(), 3));
    for (i, row) in rows.iter().enumerate() {
        data[[i, 0]] = row[0];
        data[[i, 1]] = row[1];
        data[[i, 2]] = row[2];
    }
    group.new_dataset_builder().with_data(&data).create(name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("charge_reduce_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_interning() {
        assert_eq!(Particle::from_name("gamma"), Particle::Gamma);
        assert_eq!(Particle::from_name("e-"), Particle::Electron);
        assert_eq!(Particle::from_name("mu-"), Particle::Other);
        assert_eq!(
            Volume::from_name(WORLD_VOLUME_NAME, "SiO2"),
            Volume::WorldBoundary
        );
        assert_eq!(Volume::from_name("SiO2", "SiO2"), Volume::Target);
        assert_eq!(Volume::from_name("vacuum", "SiO2"), Volume::Other);
    }

    #[test]
    fn test_hit_file_round_trip() {
        let mut raw = RawHits::default();
        raw.push(
            1,
            "gamma",
            0,
            "vacuum",
            "SiO2",
            0.12,
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.5],
        );
        raw.push(
            1,
            "e-",
            1,
            "SiO2",
            WORLD_VOLUME_NAME,
            0.0,
            [0.0, 0.0, 0.5],
            [0.0, 0.0, 2.0],
        );

        let path = temp_path("hits_roundtrip.h5");
        write_hit_file(&path, &raw).unwrap();
        let table = read_hit_file(&path, "SiO2").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.particles, vec![Particle::Gamma, Particle::Electron]);
        assert_eq!(table.volumes_post[0], Volume::Target);
        assert_eq!(table.volumes_post[1], Volume::WorldBoundary);
        assert_eq!(table.pos_post[[1, 2]], 2.0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_column_named() {
        let path = temp_path("hits_missing.h5");
        {
            let file = hdf5::File::create(&path).unwrap();
            let hits = file.create_group(HITS_GROUP).unwrap();
            hits.new_dataset_builder()
                .with_data(&vec![1_i32, 2])
                .create(COL_EVENT)
                .unwrap();
        }
        match read_hit_file(&path, "SiO2") {
            Err(HitFileError::MissingColumn { name, .. }) => {
                assert_eq!(name, COL_PARTICLE)
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
        std::fs::remove_file(&path).unwrap();
    }
}
