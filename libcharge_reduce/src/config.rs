use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::DEFAULT_TARGET_VOLUME;
use super::error::ConfigError;
use super::reduce::ConfigTag;

/// Which input kind a run consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// Per-iteration hit-event tables reduced into physics subsets
    Events,
    /// Per-iteration adaptive field maps filtered around the target point
    FieldMaps,
}

/// Structure representing one reduction run. Contains pathing, the physics
/// configuration tag, and the filter/worker parameters.
/// Configs are serializable and deserializable to YAML using serde and
/// serde_yaml; the YAML form is also archived with the output so a result
/// file records the parameters that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub pipeline: Pipeline,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub tag: ConfigTag,
    /// Target point in the simulation frame, mm
    pub target: [f32; 3],
    /// Filter radius around the target point, micrometers
    pub radius_um: f64,
    /// Name of the target-material volume in the simulator geometry
    pub target_volume: String,
    /// Rescale field components to V/m before computing magnitudes
    pub scale_fields: bool,
    /// Process only iterations up to this number, inclusive
    pub max_iteration: Option<u32>,
    pub n_workers: usize,
    /// Overall deadline for the whole run, seconds
    pub timeout_s: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: Pipeline::Events,
            input_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            tag: ConfigTag::Photoemission,
            target: [-0.1, 0.0, 0.122],
            radius_um: 100.0,
            target_volume: String::from(DEFAULT_TARGET_VOLUME),
            scale_fields: true,
            max_iteration: None,
            n_workers: 1,
            timeout_s: None,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Reject parameter combinations that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_workers < 1 {
            return Err(ConfigError::BadWorkerCount(self.n_workers));
        }
        if !self.input_path.exists() {
            return Err(ConfigError::BadFilePath(self.input_path.clone()));
        }
        Ok(())
    }

    /// Filter radius in mm, the unit node positions are stored in.
    pub fn radius_mm(&self) -> f64 {
        self.radius_um / 1000.0
    }

    /// Path of the final archive, with the `.h5` extension enforced.
    pub fn archive_path(&self) -> PathBuf {
        let mut path = self.output_path.clone();
        if path.extension().map(|e| e != "h5").unwrap_or(true) {
            path.set_extension("h5");
        }
        path
    }

    /// Private shard path for one worker, beside the final archive.
    pub fn shard_path(&self, worker_id: usize) -> PathBuf {
        let archive = self.archive_path();
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("output"));
        archive.with_file_name(format!("{stem}_shard_{worker_id}.h5"))
    }

    /// Shell-style pattern describing every shard of this run, for messages.
    pub fn shard_pattern(&self) -> String {
        let archive = self.archive_path();
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("output"));
        format!("{stem}_shard_*.h5")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_and_shard_paths() {
        let config = Config {
            output_path: PathBuf::from("/data/out/run7"),
            ..Config::default()
        };
        assert_eq!(config.archive_path(), PathBuf::from("/data/out/run7.h5"));
        assert_eq!(
            config.shard_path(3),
            PathBuf::from("/data/out/run7_shard_3.h5")
        );
        assert_eq!(config.shard_pattern(), "run7_shard_*.h5");
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.tag, config.tag);
        assert_eq!(back.radius_um, config.radius_um);
        assert_eq!(back.target_volume, config.target_volume);
    }

    #[test]
    fn test_radius_conversion() {
        let config = Config {
            radius_um: 10.0,
            ..Config::default()
        };
        assert_eq!(config.radius_mm(), 0.01);
    }
}
