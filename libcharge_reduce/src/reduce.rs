//! Event-level reduction of one iteration's hit table into the named physics
//! subsets the archive stores.
//!
//! All subsets are index sets into the parent table; nothing is copied until
//! the shard writer slices the position columns. The single most reused
//! primitive is [`filter_unique`], which reduces an index set to one row per
//! distinct event id.

use fxhash::{FxHashMap, FxHashSet};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::constants::*;
use super::error::ReduceError;
use super::hits::{HitTable, Particle, Volume};

/// Which physics configuration drove the simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigTag {
    Photoemission,
    SolarWind,
    AllParticles,
}

impl ConfigTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigTag::Photoemission => "photoemission",
            ConfigTag::SolarWind => "solarwind",
            ConfigTag::AllParticles => "allparticles",
        }
    }
}

impl FromStr for ConfigTag {
    type Err = ReduceError;

    /// Tags are matched by substring so decorated run names such as
    /// `onlyphotoemission` resolve to the plain tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("photoemission") {
            Ok(ConfigTag::Photoemission)
        } else if s.contains("solarwind") {
            Ok(ConfigTag::SolarWind)
        } else if s.contains("allparticles") {
            Ok(ConfigTag::AllParticles)
        } else {
            Err(ReduceError::UnknownConfigTag(s.to_string()))
        }
    }
}

/// Whether unique-event filtering keeps the first or last occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    First,
    Last,
}

/// Reduce an index set to one row per distinct event id.
///
/// "First" and "last" mean position in the input index array, not any
/// timestamp; if the table is not in chronological step order within an
/// event, this does not reinterpret it as time ordering. Survivors keep
/// their original relative order.
pub fn filter_unique(events: &[i32], indices: &[usize], keep: Keep) -> Vec<usize> {
    let mut chosen: FxHashMap<i32, usize> = FxHashMap::default();
    for (pos, &idx) in indices.iter().enumerate() {
        match keep {
            Keep::First => {
                chosen.entry(events[idx]).or_insert(pos);
            }
            Keep::Last => {
                chosen.insert(events[idx], pos);
            }
        }
    }
    indices
        .iter()
        .enumerate()
        .filter_map(|(pos, &idx)| (chosen[&events[idx]] == pos).then_some(idx))
        .collect()
}

/// First row of every event whose id is in `triggering`. Models "which
/// primary particle led to this secondary outcome".
fn join_first(events: &[i32], triggering: &FxHashSet<i32>) -> Vec<usize> {
    let member: Vec<usize> = (0..events.len())
        .filter(|&i| triggering.contains(&events[i]))
        .collect();
    filter_unique(events, &member, Keep::First)
}

/// Subsets derived under the photoemission configuration.
#[derive(Debug, Clone, Default)]
pub struct PhotoemissionSets {
    /// First gamma row (parent 0) per event
    pub incident_gammas: Vec<usize>,
    /// First row of events in which a secondary electron was created
    pub gamma_to_create: Vec<usize>,
    /// Secondary electrons that stopped in the target material
    pub stopped: Vec<usize>,
    /// First row of events whose secondary electron escaped to the world boundary
    pub gamma_to_eject: Vec<usize>,
}

/// Subsets derived under the solar-wind configuration.
#[derive(Debug, Clone, Default)]
pub struct SolarWindSets {
    pub protons_inside: Vec<usize>,
    pub protons_incident: Vec<usize>,
    pub electrons_inside: Vec<usize>,
    pub electrons_incident: Vec<usize>,
}

/// Subsets derived under the all-particles configuration: the union of the
/// photoemission creation/stopping outputs and the solar-wind inside sets.
#[derive(Debug, Clone, Default)]
pub struct AllParticleSets {
    pub gamma_to_create: Vec<usize>,
    pub stopped: Vec<usize>,
    pub protons_inside: Vec<usize>,
    pub electrons_inside: Vec<usize>,
}

/// The reducer output, shaped by the configuration tag.
#[derive(Debug, Clone)]
pub enum Reduced {
    Photoemission(PhotoemissionSets),
    SolarWind(SolarWindSets),
    AllParticles(AllParticleSets),
}

/// Partition a hit table into the named subsets for `tag`.
///
/// A zero-row table yields the correctly shaped empty subsets.
pub fn reduce(table: &HitTable, tag: ConfigTag) -> Reduced {
    match tag {
        ConfigTag::Photoemission => Reduced::Photoemission(photoemission_sets(table)),
        ConfigTag::SolarWind => Reduced::SolarWind(solar_wind_sets(table)),
        ConfigTag::AllParticles => {
            let photo = photoemission_sets(table);
            let solar = solar_wind_sets(table);
            Reduced::AllParticles(AllParticleSets {
                gamma_to_create: photo.gamma_to_create,
                stopped: photo.stopped,
                protons_inside: solar.protons_inside,
                electrons_inside: solar.electrons_inside,
            })
        }
    }
}

fn photoemission_sets(t: &HitTable) -> PhotoemissionSets {
    let n = t.len();

    let gamma_idx: Vec<usize> = (0..n)
        .filter(|&i| t.particles[i] == Particle::Gamma && t.parent_ids[i] == 0)
        .collect();
    let incident_gammas = filter_unique(&t.events, &gamma_idx, Keep::First);

    // secondary electrons, one final state per event
    let e2_idx: Vec<usize> = (0..n)
        .filter(|&i| t.particles[i] == Particle::Electron && t.parent_ids[i] > 0)
        .collect();
    let e2_last = filter_unique(&t.events, &e2_idx, Keep::Last);

    let world_e: Vec<usize> = e2_last
        .iter()
        .copied()
        .filter(|&i| {
            t.volumes_pre[i] == Volume::WorldBoundary
                || t.volumes_post[i] == Volume::WorldBoundary
        })
        .collect();

    let stopped: Vec<usize> = (0..n)
        .filter(|&i| {
            t.particles[i] == Particle::Electron
                && t.parent_ids[i] > 0
                && t.ke_post[i] == 0.0
                && t.volumes_post[i] == Volume::Target
        })
        .collect();

    let ejected_events: FxHashSet<i32> = world_e.iter().map(|&i| t.events[i]).collect();
    let created_events: FxHashSet<i32> = e2_last.iter().map(|&i| t.events[i]).collect();

    PhotoemissionSets {
        incident_gammas,
        gamma_to_create: join_first(&t.events, &created_events),
        stopped,
        gamma_to_eject: join_first(&t.events, &ejected_events),
    }
}

fn solar_wind_sets(t: &HitTable) -> SolarWindSets {
    let n = t.len();

    let proton_inc: Vec<usize> = (0..n)
        .filter(|&i| t.particles[i] == Particle::Proton && t.parent_ids[i] == 0)
        .collect();
    let protons_incident = filter_unique(&t.events, &proton_inc, Keep::First);

    let proton_idx: Vec<usize> = (0..n)
        .filter(|&i| t.particles[i] == Particle::Proton)
        .collect();
    let proton_last = filter_unique(&t.events, &proton_idx, Keep::Last);
    let protons_inside: Vec<usize> = proton_last
        .iter()
        .copied()
        .filter(|&i| t.volumes_post[i] == Volume::Target)
        .collect();

    let e_inc: Vec<usize> = (0..n)
        .filter(|&i| t.particles[i] == Particle::Electron && t.parent_ids[i] == 0)
        .collect();
    let electrons_incident = filter_unique(&t.events, &e_inc, Keep::First);
    let e_inc_last = filter_unique(&t.events, &e_inc, Keep::Last);
    let electrons_inside: Vec<usize> = e_inc_last
        .iter()
        .copied()
        .filter(|&i| t.volumes_post[i] == Volume::Target)
        .collect();

    SolarWindSets {
        protons_inside,
        protons_incident,
        electrons_inside,
        electrons_incident,
    }
}

/// Slice position rows for an index subset.
pub fn select_positions(positions: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    positions.select(Axis(0), indices)
}

impl Reduced {
    /// The archive groups this reduction writes, paired with the position
    /// slice each stores (pre-step for incident subsets, post-step for
    /// final-state subsets).
    pub fn named_position_sets(&self, table: &HitTable) -> Vec<(&'static str, Array2<f64>)> {
        match self {
            Reduced::Photoemission(sets) => vec![
                (
                    GROUP_GAMMA_CREATE,
                    select_positions(&table.pos_pre, &sets.gamma_to_create),
                ),
                (GROUP_E_STOPPED, select_positions(&table.pos_post, &sets.stopped)),
                (
                    GROUP_GAMMA_EJECT,
                    select_positions(&table.pos_pre, &sets.gamma_to_eject),
                ),
            ],
            Reduced::SolarWind(sets) => vec![
                (
                    GROUP_PROTONS_INSIDE,
                    select_positions(&table.pos_post, &sets.protons_inside),
                ),
                (
                    GROUP_PROTONS_INCIDENT,
                    select_positions(&table.pos_pre, &sets.protons_incident),
                ),
                (
                    GROUP_ELECTRONS_INSIDE,
                    select_positions(&table.pos_post, &sets.electrons_inside),
                ),
                (
                    GROUP_ELECTRONS_INCIDENT,
                    select_positions(&table.pos_pre, &sets.electrons_incident),
                ),
            ],
            Reduced::AllParticles(sets) => vec![
                (
                    GROUP_GAMMA_CREATE,
                    select_positions(&table.pos_pre, &sets.gamma_to_create),
                ),
                (
                    GROUP_E_STOPPED_FROM_GAMMA,
                    select_positions(&table.pos_post, &sets.stopped),
                ),
                (
                    GROUP_PROTONS_INSIDE,
                    select_positions(&table.pos_post, &sets.protons_inside),
                ),
                (
                    GROUP_ELECTRONS_INSIDE,
                    select_positions(&table.pos_post, &sets.electrons_inside),
                ),
            ],
        }
    }

    /// Log per-iteration yield figures the way the analysis scripts printed
    /// them.
    pub fn log_summary(&self, iteration: u32) {
        match self {
            Reduced::Photoemission(sets) => {
                let incident = sets.incident_gammas.len();
                if incident > 0 {
                    spdlog::info!(
                        "iter {}: photoelectric yield {:.4} ({} / {}), {} e- stopped, {} ejected",
                        iteration,
                        sets.gamma_to_create.len() as f64 / incident as f64,
                        sets.gamma_to_create.len(),
                        incident,
                        sets.stopped.len(),
                        sets.gamma_to_eject.len(),
                    );
                }
            }
            Reduced::SolarWind(sets) => {
                spdlog::info!(
                    "iter {}: H+ stopped {} / {}, e- stopped {} / {}",
                    iteration,
                    sets.protons_inside.len(),
                    sets.protons_incident.len(),
                    sets.electrons_inside.len(),
                    sets.electrons_incident.len(),
                );
            }
            Reduced::AllParticles(sets) => {
                spdlog::info!(
                    "iter {}: {} gammas created e-, {} e- stopped, {} H+ inside, {} e- inside",
                    iteration,
                    sets.gamma_to_create.len(),
                    sets.stopped.len(),
                    sets.protons_inside.len(),
                    sets.electrons_inside.len(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn empty_table() -> HitTable {
        HitTable {
            events: Vec::new(),
            particles: Vec::new(),
            parent_ids: Vec::new(),
            volumes_pre: Vec::new(),
            volumes_post: Vec::new(),
            ke_post: Vec::new(),
            pos_pre: Array2::zeros((0, 3)),
            pos_post: Array2::zeros((0, 3)),
        }
    }

    fn push_row(
        t: &mut HitTable,
        event: i32,
        particle: Particle,
        parent: i32,
        pre: Volume,
        post: Volume,
        ke: f64,
    ) {
        t.events.push(event);
        t.particles.push(particle);
        t.parent_ids.push(parent);
        t.volumes_pre.push(pre);
        t.volumes_post.push(post);
        t.ke_post.push(ke);
        let row = t.events.len() as f64;
        t.pos_pre
            .push_row(ndarray::ArrayView1::from(&[row, 0.0, 0.0]))
            .unwrap();
        t.pos_post
            .push_row(ndarray::ArrayView1::from(&[row, 0.0, 1.0]))
            .unwrap();
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!(
            "onlyphotoemission".parse::<ConfigTag>().unwrap(),
            ConfigTag::Photoemission
        );
        assert_eq!(
            "solarwind".parse::<ConfigTag>().unwrap(),
            ConfigTag::SolarWind
        );
        assert_eq!(
            "allparticles".parse::<ConfigTag>().unwrap(),
            ConfigTag::AllParticles
        );
        assert!(matches!(
            "onlyUV".parse::<ConfigTag>(),
            Err(ReduceError::UnknownConfigTag(_))
        ));
    }

    #[test]
    fn test_filter_unique_first_last() {
        // indices into an event column with repeats in a known order
        let events = vec![5, 3, 5, 7, 3, 5];
        let indices: Vec<usize> = (0..events.len()).collect();

        let first = filter_unique(&events, &indices, Keep::First);
        assert_eq!(first, vec![0, 1, 3]);

        let last = filter_unique(&events, &indices, Keep::Last);
        assert_eq!(last, vec![3, 4, 5]);

        // order preservation follows the input index order, not event-id order
        let reversed: Vec<usize> = (0..events.len()).rev().collect();
        let first_rev = filter_unique(&events, &reversed, Keep::First);
        assert_eq!(first_rev, vec![5, 4, 3]);
    }

    #[test]
    fn test_photoemission_scenario() {
        let mut t = empty_table();
        // event 1: gamma then a secondary e- stopping in the target
        push_row(&mut t, 1, Particle::Gamma, 0, Volume::Other, Volume::Target, 0.1);
        push_row(&mut t, 1, Particle::Electron, 1, Volume::Target, Volume::Target, 0.0);
        // event 2: gamma only, no secondary
        push_row(&mut t, 2, Particle::Gamma, 0, Volume::Other, Volume::Target, 0.1);
        // event 3: gamma then a secondary e- escaping to the world boundary
        push_row(&mut t, 3, Particle::Gamma, 0, Volume::Other, Volume::Target, 0.1);
        push_row(
            &mut t,
            3,
            Particle::Electron,
            1,
            Volume::Target,
            Volume::WorldBoundary,
            0.05,
        );

        let reduced = reduce(&t, ConfigTag::Photoemission);
        let Reduced::Photoemission(sets) = reduced else {
            panic!("wrong variant");
        };
        assert_eq!(sets.incident_gammas.len(), 3);
        assert_eq!(sets.stopped, vec![1]);
        assert_eq!(sets.gamma_to_eject, vec![3]);
        assert_eq!(sets.gamma_to_create, vec![0, 3]);
    }

    #[test]
    fn test_solar_wind_sets() {
        let mut t = empty_table();
        // event 1: primary proton entering and stopping in the target
        push_row(&mut t, 1, Particle::Proton, 0, Volume::Other, Volume::Target, 0.5);
        push_row(&mut t, 1, Particle::Proton, 0, Volume::Target, Volume::Target, 0.0);
        // event 2: primary proton scattering back out
        push_row(&mut t, 2, Particle::Proton, 0, Volume::Other, Volume::Target, 0.5);
        push_row(&mut t, 2, Particle::Proton, 0, Volume::Target, Volume::Other, 0.2);
        // event 3: primary electron stopping inside
        push_row(&mut t, 3, Particle::Electron, 0, Volume::Other, Volume::Target, 0.0);

        let Reduced::SolarWind(sets) = reduce(&t, ConfigTag::SolarWind) else {
            panic!("wrong variant");
        };
        assert_eq!(sets.protons_incident, vec![0, 2]);
        assert_eq!(sets.protons_inside, vec![1]);
        assert_eq!(sets.electrons_incident, vec![4]);
        assert_eq!(sets.electrons_inside, vec![4]);
    }

    #[test]
    fn test_zero_rows_yield_empty_shapes() {
        let t = empty_table();
        let Reduced::AllParticles(sets) = reduce(&t, ConfigTag::AllParticles) else {
            panic!("wrong variant");
        };
        assert!(sets.gamma_to_create.is_empty());
        assert!(sets.stopped.is_empty());
        assert!(sets.protons_inside.is_empty());
        assert!(sets.electrons_inside.is_empty());
        let named = Reduced::AllParticles(sets).named_position_sets(&t);
        assert_eq!(named.len(), 4);
        for (_, data) in named {
            assert_eq!(data.nrows(), 0);
        }
    }
}
