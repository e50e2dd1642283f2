//! Fixed sizes, names, and conversion factors shared across the crate.

/// Byte length of the field-map header: u32 depth + f64 step + 2x u64 counts
pub const FIELD_MAP_HEADER_BYTES: usize = 28;
/// Byte length of one node record: 3x f32 position + 3x f32 field
pub const NODE_RECORD_BYTES: usize = 24;
/// Floats per node record
pub const NODE_RECORD_FLOATS: usize = 6;

/// Conversion from internal simulator field units to V/m
pub const FIELD_SCALE: f32 = 1.0e9;

/// Reserved volume name marking the edge of the simulation world
pub const WORLD_VOLUME_NAME: &str = "physical_cyclic";
/// Default target material volume name
pub const DEFAULT_TARGET_VOLUME: &str = "SiO2";

// Column names of the hit-event table. The reader requests exactly this set;
// anything else the simulator wrote stays on disk.
pub const COL_EVENT: &str = "Event_Number";
pub const COL_PARTICLE: &str = "Particle_Type";
pub const COL_PARENT: &str = "Parent_ID";
pub const COL_VOLUME_PRE: &str = "Volume_Name_Pre";
pub const COL_VOLUME_POST: &str = "Volume_Name_Post";
pub const COL_KE_POST: &str = "Kinetic_Energy_Post_MeV";
pub const COL_POS_PRE: &str = "Pre_Step_Position_mm";
pub const COL_POS_POST: &str = "Post_Step_Position_mm";

/// Group holding the hit-table columns inside a hit file
pub const HITS_GROUP: &str = "hits";

// Archive group names per physics subset
pub const GROUP_GAMMA_CREATE: &str = "gamma_initial_leading_e_creation";
pub const GROUP_E_STOPPED: &str = "electrons_stopped";
pub const GROUP_E_STOPPED_FROM_GAMMA: &str = "electrons_stopped_from_gamma";
pub const GROUP_GAMMA_EJECT: &str = "gamma_initial_leading_to_e_ejection";
pub const GROUP_PROTONS_INSIDE: &str = "protons_inside";
pub const GROUP_PROTONS_INCIDENT: &str = "protons_incident";
pub const GROUP_ELECTRONS_INSIDE: &str = "electrons_inside";
pub const GROUP_ELECTRONS_INCIDENT: &str = "electrons_incident";

// Dataset names inside a field-map iteration group
pub const DSET_POSITIONS: &str = "pos";
pub const DSET_FIELDS: &str = "E";
pub const DSET_MAGNITUDES: &str = "E_mag";

/// Prefix of per-iteration dataset/group keys, e.g. `iter_42`
pub const ITER_KEY_PREFIX: &str = "iter_";

/// Deflate level applied to every archive dataset
pub const DEFLATE_LEVEL: u8 = 5;

/// Version string of the archive layout
pub const FORMAT_VERSION: &str = "1.0";

/// Extensions of the two input kinds
pub const FIELD_MAP_EXTENSION: &str = "bin";
pub const HIT_FILE_EXTENSION: &str = "h5";
