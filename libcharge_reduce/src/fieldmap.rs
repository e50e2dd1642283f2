//! Decoder for the adaptive-octree field-map binary format.
//!
//! One file is written per charging iteration by the simulator. The layout is
//! a fixed 28-byte header followed by a flat list of leaf-node records:
//!
//! ```text
//! max_depth        u32
//! min_step         f64
//! total_nodes      u64
//! final_leaf_nodes u64
//! nodes            total_nodes x (3x f32 position, 3x f32 field)
//! ```
//!
//! Everything is little-endian with no padding; the producer is fixed, so no
//! byte-swapping support is provided. The body is read in a single bulk
//! operation because production maps run to millions of nodes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array2, ArrayView2, s};

use super::constants::{NODE_RECORD_BYTES, NODE_RECORD_FLOATS};
use super::error::FieldMapError;

/// Mesh metadata carried in the field-map header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMapHeader {
    pub max_depth: u32,
    pub min_step: f64,
    pub total_nodes: u64,
    pub final_leaf_nodes: u64,
}

impl FieldMapHeader {
    /// Nodes that exist only because of gradient-driven refinement,
    /// i.e. interior nodes above the final leaves. Scalar diagnostic,
    /// carried into the archive as an attribute.
    pub fn gradient_refinements(&self) -> u64 {
        self.total_nodes - self.final_leaf_nodes
    }
}

/// A decoded field map: header plus a `(N, 6)` node array where columns
/// 0..3 are the node center position and 3..6 the field vector.
#[derive(Debug, Clone)]
pub struct FieldMap {
    pub header: FieldMapHeader,
    pub nodes: Array2<f32>,
}

impl FieldMap {
    /// View of the position columns, shape `(N, 3)`
    pub fn positions(&self) -> ArrayView2<'_, f32> {
        self.nodes.slice(s![.., 0..3])
    }

    /// View of the field columns, shape `(N, 3)`
    pub fn fields(&self) -> ArrayView2<'_, f32> {
        self.nodes.slice(s![.., 3..6])
    }
}

/// Decode a field-map file.
///
/// The body length is cross-checked twice: it must be an exact multiple of
/// the 24-byte record size, and the resulting record count must equal the
/// header's declared `total_nodes`. A short read anywhere is an IO error.
/// There is no valid partial-node state.
pub fn read_field_map(path: &Path) -> Result<FieldMap, FieldMapError> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader)?;

    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;
    if body.len() % NODE_RECORD_BYTES != 0 {
        return Err(FieldMapError::BodySizeMismatch {
            found: body.len() as u64,
        });
    }
    let found = (body.len() / NODE_RECORD_BYTES) as u64;
    if found != header.total_nodes {
        return Err(FieldMapError::NodeCountMismatch {
            declared: header.total_nodes,
            found,
        });
    }

    let mut flat = vec![0.0_f32; body.len() / std::mem::size_of::<f32>()];
    LittleEndian::read_f32_into(&body, &mut flat);
    let nodes = Array2::from_shape_vec((found as usize, NODE_RECORD_FLOATS), flat)?;

    Ok(FieldMap { header, nodes })
}

fn read_header(reader: &mut impl Read) -> Result<FieldMapHeader, FieldMapError> {
    Ok(FieldMapHeader {
        max_depth: reader.read_u32::<LittleEndian>()?,
        min_step: reader.read_f64::<LittleEndian>()?,
        total_nodes: reader.read_u64::<LittleEndian>()?,
        final_leaf_nodes: reader.read_u64::<LittleEndian>()?,
    })
}

/// Encode a field map in the exact on-disk layout.
///
/// Used to stage synthetic maps; the simulator is the normal producer.
/// `nodes` must be `(header.total_nodes, 6)`.
pub fn write_field_map(
    path: &Path,
    header: &FieldMapHeader,
    nodes: ArrayView2<'_, f32>,
) -> Result<(), FieldMapError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_u32::<LittleEndian>(header.max_depth)?;
    writer.write_f64::<LittleEndian>(header.min_step)?;
    writer.write_u64::<LittleEndian>(header.total_nodes)?;
    writer.write_u64::<LittleEndian>(header.final_leaf_nodes)?;

    for row in nodes.rows() {
        for value in row.iter() {
            writer.write_f32::<LittleEndian>(*value)?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FIELD_MAP_HEADER_BYTES;
    use std::fs::OpenOptions;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("charge_reduce_{}_{}", std::process::id(), name))
    }

    fn synthetic_map(n: usize) -> (FieldMapHeader, Array2<f32>) {
        let header = FieldMapHeader {
            max_depth: 12,
            min_step: 0.8e-6,
            total_nodes: n as u64,
            final_leaf_nodes: (n as u64).saturating_sub(7.min(n as u64)),
        };
        // deterministic pseudo-random values, exactly representable as f32
        let nodes = Array2::from_shape_fn((n, 6), |(i, j)| {
            ((i * 31 + j * 7) % 1000) as f32 * 0.125 - 40.0
        });
        (header, nodes)
    }

    #[test]
    fn test_round_trip() {
        for n in [0_usize, 1, 7, 1000, 10000] {
            let (header, nodes) = synthetic_map(n);
            let path = temp_path(&format!("roundtrip_{n}.bin"));
            write_field_map(&path, &header, nodes.view()).unwrap();
            assert_eq!(
                std::fs::metadata(&path).unwrap().len(),
                (FIELD_MAP_HEADER_BYTES + n * NODE_RECORD_BYTES) as u64
            );
            let map = read_field_map(&path).unwrap();
            assert_eq!(map.header, header);
            assert_eq!(map.nodes, nodes);
            assert_eq!(
                map.header.gradient_refinements(),
                header.total_nodes - header.final_leaf_nodes
            );
            std::fs::remove_file(&path).unwrap();
        }
    }

    #[test]
    fn test_position_field_split() {
        let (header, nodes) = synthetic_map(5);
        let path = temp_path("split.bin");
        write_field_map(&path, &header, nodes.view()).unwrap();
        let map = read_field_map(&path).unwrap();
        assert_eq!(map.positions().shape(), &[5, 3]);
        assert_eq!(map.fields().shape(), &[5, 3]);
        assert_eq!(map.positions()[[2, 1]], nodes[[2, 1]]);
        assert_eq!(map.fields()[[4, 2]], nodes[[4, 5]]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_truncation_detected() {
        let (header, nodes) = synthetic_map(64);
        for cut in [1_u64, 5, 23] {
            let path = temp_path(&format!("truncated_{cut}.bin"));
            write_field_map(&path, &header, nodes.view()).unwrap();
            let full_len = std::fs::metadata(&path).unwrap().len();
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(full_len - cut).unwrap();
            match read_field_map(&path) {
                Err(FieldMapError::BodySizeMismatch { .. }) => (),
                other => panic!("expected BodySizeMismatch, got {other:?}"),
            }
            std::fs::remove_file(&path).unwrap();
        }
    }

    #[test]
    fn test_node_count_mismatch_detected() {
        let (header, nodes) = synthetic_map(16);
        let path = temp_path("count_mismatch.bin");
        write_field_map(&path, &header, nodes.view()).unwrap();
        // chop exactly one whole record; the length stays record-aligned
        let full_len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - NODE_RECORD_BYTES as u64).unwrap();
        match read_field_map(&path) {
            Err(FieldMapError::NodeCountMismatch { declared, found }) => {
                assert_eq!(declared, 16);
                assert_eq!(found, 15);
            }
            other => panic!("expected NodeCountMismatch, got {other:?}"),
        }
        std::fs::remove_file(&path).unwrap();
    }
}
