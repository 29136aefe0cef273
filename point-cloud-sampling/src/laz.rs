/// LAS/LAZ input adapter.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use constants::channel::{BIAS_VALUE, CHANNEL_MAP, COLOUR_CHANNEL_IDS, U16_FULL_SCALE};
use las::Reader;
use log::info;

use crate::cloud::{FeatureSchema, PointCloud};
use crate::error::Result;
use crate::progress::progress_bar;
use crate::subsampling::GridAccumulator;

/// Points decoded per call into a chunk consumer.
const READ_CHUNK: usize = 100_000;

/// A cloud read from disk plus what is needed to map it back.
#[derive(Debug, Clone)]
pub struct LoadedCloud {
    pub cloud: PointCloud,
    /// Points read from the file, before any subsampling.
    pub raw_points: usize,
    /// World position of the local origin.
    pub origin: [f64; 3],
    pub has_colour: bool,
}

/// Header facts shared by every chunk of one file.
///
/// Coordinates are shifted by the header minimum before narrowing to `f32`,
/// so georeferenced clouds keep millimetre precision.
struct InputLayout {
    origin: [f64; 3],
    has_colour: bool,
    schema: FeatureSchema,
}

pub fn create_reader(file_path: &Path) -> Result<Reader> {
    let file = File::open(file_path)?;
    Ok(Reader::new(BufReader::new(file))?)
}

/// Channels produced by the loader, colour channels only when the format carries them.
pub fn channel_schema(has_colour: bool) -> FeatureSchema {
    FeatureSchema::new(
        CHANNEL_MAP
            .iter()
            .filter(|c| has_colour || !COLOUR_CHANNEL_IDS.contains(&c.id))
            .map(|c| c.name),
    )
}

/// Open the file and derive the origin and channel layout from its header.
fn open_input(file_path: &Path) -> Result<(Reader, InputLayout)> {
    let reader = create_reader(file_path)?;
    let header = reader.header();
    let has_colour = header.point_format().has_color;
    let min = header.bounds().min;
    let layout = InputLayout {
        origin: [min.x, min.y, min.z],
        has_colour,
        schema: channel_schema(has_colour),
    };
    Ok((reader, layout))
}

/// Decode points in chunks of at most `READ_CHUNK`, handing each to `consume`.
///
/// Positions are shifted by the header minimum; features carry normalised
/// intensity, colour when present, and a constant bias channel.
fn read_chunks<F>(mut reader: Reader, layout: &InputLayout, mut consume: F) -> Result<usize>
where
    F: FnMut(&[[f32; 3]], &[f32]) -> Result<()>,
{
    let origin = layout.origin;
    let dim = layout.schema.dim();
    let total_points = reader.header().number_of_points();

    let mut positions = Vec::with_capacity(READ_CHUNK);
    let mut features = Vec::with_capacity(READ_CHUNK * dim);
    let mut read = 0usize;

    let pb = progress_bar(total_points, "points", "Loading points");
    for point_result in reader.points() {
        let point = point_result?;
        positions.push([
            (point.x - origin[0]) as f32,
            (point.y - origin[1]) as f32,
            (point.z - origin[2]) as f32,
        ]);

        features.push(point.intensity as f32 / U16_FULL_SCALE);
        if layout.has_colour {
            let (r, g, b) = point.color.map_or((0, 0, 0), |c| (c.red, c.green, c.blue));
            features.extend([r, g, b].map(|v| v as f32 / U16_FULL_SCALE));
        }
        features.push(BIAS_VALUE);

        if positions.len() == READ_CHUNK {
            consume(&positions, &features)?;
            read += positions.len();
            positions.clear();
            features.clear();
            pb.set_position(read as u64);
        }
    }
    if !positions.is_empty() {
        consume(&positions, &features)?;
        read += positions.len();
    }
    pb.finish_with_message("Points loaded");

    Ok(read)
}

/// Read every point into memory.
pub fn load_cloud(file_path: &Path) -> Result<LoadedCloud> {
    let (reader, layout) = open_input(file_path)?;
    let mut positions = Vec::new();
    let mut features = Vec::new();
    let read = read_chunks(reader, &layout, |p, f| {
        positions.extend_from_slice(p);
        features.extend_from_slice(f);
        Ok(())
    })?;

    info!(
        "Loaded {} points from {} ({} channels, colour: {})",
        read,
        file_path.display(),
        layout.schema.dim(),
        layout.has_colour
    );

    Ok(LoadedCloud {
        cloud: PointCloud::new(positions, features, layout.schema)?,
        raw_points: read,
        origin: layout.origin,
        has_colour: layout.has_colour,
    })
}

/// Grid subsample the file at `dl` while reading it.
///
/// Only one chunk of raw points is held at a time, the rest of the memory
/// follows the number of occupied cells.
pub fn load_subsampled(file_path: &Path, dl: f32) -> Result<LoadedCloud> {
    let (reader, layout) = open_input(file_path)?;
    let mut grid = GridAccumulator::new(dl, layout.schema.dim())?;
    let read = read_chunks(reader, &layout, |p, f| grid.add_chunk(p, f))?;

    info!(
        "Subsampled {} points from {} into {} cells at dl={}",
        read,
        file_path.display(),
        grid.occupied_cells(),
        dl
    );
    let (positions, features) = grid.into_barycenters();

    Ok(LoadedCloud {
        cloud: PointCloud::with_index_cell_size(positions, features, layout.schema, dl)?,
        raw_points: read,
        origin: layout.origin,
        has_colour: layout.has_colour,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SamplingError;
    use crate::subsampling::GridSubsampler;
    use approx::assert_relative_eq;
    use las::{Header, Point, Writer};

    /// 40 x 40 grid at 0.1 spacing, offset far from the world origin.
    fn write_grid(path: &Path) {
        let mut writer = Writer::from_path(path, Header::default()).unwrap();
        for i in 0..40 {
            for j in 0..40 {
                writer
                    .write_point(Point {
                        x: 1_000.0 + i as f64 * 0.1,
                        y: 2_000.0 + j as f64 * 0.1,
                        z: 5.0,
                        intensity: 32_768,
                        ..Default::default()
                    })
                    .unwrap();
            }
        }
        writer.close().unwrap();
    }

    #[test]
    fn schema_follows_colour_availability() {
        assert_eq!(
            channel_schema(true).channels,
            vec!["intensity", "red", "green", "blue", "bias"]
        );
        assert_eq!(channel_schema(false).channels, vec!["intensity", "bias"]);
    }

    #[test]
    fn streamed_subsampling_matches_loading_then_subsampling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.las");
        write_grid(&path);

        let loaded = load_cloud(&path).unwrap();
        assert_eq!(loaded.raw_points, 1_600);
        assert!(!loaded.has_colour);
        assert_relative_eq!(loaded.origin[0], 1_000.0, epsilon = 1e-6);

        let expected = GridSubsampler::new(0.25).unwrap().subsample(&loaded.cloud).unwrap();
        let streamed = load_subsampled(&path, 0.25).unwrap();

        assert_eq!(streamed.raw_points, 1_600);
        assert_eq!(streamed.origin, loaded.origin);
        assert_eq!(streamed.cloud.len(), expected.len());
        assert_eq!(streamed.cloud.schema(), expected.schema());
        for i in 0..expected.len() {
            for a in 0..3 {
                assert_relative_eq!(
                    streamed.cloud.position(i)[a],
                    expected.position(i)[a],
                    epsilon = 1e-5
                );
            }
            assert_relative_eq!(streamed.cloud.point_features(i)[0], 0.5, epsilon = 1e-4);
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cloud(&dir.path().join("absent.laz")).unwrap_err();
        assert!(matches!(err, SamplingError::Io(_)));
    }
}
