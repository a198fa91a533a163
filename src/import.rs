//! Conversion of externally tracked trajectory tables.
//!
//! File parsing (CSV/Excel readers, column pickers) belongs to the host
//! shell; this module takes already-parsed rows and performs the unit
//! conversion and structural validation needed before
//! [`TrajectoryCalculator::set_from_external`](crate::TrajectoryCalculator::set_from_external).

use std::collections::BTreeMap;

use crate::error::{CelltraceError, CelltraceResult};
use crate::provider::ObjectId;
use crate::traject::TrackPoint;

/// Unit of the time column in the source table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeColumnUnit {
    Frame,
    Ms,
    S,
    Min,
    H,
}

/// Unit of the coordinate columns in the source table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceColumnUnit {
    Pixel,
    Um,
}

/// One parsed table row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectoryRow {
    pub object: ObjectId,
    pub time: f64,
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct ImportOptions {
    pub time_unit: TimeColumnUnit,
    pub space_unit: SpaceColumnUnit,
    pub original_fps: f64,
    pub um_per_pixel: f64,
}

/// Group rows per object and convert times to frame indices and coordinates
/// to pixels. Trajectories come out sorted by frame; objects keep their
/// original ids (reassignment happens at calculator import).
pub fn convert_rows(
    rows: &[TrajectoryRow],
    options: ImportOptions,
) -> CelltraceResult<BTreeMap<ObjectId, Vec<TrackPoint>>> {
    if options.time_unit != TimeColumnUnit::Frame && options.original_fps <= 0.0 {
        return Err(CelltraceError::validation(
            "time unit conversion requires a positive original fps",
        ));
    }
    if options.space_unit == SpaceColumnUnit::Um && options.um_per_pixel <= 0.0 {
        return Err(CelltraceError::validation(
            "length unit conversion requires a positive um-per-pixel scale",
        ));
    }

    let mut trajectories: BTreeMap<ObjectId, Vec<TrackPoint>> = BTreeMap::new();

    for row in rows {
        let seconds = match options.time_unit {
            TimeColumnUnit::Frame => None,
            TimeColumnUnit::Ms => Some(row.time / 1000.0),
            TimeColumnUnit::S => Some(row.time),
            TimeColumnUnit::Min => Some(row.time * 60.0),
            TimeColumnUnit::H => Some(row.time * 3600.0),
        };
        let frame_value = match seconds {
            None => row.time,
            Some(s) => s * options.original_fps,
        };
        let frame = frame_value.round();
        if !frame.is_finite() || frame < 0.0 {
            return Err(CelltraceError::validation(format!(
                "object {}: time value {} maps to invalid frame {frame}",
                row.object, row.time
            )));
        }

        let to_pixels = |v: f64| match options.space_unit {
            SpaceColumnUnit::Pixel => v,
            SpaceColumnUnit::Um => v / options.um_per_pixel,
        };

        trajectories.entry(row.object).or_default().push(TrackPoint {
            frame: frame as usize,
            x: to_pixels(row.x),
            y: to_pixels(row.y),
        });
    }

    for points in trajectories.values_mut() {
        points.sort_by_key(|p| p.frame);
    }

    Ok(trajectories)
}

/// Structural validation against the sequence geometry: duplicate frames per
/// object, frame range, and coordinate bounds. One descriptive error,
/// nothing partially accepted.
pub fn validate_trajectories(
    trajectories: &BTreeMap<ObjectId, Vec<TrackPoint>>,
    frame_count: usize,
    frame_width: u32,
    frame_height: u32,
) -> CelltraceResult<()> {
    if trajectories.is_empty() {
        return Err(CelltraceError::validation("no trajectory data to validate"));
    }

    for (&id, points) in trajectories {
        let mut last_frame: Option<usize> = None;
        for p in points {
            if last_frame == Some(p.frame) {
                return Err(CelltraceError::validation(format!(
                    "object {id} has duplicate data at frame {}",
                    p.frame
                )));
            }
            last_frame = Some(p.frame);

            if p.frame >= frame_count {
                return Err(CelltraceError::validation(format!(
                    "trajectory data contains frame {}, but the sequence only has {frame_count} frames (0-{})",
                    p.frame,
                    frame_count.saturating_sub(1)
                )));
            }
            if p.x < 0.0 || p.x >= f64::from(frame_width) {
                return Err(CelltraceError::validation(format!(
                    "object {id} at frame {}: x coordinate {:.1} is out of range [0, {frame_width})",
                    p.frame, p.x
                )));
            }
            if p.y < 0.0 || p.y >= f64::from(frame_height) {
                return Err(CelltraceError::validation(format!(
                    "object {id} at frame {}: y coordinate {:.1} is out of range [0, {frame_height})",
                    p.frame, p.y
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(object: u32, time: f64, x: f64, y: f64) -> TrajectoryRow {
        TrajectoryRow {
            object: ObjectId(object),
            time,
            x,
            y,
        }
    }

    #[test]
    fn seconds_convert_through_fps_and_um_through_scale() {
        let rows = [row(1, 0.5, 10.0, 20.0), row(1, 1.0, 12.0, 20.0)];
        let trajectories = convert_rows(
            &rows,
            ImportOptions {
                time_unit: TimeColumnUnit::S,
                space_unit: SpaceColumnUnit::Um,
                original_fps: 2.0,
                um_per_pixel: 2.0,
            },
        )
        .unwrap();

        let points = &trajectories[&ObjectId(1)];
        assert_eq!(points[0], TrackPoint { frame: 1, x: 5.0, y: 10.0 });
        assert_eq!(points[1], TrackPoint { frame: 2, x: 6.0, y: 10.0 });
    }

    #[test]
    fn frame_unit_passes_through_and_sorts() {
        let rows = [row(3, 4.0, 1.0, 1.0), row(3, 2.0, 0.0, 0.0)];
        let trajectories = convert_rows(
            &rows,
            ImportOptions {
                time_unit: TimeColumnUnit::Frame,
                space_unit: SpaceColumnUnit::Pixel,
                original_fps: 0.0,
                um_per_pixel: 1.0,
            },
        )
        .unwrap();
        let frames: Vec<usize> = trajectories[&ObjectId(3)].iter().map(|p| p.frame).collect();
        assert_eq!(frames, vec![2, 4]);
    }

    #[test]
    fn negative_time_is_rejected() {
        let rows = [row(1, -2.0, 0.0, 0.0)];
        assert!(
            convert_rows(
                &rows,
                ImportOptions {
                    time_unit: TimeColumnUnit::S,
                    space_unit: SpaceColumnUnit::Pixel,
                    original_fps: 1.0,
                    um_per_pixel: 1.0,
                },
            )
            .is_err()
        );
    }

    #[test]
    fn validation_catches_duplicates_range_and_bounds() {
        let mut trajectories = BTreeMap::new();
        trajectories.insert(
            ObjectId(1),
            vec![
                TrackPoint { frame: 0, x: 1.0, y: 1.0 },
                TrackPoint { frame: 0, x: 2.0, y: 1.0 },
            ],
        );
        let err = validate_trajectories(&trajectories, 10, 8, 8).unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let mut trajectories = BTreeMap::new();
        trajectories.insert(ObjectId(1), vec![TrackPoint { frame: 12, x: 1.0, y: 1.0 }]);
        let err = validate_trajectories(&trajectories, 10, 8, 8).unwrap_err();
        assert!(err.to_string().contains("only has 10 frames"));

        let mut trajectories = BTreeMap::new();
        trajectories.insert(ObjectId(1), vec![TrackPoint { frame: 0, x: 9.0, y: 1.0 }]);
        let err = validate_trajectories(&trajectories, 10, 8, 8).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let mut trajectories = BTreeMap::new();
        trajectories.insert(ObjectId(1), vec![TrackPoint { frame: 0, x: 1.0, y: 1.0 }]);
        assert!(validate_trajectories(&trajectories, 10, 8, 8).is_ok());
    }
}
