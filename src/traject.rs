//! Trajectory and velocity computation from labeled mask sequences.
//!
//! Centroids are accumulated for every label in a single sweep per frame
//! (one pass over all objects, not one pass per object per frame). Speeds
//! are physical: pixel displacement scaled by the length-per-pixel factor
//! and divided by the frame interval.

use std::collections::{BTreeMap, HashMap};

use crate::error::{CelltraceError, CelltraceResult};
use crate::provider::{FrameProvider, ObjectId};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackPoint {
    pub frame: usize,
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VelocitySample {
    /// The later frame of the centroid pair this speed was derived from.
    pub frame: usize,
    pub speed: f64,
}

#[derive(Clone, Debug, Default)]
struct Track {
    points: Vec<TrackPoint>,
    velocities: Vec<VelocitySample>,
    original_id: Option<ObjectId>,
}

/// Default colorbar bounds when no velocities exist yet.
pub const DEFAULT_VELOCITY_RANGE: (f64, f64) = (0.0, 100.0);

const RESCALE_NOOP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Default)]
pub struct TrajectoryCalculator {
    tracks: BTreeMap<ObjectId, Track>,
    calculated: bool,
    last_fps: f64,
    last_um_per_pixel: f64,
}

impl TrajectoryCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_calculated(&self) -> bool {
        self.calculated
    }

    pub fn object_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn last_fps(&self) -> f64 {
        self.last_fps
    }

    pub fn last_um_per_pixel(&self) -> f64 {
        self.last_um_per_pixel
    }

    /// Derive all trajectories from the provider's mask sequence.
    ///
    /// A speed is recorded only between directly consecutive frames in which
    /// the object is present; any gap (absent object or unloadable mask)
    /// breaks the velocity chain.
    pub fn calculate_all(
        &mut self,
        provider: &dyn FrameProvider,
        original_fps: f64,
        um_per_pixel: f64,
    ) -> CelltraceResult<()> {
        let frame_count = provider.frame_count();
        if frame_count == 0 {
            return Err(CelltraceError::validation(
                "cannot calculate trajectories: provider has no frames",
            ));
        }

        let frame_interval = if original_fps > 0.0 {
            1.0 / original_fps
        } else {
            1.0
        };

        let mut tracks: BTreeMap<ObjectId, Track> = BTreeMap::new();
        for id in provider.object_ids() {
            tracks.insert(id, Track::default());
        }

        // (frame, x, y) of the most recent centroid per object.
        let mut prev: HashMap<ObjectId, (usize, f64, f64)> = HashMap::new();

        for frame_idx in 0..frame_count {
            let Some(mask) = provider.mask(frame_idx) else {
                continue;
            };

            for (id, (cx, cy)) in frame_centroids(mask.labels(), mask.width()) {
                let track = tracks.entry(id).or_default();
                track.points.push(TrackPoint {
                    frame: frame_idx,
                    x: cx,
                    y: cy,
                });

                if let Some(&(prev_frame, px, py)) = prev.get(&id)
                    && prev_frame + 1 == frame_idx
                {
                    let dx = (cx - px) * um_per_pixel;
                    let dy = (cy - py) * um_per_pixel;
                    let speed = (dx * dx + dy * dy).sqrt() / frame_interval;
                    track.velocities.push(VelocitySample {
                        frame: frame_idx,
                        speed,
                    });
                }
                prev.insert(id, (frame_idx, cx, cy));
            }
        }

        self.tracks = tracks;
        self.calculated = true;
        self.last_fps = original_fps;
        self.last_um_per_pixel = um_per_pixel;
        tracing::info!(
            objects = self.tracks.len(),
            frames = frame_count,
            "trajectory calculation completed"
        );
        Ok(())
    }

    /// Replace all trajectories with externally provided ones.
    ///
    /// Every point is validated against the mask sequence (in bounds and on a
    /// non-background pixel at its rounded position) before any state is
    /// touched; a single bad point fails the whole load and leaves the
    /// calculator exactly as it was. Object ids are reassigned 1..N in order
    /// of earliest appearance (ties broken by original id) and the original
    /// ids retained for lookup.
    pub fn set_from_external(
        &mut self,
        external: &BTreeMap<ObjectId, Vec<TrackPoint>>,
        provider: &dyn FrameProvider,
        original_fps: f64,
        um_per_pixel: f64,
    ) -> CelltraceResult<()> {
        let frame_interval = if original_fps > 0.0 {
            1.0 / original_fps
        } else {
            1.0
        };

        let mut order: Vec<(usize, ObjectId)> = external
            .iter()
            .filter_map(|(&id, points)| {
                let first = points.iter().map(|p| p.frame).min()?;
                Some((first, id))
            })
            .collect();
        order.sort_unstable();

        let mut tracks: BTreeMap<ObjectId, Track> = BTreeMap::new();

        for (new_index, &(_, orig_id)) in order.iter().enumerate() {
            let points = &external[&orig_id];

            for p in points {
                let Some(mask) = provider.mask(p.frame) else {
                    return Err(CelltraceError::validation(format!(
                        "object {orig_id}: failed to load mask for frame {}",
                        p.frame
                    )));
                };

                let px = p.x.round() as i64;
                let py = p.y.round() as i64;
                match mask.get(px, py) {
                    None => {
                        return Err(CelltraceError::validation(format!(
                            "object {orig_id} at frame {}: position ({px}, {py}) is out of image bounds",
                            p.frame
                        )));
                    }
                    Some(0) => {
                        return Err(CelltraceError::validation(format!(
                            "object {orig_id} at frame {}: no mask found at trajectory position ({px}, {py})",
                            p.frame
                        )));
                    }
                    Some(_) => {}
                }
            }

            let mut sorted = points.clone();
            sorted.sort_by_key(|p| p.frame);

            let mut velocities = Vec::with_capacity(sorted.len().saturating_sub(1));
            for pair in sorted.windows(2) {
                let (prev, curr) = (pair[0], pair[1]);
                let dx = (curr.x - prev.x) * um_per_pixel;
                let dy = (curr.y - prev.y) * um_per_pixel;
                let elapsed = (curr.frame as f64 - prev.frame as f64) * frame_interval;
                let speed = if elapsed > 0.0 {
                    (dx * dx + dy * dy).sqrt() / elapsed
                } else {
                    0.0
                };
                velocities.push(VelocitySample {
                    frame: curr.frame,
                    speed,
                });
            }

            tracks.insert(
                ObjectId(new_index as u32 + 1),
                Track {
                    points: sorted,
                    velocities,
                    original_id: Some(orig_id),
                },
            );
        }

        self.tracks = tracks;
        self.calculated = true;
        self.last_fps = original_fps;
        self.last_um_per_pixel = um_per_pixel;
        tracing::info!(
            objects = self.tracks.len(),
            "loaded trajectories from external data"
        );
        Ok(())
    }

    /// Rescale all stored speeds after a parameter change, avoiding a full
    /// recomputation: centroids are unchanged, only the scale factors moved.
    pub fn rescale_velocities(
        &mut self,
        new_fps: f64,
        new_um_per_pixel: f64,
    ) -> CelltraceResult<()> {
        if !self.calculated {
            return Err(CelltraceError::validation(
                "cannot rescale velocities: trajectories not calculated",
            ));
        }
        if self.last_fps <= 0.0 || self.last_um_per_pixel <= 0.0 {
            return Err(CelltraceError::validation(
                "cannot rescale velocities: previous fps/scale were not positive",
            ));
        }

        let factor = (new_um_per_pixel / self.last_um_per_pixel) * (new_fps / self.last_fps);
        if (factor - 1.0).abs() < RESCALE_NOOP_TOLERANCE {
            return Ok(());
        }

        for track in self.tracks.values_mut() {
            for v in &mut track.velocities {
                v.speed *= factor;
            }
        }

        self.last_fps = new_fps;
        self.last_um_per_pixel = new_um_per_pixel;
        tracing::debug!(factor, "velocities rescaled");
        Ok(())
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.tracks.keys().copied().collect()
    }

    pub fn original_id(&self, id: ObjectId) -> Option<ObjectId> {
        let track = self.tracks.get(&id)?;
        Some(track.original_id.unwrap_or(id))
    }

    pub fn centroid(&self, id: ObjectId, frame: usize) -> Option<(f64, f64)> {
        self.tracks
            .get(&id)?
            .points
            .iter()
            .find(|p| p.frame == frame)
            .map(|p| (p.x, p.y))
    }

    pub fn trajectory(&self, id: ObjectId) -> &[TrackPoint] {
        self.tracks.get(&id).map_or(&[], |t| t.points.as_slice())
    }

    pub fn trajectory_segment(&self, id: ObjectId, start: usize, end: usize) -> Vec<TrackPoint> {
        self.trajectory(id)
            .iter()
            .filter(|p| p.frame >= start && p.frame <= end)
            .copied()
            .collect()
    }

    pub fn velocity(&self, id: ObjectId, frame: usize) -> Option<f64> {
        self.tracks
            .get(&id)?
            .velocities
            .iter()
            .find(|v| v.frame == frame)
            .map(|v| v.speed)
    }

    /// Observed (min, max) speed across all objects and frames, or the fixed
    /// default range when nothing has a velocity yet.
    pub fn velocity_range(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for track in self.tracks.values() {
            for v in &track.velocities {
                min = min.min(v.speed);
                max = max.max(v.speed);
            }
        }
        if min > max {
            return DEFAULT_VELOCITY_RANGE;
        }
        (min, max)
    }

    pub fn object_frame_range(&self, id: ObjectId) -> Option<(usize, usize)> {
        let points = &self.tracks.get(&id)?.points;
        let first = points.iter().map(|p| p.frame).min()?;
        let last = points.iter().map(|p| p.frame).max()?;
        Some((first, last))
    }
}

/// Mean pixel position per label in one mask, all labels in one sweep.
fn frame_centroids(labels: &[u32], width: u32) -> BTreeMap<ObjectId, (f64, f64)> {
    let mut acc: HashMap<u32, (f64, f64, u64)> = HashMap::new();
    let width = width as usize;
    for (i, &label) in labels.iter().enumerate() {
        if label == 0 {
            continue;
        }
        let entry = acc.entry(label).or_insert((0.0, 0.0, 0));
        entry.0 += (i % width) as f64;
        entry.1 += (i / width) as f64;
        entry.2 += 1;
    }
    acc.into_iter()
        .map(|(label, (sx, sy, n))| (ObjectId(label), (sx / n as f64, sy / n as f64)))
        .collect()
}
