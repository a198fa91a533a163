use std::sync::Arc;

use crate::error::{CelltraceError, CelltraceResult};

/// Object identifier as stored in labeled masks. Positive; 0 is background.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ObjectId(pub u32);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Straight-alpha RGBA8 raster. Camera frames are fully opaque (a = 255).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRgba {
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> CelltraceResult<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return Err(CelltraceError::validation(
                "frame byte length must equal width*height*4",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn load_png(path: impl AsRef<std::path::Path>) -> CelltraceResult<Self> {
        let img = image::open(path.as_ref())
            .map_err(|e| {
                CelltraceError::validation(format!(
                    "failed to decode image '{}': {e}",
                    path.as_ref().display()
                ))
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        Self::from_rgba8(width, height, img.into_raw())
    }

    pub fn save_png(&self, path: impl AsRef<std::path::Path>) -> CelltraceResult<()> {
        image::save_buffer(
            path.as_ref(),
            &self.data,
            self.width,
            self.height,
            image::ColorType::Rgba8,
        )
        .map_err(|e| {
            CelltraceError::export(format!(
                "failed to write image '{}': {e}",
                path.as_ref().display()
            ))
        })
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }
}

/// 2D integer label raster paired with one original frame. 0 = background.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMask {
    width: u32,
    height: u32,
    labels: Vec<u32>,
}

impl LabelMask {
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_labels(width: u32, height: u32, labels: Vec<u32>) -> CelltraceResult<Self> {
        if labels.len() != width as usize * height as usize {
            return Err(CelltraceError::validation(
                "mask label count must equal width*height",
            ));
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn label(&self, x: u32, y: u32) -> u32 {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn get(&self, x: i64, y: i64) -> Option<u32> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some(self.label(x as u32, y as u32))
    }

    pub fn set(&mut self, x: u32, y: u32, label: u32) {
        self.labels[y as usize * self.width as usize + x as usize] = label;
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Sorted unique non-background labels present in this mask.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<u32> = self.labels.iter().copied().filter(|&v| v != 0).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(ObjectId).collect()
    }
}

/// Source of original frames and labeled masks for one sequence.
///
/// Implementations own loading, validation, and caching (a bounded LRU is
/// recommended since the renderer re-fetches per frame). Both rasters of a
/// pair must share dimensions; `None` signals a frame that failed to load and
/// is skipped at render granularity rather than aborting.
pub trait FrameProvider {
    fn frame_count(&self) -> usize;

    /// All object ids present anywhere in the sequence, ascending.
    fn object_ids(&self) -> Vec<ObjectId>;

    fn frame(&self, index: usize) -> Option<Arc<FrameRgba>>;

    fn mask(&self, index: usize) -> Option<Arc<LabelMask>>;
}

/// In-memory provider. Backs the test suite and small sequences; also the
/// reference implementation for file-backed providers in the host shell.
pub struct MemoryProvider {
    frames: Vec<Option<Arc<FrameRgba>>>,
    masks: Vec<Option<Arc<LabelMask>>>,
    object_ids: Vec<ObjectId>,
}

impl MemoryProvider {
    pub fn new(frames: Vec<Option<FrameRgba>>, masks: Vec<Option<LabelMask>>) -> Self {
        let masks: Vec<Option<Arc<LabelMask>>> =
            masks.into_iter().map(|m| m.map(Arc::new)).collect();
        let mut ids: Vec<ObjectId> = masks
            .iter()
            .flatten()
            .flat_map(|m| m.object_ids())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Self {
            frames: frames.into_iter().map(|f| f.map(Arc::new)).collect(),
            masks,
            object_ids: ids,
        }
    }
}

impl FrameProvider for MemoryProvider {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn object_ids(&self) -> Vec<ObjectId> {
        self.object_ids.clone()
    }

    fn frame(&self, index: usize) -> Option<Arc<FrameRgba>> {
        self.frames.get(index)?.clone()
    }

    fn mask(&self, index: usize) -> Option<Arc<LabelMask>> {
        self.masks.get(index)?.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_object_ids_are_sorted_and_deduped() {
        let mut mask = LabelMask::zeroed(4, 1);
        mask.set(0, 0, 7);
        mask.set(1, 0, 2);
        mask.set(2, 0, 7);
        assert_eq!(
            mask.object_ids(),
            vec![ObjectId(2), ObjectId(7)],
        );
    }

    #[test]
    fn frame_rejects_bad_byte_length() {
        assert!(FrameRgba::from_rgba8(2, 2, vec![0u8; 15]).is_err());
    }

    #[test]
    fn memory_provider_collects_ids_across_frames() {
        let mut m0 = LabelMask::zeroed(2, 2);
        m0.set(0, 0, 3);
        let mut m1 = LabelMask::zeroed(2, 2);
        m1.set(1, 1, 1);
        let provider = MemoryProvider::new(
            vec![
                Some(FrameRgba::filled(2, 2, [0, 0, 0, 255])),
                Some(FrameRgba::filled(2, 2, [0, 0, 0, 255])),
            ],
            vec![Some(m0), Some(m1)],
        );
        assert_eq!(provider.frame_count(), 2);
        assert_eq!(provider.object_ids(), vec![ObjectId(1), ObjectId(3)]);
        assert!(provider.frame(5).is_none());
    }
}
