use std::collections::HashMap;

use crate::provider::{FrameRgba, ObjectId};

/// sRGB color triple, 0-255 per channel.
pub type Rgb = [u8; 3];

/// Hue increment (degrees) giving maximal perceptual spread between
/// consecutive indices without knowing the palette size up front.
pub const GOLDEN_ANGLE_DEG: f64 = 137.50776405003785;

const OBJECT_SATURATION: f64 = 0.75;
const OBJECT_VALUE: f64 = 0.9;

/// Named colormaps recognized for velocity coloring. Closed list; unknown
/// names fail at configuration deserialization.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    #[default]
    Viridis,
    Plasma,
    Inferno,
    Magma,
    Cividis,
    Turbo,
    Rainbow,
    Sinebow,
    Cubehelix,
    Cool,
    Warm,
    Spectral,
    #[serde(rename = "RdYlBu")]
    RdYlBu,
}

impl Colormap {
    pub const ALL: [Colormap; 13] = [
        Colormap::Viridis,
        Colormap::Plasma,
        Colormap::Inferno,
        Colormap::Magma,
        Colormap::Cividis,
        Colormap::Turbo,
        Colormap::Rainbow,
        Colormap::Sinebow,
        Colormap::Cubehelix,
        Colormap::Cool,
        Colormap::Warm,
        Colormap::Spectral,
        Colormap::RdYlBu,
    ];

    fn gradient(self) -> colorous::Gradient {
        match self {
            Colormap::Viridis => colorous::VIRIDIS,
            Colormap::Plasma => colorous::PLASMA,
            Colormap::Inferno => colorous::INFERNO,
            Colormap::Magma => colorous::MAGMA,
            Colormap::Cividis => colorous::CIVIDIS,
            Colormap::Turbo => colorous::TURBO,
            Colormap::Rainbow => colorous::RAINBOW,
            Colormap::Sinebow => colorous::SINEBOW,
            Colormap::Cubehelix => colorous::CUBEHELIX,
            Colormap::Cool => colorous::COOL,
            Colormap::Warm => colorous::WARM,
            Colormap::Spectral => colorous::SPECTRAL,
            Colormap::RdYlBu => colorous::RED_YELLOW_BLUE,
        }
    }

    /// Sample at `t` in [0, 1]; 0 = low end of the scale.
    pub fn sample(self, t: f64) -> Rgb {
        let c = self.gradient().eval_continuous(t.clamp(0.0, 1.0));
        [c.r, c.g, c.b]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwatchOrientation {
    /// High value at the top.
    Vertical,
    /// Low value at the left.
    Horizontal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct SwatchKey {
    map: Colormap,
    width: u32,
    height: u32,
    orientation: SwatchOrientation,
}

/// Color assignment for tracked objects plus scalar-to-color lookup.
///
/// Object colors use golden-angle hue stepping: re-running with the same
/// ordered id list reproduces identical colors, while ids never assigned
/// still get a deterministic color from the same formula keyed by the id
/// value itself.
pub struct ColorMapper {
    object_colors: HashMap<ObjectId, Rgb>,
    swatch_cache: HashMap<SwatchKey, FrameRgba>,
}

impl Default for ColorMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorMapper {
    pub fn new() -> Self {
        Self {
            object_colors: HashMap::new(),
            swatch_cache: HashMap::new(),
        }
    }

    /// Assign a color to each id by its position in `ids`. Replaces any
    /// previous assignment wholesale.
    pub fn assign_colors(&mut self, ids: &[ObjectId]) {
        self.object_colors.clear();
        for (i, &id) in ids.iter().enumerate() {
            self.object_colors.insert(id, golden_angle_color(i as f64));
        }
        tracing::debug!(objects = ids.len(), "assigned object colors");
    }

    pub fn object_color(&self, id: ObjectId) -> Rgb {
        if let Some(&color) = self.object_colors.get(&id) {
            return color;
        }
        golden_angle_color(f64::from(id.0))
    }

    /// Color for a velocity value on the configured scale. The value is
    /// clamped into `[vmin, vmax]`; a degenerate range collapses to the low
    /// end of the map instead of dividing by zero.
    pub fn velocity_color(&self, velocity: f64, vmin: f64, vmax: f64, map: Colormap) -> Rgb {
        let t = if vmax > vmin {
            (velocity - vmin) / (vmax - vmin)
        } else {
            0.0
        };
        map.sample(t)
    }

    /// Gradient swatch for colorbar display, cached per request shape since
    /// every exported frame asks for the same image.
    pub fn colormap_image(
        &mut self,
        map: Colormap,
        width: u32,
        height: u32,
        orientation: SwatchOrientation,
    ) -> &FrameRgba {
        let key = SwatchKey {
            map,
            width,
            height,
            orientation,
        };
        self.swatch_cache
            .entry(key)
            .or_insert_with(|| render_swatch(map, width, height, orientation))
    }
}

fn render_swatch(
    map: Colormap,
    width: u32,
    height: u32,
    orientation: SwatchOrientation,
) -> FrameRgba {
    let mut img = FrameRgba::filled(width, height, [0, 0, 0, 255]);
    match orientation {
        SwatchOrientation::Vertical => {
            for y in 0..height {
                let t = if height > 1 {
                    1.0 - f64::from(y) / f64::from(height - 1)
                } else {
                    1.0
                };
                let [r, g, b] = map.sample(t);
                for x in 0..width {
                    img.put_pixel(x, y, [r, g, b, 255]);
                }
            }
        }
        SwatchOrientation::Horizontal => {
            for x in 0..width {
                let t = if width > 1 {
                    f64::from(x) / f64::from(width - 1)
                } else {
                    0.0
                };
                let [r, g, b] = map.sample(t);
                for y in 0..height {
                    img.put_pixel(x, y, [r, g, b, 255]);
                }
            }
        }
    }
    img
}

fn golden_angle_color(i: f64) -> Rgb {
    let hue = (i * GOLDEN_ANGLE_DEG).rem_euclid(360.0) / 360.0;
    hsv_to_rgb(hue, OBJECT_SATURATION, OBJECT_VALUE)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match (i as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    [
        (r * 255.0) as u8,
        (g * 255.0) as u8,
        (b * 255.0) as u8,
    ]
}
