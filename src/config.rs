//! Visualization configuration model.
//!
//! One flat record per visual element, grouped under [`RenderConfig`]. The
//! JSON document round-trips field-for-field (top-level keys: `global, mask,
//! contour, centroid, ellipse_axes, trajectory, time_label, scale_bar,
//! speed_label, colorbar, output`). The configuration layer of the host
//! application mutates these between renders; the renderer treats a config as
//! an immutable snapshot for the duration of one render call.

use std::path::Path;

use crate::color::{Colormap, Rgb};
use crate::error::{CelltraceError, CelltraceResult};

/// Label positions are fractions of the original (pre-extension) frame size,
/// permissively clamped so elements can sit just outside the frame (e.g. a
/// colorbar in the extension margin).
pub const POSITION_MIN: f64 = -0.5;
pub const POSITION_MAX: f64 = 2.0;

pub fn clamp_position(pos: [f64; 2]) -> [f64; 2] {
    [
        pos[0].clamp(POSITION_MIN, POSITION_MAX),
        pos[1].clamp(POSITION_MIN, POSITION_MAX),
    ]
}

/// The draggable annotation elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Time,
    ScaleBar,
    Speed,
    Colorbar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorName {
    #[default]
    White,
    Black,
    Red,
    Blue,
    Green,
    Yellow,
}

impl ColorName {
    pub fn rgb(self) -> Rgb {
        match self {
            ColorName::White => [255, 255, 255],
            ColorName::Black => [0, 0, 0],
            ColorName::Red => [255, 0, 0],
            ColorName::Blue => [0, 0, 255],
            ColorName::Green => [0, 255, 0],
            ColorName::Yellow => [255, 255, 0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default)]
pub enum FontFamily {
    #[default]
    Arial,
    #[serde(rename = "Times New Roman")]
    TimesNewRoman,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Ms,
    #[default]
    S,
    Min,
    H,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryMode {
    #[default]
    Full,
    StartToCurrent,
    DelayBefore,
    DelayAfter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrajectoryColorMode {
    #[default]
    Object,
    Velocity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarkerShape {
    #[default]
    Circle,
    Triangle,
    Star,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScaleTextPosition {
    Above,
    #[default]
    Below,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorbarTitlePosition {
    #[default]
    Top,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Avi,
    Gif,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub original_fps: f64,
    pub um_per_pixel: f64,
    pub output_fps: f64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            original_fps: 1.0,
            um_per_pixel: 1.0,
            output_fps: 30.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    pub enabled: bool,
    pub opacity: f64,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            opacity: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    pub enabled: bool,
    pub thickness: u32,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thickness: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CentroidConfig {
    pub enabled: bool,
    pub marker_shape: MarkerShape,
    pub marker_size: u32,
}

impl Default for CentroidConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            marker_shape: MarkerShape::Circle,
            marker_size: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EllipseAxesConfig {
    pub show_major_axis: bool,
    pub show_minor_axis: bool,
    pub major_thickness: u32,
    pub major_color: ColorName,
    pub minor_thickness: u32,
    pub minor_color: ColorName,
}

impl Default for EllipseAxesConfig {
    fn default() -> Self {
        Self {
            show_major_axis: false,
            show_minor_axis: false,
            major_thickness: 1,
            major_color: ColorName::White,
            minor_thickness: 1,
            minor_color: ColorName::White,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    pub enabled: bool,
    pub mode: TrajectoryMode,
    /// Window width in seconds for the delay modes.
    pub delay_time: f64,
    pub thickness: u32,
    pub color_mode: TrajectoryColorMode,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: TrajectoryMode::Full,
            delay_time: 1.0,
            thickness: 1,
            color_mode: TrajectoryColorMode::Object,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TimeLabelConfig {
    pub enabled: bool,
    pub unit: TimeUnit,
    pub font_family: FontFamily,
    pub font_size: u32,
    pub font_bold: bool,
    pub color: ColorName,
    pub position: [f64; 2],
}

impl Default for TimeLabelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unit: TimeUnit::S,
            font_family: FontFamily::Arial,
            font_size: 24,
            font_bold: false,
            color: ColorName::White,
            position: [0.02, 0.02],
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScaleBarConfig {
    pub enabled: bool,
    pub thickness: u32,
    pub length_um: f64,
    pub bar_color: ColorName,
    pub text_enabled: bool,
    pub text_position: ScaleTextPosition,
    pub text_gap: i32,
    pub font_family: FontFamily,
    pub font_size: u32,
    pub font_bold: bool,
    pub text_color: ColorName,
    pub position: [f64; 2],
}

impl Default for ScaleBarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thickness: 3,
            length_um: 50.0,
            bar_color: ColorName::White,
            text_enabled: true,
            text_position: ScaleTextPosition::Below,
            text_gap: 5,
            font_family: FontFamily::Arial,
            font_size: 18,
            font_bold: false,
            text_color: ColorName::White,
            position: [0.85, 0.92],
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SpeedLabelConfig {
    pub enabled: bool,
    pub font_family: FontFamily,
    pub font_size: u32,
    pub font_bold: bool,
    pub color: ColorName,
    pub position: [f64; 2],
}

impl Default for SpeedLabelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            font_family: FontFamily::Arial,
            font_size: 20,
            font_bold: false,
            color: ColorName::White,
            position: [0.02, 0.92],
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ColorbarConfig {
    pub enabled: bool,
    pub colormap: Colormap,
    pub bar_height: u32,
    pub bar_width: u32,
    pub title: String,
    pub title_font_family: FontFamily,
    pub title_font_size: u32,
    pub title_font_bold: bool,
    pub title_color: ColorName,
    pub title_position: ColorbarTitlePosition,
    pub title_gap: i32,
    pub vmin: f64,
    pub vmax: f64,
    pub tick_interval: f64,
    pub tick_font_family: FontFamily,
    pub tick_font_size: u32,
    pub tick_font_bold: bool,
    pub tick_color: ColorName,
    pub border_thickness: u32,
    pub tick_thickness: u32,
    pub tick_length: i32,
    pub position: [f64; 2],
}

impl Default for ColorbarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            colormap: Colormap::Viridis,
            bar_height: 200,
            bar_width: 14,
            title: "Speed (\u{03bc}m/s)".to_string(),
            title_font_family: FontFamily::Arial,
            title_font_size: 14,
            title_font_bold: false,
            title_color: ColorName::Black,
            title_position: ColorbarTitlePosition::Top,
            title_gap: 5,
            vmin: 0.0,
            vmax: 100.0,
            tick_interval: 20.0,
            tick_font_family: FontFamily::Arial,
            tick_font_size: 12,
            tick_font_bold: false,
            tick_color: ColorName::Black,
            border_thickness: 1,
            tick_thickness: 1,
            tick_length: 5,
            position: [1.02, 0.1],
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub video_format: VideoFormat,
    pub image_prefix: String,
    pub subfolder_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            video_format: VideoFormat::Mp4,
            image_prefix: "frame_".to_string(),
            subfolder_name: "frames".to_string(),
        }
    }
}

/// Complete visualization configuration snapshot.
#[derive(Clone, Debug, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub global: GlobalConfig,
    pub mask: MaskConfig,
    pub contour: ContourConfig,
    pub centroid: CentroidConfig,
    pub ellipse_axes: EllipseAxesConfig,
    pub trajectory: TrajectoryConfig,
    pub time_label: TimeLabelConfig,
    pub scale_bar: ScaleBarConfig,
    pub speed_label: SpeedLabelConfig,
    pub colorbar: ColorbarConfig,
    pub output: OutputConfig,
}

impl RenderConfig {
    pub fn to_json(&self) -> CelltraceResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CelltraceError::serde(e.to_string()))
    }

    pub fn from_json(json: &str) -> CelltraceResult<Self> {
        serde_json::from_str(json).map_err(|e| CelltraceError::serde(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CelltraceResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CelltraceError::serde(format!(
                    "failed to create config directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| {
            CelltraceError::serde(format!("failed to write config '{}': {e}", path.display()))
        })
    }

    pub fn load(path: impl AsRef<Path>) -> CelltraceResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CelltraceError::serde(format!("failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn speed_ratio(&self) -> f64 {
        if self.global.original_fps <= 0.0 {
            return 1.0;
        }
        self.global.output_fps / self.global.original_fps
    }

    /// Playback-speed multiplier text: `8×`, `2.5×`, `0.25×`.
    pub fn speed_ratio_text(&self) -> String {
        let ratio = self.speed_ratio();
        if ratio >= 1.0 {
            if (ratio - ratio.round()).abs() < 1e-9 {
                format!("{}\u{00d7}", ratio.round() as i64)
            } else {
                format!("{ratio:.1}\u{00d7}")
            }
        } else {
            format!("{ratio:.2}\u{00d7}")
        }
    }

    pub fn default_position(&self, kind: LabelKind) -> [f64; 2] {
        match kind {
            LabelKind::Time => self.time_label.position,
            LabelKind::ScaleBar => self.scale_bar.position,
            LabelKind::Speed => self.speed_label.position,
            LabelKind::Colorbar => self.colorbar.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_is_lossless() {
        let mut config = RenderConfig::default();
        config.global.original_fps = 12.5;
        config.trajectory.mode = TrajectoryMode::DelayBefore;
        config.trajectory.color_mode = TrajectoryColorMode::Velocity;
        config.colorbar.colormap = Colormap::RdYlBu;
        config.colorbar.title_position = ColorbarTitlePosition::Right;
        config.scale_bar.text_position = ScaleTextPosition::Above;
        config.time_label.unit = TimeUnit::Min;
        config.centroid.marker_shape = MarkerShape::Star;
        config.output.video_format = VideoFormat::Gif;
        config.colorbar.position = [1.13, 0.07];

        let json = config.to_json().unwrap();
        let back = RenderConfig::from_json(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn json_uses_expected_top_level_keys_and_literals() {
        let json = RenderConfig::default().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in [
            "global",
            "mask",
            "contour",
            "centroid",
            "ellipse_axes",
            "trajectory",
            "time_label",
            "scale_bar",
            "speed_label",
            "colorbar",
            "output",
        ] {
            assert!(value.get(key).is_some(), "missing top-level key {key}");
        }
        assert_eq!(value["trajectory"]["mode"], "full");
        assert_eq!(value["time_label"]["color"], "white");
        assert_eq!(value["time_label"]["font_family"], "Arial");
        assert_eq!(value["output"]["video_format"], "mp4");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = RenderConfig::from_json("{\"mask\": {\"opacity\": 0.25}}").unwrap();
        assert_eq!(config.mask.opacity, 0.25);
        assert!(config.mask.enabled);
        assert_eq!(config.colorbar.bar_height, 200);
    }

    #[test]
    fn speed_ratio_text_formats() {
        let mut config = RenderConfig::default();
        config.global.original_fps = 10.0;
        config.global.output_fps = 30.0;
        assert_eq!(config.speed_ratio_text(), "3\u{00d7}");

        config.global.output_fps = 25.0;
        assert_eq!(config.speed_ratio_text(), "2.5\u{00d7}");

        config.global.output_fps = 2.5;
        assert_eq!(config.speed_ratio_text(), "0.25\u{00d7}");
    }

    #[test]
    fn positions_clamp_to_permissive_range() {
        assert_eq!(clamp_position([-3.0, 5.0]), [-0.5, 2.0]);
        assert_eq!(clamp_position([0.5, 0.5]), [0.5, 0.5]);
    }
}
