//! Per-frame detection pipeline
//!
//! [`Pipeline`] owns every piece of mutable detection state: calibration gains, the
//! smoothing streams (one for the center point and one per grid cell), the actuator
//! state and the note gate. The frame loop drives it one frame at a time.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::actuator::{ActuatorLink, ActuatorOutput, ActuatorState};
use crate::adaptation::ChromaticAdapter;
use crate::audio::{AudioCue, Tone, ToneSink};
use crate::catalog::{ColorCatalog, MatchResult, PrecisionTier};
use crate::colorspace::{ColorSample, Lab, Rgb};
use crate::config::{Config, Mode};
use crate::error::AppError;
use crate::extractor::DominantColorExtractor;
use crate::image_processing::{self, ClaheParams, KmeansParams};
use crate::link::ActuatorPort;
use crate::normalizer::{FrameNormalizer, Gains};
use crate::palette::{self, GridColor, PaletteBuilder, PaletteEntry};
use crate::smoothing::TemporalSmoother;

/// Runtime toggles
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Settings {
    pub mode: Mode,
    /// Side of the center region in pixels
    pub roi_size: u32,
    pub clahe: bool,
    pub white_balance: bool,
    pub chromatic_adaptation: bool,
    pub common_anode: bool,
    pub audio: bool,
}

/// Partial settings change; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SettingsUpdate {
    pub mode: Option<Mode>,
    pub roi_size: Option<u32>,
    pub clahe: Option<bool>,
    pub white_balance: Option<bool>,
    pub chromatic_adaptation: Option<bool>,
    pub common_anode: Option<bool>,
    pub audio: Option<bool>,
}

/// A catalog match, detached from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ColorMatch {
    pub name: String,
    pub localized_name: String,
    pub hex: String,
    pub distance: f64,
    pub tier: PrecisionTier,
}

impl From<MatchResult<'_>> for ColorMatch {
    fn from(m: MatchResult<'_>) -> Self {
        Self {
            name: m.color.name.clone(),
            localized_name: m.color.localized_name.clone(),
            hex: m.color.hex.clone(),
            distance: m.distance,
            tier: m.tier,
        }
    }
}

/// Everything one frame produced
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FrameReport {
    /// Frame counter since start
    pub frame: u64,
    /// Seconds since the pipeline started
    pub timestamp: f64,
    pub mode: Mode,
    /// Dominant color of the center region
    pub sample: ColorSample,
    /// Match for the unsmoothed sample
    pub raw_match: ColorMatch,
    pub smoothed_lab: Lab,
    pub smoothed_rgb: Rgb,
    /// Match for the smoothed sample; this is the displayed name
    pub smoothed_match: ColorMatch,
    /// Empty in single mode
    pub palette: Vec<PaletteEntry>,
    /// Absent when a palette frame was held back by the send interval
    pub actuator: Option<ActuatorOutput>,
    pub actuator_state: ActuatorState,
    pub gains: Gains,
    pub tone: Option<Tone>,
}

pub struct Pipeline {
    catalog: ColorCatalog,
    normalizer: FrameNormalizer,
    extractor: DominantColorExtractor,
    adapter: Option<ChromaticAdapter>,
    smoother: TemporalSmoother,
    grid_smoothers: Vec<TemporalSmoother>,
    palette_builder: PaletteBuilder,
    grid_size: usize,
    grid_margin: f64,
    grid_sample_size: u32,
    actuator: ActuatorLink,
    audio: AudioCue,
    settings: Settings,
    frame_count: u64,
    /// Raw center region of the most recent frame, for calibration
    last_region: Option<RgbImage>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        catalog: ColorCatalog,
        port: Option<Box<dyn ActuatorPort>>,
        tone_sink: Box<dyn ToneSink>,
    ) -> Self {
        let d = &config.detection;
        let p = &config.palette;
        let grid_size = p.grid_size as usize;

        let clahe = ClaheParams {
            clip_limit: d.clahe_clip_limit,
            tile_grid: d.clahe_tile_grid,
        };
        let kmeans = KmeansParams {
            k: d.clusters,
            max_iter: d.kmeans_max_iter,
            converge: d.kmeans_converge,
            seed: d.kmeans_seed,
        };

        Self {
            catalog,
            normalizer: FrameNormalizer::new(clahe, d.clahe, d.white_balance),
            extractor: DominantColorExtractor::new(kmeans),
            adapter: None,
            smoother: TemporalSmoother::new(d.smoothing_alpha),
            grid_smoothers: vec![TemporalSmoother::new(d.smoothing_alpha); grid_size * grid_size],
            palette_builder: PaletteBuilder::new(p.dedup_threshold, p.max_entries),
            grid_size,
            grid_margin: p.margin,
            grid_sample_size: p.sample_size,
            actuator: ActuatorLink::new(port, &config.actuator, p),
            audio: AudioCue::new(&config.audio, tone_sink),
            settings: Settings {
                mode: d.mode,
                roi_size: d.roi_size,
                clahe: d.clahe,
                white_balance: d.white_balance,
                chromatic_adaptation: d.chromatic_adaptation,
                common_anode: config.actuator.common_anode,
                audio: config.audio.enabled,
            },
            frame_count: 0,
            last_region: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gains(&self) -> Gains {
        self.normalizer.gains()
    }

    pub fn loop_delay(&self) -> std::time::Duration {
        self.actuator.loop_delay()
    }

    pub fn actuator_connected(&self) -> bool {
        self.actuator.is_connected()
    }

    /// Dominant color of a raw region, after normalization and adaptation
    fn detect(&self, region: &RgbImage) -> Rgb {
        let normalized = self.normalizer.apply(region);
        let dominant = self.extractor.extract(&normalized);
        match &self.adapter {
            Some(adapter) if self.settings.chromatic_adaptation => adapter.adapt(dominant),
            _ => dominant,
        }
    }

    /// Process one frame captured at `t` seconds
    pub fn process_frame(&mut self, frame: &RgbImage, t: f64) -> FrameReport {
        self.frame_count += 1;

        let region = image_processing::center_region(frame, self.settings.roi_size);
        let sample = ColorSample::from_rgb(self.detect(&region));
        self.last_region = Some(region);

        let raw_match = ColorMatch::from(self.catalog.match_lab(sample.lab));
        let smoothed_lab = self.smoother.update(sample.lab);
        let smoothed_match = ColorMatch::from(self.catalog.match_lab(smoothed_lab));

        let (palette, actuator) = match self.settings.mode {
            Mode::Single => (Vec::new(), Some(self.actuator.drive_single(sample.rgb, t))),
            Mode::Grid => {
                let palette = self.build_palette(frame);
                let colors: Vec<Rgb> = palette.iter().map(|e| e.rgb).collect();
                let output = self.actuator.drive_palette(&colors, t);
                (palette, output)
            }
        };

        let tone = if self.settings.audio {
            self.audio.observe(sample.hsv, t)
        } else {
            None
        };

        debug!(
            "Frame {}: {} {} {} (dE {:.2}) -> {}",
            self.frame_count,
            sample.rgb.to_hex(),
            smoothed_match.tier.symbol(),
            smoothed_match.name,
            smoothed_match.distance,
            actuator.as_ref().map_or("held", |a| a.frame.as_str())
        );

        FrameReport {
            frame: self.frame_count,
            timestamp: t,
            mode: self.settings.mode,
            sample,
            raw_match,
            smoothed_lab,
            smoothed_rgb: smoothed_lab.to_rgb(),
            smoothed_match,
            palette,
            actuator,
            actuator_state: self.actuator.state(),
            gains: self.normalizer.gains(),
            tone,
        }
    }

    /// Sample every grid point and merge the results
    fn build_palette(&mut self, frame: &RgbImage) -> Vec<PaletteEntry> {
        let (width, height) = frame.dimensions();
        let points = palette::grid_points(width, height, self.grid_size, self.grid_margin);
        let half_extent = self.grid_sample_size / 2;

        let mut colors = Vec::with_capacity(points.len());
        for (point, smoother) in points.iter().zip(self.grid_smoothers.iter_mut()) {
            let region = image_processing::crop_region(frame, point.x, point.y, half_extent);
            let normalized = self.normalizer.apply(&region);
            let mut rgb = self.extractor.extract(&normalized);
            if let Some(adapter) = self.adapter.as_ref().filter(|_| self.settings.chromatic_adaptation) {
                rgb = adapter.adapt(rgb);
            }

            let lab = smoother.update(rgb.to_lab());
            let name = self.catalog.match_lab(lab).color.name.clone();
            colors.push(GridColor {
                rgb: lab.to_rgb(),
                lab,
                name,
                position: point.position,
            });
        }

        self.palette_builder.build(&colors)
    }

    /// Calibrate white balance on the center region of the last frame
    pub fn calibrate(&mut self) -> Result<Gains, AppError> {
        let region = self.last_region.as_ref().ok_or(AppError::NoFrame)?;
        let gains = self.normalizer.calibrate(region);
        self.adapter = Some(ChromaticAdapter::from_gains(gains));
        Ok(gains)
    }

    pub fn reset_calibration(&mut self) {
        self.normalizer.reset_calibration();
        self.adapter = None;
    }

    fn reset_smoothing(&mut self) {
        self.smoother.reset();
        for s in &mut self.grid_smoothers {
            s.reset();
        }
    }

    /// Apply a partial settings change
    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<Settings, AppError> {
        if update.roi_size == Some(0) {
            return Err(AppError::InvalidSetting("roi_size must be at least 1".into()));
        }

        if let Some(mode) = update.mode {
            if mode != self.settings.mode {
                info!("Switching to {:?} mode", mode);
                self.settings.mode = mode;
                self.reset_smoothing();
            }
        }
        if let Some(roi_size) = update.roi_size {
            self.settings.roi_size = roi_size;
        }
        if let Some(clahe) = update.clahe {
            self.settings.clahe = clahe;
            self.normalizer.clahe_enabled = clahe;
        }
        if let Some(white_balance) = update.white_balance {
            self.settings.white_balance = white_balance;
            self.normalizer.white_balance_enabled = white_balance;
        }
        if let Some(chromatic_adaptation) = update.chromatic_adaptation {
            self.settings.chromatic_adaptation = chromatic_adaptation;
        }
        if let Some(common_anode) = update.common_anode {
            self.settings.common_anode = common_anode;
            self.actuator.set_common_anode(common_anode);
        }
        if let Some(audio) = update.audio {
            if audio && !self.settings.audio {
                self.audio.reset();
            }
            self.settings.audio = audio;
        }

        Ok(self.settings.clone())
    }

    /// Turn the actuator off and release the link
    pub async fn shutdown(&mut self) {
        self.actuator.shutdown().await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::audio::ChannelToneSink;
    use crate::link::testing::RecordingPort;

    pub(crate) fn sample_report(frame: u64) -> FrameReport {
        let catalog = ColorCatalog::builtin();
        let sample = ColorSample::from_rgb(Rgb::new(255, 0, 0));
        let m = ColorMatch::from(catalog.match_lab(sample.lab));
        FrameReport {
            frame,
            timestamp: 0.0,
            mode: Mode::Single,
            sample,
            raw_match: m.clone(),
            smoothed_lab: sample.lab,
            smoothed_rgb: sample.rgb,
            smoothed_match: m,
            palette: Vec::new(),
            actuator: None,
            actuator_state: ActuatorLink::new(
                None,
                &Default::default(),
                &Default::default(),
            )
            .state(),
            gains: Gains::IDENTITY,
            tone: None,
        }
    }

    fn pipeline(config: &Config, port: Option<RecordingPort>) -> (Pipeline, mpsc::Receiver<Tone>) {
        let (tx, rx) = mpsc::channel(16);
        let port = port.map(|p| Box::new(p) as Box<dyn ActuatorPort>);
        let pipeline = Pipeline::new(
            config,
            ColorCatalog::builtin(),
            port,
            Box::new(ChannelToneSink::new(tx)),
        );
        (pipeline, rx)
    }

    fn plain_config() -> Config {
        let mut config = Config::default();
        config.detection.clahe = false;
        config
    }

    #[test]
    fn test_single_mode_names_and_drives() {
        let port = RecordingPort::default();
        let (mut pipeline, _rx) = pipeline(&plain_config(), Some(port.clone()));
        let frame = RgbImage::from_pixel(120, 90, image::Rgb([255, 0, 0]));

        let report = pipeline.process_frame(&frame, 0.625);

        assert_eq!(report.frame, 1);
        assert_eq!(report.sample.rgb, Rgb::new(255, 0, 0));
        assert_eq!(report.raw_match.name, "Red");
        assert_eq!(report.raw_match.distance, 0.0);
        assert_eq!(report.raw_match.tier, PrecisionTier::Excellent);
        assert_eq!(report.smoothed_match.name, "Red");
        assert!(report.palette.is_empty());

        // First EMA step from black: round(255 * 0.15) = 38
        let output = report.actuator.expect("single mode always drives");
        assert!(output.sent);
        assert_eq!(report.actuator_state.prev_rgb, Rgb::new(38, 0, 0));
        assert_eq!(port.frames().len(), 1);
    }

    #[test]
    fn test_smoothed_name_lags_raw() {
        let (mut pipeline, _rx) = pipeline(&plain_config(), None);
        let red = RgbImage::from_pixel(60, 60, image::Rgb([255, 0, 0]));
        let blue = RgbImage::from_pixel(60, 60, image::Rgb([0, 0, 255]));

        for i in 0..5 {
            pipeline.process_frame(&red, i as f64 * 0.1);
        }
        let report = pipeline.process_frame(&blue, 0.5);
        assert_eq!(report.raw_match.name, "Blue");
        assert_ne!(report.smoothed_match.name, "Blue");
    }

    #[test]
    fn test_grid_mode_builds_palette() {
        let port = RecordingPort::default();
        let mut config = plain_config();
        config.detection.mode = Mode::Grid;
        let (mut pipeline, _rx) = pipeline(&config, Some(port.clone()));

        let frame = RgbImage::from_fn(200, 200, |x, _| {
            if x < 80 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });

        let report = pipeline.process_frame(&frame, 0.625);
        // Grid columns at x = 56, 100 and 144: red, blue, blue
        assert_eq!(report.palette.len(), 2);
        assert_eq!(report.palette[0].rgb, Rgb::new(0, 0, 255));
        assert_eq!(report.palette[0].count, 6);
        assert_eq!(report.palette[1].rgb, Rgb::new(255, 0, 0));
        assert_eq!(report.palette[1].count, 3);

        let output = report.actuator.expect("first palette frame is sent");
        assert_eq!(output.frame, "P:2:0000FF:FF0000");

        // Held back by the send interval
        let report = pipeline.process_frame(&frame, 0.7);
        assert!(report.actuator.is_none());
        assert_eq!(port.frames().len(), 1);
    }

    #[test]
    fn test_calibration_needs_a_frame() {
        let (mut pipeline, _rx) = pipeline(&plain_config(), None);
        assert!(matches!(pipeline.calibrate(), Err(AppError::NoFrame)));
    }

    #[test]
    fn test_calibration_neutralizes_cast() {
        let (mut pipeline, _rx) = pipeline(&plain_config(), None);
        let tinted_white = RgbImage::from_pixel(80, 80, image::Rgb([240, 220, 160]));

        let before = pipeline.process_frame(&tinted_white, 0.0);
        assert_eq!(before.sample.rgb, Rgb::new(240, 220, 160));

        let gains = pipeline.calibrate().unwrap();
        assert!((gains.r - 1.0).abs() < 1e-9);

        let after = pipeline.process_frame(&tinted_white, 0.1);
        assert_eq!(after.sample.rgb, Rgb::new(240, 240, 240));
        assert_eq!(after.gains, gains);

        pipeline.reset_calibration();
        let reset = pipeline.process_frame(&tinted_white, 0.2);
        assert_eq!(reset.sample.rgb, Rgb::new(240, 220, 160));
        assert_eq!(reset.gains, Gains::IDENTITY);
    }

    #[test]
    fn test_settings_update() {
        let port = RecordingPort::default();
        let (mut pipeline, _rx) = pipeline(&plain_config(), Some(port.clone()));

        let settings = pipeline
            .update_settings(SettingsUpdate {
                mode: Some(Mode::Grid),
                common_anode: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(settings.mode, Mode::Grid);
        assert!(settings.common_anode);
        assert!(!settings.clahe);

        assert!(matches!(
            pipeline.update_settings(SettingsUpdate {
                roi_size: Some(0),
                ..Default::default()
            }),
            Err(AppError::InvalidSetting(_))
        ));
    }

    #[test]
    fn test_audio_toggle() {
        let (mut pipeline, mut rx) = pipeline(&plain_config(), None);
        let frame = RgbImage::from_pixel(60, 60, image::Rgb([255, 0, 0]));

        assert!(pipeline.process_frame(&frame, 0.0).tone.is_none());

        pipeline
            .update_settings(SettingsUpdate {
                audio: Some(true),
                ..Default::default()
            })
            .unwrap();
        let tone = pipeline.process_frame(&frame, 1.0).tone.expect("tone");
        // Red: hue 0, value 255
        assert!((tone.frequency_hz - 523.25).abs() < 1e-9);
        assert_eq!(rx.try_recv().ok(), Some(tone));
    }

    #[tokio::test]
    async fn test_shutdown_turns_light_off() {
        let port = RecordingPort::default();
        let mut config = plain_config();
        config.actuator.shutdown_settle_ms = 1;
        let (mut pipeline, _rx) = pipeline(&config, Some(port.clone()));

        pipeline.shutdown().await;
        assert_eq!(port.frames(), vec!["0,0,0\n"; 3]);
        assert!(!pipeline.actuator_connected());
    }
}
