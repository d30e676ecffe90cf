//! Runtime configuration
//!
//! Loaded from the JSON file named by `CHROMALIGHT_CONFIG` (every field optional),
//! then overridden by `PORT`, `SERIAL_PORT` and `FRAME_SOURCE`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Smallest allowed frame loop delay (seconds)
pub const MIN_LOOP_DELAY: f64 = 0.05;
/// Largest allowed frame loop delay (seconds)
pub const MAX_LOOP_DELAY: f64 = 0.5;
/// Largest palette the actuator firmware accepts
pub const MAX_PALETTE_ENTRIES: usize = 49;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Sampling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One region at the frame center drives the actuator
    #[default]
    Single,
    /// An N×N grid of regions produces a palette
    Grid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub detection: DetectionConfig,
    pub palette: PaletteConfig,
    pub actuator: ActuatorConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Image file or directory of frames
    pub path: PathBuf,
    pub frame_interval_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("frames"),
            frame_interval_ms: 33,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub mode: Mode,
    /// Side of the square region sampled at the frame center
    pub roi_size: u32,
    pub clusters: usize,
    pub kmeans_max_iter: usize,
    pub kmeans_converge: f32,
    pub kmeans_seed: u64,
    pub clahe: bool,
    pub clahe_clip_limit: f32,
    pub clahe_tile_grid: u32,
    pub white_balance: bool,
    pub chromatic_adaptation: bool,
    /// EMA weight of the newest L*a*b* sample
    pub smoothing_alpha: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Single,
            roi_size: 50,
            clusters: 3,
            kmeans_max_iter: 20,
            kmeans_converge: 0.0001,
            kmeans_seed: 0,
            clahe: true,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            white_balance: true,
            chromatic_adaptation: false,
            smoothing_alpha: 0.35,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    pub grid_size: u32,
    /// Fraction of each axis left unsampled on both sides
    pub margin: f64,
    pub sample_size: u32,
    pub dedup_threshold: f64,
    pub max_entries: usize,
    /// Minimum seconds between palette frames on the serial link
    pub send_interval: f64,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            grid_size: 3,
            margin: 0.28,
            sample_size: 20,
            dedup_threshold: 10.0,
            max_entries: 8,
            send_interval: 0.34,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Serial device; the actuator is disabled when unset
    pub port: Option<String>,
    pub baud_rate: u32,
    pub write_timeout_ms: u64,
    /// Wait after opening the port while the microcontroller resets
    pub reset_delay_ms: u64,
    pub gamma: f64,
    pub smoothing: f64,
    pub black_threshold: f64,
    /// Breathing frequency in Hz
    pub pulse_speed: f64,
    pub min_brightness: f64,
    pub common_anode: bool,
    pub initial_delay: f64,
    pub delay_decrease: f64,
    pub delay_increase: f64,
    pub shutdown_repeats: u32,
    pub shutdown_settle_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            write_timeout_ms: 50,
            reset_delay_ms: 2000,
            gamma: 2.5,
            smoothing: 0.15,
            black_threshold: 60.0,
            pulse_speed: 0.4,
            min_brightness: 0.3,
            common_anode: false,
            initial_delay: 0.1,
            delay_decrease: 0.005,
            delay_increase: 0.05,
            shutdown_repeats: 3,
            shutdown_settle_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub base_cooldown: f64,
    pub max_cooldown: f64,
    pub tolerance_hz: f64,
    pub duration: f64,
    pub volume: f64,
    /// Samples darker than this HSV value are silent
    pub silence_threshold: u8,
    pub queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_cooldown: 0.5,
            max_cooldown: 15.0,
            tolerance_hz: 3.0,
            duration: 2.0,
            volume: 0.5,
            silence_threshold: 60,
            queue_depth: 8,
        }
    }
}

impl Config {
    /// Load from `CHROMALIGHT_CONFIG` (if set) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("CHROMALIGHT_CONFIG") {
            Ok(path) => Self::load_from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply environment-style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT must be a port number, got {}", port)))?;
        }
        if let Some(serial) = lookup("SERIAL_PORT") {
            self.actuator.port = if serial.is_empty() { None } else { Some(serial) };
        }
        if let Some(path) = lookup("FRAME_SOURCE") {
            self.source.path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        check(d.roi_size >= 1, "detection.roi_size must be at least 1")?;
        check(
            (1..=255).contains(&d.clusters),
            "detection.clusters must be between 1 and 255",
        )?;
        check(d.clahe_clip_limit >= 1.0, "detection.clahe_clip_limit must be at least 1.0")?;
        check(d.clahe_tile_grid >= 1, "detection.clahe_tile_grid must be at least 1")?;
        check(
            d.smoothing_alpha > 0.0 && d.smoothing_alpha <= 1.0,
            "detection.smoothing_alpha must be in (0, 1]",
        )?;

        let p = &self.palette;
        check(
            (1..=7).contains(&p.grid_size),
            "palette.grid_size must be between 1 and 7",
        )?;
        check(
            (0.0..0.5).contains(&p.margin),
            "palette.margin must be in [0, 0.5)",
        )?;
        check(p.sample_size >= 1, "palette.sample_size must be at least 1")?;
        check(p.dedup_threshold >= 0.0, "palette.dedup_threshold must not be negative")?;
        check(
            (1..=MAX_PALETTE_ENTRIES).contains(&p.max_entries),
            "palette.max_entries must be between 1 and 49",
        )?;
        check(p.send_interval >= 0.0, "palette.send_interval must not be negative")?;

        let a = &self.actuator;
        check(a.gamma > 0.0, "actuator.gamma must be positive")?;
        check(
            a.smoothing > 0.0 && a.smoothing <= 1.0,
            "actuator.smoothing must be in (0, 1]",
        )?;
        check(
            (0.0..=1.0).contains(&a.min_brightness),
            "actuator.min_brightness must be in [0, 1]",
        )?;
        check(
            (MIN_LOOP_DELAY..=MAX_LOOP_DELAY).contains(&a.initial_delay),
            "actuator.initial_delay must be in [0.05, 0.5]",
        )?;
        check(
            a.delay_decrease > 0.0 && a.delay_increase > 0.0,
            "actuator delay steps must be positive",
        )?;

        let au = &self.audio;
        check(
            au.base_cooldown > 0.0 && au.max_cooldown >= au.base_cooldown,
            "audio cooldowns must satisfy 0 < base_cooldown <= max_cooldown",
        )?;
        check(au.queue_depth >= 1, "audio.queue_depth must be at least 1")?;

        Ok(())
    }
}

fn check(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message.to_string()))
    }
}
