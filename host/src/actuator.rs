//! Output stage for the lighting controller
//!
//! Turns detected colors into wire frames: black cutoff, RGB smoothing, gamma
//! correction, a slow breathing modulation and optional polarity inversion. Write
//! outcomes pace the frame loop additively, so a congested serial link slows
//! detection down instead of queueing.

use std::f64::consts::PI;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::colorspace::Rgb;
use crate::config::{ActuatorConfig, PaletteConfig, MAX_LOOP_DELAY, MIN_LOOP_DELAY};
use crate::link::{ActuatorPort, LinkError};

/// Precomputed gamma correction, `floor((i/255)^gamma * 255)`
#[derive(Clone)]
pub struct GammaTable([u8; 256]);

impl GammaTable {
    pub fn new(gamma: f64) -> Self {
        let mut table = [0u8; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = ((i as f64 / 255.0).powf(gamma) * 255.0).floor() as u8;
        }
        Self(table)
    }

    #[inline]
    pub fn correct(&self, c: u8) -> u8 {
        self.0[c as usize]
    }

    pub fn apply(&self, rgb: Rgb) -> Rgb {
        Rgb::new(self.correct(rgb.r), self.correct(rgb.g), self.correct(rgb.b))
    }
}

impl std::fmt::Debug for GammaTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("GammaTable").finish()
    }
}

/// Breathing brightness factor at time `t` seconds, in `[min, 1]`
pub fn pulse_factor(t: f64, speed_hz: f64, min: f64) -> f64 {
    let wave = ((2.0 * PI * speed_hz * t).sin() + 1.0) / 2.0;
    min + wave * (1.0 - min)
}

fn scale(rgb: Rgb, factor: f64) -> Rgb {
    let s = |c: u8| (c as f64 * factor).floor().clamp(0.0, 255.0) as u8;
    Rgb::new(s(rgb.r), s(rgb.g), s(rgb.b))
}

fn invert(rgb: Rgb) -> Rgb {
    Rgb::new(255 - rgb.r, 255 - rgb.g, 255 - rgb.b)
}

/// Single color frame: `R,G,B\n`
pub fn encode_single(rgb: Rgb) -> String {
    format!("{},{},{}\n", rgb.r, rgb.g, rgb.b)
}

/// Palette frame: `P:N:RRGGBB:RRGGBB...\n`
pub fn encode_palette(colors: &[Rgb]) -> String {
    let mut out = format!("P:{}", colors.len());
    for c in colors {
        let _ = write!(out, ":{:02X}{:02X}{:02X}", c.r, c.g, c.b);
    }
    out.push('\n');
    out
}

/// Frame loop delay paced by write outcomes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct LoopDelay {
    /// Current delay in seconds
    pub seconds: f64,
    #[serde(skip)]
    decrease: f64,
    #[serde(skip)]
    increase: f64,
}

impl LoopDelay {
    pub fn new(initial: f64, decrease: f64, increase: f64) -> Self {
        Self {
            seconds: initial.clamp(MIN_LOOP_DELAY, MAX_LOOP_DELAY),
            decrease,
            increase,
        }
    }

    pub fn on_success(&mut self) {
        self.seconds = (self.seconds - self.decrease).max(MIN_LOOP_DELAY);
    }

    pub fn on_timeout(&mut self) {
        self.seconds = (self.seconds + self.increase).min(MAX_LOOP_DELAY);
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct ActuatorState {
    /// Smoothed color before gamma and breathing
    pub prev_rgb: Rgb,
    pub loop_delay: LoopDelay,
    pub common_anode: bool,
}

/// What the actuator stage produced for one frame
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ActuatorOutput {
    /// Frame that was (or would have been) written, without the newline
    pub frame: String,
    /// Breathing factor used
    pub pulse: f64,
    /// Whether a serial port took the frame
    pub sent: bool,
}

pub struct ActuatorLink {
    port: Option<Box<dyn ActuatorPort>>,
    gamma: GammaTable,
    state: ActuatorState,
    smoothing: f64,
    black_threshold: f64,
    pulse_speed: f64,
    min_brightness: f64,
    palette_interval: f64,
    last_palette_at: Option<f64>,
    shutdown_repeats: u32,
    shutdown_settle: Duration,
}

impl ActuatorLink {
    pub fn new(
        port: Option<Box<dyn ActuatorPort>>,
        config: &ActuatorConfig,
        palette: &PaletteConfig,
    ) -> Self {
        Self {
            port,
            gamma: GammaTable::new(config.gamma),
            state: ActuatorState {
                prev_rgb: Rgb::BLACK,
                loop_delay: LoopDelay::new(
                    config.initial_delay,
                    config.delay_decrease,
                    config.delay_increase,
                ),
                common_anode: config.common_anode,
            },
            smoothing: config.smoothing,
            black_threshold: config.black_threshold,
            pulse_speed: config.pulse_speed,
            min_brightness: config.min_brightness,
            palette_interval: palette.send_interval,
            last_palette_at: None,
            shutdown_repeats: config.shutdown_repeats,
            shutdown_settle: Duration::from_millis(config.shutdown_settle_ms),
        }
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn loop_delay(&self) -> Duration {
        self.state.loop_delay.duration()
    }

    pub fn set_common_anode(&mut self, common_anode: bool) {
        self.state.common_anode = common_anode;
    }

    /// Output stage shared by single and palette frames: gamma, breathing, polarity
    fn shape(&self, rgb: Rgb, pulse: f64) -> Rgb {
        let shaped = scale(self.gamma.apply(rgb), pulse);
        if self.state.common_anode {
            invert(shaped)
        } else {
            shaped
        }
    }

    /// Drive one color toward `target` at time `t` seconds
    pub fn drive_single(&mut self, target: Rgb, t: f64) -> ActuatorOutput {
        let target = if target.luminance() < self.black_threshold {
            Rgb::BLACK
        } else {
            target
        };

        let s = self.smoothing;
        let prev = self.state.prev_rgb;
        let blend = |p: u8, c: u8| (p as f64 * (1.0 - s) + c as f64 * s).round() as u8;
        let smoothed = Rgb::new(
            blend(prev.r, target.r),
            blend(prev.g, target.g),
            blend(prev.b, target.b),
        );
        self.state.prev_rgb = smoothed;

        let pulse = pulse_factor(t, self.pulse_speed, self.min_brightness);
        let frame = encode_single(self.shape(smoothed, pulse));
        let sent = self.write(&frame);

        ActuatorOutput {
            frame: frame.trim_end().to_string(),
            pulse,
            sent,
        }
    }

    /// Drive a palette at time `t` seconds
    ///
    /// Returns `None` while the palette send interval has not elapsed.
    pub fn drive_palette(&mut self, colors: &[Rgb], t: f64) -> Option<ActuatorOutput> {
        if let Some(last) = self.last_palette_at {
            if t - last < self.palette_interval {
                return None;
            }
        }
        self.last_palette_at = Some(t);

        let pulse = pulse_factor(t, self.pulse_speed, self.min_brightness);
        let shaped: Vec<Rgb> = colors.iter().map(|c| self.shape(*c, pulse)).collect();
        let frame = encode_palette(&shaped);
        let sent = self.write(&frame);

        Some(ActuatorOutput {
            frame: frame.trim_end().to_string(),
            pulse,
            sent,
        })
    }

    /// The frame that turns every LED off
    pub fn off_frame(&self) -> String {
        let off = if self.state.common_anode {
            invert(Rgb::BLACK)
        } else {
            Rgb::BLACK
        };
        encode_single(off)
    }

    /// Force the light off and release the port
    pub async fn shutdown(&mut self) {
        let Some(mut port) = self.port.take() else {
            return;
        };

        let frame = self.off_frame();
        for i in 0..self.shutdown_repeats {
            if let Err(e) = port.send(&frame) {
                warn!("Failed to send off frame: {}", e);
            }
            if i + 1 < self.shutdown_repeats {
                tokio::time::sleep(self.shutdown_settle).await;
            }
        }
        info!("Actuator turned off, serial link closed");
    }

    /// Write a frame and adjust the loop delay; returns whether it went out
    fn write(&mut self, frame: &str) -> bool {
        let Some(port) = self.port.as_mut() else {
            return false;
        };

        match port.send(frame) {
            Ok(()) => {
                self.state.loop_delay.on_success();
                true
            }
            Err(LinkError::Timeout) => {
                self.state.loop_delay.on_timeout();
                debug!(
                    "Serial write timed out, loop delay now {:.3}s",
                    self.state.loop_delay.seconds
                );
                false
            }
            Err(e) => {
                warn!("Serial write failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::link::testing::RecordingPort;

    fn link_with(port: &RecordingPort, config: ActuatorConfig) -> ActuatorLink {
        ActuatorLink::new(
            Some(Box::new(port.clone())),
            &config,
            &PaletteConfig::default(),
        )
    }

    #[test]
    fn test_gamma_table() {
        let table = GammaTable::new(2.5);
        assert_eq!(table.correct(0), 0);
        assert_eq!(table.correct(255), 255);
        assert_eq!(table.correct(128), 45);
        assert!((1..=255).all(|i| table.correct(i) >= table.correct(i - 1)));
    }

    #[test]
    fn test_pulse_extremes() {
        // Peak at a quarter period, trough at three quarters
        let speed = 0.4;
        let period = 1.0 / speed;
        assert!((pulse_factor(period / 4.0, speed, 0.3) - 1.0).abs() < 1e-12);
        assert!((pulse_factor(3.0 * period / 4.0, speed, 0.3) - 0.3).abs() < 1e-12);
        assert!((pulse_factor(0.0, speed, 0.3) - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_encodings() {
        assert_eq!(encode_single(Rgb::new(255, 10, 0)), "255,10,0\n");
        assert_eq!(
            encode_palette(&[Rgb::new(255, 0, 0), Rgb::new(0, 171, 205)]),
            "P:2:FF0000:00ABCD\n"
        );
        assert_eq!(encode_palette(&[]), "P:0\n");
    }

    #[test]
    fn test_loop_delay_bounds() {
        let mut delay = LoopDelay::new(0.1, 0.005, 0.05);
        for _ in 0..1000 {
            delay.on_success();
        }
        assert_eq!(delay.seconds, MIN_LOOP_DELAY);

        for _ in 0..1000 {
            delay.on_timeout();
        }
        assert_eq!(delay.seconds, MAX_LOOP_DELAY);

        assert_eq!(LoopDelay::new(3.0, 0.005, 0.05).seconds, MAX_LOOP_DELAY);
    }

    #[test]
    fn test_loop_delay_reaches_floor() {
        let mut delay = LoopDelay::new(MAX_LOOP_DELAY, 0.005, 0.05);
        let bound = ((MAX_LOOP_DELAY - MIN_LOOP_DELAY) / 0.005).ceil() as usize + 1;

        let mut steps = 0;
        while delay.seconds > MIN_LOOP_DELAY {
            delay.on_success();
            steps += 1;
            assert!(steps <= bound, "still at {} after {} steps", delay.seconds, steps);
        }
        assert_eq!(delay.seconds, MIN_LOOP_DELAY);
    }

    #[test]
    fn test_mixed_events_stay_bounded() {
        let mut delay = LoopDelay::new(0.1, 0.005, 0.05);
        for i in 0..500u32 {
            if (i * 7919) % 5 < 2 {
                delay.on_timeout();
            } else {
                delay.on_success();
            }
            assert!((MIN_LOOP_DELAY..=MAX_LOOP_DELAY).contains(&delay.seconds));
        }
    }

    #[test]
    fn test_writes_pace_loop() {
        let port = RecordingPort::default();
        let mut link = link_with(&port, ActuatorConfig::default());

        let t = 0.625; // pulse peak at 0.4 Hz
        link.drive_single(Rgb::new(255, 255, 255), t);
        assert!((link.state().loop_delay.seconds - 0.095).abs() < 1e-9);

        port.fail_next(io::ErrorKind::TimedOut);
        let out = link.drive_single(Rgb::new(255, 255, 255), t);
        assert!(!out.sent);
        assert!((link.state().loop_delay.seconds - 0.145).abs() < 1e-9);

        port.fail_next(io::ErrorKind::BrokenPipe);
        link.drive_single(Rgb::new(255, 255, 255), t);
        assert!((link.state().loop_delay.seconds - 0.145).abs() < 1e-9);

        assert_eq!(port.frames().len(), 1);
    }

    #[test]
    fn test_single_frame_pipeline() {
        let port = RecordingPort::default();
        let config = ActuatorConfig {
            smoothing: 1.0,
            ..ActuatorConfig::default()
        };
        let mut link = link_with(&port, config);

        let out = link.drive_single(Rgb::new(255, 128, 0), 0.625);
        assert_eq!(out.frame, "255,45,0");
        assert!(out.sent);

        // Below the luminance cutoff the target is black
        let out = link.drive_single(Rgb::new(50, 50, 50), 0.625);
        assert_eq!(out.frame, "0,0,0");
    }

    #[test]
    fn test_rgb_smoothing() {
        let port = RecordingPort::default();
        let mut link = link_with(&port, ActuatorConfig::default());
        link.drive_single(Rgb::new(200, 100, 0), 0.0);
        assert_eq!(link.state().prev_rgb, Rgb::new(30, 15, 0));
        link.drive_single(Rgb::new(200, 100, 0), 0.0);
        assert_eq!(link.state().prev_rgb, Rgb::new(56, 28, 0));
    }

    #[test]
    fn test_common_anode_inverts() {
        let port = RecordingPort::default();
        let config = ActuatorConfig {
            smoothing: 1.0,
            common_anode: true,
            ..ActuatorConfig::default()
        };
        let mut link = link_with(&port, config);
        let out = link.drive_single(Rgb::new(255, 0, 0), 0.625);
        assert_eq!(out.frame, "0,255,255");
        assert_eq!(link.off_frame(), "255,255,255\n");
    }

    #[test]
    fn test_palette_rate_cap() {
        let port = RecordingPort::default();
        let mut link = link_with(&port, ActuatorConfig::default());
        let colors = [Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)];

        let out = link.drive_palette(&colors, 0.625).expect("first send");
        assert_eq!(out.frame, "P:2:FF0000:0000FF");
        assert!(link.drive_palette(&colors, 0.8).is_none());
        assert!(link.drive_palette(&colors, 0.97).is_some());
        assert_eq!(port.frames().len(), 2);
        // Palette frames bypass RGB smoothing
        assert_eq!(link.state().prev_rgb, Rgb::BLACK);
    }

    #[test]
    fn test_without_port() {
        let mut link = ActuatorLink::new(None, &ActuatorConfig::default(), &PaletteConfig::default());
        let out = link.drive_single(Rgb::new(255, 255, 255), 0.0);
        assert!(!out.sent);
        assert!(!link.is_connected());
        assert!((link.state().loop_delay.seconds - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_shutdown_sends_off_frames() {
        let port = RecordingPort::default();
        let config = ActuatorConfig {
            shutdown_settle_ms: 1,
            ..ActuatorConfig::default()
        };
        let mut link = link_with(&port, config);
        link.shutdown().await;

        assert_eq!(port.frames(), vec!["0,0,0\n"; 3]);
        assert!(!link.is_connected());

        // Second shutdown is a no-op
        link.shutdown().await;
        assert_eq!(port.frames().len(), 3);
    }
}
