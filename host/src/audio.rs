//! Audio cues for detected colors
//!
//! Each color maps to a note of the C major pentatonic scale: hue picks the scale
//! step and value picks the octave. Held colors are not replayed on every frame; a
//! repeated note waits for a cooldown that doubles with each repeat.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::colorspace::Hsv;
use crate::config::AudioConfig;

const C3: f64 = 130.81;
const C4: f64 = 261.63;
const C5: f64 = 523.25;

/// Semitone offsets of the major pentatonic scale
const PENTATONIC: [f64; 5] = [0.0, 2.0, 4.0, 7.0, 9.0];

/// A tone request for the player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Tone {
    pub frequency_hz: f64,
    pub duration_s: f64,
    pub volume: f64,
}

/// Note frequency for a color
pub fn pentatonic_frequency(hsv: Hsv) -> f64 {
    let base = if hsv.v < 85 {
        C3
    } else if hsv.v < 170 {
        C4
    } else {
        C5
    };

    let step = ((hsv.h as f64 / 360.0 * 5.0).floor() as usize).min(4);
    base * 2f64.powf(PENTATONIC[step] / 12.0)
}

/// Decides when a note may play
#[derive(Debug, Clone)]
pub struct NoteGate {
    base_cooldown: f64,
    max_cooldown: f64,
    tolerance_hz: f64,
    silence_threshold: u8,
    last_frequency: Option<f64>,
    last_played_at: Option<f64>,
    repeat_count: u32,
}

impl NoteGate {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            base_cooldown: config.base_cooldown,
            max_cooldown: config.max_cooldown,
            tolerance_hz: config.tolerance_hz,
            silence_threshold: config.silence_threshold,
            last_frequency: None,
            last_played_at: None,
            repeat_count: 0,
        }
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// Cooldown a repeat of the last note must wait
    pub fn repeat_cooldown(&self) -> f64 {
        let exp = self.repeat_count.min(63) as i32;
        (self.base_cooldown * 2f64.powi(exp)).min(self.max_cooldown)
    }

    /// Frequency to play at time `now` seconds, if any
    pub fn check(&mut self, hsv: Hsv, now: f64) -> Option<f64> {
        if hsv.v < self.silence_threshold {
            return None;
        }

        let since_last = self.last_played_at.map(|t| now - t);
        if since_last.is_some_and(|dt| dt < self.base_cooldown) {
            return None;
        }

        let frequency = pentatonic_frequency(hsv);
        let is_new = self
            .last_frequency
            .map_or(true, |last| (frequency - last).abs() > self.tolerance_hz);

        if is_new {
            self.repeat_count = 0;
        } else {
            if since_last.is_some_and(|dt| dt < self.repeat_cooldown()) {
                return None;
            }
            self.repeat_count += 1;
        }

        self.last_frequency = Some(frequency);
        self.last_played_at = Some(now);
        Some(frequency)
    }

    pub fn reset(&mut self) {
        self.last_frequency = None;
        self.last_played_at = None;
        self.repeat_count = 0;
    }
}

/// Destination for tones; must never block the caller
pub trait ToneSink: Send {
    /// Hand over a tone; returns false if it was dropped
    fn dispatch(&self, tone: Tone) -> bool;
}

/// Bounded queue feeding a player task
pub struct ChannelToneSink {
    tx: mpsc::Sender<Tone>,
}

impl ChannelToneSink {
    pub fn new(tx: mpsc::Sender<Tone>) -> Self {
        Self { tx }
    }
}

impl ToneSink for ChannelToneSink {
    fn dispatch(&self, tone: Tone) -> bool {
        match self.tx.try_send(tone) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping tone: {}", e);
                false
            }
        }
    }
}

/// Spawn the tone player
///
/// Waveform synthesis is not part of this host; the player logs what it would play.
pub fn spawn_player(mut rx: mpsc::Receiver<Tone>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(tone) = rx.recv().await {
            info!(
                "Tone {:.2} Hz for {:.1}s at volume {:.2}",
                tone.frequency_hz, tone.duration_s, tone.volume
            );
        }
        debug!("Tone player stopped");
    })
}

/// Gate plus sink: turns color samples into dispatched tones
pub struct AudioCue {
    gate: NoteGate,
    sink: Box<dyn ToneSink>,
    duration_s: f64,
    volume: f64,
}

impl AudioCue {
    pub fn new(config: &AudioConfig, sink: Box<dyn ToneSink>) -> Self {
        Self {
            gate: NoteGate::new(config),
            sink,
            duration_s: config.duration,
            volume: config.volume,
        }
    }

    /// Offer a sample; returns the tone if one was dispatched
    pub fn observe(&mut self, hsv: Hsv, now: f64) -> Option<Tone> {
        let frequency_hz = self.gate.check(hsv, now)?;
        let tone = Tone {
            frequency_hz,
            duration_s: self.duration_s,
            volume: self.volume,
        };
        self.sink.dispatch(tone).then_some(tone)
    }

    pub fn reset(&mut self) {
        self.gate.reset();
    }
}
