//! Feature timeline data model.
//!
//! The analysis result served to clients: a tempo estimate, beat onsets and
//! four per-hop tracks sampled at a fixed 60 Hz grid. Immutable once built,
//! either freshly computed or served verbatim from cache.

use serde::{Deserialize, Serialize};

/// Analysis frames emitted per second of audio.
pub const HOP_RATE: u32 = 60;

/// Number of mel bands in the `melbands` track.
pub const MEL_BANDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessPoint {
    pub t: f64,
    pub v: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralPoint {
    pub t: f64,
    pub c: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MelPoint {
    pub t: f64,
    pub bands: [f32; MEL_BANDS],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BassPoint {
    pub t: f64,
    pub b: f32,
}

/// The full multi-channel analysis result for one source.
///
/// Invariants (checked by [`FeatureTimeline::validate`], relied on by
/// clients): all four per-hop tracks have the same length with
/// `t[i] == i / 60`, every normalized value lies in `[0, 1]`, beats are
/// strictly increasing within `[0, duration]`, and `tempo > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTimeline {
    pub source_id: String,
    pub tempo: f32,
    /// Track duration in seconds.
    pub duration: f64,
    /// True when this timeline was generated analytically instead of being
    /// measured from real audio.
    pub synthetic: bool,
    pub beats: Vec<Beat>,
    pub loudness: Vec<LoudnessPoint>,
    pub spectral: Vec<SpectralPoint>,
    pub melbands: Vec<MelPoint>,
    pub bass: Vec<BassPoint>,
}

impl FeatureTimeline {
    /// Check every structural invariant, returning a description of the
    /// first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.tempo > 0.0) {
            return Err(format!("tempo must be positive, got {}", self.tempo));
        }
        if self.duration < 0.0 {
            return Err(format!("negative duration {}", self.duration));
        }

        let n = self.loudness.len();
        if self.spectral.len() != n || self.melbands.len() != n || self.bass.len() != n {
            return Err(format!(
                "per-hop track lengths differ: loudness={} spectral={} melbands={} bass={}",
                n,
                self.spectral.len(),
                self.melbands.len(),
                self.bass.len()
            ));
        }

        for i in 0..n {
            let t = i as f64 / HOP_RATE as f64;
            if self.loudness[i].t != t
                || self.spectral[i].t != t
                || self.melbands[i].t != t
                || self.bass[i].t != t
            {
                return Err(format!("hop {} is off the {} Hz grid", i, HOP_RATE));
            }

            if !in_unit_range(self.loudness[i].v) {
                return Err(format!("loudness[{}] out of range: {}", i, self.loudness[i].v));
            }
            if !in_unit_range(self.spectral[i].c) {
                return Err(format!("spectral[{}] out of range: {}", i, self.spectral[i].c));
            }
            if !in_unit_range(self.bass[i].b) {
                return Err(format!("bass[{}] out of range: {}", i, self.bass[i].b));
            }
            for (band, &value) in self.melbands[i].bands.iter().enumerate() {
                if !in_unit_range(value) {
                    return Err(format!("melbands[{}][{}] out of range: {}", i, band, value));
                }
            }
        }

        let mut previous = f64::NEG_INFINITY;
        for beat in &self.beats {
            if beat.t <= previous {
                return Err(format!("beats not strictly increasing at t={}", beat.t));
            }
            if beat.t < 0.0 || beat.t > self.duration {
                return Err(format!("beat at t={} outside [0, {}]", beat.t, self.duration));
            }
            previous = beat.t;
        }

        Ok(())
    }
}

fn in_unit_range(value: f32) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}
