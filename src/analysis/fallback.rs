//! Synthetic timeline generation.
//!
//! When acquisition or analysis fails (or no source is available at all),
//! the service still has to return a schema-identical timeline. This module
//! generates one analytically: deterministic, smoothly varying, and on the
//! same 60 Hz grid with the same value ranges as the real analyzer.

use super::timeline::{
    BassPoint, Beat, FeatureTimeline, LoudnessPoint, MelPoint, SpectralPoint, HOP_RATE, MEL_BANDS,
};

/// Duration assumed when the caller has no better estimate.
pub const DEFAULT_DURATION_SECS: f64 = 240.0;

const SYNTHETIC_TEMPO_BPM: f32 = 120.0;

const TAU: f64 = std::f64::consts::TAU;

/// Generate a synthetic [`FeatureTimeline`] for the given duration.
///
/// Same input, same output: the composition is a fixed set of sinusoids, so
/// repeated calls are bit-identical. Values stay comfortably inside [0, 1]
/// with bounded derivatives, which keeps downstream visualization smooth.
pub fn synthetic_timeline(source_id: &str, duration_secs: f64) -> FeatureTimeline {
    let duration = if duration_secs.is_finite() && duration_secs > 0.0 {
        duration_secs
    } else {
        DEFAULT_DURATION_SECS
    };

    let hop_count = (duration * HOP_RATE as f64) as usize;

    let mut loudness = Vec::with_capacity(hop_count);
    let mut spectral = Vec::with_capacity(hop_count);
    let mut melbands = Vec::with_capacity(hop_count);
    let mut bass = Vec::with_capacity(hop_count);

    for hop in 0..hop_count {
        let t = hop as f64 / HOP_RATE as f64;

        // Slow amplitude swells with a faster pulse riding on top.
        let v = 0.55 + 0.25 * (TAU * 0.05 * t).sin() + 0.12 * (TAU * 0.5 * t).sin();
        // Brightness drifts slowly around the middle of the range.
        let c = 0.45 + 0.2 * (TAU * 0.03 * t + 1.1).sin() + 0.08 * (TAU * 0.21 * t).sin();

        let mut bands = [0.0f32; MEL_BANDS];
        for (band, slot) in bands.iter_mut().enumerate() {
            let phase = band as f64 * 0.9;
            let rate = 0.08 + band as f64 * 0.015;
            let value = 0.5 + 0.3 * (TAU * rate * t + phase).sin() + 0.1 * (TAU * 0.5 * t + phase).sin();
            *slot = value.clamp(0.0, 1.0) as f32;
        }
        let b = (bands[0] + bands[1]) / 2.0;

        loudness.push(LoudnessPoint { t, v: v.clamp(0.0, 1.0) as f32 });
        spectral.push(SpectralPoint { t, c: c.clamp(0.0, 1.0) as f32 });
        melbands.push(MelPoint { t, bands });
        bass.push(BassPoint { t, b });
    }

    // Beats on the half-second grid of the fixed synthetic tempo.
    let beat_interval = 60.0 / SYNTHETIC_TEMPO_BPM as f64;
    let mut beats = Vec::new();
    let mut beat_t = beat_interval;
    while beat_t < duration {
        beats.push(Beat { t: beat_t });
        beat_t += beat_interval;
    }

    FeatureTimeline {
        source_id: source_id.to_string(),
        tempo: SYNTHETIC_TEMPO_BPM,
        duration,
        synthetic: true,
        beats,
        loudness,
        spectral,
        melbands,
        bass,
    }
}
