//! Beat onset detection and tempo estimation.
//!
//! A spectral-flux onset curve is computed over the whole waveform, peaks
//! are picked against an adaptive local-mean threshold, and the tempo is
//! taken from the median inter-onset interval restricted to a musically
//! plausible band.

use rustfft::{num_complex::Complex, FftPlanner};

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 1024;

/// Default tempo when onsets are too sparse to estimate one.
pub const DEFAULT_TEMPO_BPM: f32 = 120.0;

/// Minimum gap between picked beats, in seconds.
const MIN_BEAT_GAP: f64 = 0.1;

/// Detect beat onset times (seconds, strictly increasing) over a mono
/// waveform.
pub fn detect_beats(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    let flux = onset_curve(samples, sample_rate);
    pick_peaks(&flux)
}

/// Estimate tempo in BPM from a list of beat times.
///
/// Intervals outside 0.3–1.0 s (200–60 BPM) are ignored; with no usable
/// intervals the default tempo is returned.
pub fn estimate_tempo(beat_times: &[f64]) -> f32 {
    let mut intervals: Vec<f64> = beat_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (0.3..=1.0).contains(&i))
        .collect();

    if intervals.is_empty() {
        return DEFAULT_TEMPO_BPM;
    }

    intervals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = intervals[intervals.len() / 2];
    (60.0 / median) as f32
}

/// Spectral flux per analysis hop, as `(time_secs, flux)` pairs.
fn onset_curve(samples: &[f32], sample_rate: u32) -> Vec<(f64, f32)> {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);
    let window = hann_window(FFT_SIZE);

    let mut previous = vec![0.0f32; FFT_SIZE / 2];
    let mut curve = Vec::new();

    let mut pos = 0;
    while pos + FFT_SIZE <= samples.len() {
        let mut buffer: Vec<Complex<f32>> = samples[pos..pos + FFT_SIZE]
            .iter()
            .enumerate()
            .map(|(i, &s)| Complex::new(s * window[i], 0.0))
            .collect();
        fft.process(&mut buffer);

        let magnitudes: Vec<f32> = buffer[..FFT_SIZE / 2].iter().map(|c| c.norm()).collect();

        let flux: f32 = magnitudes
            .iter()
            .zip(previous.iter())
            .map(|(current, prev)| (current - prev).max(0.0))
            .sum();

        curve.push((pos as f64 / sample_rate as f64, flux));
        previous = magnitudes;
        pos += HOP_SIZE;
    }

    curve
}

/// Pick local peaks above an adaptive threshold, enforcing a refractory gap.
fn pick_peaks(flux: &[(f64, f32)]) -> Vec<f64> {
    let window = 20;
    let mut beats: Vec<f64> = Vec::new();

    for i in 0..flux.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(flux.len());
        let local_mean: f32 =
            flux[start..end].iter().map(|(_, f)| f).sum::<f32>() / (end - start) as f32;
        let threshold = local_mean * 1.5 + 0.01;

        if flux[i].1 <= threshold {
            continue;
        }

        let is_peak = (i == 0 || flux[i].1 >= flux[i - 1].1)
            && (i == flux.len() - 1 || flux[i].1 >= flux[i + 1].1);
        let far_enough = beats.last().map_or(true, |&last| flux[i].0 - last > MIN_BEAT_GAP);

        if is_peak && far_enough {
            beats.push(flux[i].0);
        }
    }

    beats
}

pub(crate) fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 22050;

    /// Silence with short loud bursts every `period` seconds.
    fn clicks(duration_secs: f64, period: f64) -> Vec<f32> {
        let n = (duration_secs * SAMPLE_RATE as f64) as usize;
        let mut samples = vec![0.0f32; n];
        let mut t = period;
        while t < duration_secs {
            let start = (t * SAMPLE_RATE as f64) as usize;
            for i in start..(start + 512).min(n) {
                // Decaying noise-ish burst, deterministic.
                let k = (i - start) as f32;
                samples[i] = (1.0 - k / 512.0) * (0.9 * (k * 0.7).sin());
            }
            t += period;
        }
        samples
    }

    #[test]
    fn detects_regular_clicks() {
        let samples = clicks(8.0, 0.5);
        let beats = detect_beats(&samples, SAMPLE_RATE);

        assert!(beats.len() >= 8, "too few beats detected: {:?}", beats);
        for pair in beats.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        for &t in &beats {
            assert!((0.0..=8.0).contains(&t));
        }
    }

    #[test]
    fn tempo_from_half_second_grid_is_120() {
        let beats: Vec<f64> = (1..20).map(|i| i as f64 * 0.5).collect();
        let bpm = estimate_tempo(&beats);
        assert!((bpm - 120.0).abs() < 1.0, "got {} bpm", bpm);
    }

    #[test]
    fn tempo_defaults_when_underdetermined() {
        assert_eq!(estimate_tempo(&[]), DEFAULT_TEMPO_BPM);
        assert_eq!(estimate_tempo(&[1.0]), DEFAULT_TEMPO_BPM);
        // Intervals outside the plausible band are ignored.
        assert_eq!(estimate_tempo(&[0.0, 3.0, 6.0]), DEFAULT_TEMPO_BPM);
    }

    #[test]
    fn silence_has_no_beats() {
        let samples = vec![0.0f32; SAMPLE_RATE as usize * 4];
        assert!(detect_beats(&samples, SAMPLE_RATE).is_empty());
    }

    #[test]
    fn too_short_input_yields_no_beats() {
        let samples = vec![0.1f32; 512];
        assert!(detect_beats(&samples, SAMPLE_RATE).is_empty());
    }
}
