//! Frame-synchronous spectral analysis.
//!
//! Converts a decoded mono waveform into a [`FeatureTimeline`]: a global
//! tempo/beat estimate plus loudness, spectral centroid, mel-band and bass
//! tracks sampled on a fixed 60 Hz grid.

use std::path::Path;

use rustfft::{num_complex::Complex, FftPlanner};
use thiserror::Error;

use super::mel::MelFilterbank;
use super::tempo::{self, hann_window};
use super::timeline::{
    BassPoint, Beat, FeatureTimeline, LoudnessPoint, MelPoint, SpectralPoint, HOP_RATE, MEL_BANDS,
};

/// Analysis frame length in samples.
const FRAME_SIZE: usize = 1024;

const DB_FLOOR: f32 = -60.0;
const EPSILON: f32 = 1e-10;

/// Errors from the analysis stage. The orchestration layer decides whether
/// to substitute the synthetic fallback; this module only reports causes.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to decode waveform: {0}")]
    Decode(String),

    #[error("analysis backend unavailable: {0}")]
    Unavailable(String),

    #[error("waveform too large to analyze: {size} bytes (limit: {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("internal numeric failure: {0}")]
    Internal(String),
}

/// Analyze a decoded WAV file, guarding against oversized inputs before any
/// sample data is loaded.
pub fn analyze_wav_file(
    path: &Path,
    source_id: &str,
    max_bytes: u64,
) -> Result<FeatureTimeline, AnalysisError> {
    let size = std::fs::metadata(path)
        .map_err(|e| AnalysisError::Decode(format!("stat {}: {}", path.display(), e)))?
        .len();
    if size > max_bytes {
        return Err(AnalysisError::TooLarge { size, limit: max_bytes });
    }

    let (samples, sample_rate) = read_wav_mono(path)?;
    analyze_samples(&samples, sample_rate, source_id)
}

/// Decode a WAV file into mono f32 samples. Multi-channel input is averaged
/// down, although the acquisition stage already requests mono output.
fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), AnalysisError> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| AnalysisError::Decode(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AnalysisError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AnalysisError::Decode(e.to_string()))?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    if samples.is_empty() {
        return Err(AnalysisError::Decode("empty waveform".to_string()));
    }
    Ok((samples, spec.sample_rate))
}

/// Analyze mono samples at the given rate.
pub fn analyze_samples(
    samples: &[f32],
    sample_rate: u32,
    source_id: &str,
) -> Result<FeatureTimeline, AnalysisError> {
    if samples.is_empty() || sample_rate == 0 {
        return Err(AnalysisError::Decode("empty waveform".to_string()));
    }

    let duration = samples.len() as f64 / sample_rate as f64;

    let beat_times = tempo::detect_beats(samples, sample_rate);
    let tempo_bpm = tempo::estimate_tempo(&beat_times);

    let hop_count = ((samples.len() as u64 * HOP_RATE as u64) / sample_rate as u64) as usize;
    let hop_count = hop_count.max(1);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);
    let window = hann_window(FRAME_SIZE);
    let filterbank = MelFilterbank::new(FRAME_SIZE, sample_rate);

    let nyquist = sample_rate as f32 / 2.0;
    let freq_resolution = sample_rate as f32 / FRAME_SIZE as f32;
    let half = FRAME_SIZE / 2 + 1;

    let mut loudness = Vec::with_capacity(hop_count);
    let mut spectral = Vec::with_capacity(hop_count);
    let mut melbands = Vec::with_capacity(hop_count);
    let mut bass = Vec::with_capacity(hop_count);

    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); FRAME_SIZE];
    let mut magnitudes = vec![0.0f32; half];

    for hop in 0..hop_count {
        let t = hop as f64 / HOP_RATE as f64;

        // Frame starts are spaced at exactly sample_rate / HOP_RATE samples;
        // the tail frame is zero-padded.
        let start = ((hop as f64 * sample_rate as f64) / HOP_RATE as f64).round() as usize;
        let available = samples.len().saturating_sub(start).min(FRAME_SIZE);

        let mut rms_accum = 0.0f32;
        for i in 0..FRAME_SIZE {
            let sample = if i < available { samples[start + i] } else { 0.0 };
            rms_accum += sample * sample;
            buffer[i] = Complex::new(sample * window[i], 0.0);
        }
        fft.process(&mut buffer);
        for (i, slot) in magnitudes.iter_mut().enumerate() {
            *slot = buffer[i].norm();
        }

        // Loudness: RMS mapped through a dB-like scale, then saturated.
        let rms = (rms_accum / FRAME_SIZE as f32).sqrt();
        let db = 20.0 * (rms + EPSILON).log10();
        let v = compress_db(db);

        // Spectral centroid normalized by Nyquist.
        let total: f32 = magnitudes.iter().sum();
        let c = if total > EPSILON {
            let centroid_hz: f32 = magnitudes
                .iter()
                .enumerate()
                .map(|(i, &mag)| i as f32 * freq_resolution * mag)
                .sum::<f32>()
                / total;
            (centroid_hz / nyquist).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Mel bands, each dB-compressed with the same saturating family.
        let energies = filterbank.band_energies(&magnitudes);
        let mut bands = [0.0f32; MEL_BANDS];
        for (slot, &energy) in bands.iter_mut().zip(energies.iter()) {
            *slot = compress_db(10.0 * (energy + EPSILON).log10());
        }

        let b = (bands[0] + bands[1]) / 2.0;

        loudness.push(LoudnessPoint { t, v });
        spectral.push(SpectralPoint { t, c });
        melbands.push(MelPoint { t, bands });
        bass.push(BassPoint { t, b });
    }

    let timeline = FeatureTimeline {
        source_id: source_id.to_string(),
        tempo: tempo_bpm,
        duration,
        synthetic: false,
        beats: beat_times.into_iter().map(|t| Beat { t }).collect(),
        loudness,
        spectral,
        melbands,
        bass,
    };

    timeline
        .validate()
        .map_err(AnalysisError::Internal)?;
    Ok(timeline)
}

/// Map a dB value into [0, 1] with a saturating nonlinearity, so loud
/// transients compress instead of clipping the encoding.
fn compress_db(db: f32) -> f32 {
    ((db - DB_FLOOR) / -DB_FLOOR).max(0.0).tanh()
}
