//! Triangular mel filterbank over FFT magnitude bins.

use super::timeline::MEL_BANDS;

/// A bank of triangular filters on the mel scale, spanning 0 Hz to Nyquist.
///
/// Each filter is a dense weight vector over the non-redundant half of the
/// magnitude spectrum.
pub struct MelFilterbank {
    filters: Vec<Vec<f32>>,
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

impl MelFilterbank {
    /// Build the filterbank for a given FFT size and sample rate.
    pub fn new(fft_size: usize, sample_rate: u32) -> MelFilterbank {
        let half = fft_size / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;
        let freq_resolution = sample_rate as f32 / fft_size as f32;

        // MEL_BANDS triangles need MEL_BANDS + 2 edge points.
        let max_mel = hz_to_mel(nyquist);
        let edges_hz: Vec<f32> = (0..MEL_BANDS + 2)
            .map(|i| mel_to_hz(max_mel * i as f32 / (MEL_BANDS + 1) as f32))
            .collect();

        let mut filters = Vec::with_capacity(MEL_BANDS);
        for band in 0..MEL_BANDS {
            let (low, center, high) = (edges_hz[band], edges_hz[band + 1], edges_hz[band + 2]);
            let mut weights = vec![0.0f32; half];
            for (bin, weight) in weights.iter_mut().enumerate() {
                let hz = bin as f32 * freq_resolution;
                if hz > low && hz < high {
                    *weight = if hz <= center {
                        (hz - low) / (center - low)
                    } else {
                        (high - hz) / (high - center)
                    };
                }
            }
            filters.push(weights);
        }

        MelFilterbank { filters }
    }

    /// Apply the filterbank to a half-spectrum of magnitudes, returning the
    /// per-band mean energy (magnitude squared).
    pub fn band_energies(&self, magnitudes: &[f32]) -> [f32; MEL_BANDS] {
        let mut energies = [0.0f32; MEL_BANDS];
        for (band, weights) in self.filters.iter().enumerate() {
            let mut energy = 0.0f32;
            let mut weight_sum = 0.0f32;
            for (&mag, &w) in magnitudes.iter().zip(weights.iter()) {
                if w > 0.0 {
                    energy += w * mag * mag;
                    weight_sum += w;
                }
            }
            energies[band] = if weight_sum > 0.0 { energy / weight_sum } else { 0.0 };
        }
        energies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFT_SIZE: usize = 1024;
    const SAMPLE_RATE: u32 = 22050;

    #[test]
    fn builds_expected_band_count() {
        let bank = MelFilterbank::new(FFT_SIZE, SAMPLE_RATE);
        assert_eq!(bank.filters.len(), MEL_BANDS);
        assert_eq!(bank.filters[0].len(), FFT_SIZE / 2 + 1);
    }

    #[test]
    fn every_band_has_support() {
        let bank = MelFilterbank::new(FFT_SIZE, SAMPLE_RATE);
        for (band, weights) in bank.filters.iter().enumerate() {
            assert!(
                weights.iter().any(|&w| w > 0.0),
                "band {} covers no bins",
                band
            );
        }
    }

    #[test]
    fn low_tone_lands_in_low_bands() {
        let bank = MelFilterbank::new(FFT_SIZE, SAMPLE_RATE);
        let freq_resolution = SAMPLE_RATE as f32 / FFT_SIZE as f32;

        // Energy only near 80 Hz.
        let mut magnitudes = vec![0.0f32; FFT_SIZE / 2 + 1];
        let bin = (80.0 / freq_resolution) as usize;
        magnitudes[bin] = 1.0;

        let energies = bank.band_energies(&magnitudes);
        let low: f32 = energies[..2].iter().sum();
        let high: f32 = energies[MEL_BANDS - 2..].iter().sum();
        assert!(low > high, "expected low-band energy, got {:?}", energies);
    }

    #[test]
    fn silence_is_all_zero() {
        let bank = MelFilterbank::new(FFT_SIZE, SAMPLE_RATE);
        let magnitudes = vec![0.0f32; FFT_SIZE / 2 + 1];
        assert_eq!(bank.band_energies(&magnitudes), [0.0; MEL_BANDS]);
    }
}
