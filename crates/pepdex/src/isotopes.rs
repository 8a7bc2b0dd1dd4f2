//! Isotope envelopes from elemental composition.
//!
//! The number of heavy isotopes of each kind in a molecule is approximately
//! Poisson distributed with mean `atoms * (heavy abundance / light abundance)`.
//! Convolving those per-isotope distributions gives the relative height of
//! the M, M+1, M+2, ... peaks.

use crate::mass::Composition;

/// (nominal mass shift, abundance relative to the lightest isotope)
const CARBON: &[(usize, f32)] = &[(1, 0.0107 / 0.9893)];
const HYDROGEN: &[(usize, f32)] = &[(1, 0.000115 / 0.999885)];
const NITROGEN: &[(usize, f32)] = &[(1, 0.00364 / 0.99636)];
const OXYGEN: &[(usize, f32)] = &[(1, 0.00038 / 0.99757), (2, 0.00205 / 0.99757)];
const SULFUR: &[(usize, f32)] = &[(1, 0.0075 / 0.9499), (2, 0.0425 / 0.9499)];

/// Poisson probabilities placed at multiples of `step`, truncated to `len`
fn poisson(lambda: f32, step: usize, len: usize) -> Vec<f32> {
    let mut dist = vec![0.0; len];
    let mut term = (-lambda).exp();
    let mut k = 0;
    while k * step < len {
        dist[k * step] = term;
        k += 1;
        term *= lambda / k as f32;
    }
    dist
}

/// Truncated linear convolution, the output has the length of `a`
fn convolve(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; a.len()];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().take(a.len() - i).enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Relative intensities of the first `peaks` isotopic peaks of a molecule with
/// the given `composition`, scaled so that the most abundant peak is 1.0
pub fn isotope_envelope(composition: Composition, peaks: usize) -> Vec<f32> {
    if peaks == 0 {
        return Vec::new();
    }
    let elements = [
        (composition.carbon, CARBON),
        (composition.hydrogen, HYDROGEN),
        (composition.nitrogen, NITROGEN),
        (composition.oxygen, OXYGEN),
        (composition.sulfur, SULFUR),
    ];

    let mut envelope = vec![0.0; peaks];
    envelope[0] = 1.0;
    for (count, isotopes) in elements {
        if count == 0 {
            continue;
        }
        for &(shift, ratio) in isotopes {
            let dist = poisson(count as f32 * ratio, shift, peaks);
            envelope = convolve(&envelope, &dist);
        }
    }

    let max = envelope.iter().copied().fold(f32::MIN, f32::max);
    if max > 0.0 {
        envelope.iter_mut().for_each(|val| *val /= max);
    }
    envelope
}
