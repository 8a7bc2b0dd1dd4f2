use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::database::binary_search_slice;
use crate::mass::{Tolerance, NEUTRON, PROTON};
use crate::Error;

/// A centroided peak
#[derive(PartialEq, PartialOrd, Copy, Clone, Default, Debug, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f32,
    pub intensity: f32,
}

/// A de-isotoped peak, that might have some charge state information
#[derive(PartialEq, PartialOrd, Debug, Copy, Clone)]
pub struct Deisotoped {
    pub mz: f32,
    // Cumulative intensity of all isotopic peaks in the envelope higher than this one
    pub intensity: f32,
    // Assigned charge
    pub charge: Option<u8>,
    // If `Some(idx)`, idx is the index of the parent isotopic envelope
    pub envelope: Option<usize>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precursor {
    pub mz: f32,
    /// If missing, every charge in the scorer's configured range is tried
    #[serde(default)]
    pub charge: Option<u8>,
    /// Per-spectrum override of the isotope error range
    #[serde(default)]
    pub isotope_errors: Option<(i8, i8)>,
}

/// A tandem mass spectrum. Peaks must be sorted by m/z in ascending order
/// before scoring
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub id: String,
    pub precursor: Precursor,
    pub peaks: Vec<Peak>,
}

impl Spectrum {
    /// Returns an error naming the first peak that is out of order
    pub fn check_sorted(&self) -> Result<(), Error> {
        match self.peaks.windows(2).position(|w| {
            matches!(w[0].mz.partial_cmp(&w[1].mz), None | Some(Ordering::Greater))
        }) {
            Some(position) => Err(Error::UnsortedSpectrum {
                id: self.id.clone(),
                position: position + 1,
            }),
            None => Ok(()),
        }
    }

    pub fn total_intensity(&self) -> f32 {
        self.peaks.iter().map(|peak| peak.intensity).sum()
    }
}

pub struct SpectrumProcessor {
    pub take_top_n: usize,
    pub max_fragment_mz: f32,
    pub min_fragment_mz: f32,
    pub deisotope: bool,
}

/// Binary search followed by linear search to select the most intense peak
/// within the `tolerance` window around `mz`
pub fn select_most_intense_peak(peaks: &[Peak], mz: f32, tolerance: Tolerance) -> Option<&Peak> {
    let (lo, hi) = tolerance.bounds(mz);
    let (i, j) = binary_search_slice(peaks, |peak, query| peak.mz.total_cmp(query), lo, hi);

    let mut best_peak = None;
    let mut max_int = 0.0;
    for peak in peaks[i..j]
        .iter()
        .filter(|peak| peak.mz >= lo && peak.mz <= hi)
    {
        if peak.intensity >= max_int {
            max_int = peak.intensity;
            best_peak = Some(peak);
        }
    }
    best_peak
}

/// Deisotope a set of peaks by attempting to find C13 peaks under a given `ppm` tolerance
pub fn deisotope(mz: &[f32], int: &[f32], max_charge: u8, ppm: f32) -> Vec<Deisotoped> {
    let mut peaks = mz
        .iter()
        .zip(int.iter())
        .map(|(mz, int)| Deisotoped {
            mz: *mz,
            intensity: *int,
            envelope: None,
            charge: None,
        })
        .collect::<Vec<_>>();

    // Is the peak at index `i` an isotopic peak?
    for i in (0..mz.len()).rev() {
        let tol = Tolerance::ppm_to_delta_mass(mz[i], ppm);
        for j in (0..i).rev() {
            let delta = mz[i] - mz[j];
            if delta > NEUTRON + tol {
                break;
            }
            for charge in 1..=max_charge {
                let iso = NEUTRON / charge as f32;
                if (delta - iso).abs() <= tol && int[i] < int[j] {
                    // Make sure this peak isn't already part of an isotopic envelope
                    if let Some(existing) = peaks[i].charge {
                        if existing != charge {
                            continue;
                        }
                    }
                    peaks[j].intensity += peaks[i].intensity;
                    peaks[j].charge = Some(charge);
                    peaks[i].charge = Some(charge);
                    peaks[i].envelope = Some(j);
                }
            }
        }
    }
    peaks
}

/// Path compression of isotopic envelope links
pub fn path_compression(peaks: &mut [Deisotoped]) {
    for idx in 0..peaks.len() {
        if let Some(parent) = peaks[idx].envelope {
            if let Some(upper) = peaks[parent].envelope {
                peaks[idx].envelope = Some(upper);
            }
            peaks[idx].intensity = 0.0;
        }
    }
}

impl SpectrumProcessor {
    /// Create a new [`SpectrumProcessor`]
    ///
    /// # Arguments
    /// * `take_top_n`: Keep only the top N most intense peaks from the spectrum
    /// * `min_fragment_mz`: Keep only fragments >= this m/z
    /// * `max_fragment_mz`: Keep only fragments <= this m/z
    /// * `deisotope`: Perform deisotoping & charge state deconvolution
    pub fn new(
        take_top_n: usize,
        min_fragment_mz: f32,
        max_fragment_mz: f32,
        deisotope: bool,
    ) -> Self {
        Self {
            take_top_n,
            min_fragment_mz,
            max_fragment_mz,
            deisotope,
        }
    }

    /// Returns a copy of `spectrum` whose peaks are filtered to the
    /// configured m/z window, optionally deisotoped (collapsing each envelope
    /// into a singly charged monoisotopic peak), reduced to the most intense
    /// `take_top_n` and sorted by m/z
    pub fn process(&self, mut spectrum: Spectrum) -> Spectrum {
        spectrum.peaks.retain(|peak| peak.mz.is_finite());
        spectrum.peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));

        let mut peaks = if self.deisotope {
            // If the precursor charge is unknown, deisotope fragments up to z=3
            let charge = spectrum.precursor.charge.unwrap_or(3);
            let mz = spectrum.peaks.iter().map(|p| p.mz).collect::<Vec<_>>();
            let int = spectrum.peaks.iter().map(|p| p.intensity).collect::<Vec<_>>();
            let mut peaks = deisotope(&mz, &int, charge, 10.0);
            path_compression(&mut peaks);
            peaks
                .into_iter()
                .filter(|peak| peak.envelope.is_none())
                .map(|peak| Peak {
                    // Convert to MH+
                    mz: (peak.mz - PROTON) * peak.charge.unwrap_or(1) as f32 + PROTON,
                    intensity: peak.intensity,
                })
                .collect::<Vec<_>>()
        } else {
            std::mem::take(&mut spectrum.peaks)
        };

        peaks.retain(|peak| peak.mz >= self.min_fragment_mz && peak.mz <= self.max_fragment_mz);
        peaks.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
        peaks.truncate(self.take_top_n);
        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));

        log::trace!("{}: kept {} peaks", spectrum.id, peaks.len());
        spectrum.peaks = peaks;
        spectrum
    }
}
