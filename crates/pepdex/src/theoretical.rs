//! Theoretical spectra for peptides, used to simulate an ideal measurement
//! of a sequence.

use crate::ion_series::{IonSeries, Kind};
use crate::isotopes::isotope_envelope;
use crate::mass::{Composition, Mass, NEUTRON, PROTON};
use crate::peptide::Peptide;
use crate::spectrum::{Peak, Precursor, Spectrum};

#[derive(Clone, Debug, PartialEq)]
pub struct TheoreticalSpectrumGenerator {
    pub ion_kinds: Vec<Kind>,
    /// Fragments are emitted at every charge from 1 up to this value
    pub max_charge: u8,
    /// Peaks per isotope envelope. 1 emits only monoisotopic peaks
    pub isotopes: usize,
}

impl Default for TheoreticalSpectrumGenerator {
    fn default() -> Self {
        Self {
            ion_kinds: vec![Kind::B, Kind::Y],
            max_charge: 1,
            isotopes: 1,
        }
    }
}

impl TheoreticalSpectrumGenerator {
    /// Elemental composition of the residues in an ion, ignoring modifications
    fn composition(peptide: &Peptide, kind: Kind, ordinal: usize) -> Composition {
        let residues = match kind.is_nterm() {
            true => &peptide.sequence[..ordinal],
            false => &peptide.sequence[peptide.sequence.len() - ordinal..],
        };
        let base = residues.iter().map(|r| r.composition()).sum::<Composition>();
        match kind.is_nterm() {
            true => base,
            false => base + Composition::H2O,
        }
    }

    /// Generate the spectrum of `peptide` as if it had been measured as a
    /// precursor of charge `precursor_charge`. Peaks are sorted by m/z
    pub fn generate(&self, peptide: &Peptide, precursor_charge: u8) -> Spectrum {
        let mut peaks = Vec::new();
        for kind in &self.ion_kinds {
            for ion in IonSeries::new(peptide, *kind) {
                let envelope = match self.isotopes {
                    0 | 1 => vec![1.0],
                    n => isotope_envelope(
                        Self::composition(peptide, ion.kind, ion.ordinal as usize),
                        n,
                    ),
                };
                for charge in 1..=self.max_charge.max(1) {
                    let z = charge as f32;
                    for (iso, intensity) in envelope.iter().enumerate() {
                        peaks.push(Peak {
                            mz: (ion.monoisotopic_mass + iso as f32 * NEUTRON + z * PROTON) / z,
                            intensity: *intensity,
                        });
                    }
                }
            }
        }
        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));

        let z = precursor_charge.max(1);
        Spectrum {
            id: peptide.to_string(),
            precursor: Precursor {
                mz: (peptide.monoisotopic + z as f32 * PROTON) / z as f32,
                charge: Some(z),
                isotope_errors: None,
            },
            peaks,
        }
    }
}
