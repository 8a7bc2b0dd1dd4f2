use serde::{Deserialize, Serialize};

use crate::mass::Mass;
use crate::peptide::Peptide;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    A,
    B,
    C,
    X,
    Y,
    Z,
}

impl Kind {
    /// Does this series contain the peptide N-terminus?
    pub fn is_nterm(self) -> bool {
        matches!(self, Kind::A | Kind::B | Kind::C)
    }
}

/// Theoretical fragment ion
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ion {
    pub kind: Kind,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f32,
    /// Number of residues in the fragment, i.e. the 3 of b3
    pub ordinal: u16,
}

/// Generate fragment ions of a single series for a candidate peptide
pub struct IonSeries<'p> {
    pub kind: Kind,
    cumulative_mass: f32,
    peptide: &'p Peptide,
    idx: usize,
}

impl<'p> IonSeries<'p> {
    /// Create a new [`IonSeries`] iterator for a specified peptide
    pub fn new(peptide: &'p Peptide, kind: Kind) -> Self {
        const C: f32 = 12.0;
        const O: f32 = 15.994914;
        const H: f32 = 1.007825;
        const PRO: f32 = 1.0072764;
        const N: f32 = 14.003074;
        // Ammonia plus a proton, the c/z ion offset
        const NH3_H: f32 = N + H * 2.0 + PRO;

        let nterm = peptide.nterm.unwrap_or_default();
        let cumulative_mass = match kind {
            Kind::A => nterm - (C + O),
            Kind::B => nterm,
            Kind::C => nterm + NH3_H,
            Kind::X => peptide.monoisotopic - nterm + (C + O - NH3_H + N + H),
            Kind::Y => peptide.monoisotopic - nterm,
            Kind::Z => peptide.monoisotopic - nterm - NH3_H,
        };
        Self {
            kind,
            cumulative_mass,
            peptide,
            idx: 0,
        }
    }
}

impl<'p> Iterator for IonSeries<'p> {
    type Item = Ion;

    // Dynamic programming solution - memoize cumulative mass of
    // peptide fragment for fast fragment ion generation
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.peptide.sequence.len() {
            return None;
        }
        let r = self.peptide.sequence.get(self.idx)?;
        let m = self.peptide.modifications.get(self.idx)?;

        self.cumulative_mass += match self.kind.is_nterm() {
            true => r.monoisotopic() + *m,
            false => -(r.monoisotopic() + *m),
        };
        self.idx += 1;

        let ordinal = match self.kind.is_nterm() {
            true => self.idx,
            false => self.peptide.sequence.len() - self.idx,
        };

        Some(Ion {
            kind: self.kind,
            monoisotopic_mass: self.cumulative_mass,
            ordinal: ordinal as u16,
        })
    }
}
