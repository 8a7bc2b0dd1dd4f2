use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::Error;

pub const H2O: f32 = 18.010565;
pub const PROTON: f32 = 1.0072764;
pub const NEUTRON: f32 = 1.00335;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f32, f32),
    Da(f32, f32),
}

impl Tolerance {
    /// Symmetric ppm window
    pub fn ppm(ppm: f32) -> Self {
        Tolerance::Ppm(-ppm.abs(), ppm.abs())
    }

    /// Symmetric Dalton window
    pub fn da(da: f32) -> Self {
        Tolerance::Da(-da.abs(), da.abs())
    }

    /// Compute the (`lower`, `upper`) window (in Da) for for a monoisotopic
    /// mass and a given tolerance
    pub fn bounds(&self, center: f32) -> (f32, f32) {
        match self {
            Tolerance::Ppm(lo, hi) => {
                let delta_lo = center * lo / 1_000_000.0;
                let delta_hi = center * hi / 1_000_000.0;
                (center + delta_lo, center + delta_hi)
            }
            Tolerance::Da(lo, hi) => (center + lo, center + hi),
        }
    }

    pub fn contains(&self, center: f32, rhs: f32) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }

    pub fn ppm_to_delta_mass(center: f32, ppm: f32) -> f32 {
        ppm * center / 1_000_000.0
    }

    /// A tolerance window must have a strictly positive, finite width
    pub fn validate(self) -> Result<Self, Error> {
        let (lo, hi) = match self {
            Tolerance::Ppm(lo, hi) | Tolerance::Da(lo, hi) => (lo, hi),
        };
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(Error::InvalidTolerance(self));
        }
        if lo > 0.0 || hi < 0.0 {
            log::warn!(
                "tolerance window {:?} does not contain the measured mass itself",
                self
            );
        }
        Ok(self)
    }
}

pub trait Mass {
    fn monoisotopic(&self) -> f32;
    fn composition(&self) -> Composition;
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

/// Residue masses and formulas, i.e. amino acids without the water that is
/// lost when forming a peptide bond. Only call with members of [`VALID_AA`].
impl Mass for u8 {
    fn monoisotopic(&self) -> f32 {
        match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }

    fn composition(&self) -> Composition {
        match self {
            b'A' => Composition::new(3, 5, 1, 1, 0),
            b'R' => Composition::new(6, 12, 4, 1, 0),
            b'N' => Composition::new(4, 6, 2, 2, 0),
            b'D' => Composition::new(4, 5, 1, 3, 0),
            b'C' => Composition::new(3, 5, 1, 1, 1),
            b'E' => Composition::new(5, 7, 1, 3, 0),
            b'Q' => Composition::new(5, 8, 2, 2, 0),
            b'G' => Composition::new(2, 3, 1, 1, 0),
            b'H' => Composition::new(6, 7, 3, 1, 0),
            b'I' | b'L' => Composition::new(6, 11, 1, 1, 0),
            b'K' => Composition::new(6, 12, 2, 1, 0),
            b'M' => Composition::new(5, 9, 1, 1, 1),
            b'F' => Composition::new(9, 9, 1, 1, 0),
            b'P' => Composition::new(5, 7, 1, 1, 0),
            b'S' => Composition::new(3, 5, 1, 2, 0),
            b'T' => Composition::new(4, 7, 1, 2, 0),
            b'W' => Composition::new(11, 10, 2, 1, 0),
            b'Y' => Composition::new(9, 9, 1, 2, 0),
            b'V' => Composition::new(5, 9, 1, 1, 0),
            // Selenium is not modelled, the isotope envelope ignores it
            b'U' => Composition::new(3, 5, 1, 1, 0),
            b'O' => Composition::new(12, 19, 3, 2, 0),
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

/// Elemental formula restricted to the elements found in peptides
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct Composition {
    pub carbon: u16,
    pub hydrogen: u16,
    pub nitrogen: u16,
    pub oxygen: u16,
    pub sulfur: u16,
}

impl Composition {
    pub const H2O: Composition = Composition::new(0, 2, 0, 1, 0);

    pub const fn new(carbon: u16, hydrogen: u16, nitrogen: u16, oxygen: u16, sulfur: u16) -> Self {
        Self {
            carbon,
            hydrogen,
            nitrogen,
            oxygen,
            sulfur,
        }
    }
}

impl Add for Composition {
    type Output = Composition;

    fn add(self, rhs: Self) -> Self::Output {
        Composition {
            carbon: self.carbon + rhs.carbon,
            hydrogen: self.hydrogen + rhs.hydrogen,
            nitrogen: self.nitrogen + rhs.nitrogen,
            oxygen: self.oxygen + rhs.oxygen,
            sulfur: self.sulfur + rhs.sulfur,
        }
    }
}

impl Sum for Composition {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Composition::default(), Add::add)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn smoke() {
        for ch in VALID_AA {
            assert!(ch.monoisotopic() > 0.0);
            assert!(ch.composition().carbon > 0);
        }
    }

    #[test]
    fn tolerances() {
        assert_eq!(
            Tolerance::Ppm(-10.0, 20.0).bounds(1000.0),
            (999.99, 1000.02)
        );
        assert_eq!(
            Tolerance::Ppm(-10.0, 10.0).bounds(487.0),
            (486.99513, 487.00487)
        );
        assert_eq!(Tolerance::da(0.5).bounds(100.0), (99.5, 100.5));
        assert!(Tolerance::ppm(10.0).contains(1000.0, 1000.009));
        assert!(!Tolerance::ppm(10.0).contains(1000.0, 1000.011));
    }

    #[test]
    fn invalid_tolerances() {
        assert!(Tolerance::ppm(10.0).validate().is_ok());
        assert!(Tolerance::Da(0.5, 0.5).validate().is_err());
        assert!(Tolerance::Ppm(10.0, -10.0).validate().is_err());
        assert!(Tolerance::Da(f32::NAN, 1.0).validate().is_err());
        assert_eq!(
            Tolerance::ppm(0.0).validate(),
            Err(Error::InvalidTolerance(Tolerance::Ppm(-0.0, 0.0)))
        );
    }

    #[test]
    fn glycine_formula() {
        // Residue formula of glycine plus water is free glycine, C2H5NO2
        let gly = b'G'.composition() + Composition::H2O;
        assert_eq!(gly, Composition::new(2, 5, 1, 2, 0));
    }
}
