pub mod database;
pub mod enzyme;
pub mod fasta;
pub mod ion_series;
pub mod isotopes;
pub mod mass;
pub mod modification;
pub mod peptide;
pub mod scoring;
pub mod spectrum;
pub mod tags;
pub mod theoretical;

use mass::Tolerance;
use modification::InvalidModification;

/// Everything that can go wrong while configuring or building an index, or
/// while scoring a single spectrum against it.
///
/// Configuration problems are reported before any work is done, so a failed
/// build never leaves a half-constructed [`database::FragmentIndex`] behind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("unknown enzyme `{0}`")]
    UnknownEnzyme(String),
    #[error("invalid enzyme cleavage rule: {0}")]
    InvalidEnzyme(String),
    #[error("unknown modification `{0}`")]
    UnknownModification(String),
    #[error("invalid modification `{0}`: {1}")]
    InvalidModification(String, InvalidModification),
    #[error("invalid tolerance {0:?}: lower bound must be finite and below the upper bound")]
    InvalidTolerance(Tolerance),
    #[error("invalid isotope error range [{0}, {1}]")]
    InvalidIsotopeRange(i8, i8),
    #[error("invalid precursor charge range [{0}, {1}]")]
    InvalidChargeRange(u8, u8),
    #[error("invalid {name} range [{lo}, {hi}]")]
    InvalidRange { name: &'static str, lo: f32, hi: f32 },
    #[error("invalid amino acid residue `{0}`")]
    InvalidResidue(char),
    #[error("invalid peptide sequence `{sequence}`: {reason}")]
    InvalidSequence { sequence: String, reason: String },
    #[error("more than {limit} peptides generated, refusing to build the index")]
    TooManyPeptides { limit: usize },
    #[error("spectrum `{id}` is not sorted by m/z (peak {position})")]
    UnsortedSpectrum { id: String, position: usize },
}
