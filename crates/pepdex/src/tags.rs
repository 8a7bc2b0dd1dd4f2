//! Short sequence tags read directly off a spectrum
//!
//! Consecutive fragment ions of one series differ by exactly one residue
//! mass. Chaining such differences across peaks spells out a few residues of
//! the peptide, which is enough to discard most candidates of a wide
//! precursor window before any fragment matching happens.

use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};

use crate::mass::{Tolerance, PROTON};
use crate::peptide::Peptide;
use crate::spectrum::Spectrum;
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagParameters {
    /// Number of residues in a tag
    pub length: usize,
    /// Allowed deviation between a peak mass difference and a residue mass
    pub tolerance: Tolerance,
    /// Stop collecting once this many distinct tags were found
    pub max_tags: usize,
}

impl Default for TagParameters {
    fn default() -> Self {
        Self {
            length: 3,
            tolerance: Tolerance::da(0.02),
            max_tags: 10_000,
        }
    }
}

impl TagParameters {
    pub fn validate(&self) -> Result<(), Error> {
        self.tolerance.validate()?;
        if self.length == 0 {
            return Err(Error::InvalidRange {
                name: "tag length",
                lo: 1.0,
                hi: self.length as f32,
            });
        }
        Ok(())
    }
}

/// Isoleucine and leucine are indistinguishable by mass
#[inline]
fn fold(residue: u8) -> u8 {
    match residue {
        b'I' => b'L',
        r => r,
    }
}

/// A mass difference between two peaks explained by a residue
#[derive(Copy, Clone, Debug)]
struct Edge {
    to: usize,
    residue: u8,
}

pub struct TagGenerator {
    /// Residue letters and masses, sorted by mass
    alphabet: Vec<(u8, f32)>,
    parameters: TagParameters,
}

impl TagGenerator {
    /// Create a generator over an alphabet of (residue, mass) pairs, e.g. the
    /// output of [`crate::database::FragmentIndex::residue_alphabet`]
    pub fn new(alphabet: Vec<(u8, f32)>, parameters: TagParameters) -> Self {
        let mut alphabet = alphabet
            .into_iter()
            .map(|(residue, mass)| (fold(residue), mass))
            .collect::<Vec<_>>();
        alphabet.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        alphabet.dedup_by_key(|(residue, _)| *residue);
        Self {
            alphabet,
            parameters,
        }
    }

    pub fn parameters(&self) -> &TagParameters {
        &self.parameters
    }

    /// Outgoing edges of every peak, assuming singly charged fragments
    fn graph(&self, masses: &[f32]) -> Vec<Vec<Edge>> {
        let max_residue = self
            .alphabet
            .last()
            .map(|(_, mass)| *mass)
            .unwrap_or_default();
        let (_, slack) = self.parameters.tolerance.bounds(max_residue);

        let mut edges = vec![Vec::new(); masses.len()];
        for (i, lo) in masses.iter().enumerate() {
            for (j, hi) in masses.iter().enumerate().skip(i + 1) {
                let delta = hi - lo;
                if delta > slack {
                    break;
                }
                for (residue, mass) in &self.alphabet {
                    if self.parameters.tolerance.contains(*mass, delta) {
                        edges[i].push(Edge {
                            to: j,
                            residue: *residue,
                        });
                    }
                }
            }
        }
        edges
    }

    /// Every tag of exactly `length` residues supported by the peaks of
    /// `spectrum`. Peaks are assumed to be sorted by m/z.
    ///
    /// A ladder read from low to high m/z spells the peptide N- to C-terminal
    /// when it is a b-type series, and backwards when it is a y-type series,
    /// so each path is inserted in both reading directions
    pub fn generate(&self, spectrum: &Spectrum) -> TagSet {
        let length = self.parameters.length;
        let mut tags = FnvHashSet::default();
        if length == 0 || spectrum.peaks.len() <= length {
            return TagSet { tags, length };
        }

        let masses = spectrum
            .peaks
            .iter()
            .map(|peak| peak.mz - PROTON)
            .collect::<Vec<_>>();
        let edges = self.graph(&masses);

        let mut path = Vec::with_capacity(length);
        'outer: for start in 0..masses.len() {
            // Iterative DFS: stack of (peak, next edge to try)
            let mut stack = vec![(start, 0usize)];
            path.clear();
            while let Some((node, edge)) = stack.last_mut() {
                if path.len() == length {
                    let mut tag = path.clone();
                    tags.insert(tag.clone());
                    tag.reverse();
                    tags.insert(tag);
                    if tags.len() >= self.parameters.max_tags {
                        log::debug!(
                            "{}: stopped tag generation at {} tags",
                            spectrum.id,
                            tags.len()
                        );
                        break 'outer;
                    }
                    stack.pop();
                    path.pop();
                    continue;
                }
                match edges[*node].get(*edge) {
                    Some(next) => {
                        *edge += 1;
                        path.push(next.residue);
                        stack.push((next.to, 0));
                    }
                    None => {
                        stack.pop();
                        path.pop();
                    }
                }
            }
        }

        log::trace!("{}: generated {} tags", spectrum.id, tags.len());
        TagSet { tags, length }
    }
}

/// Tags generated for a single spectrum
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagSet {
    tags: FnvHashSet<Vec<u8>>,
    length: usize,
}

impl TagSet {
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        let tag = tag.bytes().map(fold).collect::<Vec<_>>();
        self.tags.contains(&tag)
    }

    /// Does `peptide` contain any of the tags? An empty set matches every
    /// peptide, so a spectrum without a readable ladder is never pruned
    pub fn matches(&self, peptide: &Peptide) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let folded = peptide.sequence.iter().map(|r| fold(*r)).collect::<Vec<_>>();
        folded
            .windows(self.length)
            .any(|window| self.tags.contains(window))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mass::{Mass, VALID_AA};
    use crate::spectrum::{Peak, Precursor};
    use crate::theoretical::TheoreticalSpectrumGenerator;

    fn alphabet() -> Vec<(u8, f32)> {
        VALID_AA
            .iter()
            .filter(|r| !matches!(**r, b'U' | b'O'))
            .map(|r| (*r, r.monoisotopic()))
            .collect()
    }

    fn peptide(s: &str) -> Peptide {
        s.parse().unwrap()
    }

    #[test]
    fn isoleucine_is_folded() {
        let generator = TagGenerator::new(alphabet(), TagParameters::default());
        assert!(generator.alphabet.iter().all(|(r, _)| *r != b'I'));
        assert_eq!(
            generator.alphabet.iter().filter(|(r, _)| *r == b'L').count(),
            1
        );
    }

    #[test]
    fn ladder() {
        // b1..b4 of PEPTIDE
        let spectrum = Spectrum {
            id: "ladder".into(),
            precursor: Precursor::default(),
            peaks: [98.06004, 227.10263, 324.1554, 425.20306]
                .into_iter()
                .map(|mz| Peak { mz, intensity: 1.0 })
                .collect(),
        };
        let tags = TagGenerator::new(alphabet(), TagParameters::default()).generate(&spectrum);
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("EPT"));
        assert!(tags.contains("TPE"));
        assert!(tags.matches(&peptide("PEPTIDE")));
        assert!(!tags.matches(&peptide("LLLLLLLK")));
    }

    #[test]
    fn theoretical_spectrum_matches_its_peptide() {
        let spectrum = TheoreticalSpectrumGenerator::default().generate(&peptide("LESLIEK"), 2);
        let generator = TagGenerator::new(alphabet(), TagParameters::default());
        let tags = generator.generate(&spectrum);
        assert!(!tags.is_empty());
        assert!(tags.contains("ESL"));
        assert!(tags.contains("SLI"));
        assert!(tags.matches(&peptide("LESLIEK")));
        assert!(tags.matches(&peptide("IESIIEK")));
        assert!(!tags.matches(&peptide("GGGGGGGR")));
    }

    #[test]
    fn empty_set_prunes_nothing() {
        let spectrum = Spectrum {
            id: "sparse".into(),
            precursor: Precursor::default(),
            peaks: vec![Peak {
                mz: 500.0,
                intensity: 1.0,
            }],
        };
        let tags = TagGenerator::new(alphabet(), TagParameters::default()).generate(&spectrum);
        assert!(tags.is_empty());
        assert!(tags.matches(&peptide("PEPTIDE")));
    }

    #[test]
    fn tag_cap() {
        let spectrum = TheoreticalSpectrumGenerator::default().generate(&peptide("PEPTIDEK"), 2);
        let parameters = TagParameters {
            length: 2,
            max_tags: 3,
            ..Default::default()
        };
        let tags = TagGenerator::new(alphabet(), parameters).generate(&spectrum);
        assert!(tags.len() >= 3 && tags.len() <= 4);
    }

    #[test]
    fn invalid_parameters() {
        let parameters = TagParameters {
            length: 0,
            ..Default::default()
        };
        assert!(parameters.validate().is_err());
        let parameters = TagParameters {
            tolerance: Tolerance::Da(0.1, -0.1),
            ..Default::default()
        };
        assert!(parameters.validate().is_err());
        assert!(TagParameters::default().validate().is_ok());
    }
}
