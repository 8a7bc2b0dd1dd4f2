use fnv::FnvHashSet;
use regex::Regex;

use crate::fasta::ProteinIx;
use crate::mass::VALID_AA;
use crate::Error;

#[derive(Clone, PartialOrd, Ord, Debug, Default)]
/// An enzymatic digest
///
/// # Important invariant about [`Digest`]:
/// * two digests are equal if and only if their sequences and position are equal
///   i.e., decoy status and protein are ignored for equality and hashing
pub struct Digest {
    /// Is this a decoy peptide?
    pub decoy: bool,
    /// Cleaved peptide sequence
    pub sequence: String,
    /// Index of the protein this digest was cut from
    pub protein: ProteinIx,
    /// Missed cleavages
    pub missed_cleavages: u8,
    /// Where in the protein the digest sits, needed for protein-terminal mods
    pub position: Position,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
pub enum Position {
    Nterm,
    Cterm,
    Full,
    #[default]
    Internal,
}

impl Position {
    pub fn protein_nterm(&self) -> bool {
        matches!(self, Position::Nterm | Position::Full)
    }

    pub fn protein_cterm(&self) -> bool {
        matches!(self, Position::Cterm | Position::Full)
    }
}

impl Digest {
    /// Generate an internal decoy sequence by reversing the sequence
    /// inside the first and last amino acids
    pub fn reverse(&self) -> Self {
        if self.decoy {
            return self.clone();
        }

        let mut sequence = self.sequence.chars().rev().collect::<Vec<char>>();
        let n = sequence.len().saturating_sub(1);
        sequence.swap(0, n);

        Digest {
            decoy: true,
            protein: self.protein,
            sequence: sequence.into_iter().collect(),
            missed_cleavages: self.missed_cleavages,
            position: self.position,
        }
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence && self.position == other.position
    }
}

impl Eq for Digest {}

impl std::hash::Hash for Digest {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
        self.position.hash(state);
    }
}

/// Proteases known by name: (name, cleavage residues, restriction, c-terminal)
const NAMED: &[(&str, &str, Option<char>, bool)] = &[
    ("Trypsin", "KR", Some('P'), true),
    ("Trypsin/P", "KR", None, true),
    ("Lys-C", "K", Some('P'), true),
    ("Lys-C/P", "K", None, true),
    ("Lys-N", "K", None, false),
    ("Arg-C", "R", Some('P'), true),
    ("Arg-C/P", "R", None, true),
    ("Asp-N", "D", None, false),
    ("Glu-C", "E", Some('P'), true),
    ("Chymotrypsin", "FYWL", Some('P'), true),
    ("Chymotrypsin/P", "FYWL", None, true),
    ("no cleavage", "$", None, true),
    ("unspecific cleavage", "", None, true),
];

#[derive(Clone, Debug)]
pub struct EnzymeParameters {
    /// Number of missed cleavages to produce
    pub missed_cleavages: u8,
    /// Inclusive
    pub min_len: usize,
    /// Inclusive
    pub max_len: usize,
    /// `None` performs a non-specific digest
    pub enzyme: Option<Enzyme>,
}

#[derive(Clone, Debug)]
pub struct Enzyme {
    // Skip cleaving if the site is followed matching this AA
    pub skip_suffix: Option<char>,
    // Regex for matching cleavage sites
    regex: Regex,
    // Cleave at c-terminal?
    pub c_terminal: bool,
}

impl Enzyme {
    /// Build a cleavage rule. `cleave` is either empty (non-specific), `"$"`
    /// (no cleavage at all) or a string of residues to cut after (or before,
    /// if `c_terminal` is false)
    pub fn new(cleave: &str, skip_suffix: Option<char>, c_terminal: bool) -> Result<Option<Self>, Error> {
        if !(cleave.bytes().all(|x| VALID_AA.contains(&x)) || cleave == "$") {
            return Err(Error::InvalidEnzyme(format!(
                "cleavage sequence contains non-amino acid characters: {}",
                cleave
            )));
        }
        if let Some(x) = skip_suffix {
            if !x.is_ascii() || !VALID_AA.contains(&(x as u8)) {
                return Err(Error::InvalidEnzyme(format!(
                    "cleavage restriction is a non-amino acid character: {}",
                    x
                )));
            }
        }

        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| Error::InvalidEnzyme(e.to_string()));

        // At this point, cleave can be three things: empty, "$", or a string of valid AA's
        match cleave {
            "" => Ok(None),
            "$" => Ok(Some(Enzyme {
                regex: compile("$")?,
                skip_suffix: None,
                // Allowing this to be set to false could cause unexpected behavior
                c_terminal: true,
            })),
            _ => Ok(Some(Enzyme {
                regex: compile(&format!("[{}]", cleave))?,
                skip_suffix,
                c_terminal,
            })),
        }
    }

    /// Look up a protease by name, ignoring case
    pub fn from_name(name: &str) -> Result<Option<Self>, Error> {
        let (_, cleave, restrict, c_terminal) = NAMED
            .iter()
            .find(|(known, ..)| known.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::UnknownEnzyme(name.into()))?;
        Enzyme::new(cleave, *restrict, *c_terminal)
    }

    fn cleavage_sites(&self, sequence: &str) -> Vec<std::ops::Range<usize>> {
        let mut ranges = Vec::new();
        let mut left = 0;
        for mat in self.regex.find_iter(sequence) {
            let right = match self.c_terminal {
                true => mat.end(),
                false => mat.start(),
            };
            if let Some(skip) = self.skip_suffix {
                if right < sequence.len() && sequence[right..].starts_with(skip) {
                    continue;
                }
            }
            ranges.push(left..right);
            left = right;
        }
        ranges.push(left..sequence.len());
        ranges
    }
}

impl EnzymeParameters {
    fn cleavage_sites(&self, sequence: &str) -> Vec<std::ops::Range<usize>> {
        match &self.enzyme {
            Some(enzyme) => enzyme.cleavage_sites(sequence),
            None => {
                // Perform a non-specific digest
                let mut v = Vec::new();
                for len in self.min_len.max(1)..=self.max_len.min(sequence.len()) {
                    for i in 0..=sequence.len().saturating_sub(len) {
                        v.push(i..i + len)
                    }
                }
                v
            }
        }
    }

    pub fn digest(&self, sequence: &str, protein: ProteinIx) -> Vec<Digest> {
        let n = sequence.len();
        let mut digests = Vec::new();
        let sites = self.cleavage_sites(sequence);
        // Allowing missed_cleavages with non-specific digest causes OOB panics
        // in the below indexing code
        let missed_cleavages = match self.enzyme {
            None => 0,
            _ => self.missed_cleavages,
        };

        // Keep a set of peptides that have been digested from this sequence
        // - handles cases where the same peptide occurs multiple times in a protein
        let mut seen = FnvHashSet::default();

        for cleavage in 1..=(1 + missed_cleavages) {
            // Generate missed cleavages
            for win in sites.windows(cleavage as usize) {
                let start = win[0].start;
                let end = win[cleavage as usize - 1].end;

                let sequence = match sequence.get(start..end) {
                    Some(sequence) => sequence,
                    None => continue,
                };

                let len = sequence.len();

                let position = match (start == 0, end == n) {
                    (true, true) => Position::Full,
                    (true, false) => Position::Nterm,
                    (false, true) => Position::Cterm,
                    (false, false) => Position::Internal,
                };

                if len >= self.min_len
                    && len <= self.max_len
                    && len > 0
                    && seen.insert((sequence, position))
                {
                    digests.push(Digest {
                        sequence: sequence.into(),
                        missed_cleavages: cleavage - 1,
                        decoy: false,
                        position,
                        protein,
                    });
                }
            }
        }
        digests
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    const SEQUENCE: &str = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGN";

    fn digest(params: &EnzymeParameters, sequence: &str) -> Vec<String> {
        params
            .digest(sequence, ProteinIx::default())
            .into_iter()
            .map(|d| d.sequence)
            .collect()
    }

    fn params(min_len: usize, max_len: usize, missed: u8, enzyme: Option<Enzyme>) -> EnzymeParameters {
        EnzymeParameters {
            min_len,
            max_len,
            missed_cleavages: missed,
            enzyme,
        }
    }

    #[test]
    fn hash_digest() {
        let nterm = Digest {
            sequence: "MADEEK".into(),
            position: Position::Nterm,
            ..Default::default()
        };
        let set = [nterm.clone(), nterm.clone()].into_iter().collect::<HashSet<_>>();
        assert_eq!(set.len(), 1);

        let internal = Digest {
            position: Position::Internal,
            ..nterm.clone()
        };
        let set = [nterm, internal].into_iter().collect::<HashSet<_>>();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn trypsin() -> Result<(), Error> {
        let expected = vec![
            ("MADEEK".to_string(), Position::Nterm),
            ("LPPGWEK".into(), Position::Internal),
            ("MSR".into(), Position::Internal),
            ("SSGR".into(), Position::Internal),
            ("VYYFNHITNASQWERPSGN".into(), Position::Cterm),
        ];

        let tryp = params(2, 50, 0, Enzyme::from_name("trypsin")?);
        assert_eq!(
            expected,
            tryp.digest(SEQUENCE, ProteinIx(3))
                .into_iter()
                .map(|d| {
                    assert_eq!(d.protein, ProteinIx(3));
                    (d.sequence, d.position)
                })
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn trypsin_missed_cleavage() -> Result<(), Error> {
        let expected = vec![
            "MADEEK",
            "LPPGWEK",
            "R",
            "MSR",
            "SSGR",
            "VYYFNHITNASQWERPSGN",
            "MADEEKLPPGWEK",
            "LPPGWEKR",
            "RMSR",
            "MSRSSGR",
            "SSGRVYYFNHITNASQWERPSGN",
        ];
        let tryp = params(0, 50, 1, Enzyme::new("KR", Some('P'), true)?);
        assert_eq!(expected, digest(&tryp, SEQUENCE));
        Ok(())
    }

    #[test]
    fn trypsin_pro() -> Result<(), Error> {
        let expected = vec![
            "MADEEK",
            "LPPGWEK",
            "MSR",
            "SSGR",
            "VYYFNHITNASQWER",
            "PSGN",
        ];
        let tryp = params(2, 50, 0, Enzyme::from_name("Trypsin/P")?);
        assert_eq!(expected, digest(&tryp, SEQUENCE));
        Ok(())
    }

    #[test]
    fn asp_n() -> Result<(), Error> {
        let sequence = "MADEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGNW";
        let expected = vec!["MA", "DEEKLPPGWEKRMSRSSGRVYYFNHITNASQWERPSGNW"];
        let aspn = params(1, 50, 0, Enzyme::from_name("Asp-N")?);
        assert_eq!(expected, digest(&aspn, sequence));
        Ok(())
    }

    #[test]
    fn nonspecific_digest_5_7() -> Result<(), Error> {
        let expected = (5..=7)
            .flat_map(|window| SEQUENCE.as_bytes().windows(window).flat_map(std::str::from_utf8))
            .collect::<Vec<_>>();
        let unspecific = params(5, 7, 0, Enzyme::from_name("unspecific cleavage")?);
        assert_eq!(expected, digest(&unspecific, SEQUENCE));
        Ok(())
    }

    #[test]
    fn no_digest() -> Result<(), Error> {
        let none = params(0, usize::MAX, 0, Enzyme::from_name("no cleavage")?);
        assert_eq!(vec![SEQUENCE], digest(&none, SEQUENCE));
        Ok(())
    }

    #[test]
    fn ensure_unique() -> Result<(), Error> {
        let tryp = params(2, usize::MAX, 0, Enzyme::new("KR", None, true)?);
        let digests = tryp.digest("KVEGAQNQGKKVEGAQNQGKVEGAQNQGK", ProteinIx::default());
        // A repeat is kept once per position, protein-terminal mods tell them apart
        let positions = digests
            .iter()
            .map(|d| (d.sequence.as_str(), d.position))
            .collect::<Vec<_>>();
        assert_eq!(
            positions,
            vec![
                ("VEGAQNQGK", Position::Internal),
                ("VEGAQNQGK", Position::Cterm)
            ]
        );
        Ok(())
    }

    #[test]
    fn configuration_errors() {
        assert_eq!(
            Enzyme::from_name("Pepsin").unwrap_err(),
            Error::UnknownEnzyme("Pepsin".into())
        );
        assert!(matches!(
            Enzyme::new("KZ", None, true),
            Err(Error::InvalidEnzyme(_))
        ));
        assert!(matches!(
            Enzyme::new("KR", Some('#'), true),
            Err(Error::InvalidEnzyme(_))
        ));
    }
}
