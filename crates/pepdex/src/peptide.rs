use std::collections::HashMap;
use std::fmt::Write;
use std::str::FromStr;

use crate::{
    enzyme::{Digest, Position},
    fasta::ProteinIx,
    mass::{Mass, H2O, VALID_AA},
    modification::ModificationSpecificity,
    Error,
};

#[derive(Debug, Clone, PartialEq, PartialOrd, Default)]
pub struct Peptide {
    pub decoy: bool,
    pub sequence: Vec<u8>,
    /// Modification mass carried by each residue, 0.0 if unmodified
    pub modifications: Vec<f32>,
    pub nterm: Option<f32>,
    pub cterm: Option<f32>,
    pub monoisotopic: f32,
    pub missed_cleavages: u8,
    pub position: Position,
    /// Every protein this peptide occurs in, sorted. The first is the primary one
    pub proteins: Vec<ProteinIx>,
    /// Injected by hand rather than produced by digestion
    pub special: bool,
}

/// A place on a peptide that can carry a modification
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Site {
    Nterm,
    Cterm,
    Residue(usize),
}

impl Peptide {
    fn set_nterm_mod(&mut self, m: f32) {
        if self.nterm.is_none() {
            self.nterm = Some(m);
            self.monoisotopic += m;
        }
    }

    fn set_cterm_mod(&mut self, m: f32) {
        if self.cterm.is_none() {
            self.cterm = Some(m);
            self.monoisotopic += m;
        }
    }

    fn set_residue_mod(&mut self, index: usize, m: f32) {
        if self.modifications[index] == 0.0 {
            self.modifications[index] = m;
            self.monoisotopic += m;
        }
    }

    pub fn label(&self) -> i32 {
        match self.decoy {
            true => -1,
            false => 1,
        }
    }

    pub fn primary_protein(&self) -> Option<ProteinIx> {
        self.proteins.first().copied()
    }

    /// Mass of the residue at `index`, including any modification on it
    pub fn residue_mass(&self, index: usize) -> f32 {
        self.sequence[index].monoisotopic() + self.modifications[index]
    }

    /// Neutral mass recomputed from scratch
    pub fn computed_mass(&self) -> f32 {
        H2O + self.nterm.unwrap_or_default()
            + self.cterm.unwrap_or_default()
            + (0..self.sequence.len())
                .map(|i| self.residue_mass(i))
                .sum::<f32>()
    }

    fn sites(&self, spec: ModificationSpecificity) -> Vec<Site> {
        let first = self.sequence.first().copied();
        let last = self.sequence.last().copied();
        let restrict = |terminal: Option<u8>, r: Option<u8>| r.is_none() || terminal == r;

        match spec {
            ModificationSpecificity::Residue(r) => self
                .sequence
                .iter()
                .enumerate()
                .filter(|(i, &c)| c == r && self.modifications[*i] == 0.0)
                .map(|(i, _)| Site::Residue(i))
                .collect(),
            ModificationSpecificity::PeptideN(r) if self.nterm.is_none() && restrict(first, r) => {
                vec![Site::Nterm]
            }
            ModificationSpecificity::ProteinN(r)
                if self.nterm.is_none()
                    && self.position.protein_nterm()
                    && restrict(first, r) =>
            {
                vec![Site::Nterm]
            }
            ModificationSpecificity::PeptideC(r) if self.cterm.is_none() && restrict(last, r) => {
                vec![Site::Cterm]
            }
            ModificationSpecificity::ProteinC(r)
                if self.cterm.is_none()
                    && self.position.protein_cterm()
                    && restrict(last, r) =>
            {
                vec![Site::Cterm]
            }
            _ => Vec::new(),
        }
    }

    fn is_free(&self, site: Site) -> bool {
        match site {
            Site::Nterm => self.nterm.is_none(),
            Site::Cterm => self.cterm.is_none(),
            Site::Residue(i) => self.modifications[i] == 0.0,
        }
    }

    fn modify(&mut self, site: Site, mass: f32) {
        match site {
            Site::Nterm => self.set_nterm_mod(mass),
            Site::Cterm => self.set_cterm_mod(mass),
            Site::Residue(i) => self.set_residue_mod(i, mass),
        }
    }

    /// Apply a static modification to a peptide in-place
    pub fn static_mod(&mut self, spec: ModificationSpecificity, mass: f32) {
        for site in self.sites(spec) {
            self.modify(site, mass);
        }
    }

    /// Apply static modifications, then every combination of at most
    /// `max_variable_mods` variable modifications. At most `max_peptidoforms`
    /// forms are produced (the unmodified form first); the returned flag is set
    /// when combinations were dropped to respect that cap.
    pub fn apply(
        mut self,
        variable_mods: &[(ModificationSpecificity, f32)],
        static_mods: &HashMap<ModificationSpecificity, f32>,
        max_variable_mods: usize,
        max_peptidoforms: usize,
    ) -> (Vec<Peptide>, bool) {
        // Protein terminal mods take precedence over peptide terminal ones
        let mut statics = static_mods.iter().collect::<Vec<_>>();
        statics.sort_by(|a, b| a.0.cmp(b.0).reverse());
        for (spec, mass) in statics {
            self.static_mod(*spec, *mass);
        }

        let sites = variable_mods
            .iter()
            .flat_map(|(spec, mass)| self.sites(*spec).into_iter().map(move |s| (s, *mass)))
            .collect::<Vec<_>>();

        let mut peptides = Vec::new();
        let truncated = self.combine(
            &sites,
            max_variable_mods,
            max_peptidoforms.max(1),
            &mut peptides,
        );
        (peptides, truncated)
    }

    fn combine(
        &self,
        sites: &[(Site, f32)],
        remaining: usize,
        cap: usize,
        out: &mut Vec<Peptide>,
    ) -> bool {
        if out.len() >= cap {
            return true;
        }
        out.push(self.clone());
        if remaining == 0 {
            return false;
        }

        let mut truncated = false;
        for (k, (site, mass)) in sites.iter().enumerate() {
            if !self.is_free(*site) {
                continue;
            }
            let mut next = self.clone();
            next.modify(*site, *mass);
            truncated |= next.combine(&sites[k + 1..], remaining - 1, cap, out);
            if truncated {
                break;
            }
        }
        truncated
    }
}

impl TryFrom<&Digest> for Peptide {
    type Error = Error;

    fn try_from(value: &Digest) -> Result<Self, Self::Error> {
        let mut sequence = Vec::with_capacity(value.sequence.len());
        let mut monoisotopic = H2O;

        for c in value.sequence.bytes() {
            if !VALID_AA.contains(&c) {
                return Err(Error::InvalidResidue(c as char));
            }
            monoisotopic += c.monoisotopic();
            sequence.push(c);
        }

        Ok(Peptide {
            decoy: value.decoy,
            modifications: vec![0.0; sequence.len()],
            sequence,
            monoisotopic,
            nterm: None,
            cterm: None,
            missed_cleavages: value.missed_cleavages,
            position: value.position,
            proteins: vec![value.protein],
            special: false,
        })
    }
}

fn write_mass(f: &mut std::fmt::Formatter<'_>, m: f32) -> std::fmt::Result {
    if m.is_sign_positive() {
        write!(f, "[+{}]", m)
    } else {
        write!(f, "[{}]", m)
    }
}

/// Modified-sequence notation, e.g. `[+42.0106]-PEPTM[+15.9949]IDE-[+17.03]`
impl std::fmt::Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = self.nterm {
            write_mass(f, m)?;
            f.write_char('-')?;
        }
        for (r, m) in self.sequence.iter().zip(&self.modifications) {
            f.write_char(*r as char)?;
            if *m != 0.0 {
                write_mass(f, *m)?;
            }
        }
        if let Some(m) = self.cterm {
            f.write_char('-')?;
            write_mass(f, m)?;
        }
        Ok(())
    }
}

impl FromStr for Peptide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidSequence {
            sequence: s.into(),
            reason: reason.into(),
        };

        // Read a bracketed mass from the front of `rest`
        let bracket = |rest: &str| -> Result<(f32, usize), Error> {
            let end = rest.find(']').ok_or_else(|| invalid("unterminated modification"))?;
            let mass = rest[1..end]
                .trim()
                .parse::<f32>()
                .map_err(|_| invalid("modification is not a number"))?;
            if !mass.is_finite() {
                return Err(invalid("modification is not a finite number"));
            }
            Ok((mass, end + 1))
        };

        let mut rest = s.trim();
        let mut peptide = Peptide {
            monoisotopic: H2O,
            ..Default::default()
        };

        if rest.starts_with('[') {
            let (mass, used) = bracket(rest)?;
            rest = rest[used..]
                .strip_prefix('-')
                .ok_or_else(|| invalid("N-terminal modification must be followed by `-`"))?;
            peptide.set_nterm_mod(mass);
        }

        while let Some(c) = rest.chars().next() {
            match c {
                '-' => {
                    let tail = &rest[1..];
                    if !tail.starts_with('[') {
                        return Err(invalid("`-` must be followed by a C-terminal modification"));
                    }
                    let (mass, used) = bracket(tail)?;
                    if used != tail.len() {
                        return Err(invalid("trailing characters after C-terminal modification"));
                    }
                    peptide.set_cterm_mod(mass);
                    rest = "";
                }
                '[' => {
                    if peptide.sequence.is_empty() {
                        return Err(invalid("modification without a residue"));
                    }
                    let (mass, used) = bracket(rest)?;
                    let index = peptide.sequence.len() - 1;
                    if peptide.modifications[index] != 0.0 {
                        return Err(invalid("residue carries more than one modification"));
                    }
                    peptide.set_residue_mod(index, mass);
                    rest = &rest[used..];
                }
                c if c.is_ascii() && VALID_AA.contains(&(c as u8)) => {
                    peptide.sequence.push(c as u8);
                    peptide.modifications.push(0.0);
                    peptide.monoisotopic += (c as u8).monoisotopic();
                    rest = &rest[1..];
                }
                c => return Err(Error::InvalidResidue(c)),
            }
        }

        if peptide.sequence.is_empty() {
            return Err(invalid("no residues"));
        }
        Ok(peptide)
    }
}
