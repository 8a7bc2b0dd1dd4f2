use std::{
    collections::HashMap,
    fmt::{Display, Write},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::mass::VALID_AA;
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModificationSpecificity {
    PeptideN(Option<u8>),
    PeptideC(Option<u8>),
    ProteinN(Option<u8>),
    ProteinC(Option<u8>),
    Residue(u8),
}

impl ModificationSpecificity {
    /// Terminal specificities may be restricted to a residue, but never to
    /// anything other than an amino acid
    fn check(self) -> Result<Self, InvalidModification> {
        let r = match self {
            ModificationSpecificity::PeptideN(r)
            | ModificationSpecificity::PeptideC(r)
            | ModificationSpecificity::ProteinN(r)
            | ModificationSpecificity::ProteinC(r) => r,
            ModificationSpecificity::Residue(r) => Some(r),
        };
        match r {
            Some(r) if !VALID_AA.contains(&r) => Err(InvalidModification::InvalidResidue(r as char)),
            _ => Ok(self),
        }
    }
}

impl Display for ModificationSpecificity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = match self {
            ModificationSpecificity::PeptideN(r) => {
                f.write_char('^')?;
                *r
            }
            ModificationSpecificity::PeptideC(r) => {
                f.write_char('$')?;
                *r
            }
            ModificationSpecificity::ProteinN(r) => {
                f.write_char('[')?;
                *r
            }
            ModificationSpecificity::ProteinC(r) => {
                f.write_char(']')?;
                *r
            }
            ModificationSpecificity::Residue(r) => Some(*r),
        };

        if let Some(r) = r {
            f.write_char(r as char)?;
        }

        Ok(())
    }
}

impl Serialize for ModificationSpecificity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum InvalidModification {
    #[error("empty specificity")]
    Empty,
    #[error("unrecognized residue `{0}`")]
    InvalidResidue(char),
    #[error("`{0}` is too long")]
    TooLong(String),
    #[error("`{0}` is not a finite mass")]
    InvalidMass(String),
}

impl FromStr for ModificationSpecificity {
    type Err = InvalidModification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 2 {
            return Err(InvalidModification::TooLong(s.into()));
        }
        let residue = |rest: &str| rest.chars().next().map(|ch| ch as u8);
        let spec = if let Some(rest) = s.strip_prefix('^') {
            ModificationSpecificity::PeptideN(residue(rest))
        } else if let Some(rest) = s.strip_prefix('$') {
            ModificationSpecificity::PeptideC(residue(rest))
        } else if let Some(rest) = s.strip_prefix('[') {
            ModificationSpecificity::ProteinN(residue(rest))
        } else if let Some(rest) = s.strip_prefix(']') {
            ModificationSpecificity::ProteinC(residue(rest))
        } else {
            match s.chars().next() {
                Some(c) if s.len() == 1 => ModificationSpecificity::Residue(c as u8),
                Some(_) => return Err(InvalidModification::TooLong(s.into())),
                None => return Err(InvalidModification::Empty),
            }
        };
        spec.check()
    }
}

/// Variable modifications accept either a single mass or a list of masses
/// for the same specificity
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ValueOrVec {
    Value(f32),
    Vec(Vec<f32>),
}

impl From<ValueOrVec> for Vec<f32> {
    fn from(value: ValueOrVec) -> Self {
        match value {
            ValueOrVec::Value(v) => vec![v],
            ValueOrVec::Vec(v) => v,
        }
    }
}

/// UniMod-style names and their monoisotopic mass deltas
const NAMED: &[(&str, f32)] = &[
    ("Acetyl", 42.010565),
    ("Amidated", -0.984016),
    ("Carbamidomethyl", 57.021464),
    ("Carbamyl", 43.005814),
    ("Deamidated", 0.984016),
    ("Dimethyl", 28.0313),
    ("Gln->pyro-Glu", -17.026549),
    ("Glu->pyro-Glu", -18.010565),
    ("GlyGly", 114.042927),
    ("Methyl", 14.01565),
    ("Oxidation", 15.994915),
    ("Phospho", 79.966331),
    ("TMT6plex", 229.162932),
];

/// Parse a named modification such as `Carbamidomethyl (C)`,
/// `Acetyl (Protein N-term)` or `Gln->pyro-Glu (N-term Q)`
pub fn parse_named(name: &str) -> Result<(ModificationSpecificity, f32), Error> {
    let unknown = || Error::UnknownModification(name.into());

    let (label, site) = name
        .trim()
        .strip_suffix(')')
        .and_then(|s| s.rsplit_once('('))
        .ok_or_else(unknown)?;

    let (_, mass) = NAMED
        .iter()
        .find(|(known, _)| *known == label.trim())
        .ok_or_else(unknown)?;

    let residue = |rest: &str| -> Result<Option<u8>, Error> {
        match rest.trim() {
            "" => Ok(None),
            r if r.len() == 1 => Ok(Some(r.as_bytes()[0])),
            _ => Err(unknown()),
        }
    };

    let site = site.trim();
    let spec = if let Some(rest) = site.strip_prefix("Protein N-term") {
        ModificationSpecificity::ProteinN(residue(rest)?)
    } else if let Some(rest) = site.strip_prefix("Protein C-term") {
        ModificationSpecificity::ProteinC(residue(rest)?)
    } else if let Some(rest) = site.strip_prefix("N-term") {
        ModificationSpecificity::PeptideN(residue(rest)?)
    } else if let Some(rest) = site.strip_prefix("C-term") {
        ModificationSpecificity::PeptideC(residue(rest)?)
    } else {
        match residue(site)? {
            Some(r) => ModificationSpecificity::Residue(r),
            None => return Err(unknown()),
        }
    };

    let spec = spec
        .check()
        .map_err(|e| Error::InvalidModification(name.into(), e))?;
    Ok((spec, *mass))
}

fn parse_spec(s: &str, mass: f32) -> Result<ModificationSpecificity, Error> {
    if !mass.is_finite() {
        return Err(Error::InvalidModification(
            s.into(),
            InvalidModification::InvalidMass(mass.to_string()),
        ));
    }
    ModificationSpecificity::from_str(s).map_err(|e| Error::InvalidModification(s.into(), e))
}

/// Validate a `specificity -> mass` table of static modifications
pub fn validate_mods(
    input: Option<HashMap<String, f32>>,
) -> Result<HashMap<ModificationSpecificity, f32>, Error> {
    let mut output = HashMap::new();
    for (s, mass) in input.unwrap_or_default() {
        let spec = parse_spec(&s, mass)?;
        if output.insert(spec, mass).is_some() {
            log::warn!("static modification {} specified more than once", spec);
        }
    }
    Ok(output)
}

/// Validate a `specificity -> mass(es)` table of variable modifications
pub fn validate_var_mods(
    input: Option<HashMap<String, ValueOrVec>>,
) -> Result<HashMap<ModificationSpecificity, Vec<f32>>, Error> {
    let mut output: HashMap<ModificationSpecificity, Vec<f32>> = HashMap::new();
    for (s, masses) in input.unwrap_or_default() {
        let masses: Vec<f32> = masses.into();
        for &mass in &masses {
            parse_spec(&s, mass)?;
        }
        let spec = parse_spec(&s, 0.0)?;
        output.entry(spec).or_default().extend(masses);
    }
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_modifications() {
        use InvalidModification::*;
        use ModificationSpecificity::*;
        assert_eq!("[".parse::<ModificationSpecificity>(), Ok(ProteinN(None)));
        assert_eq!(
            "[M".parse::<ModificationSpecificity>(),
            Ok(ProteinN(Some(b'M')))
        );
        assert_eq!(
            "]M".parse::<ModificationSpecificity>(),
            Ok(ProteinC(Some(b'M')))
        );
        assert_eq!("^".parse::<ModificationSpecificity>(), Ok(PeptideN(None)));
        assert_eq!("M".parse::<ModificationSpecificity>(), Ok(Residue(b'M')));
        assert_eq!(
            "Z".parse::<ModificationSpecificity>(),
            Err(InvalidResidue('Z'))
        );
        assert_eq!(
            "^Z".parse::<ModificationSpecificity>(),
            Err(InvalidResidue('Z'))
        );
        assert_eq!("".parse::<ModificationSpecificity>(), Err(Empty));
        assert_eq!(
            "MC".parse::<ModificationSpecificity>(),
            Err(TooLong("MC".into()))
        );
    }

    #[test]
    fn display_round_trip() {
        for s in ["^", "$K", "[M", "]", "C"] {
            let spec = s.parse::<ModificationSpecificity>().unwrap();
            assert_eq!(spec.to_string(), s);
        }
    }

    #[test]
    fn named_modifications() {
        use ModificationSpecificity::*;
        assert_eq!(
            parse_named("Carbamidomethyl (C)").unwrap(),
            (Residue(b'C'), 57.021464)
        );
        assert_eq!(
            parse_named("Oxidation (M)").unwrap(),
            (Residue(b'M'), 15.994915)
        );
        assert_eq!(
            parse_named("Acetyl (Protein N-term)").unwrap(),
            (ProteinN(None), 42.010565)
        );
        assert_eq!(
            parse_named("Gln->pyro-Glu (N-term Q)").unwrap(),
            (PeptideN(Some(b'Q')), -17.026549)
        );
        assert_eq!(
            parse_named("Amidated (C-term)").unwrap(),
            (PeptideC(None), -0.984016)
        );
        assert_eq!(
            parse_named("Frobnicated (C)"),
            Err(Error::UnknownModification("Frobnicated (C)".into()))
        );
        assert!(parse_named("Oxidation").is_err());
        assert!(parse_named("Oxidation (B)").is_err());
    }

    #[test]
    fn validate_tables() {
        let fixed = [("C".to_string(), 57.021464)].into_iter().collect();
        let fixed = validate_mods(Some(fixed)).unwrap();
        assert_eq!(fixed[&ModificationSpecificity::Residue(b'C')], 57.021464);

        let bad = [("X".to_string(), 1.0)].into_iter().collect();
        assert!(matches!(
            validate_mods(Some(bad)),
            Err(Error::InvalidModification(..))
        ));

        let nan = [("M".to_string(), f32::NAN)].into_iter().collect();
        assert!(validate_mods(Some(nan)).is_err());

        let var = [
            ("M".to_string(), ValueOrVec::Value(15.9949)),
            ("^".to_string(), ValueOrVec::Vec(vec![42.0, 43.0])),
        ]
        .into_iter()
        .collect();
        let var = validate_var_mods(Some(var)).unwrap();
        assert_eq!(var[&ModificationSpecificity::PeptideN(None)], vec![42.0, 43.0]);
        assert_eq!(var[&ModificationSpecificity::Residue(b'M')], vec![15.9949]);
    }

    #[test]
    fn value_or_vec() {
        let v: ValueOrVec = serde_json::from_str("15.99").unwrap();
        assert_eq!(Vec::<f32>::from(v), vec![15.99]);
        let v: ValueOrVec = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(Vec::<f32>::from(v), vec![1.0, 2.0]);
    }
}
