use serde::{Deserialize, Serialize};

/// Index of a protein in the caller-owned protein list
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ProteinIx(pub u32);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protein {
    /// Accession, i.e. the first whitespace-separated word of the header
    pub identifier: String,
    /// Remainder of the header line
    pub description: String,
    pub sequence: String,
}

impl Protein {
    pub fn new<S: Into<String>>(identifier: S, description: S, sequence: S) -> Self {
        Protein {
            identifier: identifier.into(),
            description: description.into(),
            sequence: sequence.into(),
        }
    }
}

pub struct Fasta {
    pub proteins: Vec<Protein>,
}

impl Fasta {
    // Parse a string into a fasta database
    pub fn parse(contents: &str) -> Fasta {
        let mut proteins = Vec::new();
        let mut header: Option<&str> = None;
        let mut s = String::new();

        let mut flush = |header: Option<&str>, s: &mut String| {
            if s.is_empty() {
                return;
            }
            let header = header.unwrap_or_default();
            let (identifier, description) = header
                .split_once(char::is_whitespace)
                .unwrap_or((header, ""));
            proteins.push(Protein {
                identifier: identifier.into(),
                description: description.trim().into(),
                sequence: std::mem::take(s),
            });
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(id) = line.strip_prefix('>') {
                flush(header, &mut s);
                header = Some(id.trim());
            } else {
                s.push_str(line);
            }
        }
        flush(header, &mut s);

        Fasta { proteins }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_fasta() {
        let contents = r#"
>sp|P00001|TEST_HUMAN A test protein OS=Homo sapiens
MADEEKLPPG
WEKRMSR
>rev_sp|P00001|TEST_HUMAN
RSMRKEWGPP
>empty

>sp|P00002|NODESC
PEPTIDE
"#;
        let fasta = Fasta::parse(contents);
        assert_eq!(fasta.proteins.len(), 3);
        assert_eq!(
            fasta.proteins[0],
            Protein::new(
                "sp|P00001|TEST_HUMAN",
                "A test protein OS=Homo sapiens",
                "MADEEKLPPGWEKRMSR"
            )
        );
        assert_eq!(fasta.proteins[1].identifier, "rev_sp|P00001|TEST_HUMAN");
        assert_eq!(fasta.proteins[1].description, "");
        assert_eq!(fasta.proteins[2].sequence, "PEPTIDE");
    }

    #[test]
    fn parse_empty() {
        assert!(Fasta::parse("").proteins.is_empty());
    }
}
