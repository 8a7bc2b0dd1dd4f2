use pepdex_core::peptide::Peptide;
use pepdex_core::scoring::Psm;
use rayon::prelude::*;

use crate::Runner;

impl Runner {
    /// Protein identifiers of `peptide`, separated by `;`. Generated decoys
    /// carry the decoy tag in front of the target protein identifier
    fn protein_names(&self, peptide: &Peptide) -> String {
        let decoy_tag = &self.database.parameters().decoy_tag;
        peptide
            .proteins
            .iter()
            .map(|ix| {
                if self.database.is_synthetic(*ix) {
                    return "special".to_string();
                }
                match self.proteins.get(ix.0 as usize) {
                    Some(protein)
                        if peptide.decoy && !protein.identifier.contains(decoy_tag.as_str()) =>
                    {
                        format!("{}{}", decoy_tag, protein.identifier)
                    }
                    Some(protein) => protein.identifier.clone(),
                    None => format!("protein_{}", ix.0),
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn serialize_psm(&self, file_id: usize, psm: &Psm) -> csv::ByteRecord {
        let peptide = &self.database[psm.peptide];
        let filename = self
            .parameters
            .spectra
            .get(file_id)
            .map(String::as_str)
            .unwrap_or_default();

        let mut record = csv::ByteRecord::new();
        record.push_field(peptide.to_string().as_bytes());
        record.push_field(self.protein_names(peptide).as_bytes());
        record.push_field(itoa::Buffer::new().format(peptide.proteins.len()).as_bytes());
        record.push_field(filename.as_bytes());
        record.push_field(psm.spec_id.as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.rank).as_bytes());
        record.push_field(itoa::Buffer::new().format(peptide.label()).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.expmass).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.calcmass).as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.charge).as_bytes());
        record.push_field(itoa::Buffer::new().format(peptide.sequence.len()).as_bytes());
        record.push_field(
            itoa::Buffer::new()
                .format(peptide.missed_cleavages)
                .as_bytes(),
        );
        record.push_field(itoa::Buffer::new().format(psm.isotope_error).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.delta_mass).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.hyperscore).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.delta_next).as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.matched_b).as_bytes());
        record.push_field(itoa::Buffer::new().format(psm.matched_y).as_bytes());
        record.push_field(
            ryu::Buffer::new()
                .format(psm.matched_intensity_pct)
                .as_bytes(),
        );
        record.push_field(
            itoa::Buffer::new()
                .format(psm.scored_candidates)
                .as_bytes(),
        );
        record
    }

    pub fn write_psms(&self, psms: &[(usize, Psm)]) -> anyhow::Result<String> {
        let path = self.make_path("results.pepdex.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "peptide",
            "proteins",
            "num_proteins",
            "filename",
            "scannr",
            "rank",
            "label",
            "expmass",
            "calcmass",
            "charge",
            "peptide_len",
            "missed_cleavages",
            "isotope_error",
            "precursor_ppm",
            "hyperscore",
            "delta_next",
            "matched_b",
            "matched_y",
            "matched_intensity_pct",
            "scored_candidates",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in psms
            .par_iter()
            .map(|(file_id, psm)| self.serialize_psm(*file_id, psm))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }
}
