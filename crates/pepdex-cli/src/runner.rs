use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use log::info;
use pepdex_core::database::FragmentIndex;
use pepdex_core::fasta::{Fasta, Protein};
use pepdex_core::scoring::{Psm, Scorer};
use pepdex_core::spectrum::{Spectrum, SpectrumProcessor};
use rayon::prelude::*;

use crate::input::Search;

pub struct Runner {
    pub database: FragmentIndex,
    pub proteins: Vec<Protein>,
    pub parameters: Search,
    start: Instant,
}

/// Outcome of searching a single spectrum
pub enum Searched {
    Psms(usize, Vec<Psm>),
    Failed,
}

/// Collects PSMs from all spectra, keeping track of the file they came from
#[derive(Default)]
pub struct SearchResults {
    pub psms: Vec<(usize, Psm)>,
    pub searched: usize,
    pub failed: usize,
}

impl SearchResults {
    pub fn fold_op(mut self, rhs: Searched) -> Self {
        match rhs {
            Searched::Psms(file_id, psms) => {
                self.searched += 1;
                self.psms.extend(psms.into_iter().map(|psm| (file_id, psm)));
            }
            Searched::Failed => self.failed += 1,
        }
        self
    }

    pub fn reduce(mut self, other: Self) -> Self {
        self.psms.extend(other.psms);
        self.searched += other.searched;
        self.failed += other.failed;
        self
    }
}

impl FromParallelIterator<Searched> for SearchResults {
    fn from_par_iter<I>(par_iter: I) -> Self
    where
        I: IntoParallelIterator<Item = Searched>,
    {
        par_iter
            .into_par_iter()
            .fold(SearchResults::default, SearchResults::fold_op)
            .reduce(SearchResults::default, SearchResults::reduce)
    }
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();
        let contents = std::fs::read_to_string(&parameters.fasta)
            .with_context(|| format!("Failed to read FASTA from `{}`", parameters.fasta))?;
        let proteins = Fasta::parse(&contents).proteins;

        let mut database = parameters
            .database
            .build(&proteins)
            .with_context(|| format!("Failed to build database from `{}`", parameters.fasta))?;

        if !parameters.special_peptides.is_empty() {
            let mut arena = database.into_arena();
            for sequence in &parameters.special_peptides {
                arena
                    .add_special_peptide(sequence)
                    .with_context(|| format!("Invalid special peptide `{sequence}`"))?;
            }
            database = arena.build(&parameters.database);
        }

        let stats = database.stats();
        info!(
            "generated {} fragments, {} peptides ({} decoys, {} special) from {} proteins in {}ms",
            stats.fragments,
            stats.peptides,
            stats.decoys,
            stats.special,
            stats.proteins,
            start.elapsed().as_millis()
        );

        Ok(Self {
            database,
            proteins,
            parameters,
            start,
        })
    }

    // Create a path for `file_name` in the specified output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        let mut path = self.parameters.output_directory.clone();
        path.push(file_name.as_ref());
        path
    }

    fn read_spectra(&self) -> anyhow::Result<Vec<(usize, Spectrum)>> {
        let start = Instant::now();
        let processor = SpectrumProcessor::new(
            self.parameters.max_peaks,
            self.database.parameters().fragment_min_mz,
            self.database.parameters().fragment_max_mz,
            self.parameters.deisotope,
        );

        let files = self
            .parameters
            .spectra
            .par_iter()
            .enumerate()
            .map(|(file_id, path)| {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read spectra from `{path}`"))?;
                let spectra: Vec<Spectrum> = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse spectra from `{path}`"))?;
                log::trace!("- {}: read {} spectra", path, spectra.len());
                Ok(spectra
                    .into_iter()
                    .map(|spectrum| (file_id, processor.process(spectrum)))
                    .collect::<Vec<_>>())
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let spectra = files.into_iter().flatten().collect::<Vec<_>>();
        info!(
            "- file IO: {:8} ms ({} spectra)",
            start.elapsed().as_millis(),
            spectra.len()
        );
        Ok(spectra)
    }

    fn search_processed_spectra(
        &self,
        scorer: &Scorer,
        spectra: &[(usize, Spectrum)],
    ) -> SearchResults {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let counter = AtomicUsize::new(0);
        let start = Instant::now();

        let results: SearchResults = spectra
            .par_iter()
            .filter(|(_, spectrum)| spectrum.peaks.len() >= self.parameters.min_peaks)
            .map(|x| {
                let prev = counter.fetch_add(1, Ordering::Relaxed);
                if prev > 0 && prev % 10_000 == 0 {
                    let duration = Instant::now().duration_since(start).as_millis() as usize;

                    let rate = prev * 1000 / (duration + 1);
                    log::trace!("- searched {} spectra ({} spectra/s)", prev, rate);
                }
                x
            })
            .map(|(file_id, spectrum)| match scorer.score(spectrum) {
                Ok(hits) => Searched::Psms(*file_id, scorer.rescore(spectrum, &hits)),
                Err(e) => {
                    log::warn!("skipping spectrum {}: {}", spectrum.id, e);
                    Searched::Failed
                }
            })
            .collect();

        let duration = Instant::now().duration_since(start).as_millis() as usize;
        let prev = counter.load(Ordering::Relaxed);
        let rate = prev * 1000 / (duration + 1);
        log::info!("- search:  {:8} ms ({} spectra/s)", duration, rate);
        if results.failed > 0 {
            log::warn!("{} spectra could not be searched", results.failed);
        }
        results
    }

    pub fn run(mut self) -> anyhow::Result<Search> {
        let scorer = Scorer::new(&self.database, self.parameters.scoring.clone())
            .context("Invalid search parameters")?;

        let spectra = self.read_spectra()?;
        let mut results = self.search_processed_spectra(&scorer, &spectra);
        drop(spectra);

        results.psms.par_sort_unstable_by(|(fa, a), (fb, b)| {
            fa.cmp(fb)
                .then_with(|| a.spec_id.cmp(&b.spec_id))
                .then_with(|| a.rank.cmp(&b.rank))
        });
        let targets = results
            .psms
            .iter()
            .filter(|(_, psm)| psm.rank == 1 && !self.database[psm.peptide].decoy)
            .count();
        info!(
            "searched {} spectra, {} target PSMs at rank 1",
            results.searched, targets
        );

        log::trace!("writing outputs");
        let path = self.write_psms(&results.psms)?;
        self.parameters.output_paths.push(path);

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        let run_time = (Instant::now() - self.start).as_secs();
        info!("finished in {}s", run_time);
        Ok(self.parameters)
    }
}
