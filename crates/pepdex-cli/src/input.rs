use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::ArgMatches;
use pepdex_core::{
    database::{Builder, Parameters},
    mass::Tolerance,
    scoring::ScoringParameters,
    tags::TagParameters,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
/// Actual search parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub database: Parameters,
    pub scoring: ScoringParameters,
    pub fasta: String,
    pub special_peptides: Vec<String>,
    pub deisotope: bool,
    pub min_peaks: usize,
    pub max_peaks: usize,
    pub spectra: Vec<String>,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize)]
/// Input search parameters deserialized from JSON file
pub struct Input {
    database: Option<Builder>,
    fasta: Option<String>,
    precursor_tol: Option<Tolerance>,
    fragment_tol: Option<Tolerance>,
    isotope_errors: Option<(i8, i8)>,
    open_search: Option<bool>,
    open_search_window: Option<(f32, f32)>,
    min_matched_peaks: Option<u16>,
    max_hits: Option<usize>,
    precursor_charge: Option<(u8, u8)>,
    max_fragment_charge: Option<u8>,
    report_psms: Option<usize>,
    tag_filter: Option<TagParameters>,
    special_peptides: Option<Vec<String>>,
    deisotope: Option<bool>,
    min_peaks: Option<usize>,
    max_peaks: Option<usize>,
    spectra: Option<Vec<String>>,
    output_directory: Option<String>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing path to the parameter file")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(fasta) = matches.get_one::<String>("fasta") {
            log::trace!("overriding `fasta` parameter.");
            input.fasta = Some(fasta.into());
        }
        if let Some(spectra) = matches.get_many::<String>("spectra") {
            log::trace!("overriding `spectra` parameter.");
            input.spectra = Some(spectra.into_iter().map(|p| p.into()).collect());
        }
        if matches.get_flag("open-search") {
            input.open_search = Some(true);
        }

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents).map_err(anyhow::Error::from)
    }

    fn check_tolerances(tolerance: &Tolerance) {
        let (lo, hi) = match tolerance {
            Tolerance::Ppm(lo, hi) | Tolerance::Da(lo, hi) => (lo, hi),
        };
        if hi.abs() > lo.abs() {
            log::warn!(
                "Tolerances are applied to experimental masses, not theoretical: [{} - {}]",
                lo,
                hi
            );
        }
    }

    pub fn build(self) -> anyhow::Result<Search> {
        // avoid to later fail if these parameters are not set (but doesn't check if files exist)
        let fasta = self
            .fasta
            .context("`fasta` must be set. For more information try '--help'")?;
        let spectra = self
            .spectra
            .context("`spectra` must be set. For more information try '--help'")?;
        ensure!(!spectra.is_empty(), "no spectrum files given");

        let database = self
            .database
            .unwrap_or_default()
            .make_parameters()
            .context("Invalid `database` parameters")?;

        let default = ScoringParameters::default();
        let (min_precursor_charge, max_precursor_charge) = self
            .precursor_charge
            .unwrap_or((default.min_precursor_charge, default.max_precursor_charge));
        let scoring = ScoringParameters {
            precursor_tol: self.precursor_tol.unwrap_or(default.precursor_tol),
            fragment_tol: self.fragment_tol.unwrap_or(default.fragment_tol),
            isotope_errors: self.isotope_errors.unwrap_or(default.isotope_errors),
            open_search: self.open_search.unwrap_or(default.open_search),
            open_search_window: self
                .open_search_window
                .unwrap_or(default.open_search_window),
            min_matched_peaks: self.min_matched_peaks.unwrap_or(default.min_matched_peaks),
            max_hits: self.max_hits.unwrap_or(default.max_hits),
            min_precursor_charge,
            max_precursor_charge,
            max_fragment_charge: self.max_fragment_charge,
            tag_filter: self.tag_filter,
            report_psms: self.report_psms.unwrap_or(default.report_psms),
        };
        Self::check_tolerances(&scoring.fragment_tol);
        Self::check_tolerances(&scoring.precursor_tol);
        scoring.validate().context("Invalid search parameters")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            database,
            scoring,
            fasta,
            special_peptides: self.special_peptides.unwrap_or_default(),
            deisotope: self.deisotope.unwrap_or(false),
            min_peaks: self.min_peaks.unwrap_or(15),
            max_peaks: self.max_peaks.unwrap_or(150),
            spectra,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}
