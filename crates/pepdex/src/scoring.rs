use std::cmp::Ordering;
use std::ops::{AddAssign, Range};

use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};

use crate::database::{fragment_window, Fragment, FragmentIndex, PeptideIx};
use crate::ion_series::IonSeries;
use crate::mass::{Tolerance, NEUTRON, PROTON};
use crate::spectrum::{select_most_intense_peak, Spectrum};
use crate::tags::{TagGenerator, TagParameters, TagSet};
use crate::Error;

/// Search settings for a [`Scorer`]. Every field is optional when
/// deserializing, missing fields take the documented defaults
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParameters {
    /// Default: 10 ppm
    pub precursor_tol: Tolerance,
    /// Default: 10 ppm
    pub fragment_tol: Tolerance,
    /// Neutron offsets tried for every precursor, inclusive. Default: (0, 0)
    pub isotope_errors: (i8, i8),
    /// Also accept candidates within `open_search_window` of the precursor
    pub open_search: bool,
    /// Da, relative to the precursor mass. Default: (-100, 200)
    pub open_search_window: (f32, f32),
    /// Default: 4
    pub min_matched_peaks: u16,
    /// Candidates kept per call to [`Scorer::simple_scoring`]. Default: 50
    pub max_hits: usize,
    /// Charge states tried when a precursor has no charge. Default: 2..=4
    pub min_precursor_charge: u8,
    pub max_precursor_charge: u8,
    /// Highest fragment charge considered. Default: one below the precursor charge
    pub max_fragment_charge: Option<u8>,
    /// Prune candidates that contain none of the sequence tags of a spectrum
    pub tag_filter: Option<TagParameters>,
    /// PSMs reported per spectrum by [`Scorer::rescore`]. Default: 1
    pub report_psms: usize,
}

impl Default for ScoringParameters {
    fn default() -> Self {
        Self {
            precursor_tol: Tolerance::ppm(10.0),
            fragment_tol: Tolerance::ppm(10.0),
            isotope_errors: (0, 0),
            open_search: false,
            open_search_window: (-100.0, 200.0),
            min_matched_peaks: 4,
            max_hits: 50,
            min_precursor_charge: 2,
            max_precursor_charge: 4,
            max_fragment_charge: None,
            tag_filter: None,
            report_psms: 1,
        }
    }
}

impl ScoringParameters {
    pub fn validate(&self) -> Result<(), Error> {
        self.precursor_tol.validate()?;
        self.fragment_tol.validate()?;
        let (lo, hi) = self.isotope_errors;
        if lo > hi {
            return Err(Error::InvalidIsotopeRange(lo, hi));
        }
        if self.min_precursor_charge == 0 || self.min_precursor_charge > self.max_precursor_charge
        {
            return Err(Error::InvalidChargeRange(
                self.min_precursor_charge,
                self.max_precursor_charge,
            ));
        }
        let (lo, hi) = self.open_search_window;
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(Error::InvalidRange {
                name: "open search window",
                lo,
                hi,
            });
        }
        if let Some(tags) = &self.tag_filter {
            tags.validate()?;
        }
        Ok(())
    }
}

/// Preliminary score: number of matched fragments for one candidate under
/// one precursor hypothesis
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Hit {
    pub peptide: PeptideIx,
    pub matched: u16,
    pub isotope_error: i8,
    pub precursor_charge: u8,
}

/// Best hits first: most matched fragments, then lowest peptide index,
/// charge and isotope error
fn ranking(a: &Hit, b: &Hit) -> Ordering {
    b.matched
        .cmp(&a.matched)
        .then_with(|| a.peptide.cmp(&b.peptide))
        .then_with(|| a.precursor_charge.cmp(&b.precursor_charge))
        .then_with(|| a.isotope_error.cmp(&b.isotope_error))
}

/// Store preliminary scores & stats for first pass search for a query spectrum
///
/// Hits from separate calls are appended, never merged or re-sorted. Use
/// [`Scorer::score`] to get a fresh accumulator for every spectrum.
#[derive(Clone, Default, Debug, PartialEq, Serialize)]
pub struct InitialHits {
    /// Matched (fragment, peak) pairs summed over every evaluated candidate
    pub matched_peaks: usize,
    /// Number of candidates that went through fragment matching
    pub scored_candidates: usize,
    pub hits: Vec<Hit>,
}

impl InitialHits {
    pub fn clear(&mut self) {
        self.matched_peaks = 0;
        self.scored_candidates = 0;
        self.hits.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn best(&self) -> Option<&Hit> {
        self.hits.first()
    }
}

impl AddAssign<InitialHits> for InitialHits {
    fn add_assign(&mut self, rhs: InitialHits) {
        self.matched_peaks += rhs.matched_peaks;
        self.scored_candidates += rhs.scored_candidates;
        self.hits.extend(rhs.hits);
    }
}

/// A rescored peptide-spectrum match
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Psm {
    pub spec_id: String,
    pub peptide: PeptideIx,
    /// 1 for the best match of a spectrum
    pub rank: u32,
    /// X!Tandem hyperscore
    pub hyperscore: f64,
    /// Difference between the hyperscore of this match and the next one
    pub delta_next: f64,
    pub matched_b: u16,
    pub matched_y: u16,
    /// Percentage of the spectrum's intensity explained by matched fragments
    pub matched_intensity_pct: f32,
    pub isotope_error: i8,
    pub charge: u8,
    /// Experimental neutral precursor mass
    pub expmass: f32,
    /// Calculated neutral peptide mass
    pub calcmass: f32,
    /// Precursor error in ppm, after isotope correction
    pub delta_mass: f32,
    pub scored_candidates: usize,
}

/// Stirling's approximation for log factorial, with the first correction term
fn lnfact(n: u16) -> f64 {
    if n == 0 {
        0.0
    } else {
        let n = n as f64;
        n * n.ln() - n + 0.5 * (std::f64::consts::PI * 2.0 * n).ln() + 1.0 / (12.0 * n)
    }
}

fn hyperscore(matched_b: u16, matched_y: u16, summed_b: f32, summed_y: f32) -> f64 {
    let i = (summed_b + 1.0) as f64 * (summed_y + 1.0) as f64;
    let score = i.ln() + lnfact(matched_b) + lnfact(matched_y);
    if score.is_finite() {
        score
    } else {
        255.0
    }
}

#[inline(always)]
/// Calculate upper bound (excluded) of the charge state range to use for
/// searching fragment ions (1..N)
/// If user has configured max_fragment_charge, potentially override precursor
/// charge
fn max_fragment_charge(max_fragment_charge: Option<u8>, precursor_charge: u8) -> u8 {
    precursor_charge
        .min(
            max_fragment_charge
                .map(|c| c.saturating_add(1))
                .unwrap_or(precursor_charge),
        )
        .max(2)
}

/// Count (fragment, peak) pairs within tolerance, for fragment charges
/// `1..max_charge`. Both slices must be sorted by mass; `peaks` holds
/// singly charged neutral masses
fn merge_scan(
    fragments: &[Fragment],
    peaks: &[f32],
    tolerance: Tolerance,
    max_charge: u8,
) -> usize {
    let mut matched = 0;
    for charge in 1..max_charge {
        let mut start = 0;
        for peak in peaks {
            let (lo, hi) = fragment_window(tolerance, *peak, charge);
            while start < fragments.len() && fragments[start].mass < lo {
                start += 1;
            }
            matched += fragments[start..]
                .iter()
                .take_while(|fragment| fragment.mass <= hi)
                .count();
        }
    }
    matched
}

/// How candidates are matched against the peaks of a spectrum
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Strategy {
    /// Walk every candidate's fragments alongside the peaks
    MergeScan,
    /// Look every peak up in the inverted fragment table
    Inverted,
}

/// A precursor hypothesis
#[derive(Copy, Clone, Debug)]
struct Precursor {
    charge: u8,
    isotope_error: i8,
    mass: f32,
}

/// Scores spectra against a [`FragmentIndex`]. The index is borrowed, so a
/// scorer can never outlive it or observe it half-built; any number of
/// scorers may share one index across threads.
pub struct Scorer<'db> {
    db: &'db FragmentIndex,
    parameters: ScoringParameters,
    tags: Option<TagGenerator>,
}

impl<'db> Scorer<'db> {
    pub fn new(db: &'db FragmentIndex, parameters: ScoringParameters) -> Result<Self, Error> {
        parameters.validate()?;
        if parameters.max_hits == 0 {
            log::warn!("`max_hits` is 0, no hits will be reported");
        }
        let tags = parameters
            .tag_filter
            .map(|tag_parameters| TagGenerator::new(db.residue_alphabet(), tag_parameters));
        Ok(Self {
            db,
            parameters,
            tags,
        })
    }

    pub fn parameters(&self) -> &ScoringParameters {
        &self.parameters
    }

    pub fn db(&self) -> &'db FragmentIndex {
        self.db
    }

    /// Score a spectrum into a fresh accumulator
    pub fn score(&self, spectrum: &Spectrum) -> Result<InitialHits, Error> {
        let mut hits = InitialHits::default();
        self.simple_scoring(spectrum, &mut hits)?;
        Ok(hits)
    }

    /// Score a spectrum, appending the best `max_hits` candidates and the
    /// matching statistics to `hits`. Existing content is left untouched.
    ///
    /// Peaks must be sorted by m/z, otherwise [`Error::UnsortedSpectrum`]
    /// is returned and `hits` is not modified
    pub fn simple_scoring(&self, spectrum: &Spectrum, hits: &mut InitialHits) -> Result<(), Error> {
        let strategy = match self.parameters.open_search {
            true => Strategy::Inverted,
            false => Strategy::MergeScan,
        };
        self.score_with(spectrum, hits, strategy)
    }

    fn score_with(
        &self,
        spectrum: &Spectrum,
        hits: &mut InitialHits,
        strategy: Strategy,
    ) -> Result<(), Error> {
        spectrum.check_sorted()?;
        let precursors = self.precursors(spectrum)?;

        // Fragments are indexed as neutral masses; [M] instead of [MH+]
        let peaks = spectrum
            .peaks
            .iter()
            .map(|peak| peak.mz - PROTON)
            .collect::<Vec<_>>();
        let tags = self.tags.as_ref().map(|generator| generator.generate(spectrum));

        let mut batch = InitialHits::default();
        for precursor in precursors {
            let range = self.candidate_range(precursor.mass);
            let max_charge =
                max_fragment_charge(self.parameters.max_fragment_charge, precursor.charge);
            let tags = tags.as_ref();
            match strategy {
                Strategy::MergeScan => self.merge_scan_candidates(
                    &peaks, precursor, range, max_charge, tags, &mut batch,
                ),
                Strategy::Inverted => self.inverted_candidates(
                    &peaks, precursor, range, max_charge, tags, &mut batch,
                ),
            }
        }

        self.trim_hits(&mut batch);
        log::debug!(
            "{}: {} candidates, {} matched peaks, {} hits",
            spectrum.id,
            batch.scored_candidates,
            batch.matched_peaks,
            batch.hits.len()
        );
        *hits += batch;
        Ok(())
    }

    /// Every (charge, isotope error) hypothesis for the precursor of `spectrum`
    fn precursors(&self, spectrum: &Spectrum) -> Result<Vec<Precursor>, Error> {
        let (iso_lo, iso_hi) = spectrum
            .precursor
            .isotope_errors
            .unwrap_or(self.parameters.isotope_errors);
        if iso_lo > iso_hi {
            return Err(Error::InvalidIsotopeRange(iso_lo, iso_hi));
        }
        let charges = match spectrum.precursor.charge {
            Some(charge) => charge..=charge,
            None => self.parameters.min_precursor_charge..=self.parameters.max_precursor_charge,
        };

        let mz = spectrum.precursor.mz - PROTON;
        let mut precursors = Vec::new();
        for charge in charges.filter(|charge| *charge > 0) {
            for isotope_error in iso_lo..=iso_hi {
                precursors.push(Precursor {
                    charge,
                    isotope_error,
                    mass: mz * charge as f32 - isotope_error as f32 * NEUTRON,
                });
            }
        }
        Ok(precursors)
    }

    /// Positions in the mass-sorted order of every candidate for a precursor
    /// mass. The open search window always contains the narrow window
    fn candidate_range(&self, mass: f32) -> Range<usize> {
        let (lo, hi) = self.parameters.precursor_tol.bounds(mass);
        if self.parameters.open_search {
            let (open_lo, open_hi) = self.parameters.open_search_window;
            self.db
                .peptides_in_window(lo.min(mass + open_lo), hi.max(mass + open_hi))
        } else {
            self.db.peptides_in_window(lo, hi)
        }
    }

    fn keep(
        &self,
        hits: &mut InitialHits,
        peptide: PeptideIx,
        matched: usize,
        precursor: Precursor,
    ) {
        hits.scored_candidates += 1;
        hits.matched_peaks += matched;
        let matched = matched.min(u16::MAX as usize) as u16;
        if matched > 0 && matched >= self.parameters.min_matched_peaks {
            hits.hits.push(Hit {
                peptide,
                matched,
                isotope_error: precursor.isotope_error,
                precursor_charge: precursor.charge,
            });
        }
    }

    fn merge_scan_candidates(
        &self,
        peaks: &[f32],
        precursor: Precursor,
        range: Range<usize>,
        max_charge: u8,
        tags: Option<&TagSet>,
        hits: &mut InitialHits,
    ) {
        for (ix, peptide) in self.db.candidates(range) {
            if matches!(tags, Some(tags) if !tags.matches(peptide)) {
                continue;
            }
            let matched = merge_scan(
                self.db.fragments(ix),
                peaks,
                self.parameters.fragment_tol,
                max_charge,
            );
            self.keep(hits, ix, matched, precursor);
        }
    }

    fn inverted_candidates(
        &self,
        peaks: &[f32],
        precursor: Precursor,
        range: Range<usize>,
        max_charge: u8,
        tags: Option<&TagSet>,
        hits: &mut InitialHits,
    ) {
        if range.is_empty() {
            return;
        }
        let query = self.db.query_ranks(range.clone(), self.parameters.fragment_tol);
        let mut matched = vec![0usize; range.len()];
        for peak in peaks {
            for charge in 1..max_charge {
                for theoretical in query.page_search(*peak, charge) {
                    matched[theoretical.rank as usize - range.start] += 1;
                }
            }
        }

        for ((ix, peptide), matched) in self.db.candidates(range).zip(matched) {
            if matches!(tags, Some(tags) if !tags.matches(peptide)) {
                continue;
            }
            self.keep(hits, ix, matched, precursor);
        }
    }

    /// Keep the best `max_hits`, in ranked order
    fn trim_hits(&self, hits: &mut InitialHits) {
        let k = self.parameters.max_hits;
        if k == 0 {
            hits.hits.clear();
            return;
        }
        if hits.hits.len() > k {
            hits.hits.select_nth_unstable_by(k - 1, ranking);
            hits.hits.truncate(k);
        }
        hits.hits.sort_unstable_by(ranking);
    }

    /// Calculate the full hyperscore of every hit, regenerating all ions of
    /// the configured kinds, and report the best `report_psms` peptides
    pub fn rescore(&self, spectrum: &Spectrum, hits: &InitialHits) -> Vec<Psm> {
        let total_intensity = spectrum.total_intensity();
        let mz = spectrum.precursor.mz - PROTON;

        let mut psms = hits
            .hits
            .iter()
            .filter_map(|hit| {
                let peptide = &self.db[hit.peptide];
                let max_charge =
                    max_fragment_charge(self.parameters.max_fragment_charge, hit.precursor_charge);

                let (mut matched_b, mut matched_y) = (0u16, 0u16);
                let (mut summed_b, mut summed_y) = (0.0f32, 0.0f32);
                let ions = self
                    .db
                    .parameters()
                    .ion_kinds
                    .iter()
                    .flat_map(|kind| IonSeries::new(peptide, *kind));
                for ion in ions {
                    for charge in 1..max_charge {
                        // Experimental peaks are multiplied by charge, therefore theoretical are divided
                        let ion_mz = ion.monoisotopic_mass / charge as f32 + PROTON;
                        if let Some(peak) = select_most_intense_peak(
                            &spectrum.peaks,
                            ion_mz,
                            self.parameters.fragment_tol,
                        ) {
                            match ion.kind.is_nterm() {
                                true => {
                                    matched_b += 1;
                                    summed_b += peak.intensity;
                                }
                                false => {
                                    matched_y += 1;
                                    summed_y += peak.intensity;
                                }
                            }
                        }
                    }
                }
                if matched_b + matched_y < self.parameters.min_matched_peaks {
                    return None;
                }

                let expmass = mz * hit.precursor_charge as f32;
                let corrected = expmass - hit.isotope_error as f32 * NEUTRON;
                Some(Psm {
                    spec_id: spectrum.id.clone(),
                    peptide: hit.peptide,
                    rank: 0,
                    hyperscore: hyperscore(matched_b, matched_y, summed_b, summed_y),
                    delta_next: 0.0,
                    matched_b,
                    matched_y,
                    matched_intensity_pct: match total_intensity > 0.0 {
                        true => 100.0 * (summed_b + summed_y) / total_intensity,
                        false => 0.0,
                    },
                    isotope_error: hit.isotope_error,
                    charge: hit.precursor_charge,
                    expmass,
                    calcmass: peptide.monoisotopic,
                    delta_mass: (corrected - peptide.monoisotopic) * 1E6 / peptide.monoisotopic,
                    scored_candidates: hits.scored_candidates,
                })
            })
            .collect::<Vec<_>>();

        // Hyperscore is our primary score function for PSMs
        psms.sort_by(|a, b| {
            b.hyperscore
                .total_cmp(&a.hyperscore)
                .then_with(|| a.peptide.cmp(&b.peptide))
        });

        // A peptide can be hit under several precursor hypotheses; report its best
        let mut seen = FnvHashSet::default();
        psms.retain(|psm| seen.insert(psm.peptide));
        psms.truncate(self.parameters.report_psms);

        for idx in 0..psms.len() {
            let next = psms
                .get(idx + 1)
                .map(|psm| psm.hyperscore)
                .unwrap_or_default();
            psms[idx].rank = idx as u32 + 1;
            psms[idx].delta_next = psms[idx].hyperscore - next;
        }
        psms
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::database::{Builder, EnzymeBuilder};
    use crate::fasta::Fasta;
    use crate::peptide::Peptide;
    use crate::spectrum::{Peak, Precursor as SpectrumPrecursor};
    use crate::theoretical::TheoreticalSpectrumGenerator;

    const FASTA: &str = r#"
        >sp|P1|ONE
        MEWKLEQSMREQALLKAQLTQLKDPEPTIDEKLESLIEKVAGLR
        >sp|P2|TWO
        MSSGHKTSPEAAVRGGNDLLKFSEEGK
        "#;

    fn index() -> FragmentIndex {
        let fasta = Fasta::parse(FASTA);
        Builder {
            bucket_size: Some(8),
            enzyme: Some(EnzymeBuilder {
                missed_cleavages: Some(1),
                min_len: Some(5),
                max_len: Some(20),
                ..Default::default()
            }),
            fragment_min_mz: Some(100.0),
            fragment_max_mz: Some(1500.0),
            peptide_min_mass: Some(300.0),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
        .build(&fasta.proteins)
        .unwrap()
    }

    fn spectrum(sequence: &str, charge: u8) -> Spectrum {
        let peptide = sequence.parse::<Peptide>().unwrap();
        TheoreticalSpectrumGenerator::default().generate(&peptide, charge)
    }

    fn ix(index: &FragmentIndex, sequence: &str) -> PeptideIx {
        let position = index
            .peptides()
            .iter()
            .position(|p| p.to_string() == sequence)
            .unwrap();
        PeptideIx(position as u32)
    }

    #[test]
    fn test_max_fragment_charge() {
        assert_eq!(max_fragment_charge(None, 1), 2);
        assert_eq!(max_fragment_charge(None, 2), 2);
        assert_eq!(max_fragment_charge(None, 3), 3);
        assert_eq!(max_fragment_charge(None, 4), 4);
        assert_eq!(max_fragment_charge(Some(1), 2), 2);
        assert_eq!(max_fragment_charge(Some(1), 3), 2);
        assert_eq!(max_fragment_charge(Some(2), 4), 3);
        assert_eq!(max_fragment_charge(Some(4), 1), 2);
        assert_eq!(max_fragment_charge(Some(255), 8), 8);
    }

    #[test]
    fn log_factorial() {
        assert_eq!(lnfact(0), 0.0);
        assert!((lnfact(5) - 120f64.ln()).abs() < 0.01);
        assert!((lnfact(10) - 3628800f64.ln()).abs() < 0.01);
        let mut exact = 0.0f64;
        for n in 1..=50u16 {
            exact += (n as f64).ln();
            assert!((lnfact(n) - exact).abs() < 0.01, "{}", n);
        }
        assert!(hyperscore(4, 4, 10.0, 10.0) > hyperscore(3, 4, 10.0, 10.0));
    }

    #[test]
    fn hyperscore_value() {
        // ln(11 * 21) + ln(2!) + ln(3!)
        let expected = (11.0f64 * 21.0).ln() + 2f64.ln() + 6f64.ln();
        assert!((hyperscore(2, 3, 10.0, 20.0) - expected).abs() < 0.01);
        assert!((hyperscore(0, 0, 0.0, 0.0)).abs() < 1e-9);
    }

    #[test]
    fn hit_ranking() {
        let hit = |peptide, matched, precursor_charge, isotope_error| Hit {
            peptide: PeptideIx(peptide),
            matched,
            isotope_error,
            precursor_charge,
        };
        let mut hits = vec![
            hit(3, 5, 2, 0),
            hit(1, 5, 3, 0),
            hit(1, 5, 2, 1),
            hit(9, 7, 2, 0),
            hit(1, 5, 2, 0),
        ];
        hits.sort_by(ranking);
        assert_eq!(
            hits,
            vec![
                hit(9, 7, 2, 0),
                hit(1, 5, 2, 0),
                hit(1, 5, 2, 1),
                hit(1, 5, 3, 0),
                hit(3, 5, 2, 0),
            ]
        );
    }

    #[test]
    fn accumulate_and_clear() {
        let mut hits = InitialHits {
            matched_peaks: 3,
            scored_candidates: 1,
            hits: vec![Hit::default()],
        };
        hits += InitialHits {
            matched_peaks: 4,
            scored_candidates: 2,
            hits: vec![Hit::default(); 2],
        };
        assert_eq!(hits.matched_peaks, 7);
        assert_eq!(hits.scored_candidates, 3);
        assert_eq!(hits.hits.len(), 3);
        hits.clear();
        assert_eq!(hits, InitialHits::default());
    }

    #[test]
    fn merge_scan_counts_pairs() {
        let fragments = [100.0, 200.0, 200.01, 300.0]
            .into_iter()
            .map(|mass| Fragment {
                mass,
                kind: crate::ion_series::Kind::B,
                ordinal: 1,
            })
            .collect::<Vec<_>>();
        let tol = Tolerance::da(0.02);
        // Singly charged: 200.0 and 200.01 both match the second peak
        assert_eq!(merge_scan(&fragments, &[100.0, 200.005, 250.0], tol, 2), 3);
        // Doubly charged: 150.0 * 2 matches 300.0, 100.0 * 2 matches 200.0 and 200.01
        assert_eq!(merge_scan(&fragments, &[100.0, 150.0], tol, 3), 1 + 2 + 1);
        assert_eq!(merge_scan(&fragments, &[], tol, 3), 0);
        assert_eq!(merge_scan(&[], &[100.0], tol, 3), 0);
    }

    #[test]
    fn strategies_agree() {
        let index = index();
        for open_search in [false, true] {
            let scorer = Scorer::new(
                &index,
                ScoringParameters {
                    open_search,
                    min_matched_peaks: 1,
                    max_hits: 10_000,
                    isotope_errors: (-1, 1),
                    ..Default::default()
                },
            )
            .unwrap();
            for sequence in ["EQALLK", "DPEPTIDEK", "LESLIEK", "FSEEGK"] {
                let spectrum = spectrum(sequence, 2);
                let mut merged = InitialHits::default();
                let mut inverted = InitialHits::default();
                scorer
                    .score_with(&spectrum, &mut merged, Strategy::MergeScan)
                    .unwrap();
                scorer
                    .score_with(&spectrum, &mut inverted, Strategy::Inverted)
                    .unwrap();
                assert_eq!(merged, inverted, "{sequence}, open search: {open_search}");
            }
        }
    }

    #[test]
    fn finds_theoretical_peptide() {
        let index = index();
        let scorer = Scorer::new(&index, ScoringParameters::default()).unwrap();
        let spectrum = spectrum("LESLIEK", 2);
        let hits = scorer.score(&spectrum).unwrap();
        let best = hits.best().unwrap();
        assert_eq!(best.peptide, ix(&index, "LESLIEK"));
        assert_eq!(best.precursor_charge, 2);
        assert_eq!(best.isotope_error, 0);
        // Index fragments skip ordinals <= 2
        assert_eq!(best.matched, 8);
        assert!(hits.matched_peaks >= 8);

        let psms = scorer.rescore(&spectrum, &hits);
        assert_eq!(psms.len(), 1);
        assert_eq!(psms[0].peptide, best.peptide);
        assert_eq!(psms[0].rank, 1);
        assert_eq!(psms[0].matched_b + psms[0].matched_y, 12);
        assert!((psms[0].matched_intensity_pct - 100.0).abs() < 1e-3);
        assert!(psms[0].delta_mass.abs() < 1.0);
    }

    #[test]
    fn unknown_charge_tries_every_charge() {
        let index = index();
        let scorer = Scorer::new(&index, ScoringParameters::default()).unwrap();
        let mut spectrum = spectrum("LESLIEK", 3);
        spectrum.precursor.charge = None;
        let hits = scorer.score(&spectrum).unwrap();
        assert_eq!(hits.best().map(|hit| hit.precursor_charge), Some(3));
    }

    #[test]
    fn rescore_reports_distinct_peptides() {
        let index = index();
        let scorer = Scorer::new(
            &index,
            ScoringParameters {
                report_psms: 5,
                min_matched_peaks: 1,
                isotope_errors: (0, 1),
                open_search: true,
                ..Default::default()
            },
        )
        .unwrap();
        let spectrum = spectrum("DPEPTIDEK", 2);
        let hits = scorer.score(&spectrum).unwrap();
        let psms = scorer.rescore(&spectrum, &hits);
        assert!(!psms.is_empty());
        assert_eq!(psms[0].peptide, ix(&index, "DPEPTIDEK"));
        let distinct = psms.iter().map(|psm| psm.peptide).collect::<FnvHashSet<_>>();
        assert_eq!(distinct.len(), psms.len());
        assert!(psms.windows(2).all(|w| w[0].hyperscore >= w[1].hyperscore));
        assert!(psms
            .iter()
            .enumerate()
            .all(|(idx, psm)| psm.rank == idx as u32 + 1));
    }

    #[test]
    fn tag_filter_keeps_true_peptide() {
        let index = index();
        let scorer = Scorer::new(
            &index,
            ScoringParameters {
                open_search: true,
                open_search_window: (-500.0, 500.0),
                min_matched_peaks: 1,
                max_hits: 10_000,
                tag_filter: Some(TagParameters::default()),
                ..Default::default()
            },
        )
        .unwrap();
        let unfiltered = Scorer::new(
            &index,
            ScoringParameters {
                tag_filter: None,
                ..scorer.parameters().clone()
            },
        )
        .unwrap();

        let spectrum = spectrum("LESLIEK", 2);
        let filtered = scorer.score(&spectrum).unwrap();
        let all = unfiltered.score(&spectrum).unwrap();
        assert!(filtered.scored_candidates < all.scored_candidates);
        assert_eq!(filtered.best().map(|hit| hit.peptide), Some(ix(&index, "LESLIEK")));
    }

    #[test]
    fn unsorted_spectrum_is_rejected() {
        let index = index();
        let scorer = Scorer::new(&index, ScoringParameters::default()).unwrap();
        let mut spectrum = spectrum("LESLIEK", 2);
        spectrum.peaks.swap(0, 1);
        let mut hits = InitialHits {
            matched_peaks: 1,
            ..Default::default()
        };
        assert!(matches!(
            scorer.simple_scoring(&spectrum, &mut hits),
            Err(Error::UnsortedSpectrum { position: 1, .. })
        ));
        assert_eq!(hits.matched_peaks, 1);
    }

    #[test]
    fn empty_results_are_ok() {
        let index = index();
        let scorer = Scorer::new(&index, ScoringParameters::default()).unwrap();
        let spectrum = Spectrum {
            id: "nothing".into(),
            precursor: SpectrumPrecursor {
                mz: 5000.0,
                charge: Some(2),
                isotope_errors: None,
            },
            peaks: vec![Peak {
                mz: 500.0,
                intensity: 1.0,
            }],
        };
        let hits = scorer.score(&spectrum).unwrap();
        assert_eq!(hits, InitialHits::default());
        assert!(scorer.rescore(&spectrum, &hits).is_empty());
    }

    #[test]
    fn invalid_parameters() {
        let index = index();
        let invalid = [
            ScoringParameters {
                precursor_tol: Tolerance::Ppm(10.0, -10.0),
                ..Default::default()
            },
            ScoringParameters {
                fragment_tol: Tolerance::Da(0.0, 0.0),
                ..Default::default()
            },
            ScoringParameters {
                isotope_errors: (2, -1),
                ..Default::default()
            },
            ScoringParameters {
                min_precursor_charge: 4,
                max_precursor_charge: 2,
                ..Default::default()
            },
            ScoringParameters {
                open_search_window: (100.0, -100.0),
                ..Default::default()
            },
        ];
        for parameters in invalid {
            assert!(Scorer::new(&index, parameters).is_err());
        }

        let scorer = Scorer::new(&index, ScoringParameters::default()).unwrap();
        let mut spectrum = spectrum("LESLIEK", 2);
        spectrum.precursor.isotope_errors = Some((1, 0));
        assert_eq!(
            scorer.score(&spectrum),
            Err(Error::InvalidIsotopeRange(1, 0))
        );
    }

    #[test]
    fn deserialize_parameters() {
        let parameters: ScoringParameters = serde_json::from_str(
            r#"{
                "precursor_tol": { "da": [-0.5, 0.5] },
                "isotope_errors": [-1, 3],
                "open_search": true,
                "tag_filter": { "length": 4 }
            }"#,
        )
        .unwrap();
        assert_eq!(parameters.precursor_tol, Tolerance::Da(-0.5, 0.5));
        assert_eq!(parameters.fragment_tol, Tolerance::ppm(10.0));
        assert_eq!(parameters.isotope_errors, (-1, 3));
        assert!(parameters.open_search);
        assert_eq!(parameters.min_matched_peaks, 4);
        assert_eq!(parameters.tag_filter.map(|t| t.length), Some(4));
        assert!(parameters.validate().is_ok());
    }
}
