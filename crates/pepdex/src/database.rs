use crate::enzyme::{Enzyme, EnzymeParameters};
use crate::fasta::{Protein, ProteinIx};
use crate::ion_series::{IonSeries, Kind};
use crate::mass::{Mass, Tolerance, PROTON};
use crate::modification::{
    parse_named, validate_mods, validate_var_mods, ModificationSpecificity, ValueOrVec,
};
use crate::peptide::Peptide;
use crate::Error;
use dashmap::DashSet;
use fnv::FnvBuildHasher;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EnzymeBuilder {
    /// Name of a known protease, e.g. `Trypsin` or `Lys-C`. Takes precedence
    /// over an explicit cleavage rule
    pub name: Option<String>,
    /// How many missed cleavages to use
    pub missed_cleavages: Option<u8>,
    /// Minimum peptide length that will be fragmented
    pub min_len: Option<usize>,
    /// Maximum peptide length that will be fragmented
    pub max_len: Option<usize>,
    pub cleave_at: Option<String>,
    pub restrict: Option<char>,
    pub c_terminal: Option<bool>,
}

impl Default for EnzymeBuilder {
    fn default() -> Self {
        Self {
            name: Some("Trypsin".into()),
            missed_cleavages: Some(1),
            min_len: Some(7),
            max_len: Some(40),
            cleave_at: None,
            restrict: None,
            c_terminal: None,
        }
    }
}

impl TryFrom<EnzymeBuilder> for EnzymeParameters {
    type Error = Error;

    fn try_from(en: EnzymeBuilder) -> Result<EnzymeParameters, Error> {
        let enzyme = match (&en.name, &en.cleave_at) {
            (Some(name), cleave_at) => {
                if cleave_at.is_some() {
                    log::warn!("enzyme `{}` overrides the explicit cleavage rule", name);
                }
                Enzyme::from_name(name)?
            }
            (None, cleave_at) => Enzyme::new(
                cleave_at.as_deref().unwrap_or("KR"),
                en.restrict,
                en.c_terminal.unwrap_or(true),
            )?,
        };

        let min_len = en.min_len.unwrap_or(7);
        let max_len = en.max_len.unwrap_or(40);
        if min_len > max_len {
            return Err(Error::InvalidRange {
                name: "peptide length",
                lo: min_len as f32,
                hi: max_len as f32,
            });
        }

        Ok(EnzymeParameters {
            missed_cleavages: en.missed_cleavages.unwrap_or(1),
            min_len,
            max_len,
            enzyme,
        })
    }
}

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
/// Parameters used for generating the fragment index
pub struct Builder {
    /// This parameter allows tuning of the internal search structure
    pub bucket_size: Option<usize>,

    pub enzyme: Option<EnzymeBuilder>,
    /// Minimum fragment m/z that will be stored in the index
    pub fragment_min_mz: Option<f32>,
    /// Maximum fragment m/z that will be stored in the index
    pub fragment_max_mz: Option<f32>,
    /// Minimum peptide monoisotopic mass that will be fragmented
    pub peptide_min_mass: Option<f32>,
    /// Maximum peptide monoisotopic mass that will be fragmented
    pub peptide_max_mass: Option<f32>,
    /// Which kind of fragment ions to generate (a, b, c, x, y, z)
    pub ion_kinds: Option<Vec<Kind>>,
    /// Minimum ion index to be generated: 1 will remove b1/y1 ions
    /// 2 will remove b1/b2/y1/y2 ions, etc
    pub min_ion_index: Option<usize>,
    /// Static modifications to add to matching amino acids
    pub static_mods: Option<HashMap<String, f32>>,
    /// Variable modifications to add to matching amino acids
    pub variable_mods: Option<HashMap<String, ValueOrVec>>,
    /// Named fixed modifications, e.g. `Carbamidomethyl (C)`
    pub modifications_fixed: Option<Vec<String>>,
    /// Named variable modifications, e.g. `Oxidation (M)`
    pub modifications_variable: Option<Vec<String>>,
    /// Limit number of variable modifications on a peptide
    pub max_variable_mods: Option<usize>,
    /// Limit number of modified forms generated from a single peptide
    pub max_peptidoforms: Option<usize>,
    /// Refuse to build an index with more peptides than this
    pub max_peptides: Option<usize>,
    /// Use this prefix for decoy proteins
    pub decoy_tag: Option<String>,

    pub generate_decoys: Option<bool>,
}

fn check_range(name: &'static str, lo: f32, hi: f32) -> Result<(), Error> {
    if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Err(Error::InvalidRange { name, lo, hi });
    }
    Ok(())
}

impl Builder {
    pub fn make_parameters(self) -> Result<Parameters, Error> {
        let bucket_size = self.bucket_size.unwrap_or(8192).max(1).next_power_of_two();
        let enzyme = self.enzyme.unwrap_or_default();
        let enzyme_parameters = EnzymeParameters::try_from(enzyme.clone())?;

        let fragment_min_mz = self.fragment_min_mz.unwrap_or(150.0);
        let fragment_max_mz = self.fragment_max_mz.unwrap_or(2000.0);
        check_range("fragment m/z", fragment_min_mz, fragment_max_mz)?;
        let peptide_min_mass = self.peptide_min_mass.unwrap_or(500.0);
        let peptide_max_mass = self.peptide_max_mass.unwrap_or(5000.0);
        check_range("peptide mass", peptide_min_mass, peptide_max_mass)?;

        let mut static_mods = validate_mods(self.static_mods)?;
        for name in self.modifications_fixed.unwrap_or_default() {
            let (spec, mass) = parse_named(&name)?;
            if static_mods.insert(spec, mass).is_some() {
                log::warn!("static modification {} specified more than once", spec);
            }
        }

        let mut variable_mods = validate_var_mods(self.variable_mods)?
            .into_iter()
            .flat_map(|(spec, masses)| masses.into_iter().map(move |m| (spec, m)))
            .collect::<Vec<_>>();
        for name in self.modifications_variable.unwrap_or_default() {
            variable_mods.push(parse_named(&name)?);
        }
        variable_mods.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));
        variable_mods.dedup();

        let ion_kinds = self.ion_kinds.unwrap_or_else(|| vec![Kind::B, Kind::Y]);
        if ion_kinds.is_empty() {
            log::warn!("no fragment ion kinds configured, peptides will have no fragments");
        }

        Ok(Parameters {
            bucket_size,
            enzyme,
            enzyme_parameters,
            fragment_min_mz,
            fragment_max_mz,
            peptide_min_mass,
            peptide_max_mass,
            ion_kinds,
            min_ion_index: self.min_ion_index.unwrap_or(2),
            static_mods,
            variable_mods,
            max_variable_mods: self.max_variable_mods.unwrap_or(2),
            max_peptidoforms: self.max_peptidoforms.unwrap_or(1024).max(1),
            max_peptides: self.max_peptides.unwrap_or(50_000_000),
            decoy_tag: self.decoy_tag.unwrap_or_else(|| "rev_".into()),
            generate_decoys: self.generate_decoys.unwrap_or(false),
        })
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct Parameters {
    pub bucket_size: usize,
    pub enzyme: EnzymeBuilder,
    #[serde(skip)]
    enzyme_parameters: EnzymeParameters,
    pub fragment_min_mz: f32,
    pub fragment_max_mz: f32,
    pub peptide_min_mass: f32,
    pub peptide_max_mass: f32,
    pub ion_kinds: Vec<Kind>,
    pub min_ion_index: usize,
    pub static_mods: HashMap<ModificationSpecificity, f32>,
    pub variable_mods: Vec<(ModificationSpecificity, f32)>,
    pub max_variable_mods: usize,
    pub max_peptidoforms: usize,
    pub max_peptides: usize,
    pub decoy_tag: String,
    pub generate_decoys: bool,
}

/// Deterministic tie-break for peptides of identical mass
fn initial_sort(a: &Peptide, b: &Peptide) -> Ordering {
    a.sequence
        .cmp(&b.sequence)
        .then_with(|| {
            a.modifications
                .iter()
                .zip(&b.modifications)
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.nterm.unwrap_or_default().total_cmp(&b.nterm.unwrap_or_default()))
        .then_with(|| a.cterm.unwrap_or_default().total_cmp(&b.cterm.unwrap_or_default()))
        .then_with(|| a.decoy.cmp(&b.decoy))
}

impl Parameters {
    /// Digest and modify every protein, producing the peptide arena that
    /// [`PeptideArena::build`] turns into a searchable index
    pub fn digest(&self, proteins: &[Protein]) -> Result<PeptideArena, Error> {
        log::trace!("digesting {} proteins", proteins.len());
        // Generate all peptide sequences, including missed cleavages, if applicable.
        let digests = proteins
            .par_iter()
            .enumerate()
            .flat_map_iter(|(ix, protein)| {
                let decoy = protein.identifier.contains(&self.decoy_tag);
                // Decoys in the database are replaced by the ones we generate
                let digests = match decoy && self.generate_decoys {
                    true => Vec::new(),
                    false => self
                        .enzyme_parameters
                        .digest(&protein.sequence, ProteinIx(ix as u32)),
                };
                digests.into_iter().map(move |mut digest| {
                    digest.decoy = decoy;
                    digest
                })
            })
            .collect::<Vec<_>>();

        let targets: DashSet<_, FnvBuildHasher> = DashSet::default();
        digests
            .par_iter()
            .filter(|digest| !digest.decoy)
            .for_each(|digest| {
                targets.insert(digest.sequence.clone());
            });

        log::trace!("modifying peptides");
        let truncated = AtomicUsize::new(0);
        let mut peptides = digests
            .into_par_iter()
            .flat_map_iter(|digest| {
                let decoy = match self.generate_decoys {
                    true => Some(digest.reverse()),
                    false => None,
                };
                std::iter::once(digest).chain(decoy)
            })
            .filter(|digest| !digest.decoy || !targets.contains(&digest.sequence))
            .filter_map(|digest| match Peptide::try_from(&digest) {
                Ok(peptide) => Some(peptide),
                Err(e) => {
                    log::debug!("skipping peptide {}: {}", digest.sequence, e);
                    None
                }
            })
            .flat_map_iter(|peptide| {
                let (forms, capped) = peptide.apply(
                    &self.variable_mods,
                    &self.static_mods,
                    self.max_variable_mods,
                    self.max_peptidoforms,
                );
                if capped {
                    truncated.fetch_add(1, AtomicOrdering::Relaxed);
                }
                forms.into_iter().filter(|peptide| {
                    peptide.monoisotopic >= self.peptide_min_mass
                        && peptide.monoisotopic <= self.peptide_max_mass
                })
            })
            .collect::<Vec<_>>();

        let truncated = truncated.into_inner();
        if truncated > 0 {
            log::warn!(
                "{} peptides produced more than {} modified forms, extra forms were dropped",
                truncated,
                self.max_peptidoforms
            );
        }

        log::trace!("sorting and deduplicating peptides");
        peptides.par_sort_unstable_by(|a, b| {
            a.monoisotopic
                .total_cmp(&b.monoisotopic)
                .then_with(|| initial_sort(a, b))
        });
        peptides.dedup_by(|remove, keep| {
            if remove.sequence == keep.sequence
                && remove.modifications == keep.modifications
                && remove.nterm == keep.nterm
                && remove.cterm == keep.cterm
                && remove.decoy == keep.decoy
            {
                keep.proteins.extend(remove.proteins.iter().copied());
                true
            } else {
                false
            }
        });
        peptides.par_iter_mut().for_each(|peptide| {
            peptide.proteins.sort_unstable();
            peptide.proteins.dedup();
        });

        if peptides.len() > self.max_peptides {
            return Err(Error::TooManyPeptides {
                limit: self.max_peptides,
            });
        }

        Ok(PeptideArena {
            peptides,
            protein_count: proteins.len(),
            truncated,
        })
    }

    /// Digest `proteins` and build a searchable index in one step
    pub fn build(&self, proteins: &[Protein]) -> Result<FragmentIndex, Error> {
        Ok(self.digest(proteins)?.build(self))
    }

    /// Sorted theoretical fragments of `peptide` that will be stored in the index
    pub fn fragments(&self, peptide: &Peptide) -> Vec<Fragment> {
        let mut fragments = self
            .ion_kinds
            .iter()
            .flat_map(|kind| IonSeries::new(peptide, *kind))
            .filter(|ion| {
                // Don't store b1, b2, y1, y2 ions for preliminary scoring
                let mz = ion.monoisotopic_mass + PROTON;
                ion.ordinal as usize > self.min_ion_index
                    && mz >= self.fragment_min_mz
                    && mz <= self.fragment_max_mz
            })
            .map(|ion| Fragment {
                mass: ion.monoisotopic_mass,
                kind: ion.kind,
                ordinal: ion.ordinal,
            })
            .collect::<Vec<_>>();
        fragments.sort_unstable_by(|a, b| a.mass.total_cmp(&b.mass).then_with(|| a.kind.cmp(&b.kind)));
        fragments
    }
}

#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PeptideIx(pub u32);

/// A theoretical fragment belonging to a single peptide
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Fragment {
    /// Neutral fragment mass
    pub mass: f32,
    pub kind: Kind,
    pub ordinal: u16,
}

/// Entry of the inverted fragment table
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Theoretical {
    /// Position of the owning peptide in the mass-sorted order
    pub rank: u32,
    pub fragment_mass: f32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub proteins: usize,
    pub peptides: usize,
    pub decoys: usize,
    pub special: usize,
    pub fragments: usize,
    /// Peptides whose modified forms were capped by `max_peptidoforms`
    pub truncated: usize,
}

/// Append-only peptide storage. An arena can be extended with special
/// peptides, but it cannot be searched until it is built into a
/// [`FragmentIndex`]
#[derive(Clone, Debug, Default)]
pub struct PeptideArena {
    peptides: Vec<Peptide>,
    protein_count: usize,
    truncated: usize,
}

impl PeptideArena {
    pub fn peptides(&self) -> &[Peptide] {
        &self.peptides
    }

    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    /// Inject a peptide written in modified-sequence notation, e.g.
    /// `[+42.0106]-PEPTIDE-[+17.03]`. It is attributed to the synthetic
    /// protein `ProteinIx(protein_count)`, one past the last real protein.
    /// Indices of existing peptides do not change.
    pub fn add_special_peptide(&mut self, sequence: &str) -> Result<PeptideIx, Error> {
        let mut peptide = sequence.parse::<Peptide>()?;
        peptide.special = true;
        peptide.proteins = vec![ProteinIx(self.protein_count as u32)];

        let ix = PeptideIx(self.peptides.len() as u32);
        log::debug!("adding special peptide {} as {:?}", peptide, ix);
        self.peptides.push(peptide);
        Ok(ix)
    }

    /// Sort, fragment and index the arena
    pub fn build(self, parameters: &Parameters) -> FragmentIndex {
        let n = self.peptides.len();
        let peptides = self.peptides;

        log::trace!("sorting {} peptides by mass", n);
        let mut order = (0..n as u32).map(PeptideIx).collect::<Vec<_>>();
        order.par_sort_unstable_by(|a, b| {
            peptides[a.0 as usize]
                .monoisotopic
                .total_cmp(&peptides[b.0 as usize].monoisotopic)
                .then_with(|| a.cmp(b))
        });
        let masses = order
            .iter()
            .map(|ix| peptides[ix.0 as usize].monoisotopic)
            .collect::<Vec<_>>();
        let mut rank = vec![0u32; n];
        for (r, ix) in order.iter().enumerate() {
            rank[ix.0 as usize] = r as u32;
        }

        // Note that multiple charge states are handled during scoring -
        // all theoretical fragments are monoisotopic/uncharged
        log::trace!("generating fragments");
        let per_peptide = peptides
            .par_iter()
            .map(|peptide| parameters.fragments(peptide))
            .collect::<Vec<_>>();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut fragments = Vec::with_capacity(per_peptide.iter().map(Vec::len).sum());
        offsets.push(0);
        for f in per_peptide {
            fragments.extend(f);
            offsets.push(fragments.len());
        }

        let (rank, fragments_ref, offsets_ref) = (&rank, &fragments, &offsets);
        let mut theoretical = (0..n)
            .into_par_iter()
            .flat_map_iter(|ix| {
                fragments_ref[offsets_ref[ix]..offsets_ref[ix + 1]]
                    .iter()
                    .map(move |f| Theoretical {
                        rank: rank[ix],
                        fragment_mass: f.mass,
                    })
            })
            .collect::<Vec<_>>();

        log::trace!("finalizing index");
        // Sort all of our theoretical fragments by mass, from low to high
        theoretical.par_sort_unstable_by(|a, b| {
            a.fragment_mass
                .total_cmp(&b.fragment_mass)
                .then_with(|| a.rank.cmp(&b.rank))
        });

        // Now, we bucket all of our theoretical fragments, and within each bucket
        // sort by precursor rank - and save the minimum *fragment* mass in a separate
        // vector so that we can perform an efficient binary search to reduce
        // the number of in silico fragments we evaluate
        //
        // Imagine our theoretical fragments look like this
        //
        // Fragment        A      B       C       D       E       F       G       H
        // Fragment mass [ 1.0    1.2     1.3     2.5     2.5     2.6     3.5     4.0 ]
        // Precursor rank[ 5      4       2       8       1       6       7       3   ]
        //
        // If we apply a bucket size of 4 we will end up with the following:
        //
        // Fragment        C      B       A       D       E       H       F       G
        // Fragment mass [ 1.3    1.2     1.0     2.5     2.5     4.0     2.6     3.5 ]
        // Precursor rank[ 2      4       5       8       1       3       6       7   ]
        //               |___________________________|   |____________________________|
        //                Bucket 1: min mass 1.0           Bucket 2: min mass 2.5
        //
        // A query for fragment mass 1.3 - 1.9 binary searches `min_value` to find
        // that only Bucket 1 can contain matches, then binary searches the
        // precursor ranks inside the bucket.
        let bucket_size = parameters.bucket_size.max(1);
        let min_value = theoretical
            .par_chunks_mut(bucket_size)
            .map(|chunk| {
                // There is always at least one item in the chunk, and the chunk is
                // already sorted by fragment mass, so this is the minimum value
                let min = chunk[0].fragment_mass;
                chunk.sort_unstable_by(|a, b| {
                    a.rank
                        .cmp(&b.rank)
                        .then_with(|| a.fragment_mass.total_cmp(&b.fragment_mass))
                });
                min
            })
            .collect::<Vec<_>>();

        let stats = IndexStats {
            proteins: self.protein_count,
            peptides: n,
            decoys: peptides.iter().filter(|p| p.decoy).count(),
            special: peptides.iter().filter(|p| p.special).count(),
            fragments: fragments.len(),
            truncated: self.truncated,
        };
        log::info!(
            "indexed {} peptides ({} decoys, {} special) with {} fragments",
            stats.peptides,
            stats.decoys,
            stats.special,
            stats.fragments
        );

        FragmentIndex {
            peptides,
            order,
            masses,
            fragments,
            offsets,
            theoretical,
            min_value,
            bucket_size,
            protein_count: self.protein_count,
            truncated: self.truncated,
            stats,
            parameters: parameters.clone(),
        }
    }
}

/// An immutable, searchable index over a peptide arena
///
/// Peptides are stored in arena (insertion) order and addressed by
/// [`PeptideIx`]; `order` is the permutation of the arena sorted by mass, and
/// is what precursor queries binary search over. To add peptides, take the
/// arena back with [`FragmentIndex::into_arena`] and rebuild.
pub struct FragmentIndex {
    peptides: Vec<Peptide>,
    order: Vec<PeptideIx>,
    /// Peptide masses in `order`
    masses: Vec<f32>,
    fragments: Vec<Fragment>,
    offsets: Vec<usize>,
    theoretical: Vec<Theoretical>,
    min_value: Vec<f32>,
    bucket_size: usize,
    protein_count: usize,
    truncated: usize,
    stats: IndexStats,
    parameters: Parameters,
}

impl FragmentIndex {
    /// Give up the index, keeping its peptides for extension
    pub fn into_arena(self) -> PeptideArena {
        PeptideArena {
            peptides: self.peptides,
            protein_count: self.protein_count,
            truncated: self.truncated,
        }
    }

    /// Positions in [`FragmentIndex::order`] of every peptide with a mass
    /// between `lo` and `hi`, inclusive
    pub fn peptides_in_window(&self, lo: f32, hi: f32) -> Range<usize> {
        let start = self.masses.partition_point(|m| *m < lo);
        let end = self.masses.partition_point(|m| *m <= hi);
        start..end.max(start)
    }

    /// Positions in [`FragmentIndex::order`] of every peptide whose mass lies
    /// within `tolerance` of `target`. An empty range is a valid result
    pub fn find_peptides_in_mass_range(&self, target: f32, tolerance: Tolerance) -> Range<usize> {
        let (lo, hi) = tolerance.bounds(target);
        self.peptides_in_window(lo, hi)
    }

    pub fn candidates(&self, range: Range<usize>) -> impl Iterator<Item = (PeptideIx, &Peptide)> {
        self.order[range]
            .iter()
            .map(move |ix| (*ix, &self.peptides[ix.0 as usize]))
    }

    /// Create a new [`IndexedQuery`] for a precursor mass
    ///
    /// All matches returned by the query will be within the specified tolerance
    /// parameters
    pub fn query(
        &self,
        precursor_mass: f32,
        precursor_tol: Tolerance,
        fragment_tol: Tolerance,
    ) -> IndexedQuery<'_> {
        let range = self.find_peptides_in_mass_range(precursor_mass, precursor_tol);
        self.query_ranks(range, fragment_tol)
    }

    /// Create a new [`IndexedQuery`] restricted to a range of mass-sorted positions
    pub fn query_ranks(&self, ranks: Range<usize>, fragment_tol: Tolerance) -> IndexedQuery<'_> {
        IndexedQuery {
            db: self,
            fragment_tol,
            pre_idx_lo: ranks.start as u32,
            pre_idx_hi: ranks.end as u32,
        }
    }

    pub fn peptides(&self) -> &[Peptide] {
        &self.peptides
    }

    pub fn peptide_sequences(&self) -> Vec<String> {
        self.peptides.iter().map(|p| p.to_string()).collect()
    }

    pub fn order(&self) -> &[PeptideIx] {
        &self.order
    }

    pub fn fragments(&self, ix: PeptideIx) -> &[Fragment] {
        let ix = ix.0 as usize;
        &self.fragments[self.offsets[ix]..self.offsets[ix + 1]]
    }

    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    /// Number of entries in the inverted fragment table
    pub fn size(&self) -> usize {
        self.theoretical.len()
    }

    pub fn buckets(&self) -> &[f32] {
        &self.min_value
    }

    pub fn protein_count(&self) -> usize {
        self.protein_count
    }

    /// Does `protein` refer past the real proteins, i.e. to a special peptide?
    pub fn is_synthetic(&self, protein: ProteinIx) -> bool {
        protein.0 as usize >= self.protein_count
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Residue masses usable for de novo tag generation, including static
    /// residue modifications. Only the 20 standard amino acids are reported
    pub fn residue_alphabet(&self) -> Vec<(u8, f32)> {
        crate::mass::VALID_AA
            .iter()
            .filter(|r| !matches!(**r, b'U' | b'O'))
            .map(|r| {
                let delta = self
                    .parameters
                    .static_mods
                    .get(&ModificationSpecificity::Residue(*r))
                    .copied()
                    .unwrap_or_default();
                (*r, r.monoisotopic() + delta)
            })
            .collect()
    }
}

impl std::ops::Index<PeptideIx> for FragmentIndex {
    type Output = Peptide;

    fn index(&self, index: PeptideIx) -> &Self::Output {
        &self.peptides[index.0 as usize]
    }
}

pub struct IndexedQuery<'d> {
    db: &'d FragmentIndex,
    fragment_tol: Tolerance,
    pub pre_idx_lo: u32,
    pub pre_idx_hi: u32,
}

impl<'d> IndexedQuery<'d> {
    /// Every inverted-table entry whose peptide is in the precursor window and
    /// whose fragment matches a peak of neutral mass `peak_mass` at `charge`.
    ///
    /// The tolerance is applied in the m/z domain and then scaled by the
    /// charge, so a fragment of mass `m` matches when `m / charge` lies within
    /// tolerance of `peak_mass`
    pub fn page_search(
        &self,
        peak_mass: f32,
        charge: u8,
    ) -> impl Iterator<Item = &'d Theoretical> + '_ {
        let (fragment_lo, fragment_hi) = fragment_window(self.fragment_tol, peak_mass, charge);
        let db = self.db;

        // Locate the left and right page indices that contain matching fragments
        // Note that we need to multiply by `bucket_size` to transform these into
        // indices that can be used with `db.theoretical`
        let (left_idx, right_idx) = binary_search_slice(
            &db.min_value,
            |min, bounds| min.total_cmp(bounds),
            fragment_lo,
            fragment_hi,
        );

        // It is absolutely critical that we do not cross page boundaries!
        // If we do, we can no longer rely on total ordering of ranks
        (left_idx..right_idx).flat_map(move |page| {
            let left_idx = page * db.bucket_size;
            // Last chunk not guaranted to be modulo bucket size, make sure we don't
            // accidentally go out of bounds!
            let right_idx = ((page + 1) * db.bucket_size).min(db.theoretical.len());
            let slice = &db.theoretical[left_idx..right_idx];

            // Ranks are exact bounds, so only the fragment mass needs checking
            let inner_left = slice.partition_point(|t| t.rank < self.pre_idx_lo);
            let inner_right = slice.partition_point(|t| t.rank < self.pre_idx_hi);

            slice[inner_left..inner_right.max(inner_left)]
                .iter()
                .filter(move |t| t.fragment_mass >= fragment_lo && t.fragment_mass <= fragment_hi)
        })
    }

    /// Peptide owning an entry returned by [`IndexedQuery::page_search`]
    pub fn peptide(&self, theoretical: &Theoretical) -> PeptideIx {
        self.db.order[theoretical.rank as usize]
    }
}

/// Neutral fragment mass window matched by a peak of neutral mass
/// `peak_mass`, for fragments carrying `charge` protons
#[inline]
pub fn fragment_window(tolerance: Tolerance, peak_mass: f32, charge: u8) -> (f32, f32) {
    let (lo, hi) = tolerance.bounds(peak_mass);
    let z = charge.max(1) as f32;
    (lo * z, hi * z)
}

/// Return the widest `left` and `right` indices into a `slice` (sorted by the
/// function `key`) such that all values between `low` and `high` are
/// contained in `slice[left..right]`
///
/// # Invariants
///
/// * `slice[left] <= low || left == 0`
/// * `slice[right] <= high && (slice[right+1] > high || right == slice.len())`
/// * `0 <= left <= right <= slice.len()`
#[inline]
pub fn binary_search_slice<T, F, S>(slice: &[T], key: F, low: S, high: S) -> (usize, usize)
where
    F: Fn(&T, &S) -> Ordering,
{
    let left_idx = match slice.binary_search_by(|a| key(a, &low)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx.saturating_sub(1);
            while idx > 0 && key(&slice[idx], &low) != Ordering::Less {
                idx -= 1;
            }
            idx
        }
    };

    let right_idx = match slice[left_idx..].binary_search_by(|a| key(a, &high)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx + left_idx;
            while idx < slice.len() && key(&slice[idx], &high) != Ordering::Greater {
                idx = idx.saturating_add(1);
            }
            idx.min(slice.len())
        }
    };
    (left_idx, right_idx)
}
