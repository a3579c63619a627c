//! `GisOverlap`: pair records whose footprints overlap within a ratio band.
//!
//! Each active record A is matched against the candidate set through an
//! envelope index. A pair (A, B) qualifies when `ratio(A, B)`, the share of
//! A's area covered by B, is positive and inside
//! `[OverlapMinimum, OverlapMaximum]`. Qualifying pairs become composite
//! records stored as a record-set asset on A.
//!
//! When `apply` returns the input set has its original membership, records
//! that were discarded on entry are discarded again, and active records that
//! produced no pair are discarded.

use std::rc::Rc;

use miner_pvl::PvlObject;
use miner_types::{Asset, Geometry, MinerError, ResourceList, Result, SharedResource};

use crate::calculator::format_number;
use crate::gis::EnvelopeIndex;
use crate::registry::StrategyFactory;
use crate::runner::apply_all;
use crate::strategies::nested_strategies;
use crate::strategy::{activate_list, deactivate_list, get_globals, Strategy, StrategyCore};

/// Ratios within this distance of a band edge count as inside the band.
const RATIO_TOLERANCE: f64 = 1e-9;

/// How a composite's geometry is derived from the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMerge {
    None,
    Intersection,
    Union,
    Centroid,
    ResourceA,
    ResourceB,
}

impl OverlapMerge {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(OverlapMerge::None),
            "intersection" => Ok(OverlapMerge::Intersection),
            "union" => Ok(OverlapMerge::Union),
            "centroid" => Ok(OverlapMerge::Centroid),
            "resourcea" => Ok(OverlapMerge::ResourceA),
            "resourceb" => Ok(OverlapMerge::ResourceB),
            _ => Err(MinerError::Config(format!(
                "OverlapMerge = {value} is not a recognized/valid option"
            ))),
        }
    }
}

/// Extension points for pairing strategies built on `GisOverlap`.
pub trait PairHooks {
    /// Whether a record may take part in pairing at all.
    fn accept_candidate(&self, candidate: &SharedResource) -> bool {
        let _ = candidate;
        true
    }

    /// Inspect or extend a freshly built composite. `Ok(None)` rejects the pair.
    fn finish_pair(
        &mut self,
        composite: SharedResource,
        a: &SharedResource,
        b: &SharedResource,
        suffixes: (&str, &str),
        globals: &[SharedResource],
    ) -> Result<Option<SharedResource>> {
        let _ = (a, b, suffixes, globals);
        Ok(Some(composite))
    }
}

/// Accepts every candidate and every composite.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPairHooks;

impl PairHooks for NoPairHooks {}

pub struct GisOverlapStrategy<H: PairHooks = NoPairHooks> {
    core: StrategyCore,
    minimum: f64,
    maximum: f64,
    ratio_key: String,
    asset: String,
    merge: OverlapMerge,
    suffix_a: String,
    suffix_b: String,
    pair_strategies: Vec<Box<dyn Strategy>>,
    overlap_strategies: Vec<Box<dyn Strategy>>,
    hooks: H,
}

impl GisOverlapStrategy<NoPairHooks> {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        Self::with_hooks(definition, globals, factory, NoPairHooks)
    }
}

impl<H: PairHooks> GisOverlapStrategy<H> {
    pub fn with_hooks(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
        hooks: H,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let minimum = core.double_or("OverlapMinimum", 0.0)?;
        let maximum = core.double_or("OverlapMaximum", 1.0)?;
        let ratio_key = core.keys().value_or("OverlapRatioKey", "OverlapRatio");
        let asset = core.keys().value_or("Asset", "GisOverlap");
        let merge = OverlapMerge::parse(&core.keys().value_or("OverlapMerge", "none"))?;
        let suffix_a = core.keys().value_or("MergeSuffixA", "A");
        let suffix_b = core.keys().value_or("MergeSuffixB", "B");

        let pair_strategies =
            match nested_strategies(&core, factory, "StrategyConfigFile", "StrategyMiner")? {
                Some(list) => list,
                None => nested_strategies(&core, factory, "CandidateConfigFile", "CandidateMiner")?
                    .unwrap_or_default(),
            };
        let overlap_strategies =
            nested_strategies(&core, factory, "OverlapConfigFile", "OverlapMiner")?
                .unwrap_or_default();
        core.debug(&format!(
            "band [{minimum}, {maximum}], merge {merge:?}, {} candidate and {} overlap strategies",
            pair_strategies.len(),
            overlap_strategies.len()
        ));

        Ok(Self {
            core,
            minimum,
            maximum,
            ratio_key,
            asset,
            merge,
            suffix_a,
            suffix_b,
            pair_strategies,
            overlap_strategies,
            hooks,
        })
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn merge(&self) -> OverlapMerge {
        self.merge
    }

    pub fn asset_name(&self) -> &str {
        &self.asset
    }

    pub fn set_asset_name(&mut self, name: impl Into<String>) {
        self.asset = name.into();
    }

    fn in_band(&self, ratio: f64) -> bool {
        ratio > 0.0
            && ratio >= self.minimum - RATIO_TOLERANCE
            && ratio <= self.maximum + RATIO_TOLERANCE
    }

    /// The pair candidates: the input set after the candidate strategies,
    /// restricted to active records the hooks accept.
    fn candidates(
        &mut self,
        resources: &ResourceList,
        globals: &[SharedResource],
    ) -> Result<ResourceList> {
        let mut candidates = resources.clone();
        apply_all(&mut self.pair_strategies, &mut candidates, globals)?;
        Ok(candidates
            .into_iter()
            .filter(|r| r.is_active() && self.hooks.accept_candidate(r))
            .collect())
    }

    /// Composites for every qualifying partner of `resource`.
    fn process_overlaps(
        &mut self,
        resource: &SharedResource,
        geometry: &dyn Geometry,
        overlaps: &[SharedResource],
        globals: &[SharedResource],
    ) -> Result<ResourceList> {
        let mut matches = Vec::new();
        for candidate in overlaps {
            if resource.is_equal(candidate) {
                continue;
            }
            let Some(other) = candidate.geometry() else {
                continue;
            };
            let ratio_a = geometry.intersect_ratio(other.as_ref());
            let ratio_b = other.intersect_ratio(geometry);
            self.core.debug(&format!(
                "{} overlaps {} with ratios {ratio_a}, {ratio_b}",
                resource.name(),
                candidate.name()
            ));
            if !self.in_band(ratio_a) {
                continue;
            }
            match self.process_overlap(resource, candidate, ratio_a, ratio_b, globals) {
                Ok(Some(composite)) => matches.push(composite),
                Ok(None) => {}
                Err(err) if err.is_contained() => self.core.debug(&format!(
                    "pair {}/{} skipped: {err}",
                    resource.name(),
                    candidate.name()
                )),
                Err(err) => return Err(err),
            }
        }
        Ok(matches)
    }

    /// Build the composite for one pair and apply the merge option.
    fn process_overlap(
        &mut self,
        a: &SharedResource,
        b: &SharedResource,
        ratio_a: f64,
        ratio_b: f64,
        globals: &[SharedResource],
    ) -> Result<Option<SharedResource>> {
        let suffixes = (self.suffix_a.as_str(), self.suffix_b.as_str());
        let composite = self.core.composite(a, b, suffixes);
        composite.add(&format!("{}{}", self.ratio_key, self.suffix_a), format_number(ratio_a));
        composite.add(&format!("{}{}", self.ratio_key, self.suffix_b), format_number(ratio_b));
        composite.add(&self.ratio_key, format_number(ratio_a));

        let (Some(ga), Some(gb)) = (a.geometry(), b.geometry()) else {
            return self.hooks.finish_pair(composite, a, b, suffixes, globals);
        };
        let merged = match self.merge {
            OverlapMerge::None => None,
            OverlapMerge::Intersection => Some(ga.intersection(gb.as_ref())?),
            OverlapMerge::Union => Some(ga.union(gb.as_ref())?),
            OverlapMerge::ResourceA => Some(ga),
            OverlapMerge::ResourceB => Some(gb),
            OverlapMerge::Centroid => {
                let overlap = ga.intersection(gb.as_ref())?;
                match overlap.centroid() {
                    Some((x, y)) => Some(
                        self.core
                            .geometry_factory()
                            .create(&format!("POINT({x} {y})"), "wkt")?,
                    ),
                    None => None,
                }
            }
        };
        if let Some(geometry) = merged {
            if let Some((x, y)) = geometry.centroid() {
                composite.add("GisOverlapCentroidX", format_number(x));
                composite.add("GisOverlapCentroidY", format_number(y));
            }
            composite.set_geometry(Some(geometry));
        }
        let suffixes = (self.suffix_a.as_str(), self.suffix_b.as_str());
        self.hooks.finish_pair(composite, a, b, suffixes, globals)
    }
}

impl<H: PairHooks> Strategy for GisOverlapStrategy<H> {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    /// Returns the number of records that produced at least one pair.
    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        let (active, discarded): (ResourceList, ResourceList) =
            resources.iter().cloned().partition(|r| r.is_active());
        if active.is_empty() {
            self.core.debug("no active resources to pair");
            return Ok(0);
        }
        let members = resources.clone();

        let candidates = self.candidates(resources, globals)?;
        if candidates.is_empty() {
            self.core.debug("no overlap candidates");
            activate_list(&active);
            *resources = members;
            return Ok(0);
        }

        let mut index = EnvelopeIndex::new();
        for candidate in candidates.iter().filter(|r| r.has_valid_geometry()) {
            if let Some(bounds) = candidate.geometry().and_then(|g| g.bounds()) {
                index.insert(bounds, Rc::clone(candidate));
            }
        }
        self.core.debug(&format!("{} candidates indexed", index.len()));

        self.core.init_progress(active.len());
        let mut paired = 0;
        let mut unpaired = Vec::new();
        for resource in &active {
            // Records without a usable footprint are left out of the pairing.
            let Some(geometry) = resource.geometry().filter(|g| g.is_valid()) else {
                self.core
                    .debug(&format!("{} has no valid geometry, not paired", resource.name()));
                self.core.processed();
                continue;
            };
            let hits = geometry
                .bounds()
                .map(|bounds| index.query(&bounds))
                .unwrap_or_default();
            let pairs = self.process_overlaps(resource, geometry.as_ref(), &hits, globals)?;

            if pairs.is_empty() {
                unpaired.push(Rc::clone(resource));
            } else {
                self.core
                    .debug(&format!("{} has {} overlaps", resource.name(), pairs.len()));
                resource.add_asset(&self.asset, Asset::Resources(pairs));
                paired += 1;
                if !self.overlap_strategies.is_empty() {
                    let mut single = vec![Rc::clone(resource)];
                    apply_all(
                        &mut self.overlap_strategies,
                        &mut single,
                        &get_globals(resource, globals),
                    )?;
                }
            }
            self.core.processed();
        }

        activate_list(&active);
        deactivate_list(&discarded);
        deactivate_list(&unpaired);
        *resources = members;
        Ok(paired)
    }
}
