//! `GisUnion`: merge the footprints of the active records into one geometry.
//!
//! The union lands on a new record named by `UnionName`. With
//! `Mode = Resource` that record is appended to the set. With `Mode = Asset`
//! it is attached, under `Asset`, to every record that contributed.

use std::rc::Rc;

use miner_pvl::PvlObject;
use miner_types::{Asset, Resource, ResourceList, Result, SharedGeometry, SharedResource};

use crate::calculator::format_number;
use crate::registry::StrategyFactory;
use crate::strategies::choice;
use crate::strategy::{Strategy, StrategyCore};

pub struct GisUnionStrategy {
    core: StrategyCore,
    union_name: String,
    as_asset: bool,
    asset: String,
}

impl GisUnionStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let as_asset = choice(&core, "Mode", "Resource", &["resource", "asset"])? == "asset";
        let union_name = core.keys().value_or("UnionName", "GisUnion");
        let asset = core.keys().value_or("Asset", "GisUnion");
        Ok(Self {
            core,
            union_name,
            as_asset,
            asset,
        })
    }

    /// Union of every contributing geometry, folded in set order.
    fn merge(&self, geometries: &[SharedGeometry]) -> Result<Option<SharedGeometry>> {
        let mut iter = geometries.iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut merged = Rc::clone(first);
        for geometry in iter {
            merged = merged.union(geometry.as_ref())?;
        }
        Ok(Some(merged))
    }
}

impl Strategy for GisUnionStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    /// Returns the number of records whose geometry went into the union.
    fn apply(&mut self, resources: &mut ResourceList, _globals: &[SharedResource]) -> Result<usize> {
        let contributors: ResourceList = resources
            .iter()
            .filter(|r| r.is_active() || self.core.apply_discarded())
            .filter(|r| r.has_valid_geometry())
            .cloned()
            .collect();
        self.core.init_progress(contributors.len());
        let mut geometries: Vec<SharedGeometry> = Vec::with_capacity(contributors.len());
        for resource in &contributors {
            if let Some(geometry) = resource.geometry() {
                geometries.push(geometry);
            }
            self.core.processed();
        }
        let Some(merged) = self.merge(&geometries)? else {
            self.core.debug("no geometries to merge");
            return Ok(0);
        };

        let union = Resource::shared(self.union_name.clone());
        union.add("GisUnionCount", contributors.len().to_string());
        union.add("GisUnionArea", format_number(merged.area()));
        union.add("GisUnionGeometry", merged.to_wkt());
        if let Some((x, y)) = merged.centroid() {
            union.add("GisUnionCentroidX", format_number(x));
            union.add("GisUnionCentroidY", format_number(y));
        }
        union.set_geometry(Some(merged));
        self.core.debug(&format!(
            "merged {} geometries into {}",
            contributors.len(),
            self.union_name
        ));

        if self.as_asset {
            for resource in &contributors {
                resource.add_asset(&self.asset, Asset::Resources(vec![union.copy()]));
            }
        } else {
            resources.push(union);
        }
        Ok(contributors.len())
    }
}
