//! `GisIntersect`: keep only records whose footprint intersects a fixed
//! query geometry.

use miner_pvl::PvlObject;
use miner_types::{MinerError, Resource, ResourceList, Result, SharedGeometry, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategy::{apply_to_intersected_geometry, find_replacement, Strategy, StrategyCore};

pub struct GisIntersectStrategy {
    core: StrategyCore,
    geometry: SharedGeometry,
}

impl GisIntersectStrategy {
    /// The query geometry is built once from the geometry import keywords,
    /// with substitutions and references resolved against the globals.
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let query = Resource::shared(core.name());
        for key in ["GisGeometryRef", "GisGeometryKey"] {
            let target = core.keys().value_or(key, "");
            if !target.is_empty() {
                let value = find_replacement(&target, core.globals(), 0, "");
                if !value.is_empty() {
                    query.add(&target, value);
                }
            }
        }
        core.import_geometry(&query, core.globals())?;
        let geometry = query.geometry().filter(|g| g.is_valid()).ok_or_else(|| {
            MinerError::Config(format!(
                "GisIntersect strategy [{}] could not build its intersection geometry",
                core.name()
            ))
        })?;
        core.debug(&format!("intersection geometry {}", geometry.to_wkt()));
        Ok(Self { core, geometry })
    }

    pub fn geometry(&self) -> &SharedGeometry {
        &self.geometry
    }
}

impl Strategy for GisIntersectStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        let geometry = SharedGeometry::clone(&self.geometry);
        apply_to_intersected_geometry(self, resources, geometry.as_ref(), globals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gis::EnvelopeGeometry;
    use crate::registry::parameters_resource;
    use crate::strategies::testing::{active_names, definition};
    use miner_types::Bounds;

    fn located(name: &str, x: f64) -> SharedResource {
        let r = Resource::shared(name);
        r.set_geometry(Some(EnvelopeGeometry::point(x, 0.5).shared()));
        r
    }

    #[test]
    fn keeps_records_inside_query() {
        for method in ["direct", "rtree"] {
            let def = definition(&format!(
                "Object = Strategy\n Name = box\n Type = GisIntersect\n GisMethod = {method}\n \
                 GisGeometry = \"POLYGON((0 0, 2 0, 2 1, 0 1, 0 0))\"\nEnd_Object"
            ));
            let mut s = GisIntersectStrategy::new(&def, &[], &StrategyFactory::new()).unwrap();
            let mut list = vec![located("in", 1.0), located("out", 3.0), Resource::shared("none")];
            assert_eq!(s.apply(&mut list, &[]).unwrap(), 1, "{method}");
            assert_eq!(active_names(&list), vec!["in"]);
        }
    }

    #[test]
    fn geometry_from_global_reference() {
        let g = parameters_resource([("Region", "ENVELOPE(0, 10, 1, 0)")]);
        let def = definition(
            "Object = Strategy\n Name = box\n Type = GisIntersect\n GisGeometryRef = Region\nEnd_Object",
        );
        let s = GisIntersectStrategy::new(&def, &[g], &StrategyFactory::new()).unwrap();
        assert_eq!(s.geometry().bounds(), Some(Bounds::new(0.0, 0.0, 10.0, 1.0)));
    }

    #[test]
    fn missing_geometry_is_config_error() {
        let def = definition("Object = Strategy\n Name = box\n Type = GisIntersect\nEnd_Object");
        let err = StrategyFactory::new().create(&def, &[]).err().unwrap();
        assert!(err.is_config());
    }
}
