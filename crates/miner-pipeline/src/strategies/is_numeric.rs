//! `IsNumeric`: discard records whose keyword value is not a number.

use miner_pvl::PvlObject;
use miner_types::{to_double, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategy::{Strategy, StrategyCore};

pub struct IsNumericStrategy {
    core: StrategyCore,
    keyword: String,
}

impl IsNumericStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let keyword = core.required("Keyword")?;
        Ok(Self { core, keyword })
    }
}

impl Strategy for IsNumericStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn apply_one(&mut self, resource: &SharedResource, _globals: &[SharedResource]) -> Result<usize> {
        let numeric = resource
            .value(&self.keyword, 0)
            .is_ok_and(|v| to_double(&v).is_ok());
        if numeric {
            return Ok(1);
        }
        resource.discard();
        Ok(0)
    }
}
