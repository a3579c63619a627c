//! `ResourceManager`: bulk status and membership operations on the set.

use miner_pvl::PvlObject;
use miner_types::{MinerError, ResourceList, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategy::{qualifiers, Strategy, StrategyCore};

/// One entry of the `Operations` keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOperation {
    /// Reactivate every discarded record.
    ResetDiscard,
    /// Flip every record's status.
    ToggleDiscard,
    /// Remove discarded records from the set.
    DeleteDiscard,
    /// Remove the named asset wherever present.
    DeleteAsset(String),
    /// Discard records without the named asset.
    HasAsset(String),
}

impl ResourceOperation {
    /// Parse `Name` or `Name::Qualifier`.
    pub fn parse(spec: &str) -> std::result::Result<Self, String> {
        let parts = qualifiers(spec, "::");
        let op = parts.first().map(|s| s.to_ascii_lowercase()).unwrap_or_default();
        let qualifier = || {
            parts
                .get(1)
                .cloned()
                .ok_or_else(|| format!("Operation [{spec}] requires an asset name qualifier ({}::Name)", parts[0]))
        };
        match op.as_str() {
            "resetdiscard" => Ok(ResourceOperation::ResetDiscard),
            "togglediscard" => Ok(ResourceOperation::ToggleDiscard),
            "deletediscard" => Ok(ResourceOperation::DeleteDiscard),
            "deleteasset" => qualifier().map(ResourceOperation::DeleteAsset),
            "hasasset" => qualifier().map(ResourceOperation::HasAsset),
            _ => Err(format!("Invalid operation [{spec}]")),
        }
    }

    /// Apply to the set, returning the number of records affected.
    pub fn apply(&self, resources: &mut ResourceList) -> usize {
        match self {
            ResourceOperation::ResetDiscard => {
                let mut n = 0;
                for r in resources.iter().filter(|r| r.is_discarded()) {
                    r.activate();
                    n += 1;
                }
                n
            }
            ResourceOperation::ToggleDiscard => {
                for r in resources.iter() {
                    r.set_discarded(!r.is_discarded());
                }
                resources.len()
            }
            ResourceOperation::DeleteDiscard => {
                let before = resources.len();
                resources.retain(|r| r.is_active());
                before - resources.len()
            }
            ResourceOperation::DeleteAsset(name) => {
                resources.iter().map(|r| r.remove_asset(name)).sum()
            }
            ResourceOperation::HasAsset(name) => {
                let mut n = 0;
                for r in resources.iter().filter(|r| r.is_active() && !r.has_asset(name)) {
                    r.discard();
                    n += 1;
                }
                n
            }
        }
    }
}

pub struct ResourceManagerStrategy {
    core: StrategyCore,
    operations: Vec<ResourceOperation>,
}

impl ResourceManagerStrategy {
    /// Every operation is validated up front; all problems are reported in
    /// one error.
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let specs = core.keys().all_values("Operations");
        if specs.is_empty() {
            return Err(MinerError::Config(format!(
                "ResourceManager strategy [{}] requires an Operations keyword",
                core.name()
            )));
        }

        let mut operations = Vec::new();
        let mut errors = Vec::new();
        for spec in &specs {
            match ResourceOperation::parse(spec) {
                Ok(op) => operations.push(op),
                Err(message) => errors.push(message),
            }
        }
        if !errors.is_empty() {
            return Err(MinerError::Config(format!(
                "ResourceManager strategy [{}] has invalid operations: {}",
                core.name(),
                errors.join("; ")
            )));
        }
        Ok(Self { core, operations })
    }

    pub fn operations(&self) -> &[ResourceOperation] {
        &self.operations
    }
}

impl Strategy for ResourceManagerStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn apply(&mut self, resources: &mut ResourceList, _globals: &[SharedResource]) -> Result<usize> {
        self.core.init_progress(self.operations.len());
        let mut total = 0;
        for op in &self.operations {
            let n = op.apply(resources);
            self.core.debug(&format!("{op:?} affected {n} resources"));
            total += n;
            self.core.processed();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing::{active_names, build, definition, names, records};
    use miner_types::Asset;

    fn manager(ops: &str) -> Box<dyn Strategy> {
        build(&format!(
            "Object = Strategy\n Name = m\n Type = ResourceManager\n Operations = ({ops})\nEnd_Object"
        ))
    }

    #[test]
    fn reset_toggle_delete() {
        let mut list = records("K", &["a", "b", "c"]);
        list[1].discard();
        assert_eq!(manager("ResetDiscard").apply(&mut list, &[]).unwrap(), 1);
        assert_eq!(active_names(&list).len(), 3);

        list[0].discard();
        manager("ToggleDiscard").apply(&mut list, &[]).unwrap();
        assert_eq!(active_names(&list), vec!["r0"]);

        assert_eq!(manager("DeleteDiscard").apply(&mut list, &[]).unwrap(), 2);
        assert_eq!(names(&list), vec!["r0"]);
    }

    #[test]
    fn asset_operations() {
        let mut list = records("K", &["a", "b"]);
        list[0].add_asset("Pairs", Asset::Resources(vec![]));
        assert_eq!(manager("\"HasAsset::Pairs\"").apply(&mut list, &[]).unwrap(), 1);
        assert_eq!(active_names(&list), vec!["r0"]);

        assert_eq!(manager("\"DeleteAsset::Pairs\"").apply(&mut list, &[]).unwrap(), 1);
        assert!(!list[0].has_asset("pairs"));
    }

    #[test]
    fn all_errors_reported_together() {
        let def = definition(
            "Object = Strategy\n Name = m\n Type = ResourceManager\n \
             Operations = (Bogus, \"DeleteAsset::\", ResetDiscard)\nEnd_Object",
        );
        let err = crate::registry::StrategyFactory::new().create(&def, &[]).err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("Invalid operation [Bogus]"));
        assert!(msg.contains("requires an asset name qualifier"));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            ResourceOperation::parse("hasasset::Foo").unwrap(),
            ResourceOperation::HasAsset("Foo".into())
        );
    }
}
