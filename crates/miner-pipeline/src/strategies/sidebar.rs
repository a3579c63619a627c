//! `Sidebar`: run a nested strategy list, optionally restoring record status
//! (`SavePoint`) and set membership (`SaveDelete`) afterwards.
//!
//! Attribute and asset changes made by the nested list always survive; the
//! snapshots only cover the discard flags and which records are in the set.

use std::rc::Rc;

use miner_pvl::PvlObject;
use miner_types::{MinerError, ResourceList, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategies::nested_strategies;
use crate::strategy::{count_active, Strategy, StrategyCore};

/// Extension points around a sidebar run.
pub trait SidebarHooks {
    fn pre_run(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<()> {
        let _ = (resources, globals);
        Ok(())
    }

    fn pre_step(&mut self, strategy: &dyn Strategy, resources: &mut ResourceList) -> Result<()> {
        let _ = (strategy, resources);
        Ok(())
    }

    fn post_step(
        &mut self,
        strategy: &dyn Strategy,
        result: usize,
        resources: &mut ResourceList,
    ) -> Result<()> {
        let _ = (strategy, result, resources);
        Ok(())
    }

    fn post_run(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<()> {
        let _ = (resources, globals);
        Ok(())
    }

    /// The value `apply` returns once the run (and any restore) is done.
    fn count(&self, resources: &[SharedResource]) -> usize {
        count_active(resources)
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SidebarHooks for NoHooks {}

pub struct SidebarStrategy<H: SidebarHooks = NoHooks> {
    core: StrategyCore,
    strategies: Vec<Box<dyn Strategy>>,
    save_point: bool,
    save_delete: bool,
    hooks: H,
}

impl SidebarStrategy<NoHooks> {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        Self::with_hooks(definition, globals, factory, NoHooks)
    }
}

impl<H: SidebarHooks> SidebarStrategy<H> {
    /// Nested strategies come from `StrategyConfigFile` (+`Args`) or an
    /// embedded `Object = Miner`.
    pub fn with_hooks(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
        hooks: H,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let strategies = nested_strategies(&core, factory, "StrategyConfigFile", "Miner")?
            .ok_or_else(|| {
                MinerError::Config(format!(
                    "{} strategy [{}] requires StrategyConfigFile or an embedded Miner object",
                    core.strategy_type(),
                    core.name()
                ))
            })?;
        let save_point = core.bool_or("SavePoint", false)?;
        let save_delete = core.bool_or("SaveDelete", false)?;
        core.debug(&format!(
            "{} nested strategies, SavePoint = {save_point}, SaveDelete = {save_delete}",
            strategies.len()
        ));
        Ok(Self {
            core,
            strategies,
            save_point,
            save_delete,
            hooks,
        })
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    /// Run the nested list over `resources`, honouring the snapshots.
    pub fn run(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        let status: Option<Vec<(SharedResource, bool)>> = self.save_point.then(|| {
            resources
                .iter()
                .map(|r| (Rc::clone(r), r.is_discarded()))
                .collect()
        });
        let members: Option<ResourceList> = self.save_delete.then(|| resources.clone());

        self.core.init_progress(self.strategies.len());
        self.hooks.pre_run(resources, globals)?;
        for strategy in self.strategies.iter_mut() {
            self.hooks.pre_step(strategy.as_ref(), resources)?;
            let result = strategy
                .apply(resources, globals)
                .map_err(|err| err.in_strategy(strategy.name(), strategy.strategy_type()))?;
            self.core
                .debug(&format!("nested {} returned {result}", strategy.name()));
            self.hooks.post_step(strategy.as_ref(), result, resources)?;
            self.core.processed();
        }
        self.hooks.post_run(resources, globals)?;

        if let Some(status) = status {
            for (resource, discarded) in status {
                resource.set_discarded(discarded);
            }
        }
        if let Some(members) = members {
            *resources = members;
        }
        Ok(self.hooks.count(resources))
    }
}

impl<H: SidebarHooks> Strategy for SidebarStrategy<H> {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        self.run(resources, globals)
    }
}
