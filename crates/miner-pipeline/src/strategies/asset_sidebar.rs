//! `AssetSidebar`: operate on a named record-set asset of each record.

use miner_pvl::PvlObject;
use miner_types::{Asset, MinerError, ResourceList, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategies::choice;
use crate::strategies::sidebar::SidebarStrategy;
use crate::strategy::{clone_list, copy_list, get_globals, Strategy, StrategyCore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateMethod {
    Copy,
    Clone,
    Remove,
}

/// In `Create` mode the asset is (re)built from the whole outer set; in
/// `Process` mode the nested pipeline runs over each record's asset list.
pub struct AssetSidebarStrategy {
    core: StrategyCore,
    asset: String,
    create: Option<CreateMethod>,
    remove_empty: bool,
    sidebar: Option<SidebarStrategy>,
}

impl AssetSidebarStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let asset = core.required("Asset")?;
        let operation = choice(&core, "Operation", "Process", &["process", "create"])?;
        let remove_empty = core.bool_or("RemoveEmptyAssets", true)?;

        let (create, sidebar) = if operation == "create" {
            let method = match choice(&core, "CreateMethod", "Copy", &["copy", "clone", "remove"])?
                .as_str()
            {
                "clone" => CreateMethod::Clone,
                "remove" => CreateMethod::Remove,
                _ => CreateMethod::Copy,
            };
            (Some(method), None)
        } else {
            (None, Some(SidebarStrategy::new(definition, globals, factory)?))
        };

        Ok(Self {
            core,
            asset,
            create,
            remove_empty,
            sidebar,
        })
    }

    fn eligible(&self, resource: &SharedResource) -> bool {
        resource.is_active() || self.core.apply_discarded()
    }

    fn create_assets(&mut self, resources: &ResourceList, method: CreateMethod) -> usize {
        let targets: ResourceList = resources.iter().filter(|r| self.eligible(r)).cloned().collect();
        self.core.init_progress(targets.len());
        for resource in &targets {
            match method {
                CreateMethod::Copy => resource.add_asset(&self.asset, Asset::Resources(copy_list(resources))),
                CreateMethod::Clone => {
                    resource.add_asset(&self.asset, Asset::Resources(clone_list(resources, false)))
                }
                CreateMethod::Remove => {
                    resource.remove_asset(&self.asset);
                }
            }
            self.core.processed();
        }
        self.core.debug(&format!(
            "{method:?} asset {} on {} resources",
            self.asset,
            targets.len()
        ));
        targets.len()
    }

    fn process_assets(
        &mut self,
        resources: &ResourceList,
        globals: &[SharedResource],
    ) -> Result<usize> {
        let Some(sidebar) = self.sidebar.as_mut() else {
            return Err(MinerError::Config(format!(
                "AssetSidebar strategy [{}] has no nested strategies to process",
                self.core.name()
            )));
        };
        let targets: ResourceList = resources
            .iter()
            .filter(|r| (r.is_active() || self.core.apply_discarded()) && r.has_asset(&self.asset))
            .cloned()
            .collect();
        self.core.init_progress(targets.len());

        let mut result = 0;
        for resource in &targets {
            let Ok(mut list) = resource.asset_list(&self.asset) else {
                self.core.debug(&format!(
                    "asset {} of {} is not a resource list",
                    self.asset,
                    resource.name()
                ));
                self.core.processed();
                continue;
            };
            result += sidebar.apply(&mut list, &get_globals(resource, globals))?;
            resource.add_asset(&self.asset, Asset::Resources(list));
            self.core.processed();
        }

        if self.remove_empty {
            for resource in &targets {
                if resource.asset_list(&self.asset).is_ok_and(|l| l.is_empty()) {
                    resource.remove_asset(&self.asset);
                    self.core
                        .debug(&format!("removed empty asset from {}", resource.name()));
                }
            }
        }
        Ok(result)
    }
}

impl Strategy for AssetSidebarStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        match self.create {
            Some(method) => Ok(self.create_assets(resources, method)),
            None => self.process_assets(resources, globals),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing::{build, definition, records};
    use miner_types::Resource;

    #[test]
    fn create_copy_shares_data_clone_does_not() {
        let mut list = records("K", &["a", "b"]);
        build(
            "Object = Strategy\n Name = c\n Type = AssetSidebar\n Asset = Set\n \
             Operation = Create\nEnd_Object",
        )
        .apply(&mut list, &[])
        .unwrap();
        let copies = list[0].asset_list("Set").unwrap();
        assert_eq!(copies.len(), 2);
        copies[1].add("Touched", "yes");
        assert!(list[1].exists("Touched"));

        build(
            "Object = Strategy\n Name = c\n Type = AssetSidebar\n Asset = Own\n \
             Operation = Create\n CreateMethod = Clone\nEnd_Object",
        )
        .apply(&mut list, &[])
        .unwrap();
        let clones = list[0].asset_list("Own").unwrap();
        clones[1].add("Private", "yes");
        assert!(!list[1].exists("Private"));

        let n = build(
            "Object = Strategy\n Name = c\n Type = AssetSidebar\n Asset = Own\n \
             Operation = Create\n CreateMethod = Remove\nEnd_Object",
        )
        .apply(&mut list, &[])
        .unwrap();
        assert_eq!(n, 2);
        assert!(!list[0].has_asset("Own"));
    }

    const PROCESS: &str = "Object = Strategy\n Name = p\n Type = AssetSidebar\n Asset = Kids\n \
         {extra}\n \
         Object = Miner\n Object = Strategy\n Name = f\n Type = Filter\n Keyword = K\n \
         Exclude = x\n End_Object\n Object = Strategy\n Name = d\n Type = ResourceManager\n \
         Operations = DeleteDiscard\n End_Object\n End_Object\nEnd_Object";

    fn parent_with(kids: &[&str]) -> SharedResource {
        let parent = Resource::shared("parent");
        parent.add_asset("Kids", Asset::Resources(records("K", kids)));
        parent
    }

    #[test]
    fn process_runs_nested_on_each_asset_and_drops_empties() {
        let full = parent_with(&["a", "x", "b"]);
        let emptied = parent_with(&["x"]);
        let bare = Resource::shared("bare");
        let mut list = vec![full.clone(), emptied.clone(), bare.clone()];
        let mut s = build(&PROCESS.replace("{extra}", ""));
        assert_eq!(s.apply(&mut list, &[]).unwrap(), 2);
        assert_eq!(full.asset_list("Kids").unwrap().len(), 2);
        assert!(!emptied.has_asset("Kids"));
        assert!(!bare.has_asset("Kids"));
    }

    #[test]
    fn empty_assets_kept_when_requested() {
        let emptied = parent_with(&["x"]);
        let mut list = vec![emptied.clone()];
        let mut s = build(&PROCESS.replace("{extra}", "RemoveEmptyAssets = false"));
        s.apply(&mut list, &[]).unwrap();
        assert!(emptied.asset_list("Kids").unwrap().is_empty());
    }

    #[test]
    fn unknown_operation_is_config_error() {
        let def = definition(
            "Object = Strategy\n Name = c\n Type = AssetSidebar\n Asset = A\n Operation = Mangle\nEnd_Object",
        );
        let err = StrategyFactory::new().create(&def, &[]).err().unwrap();
        assert!(err.is_config());
    }
}
