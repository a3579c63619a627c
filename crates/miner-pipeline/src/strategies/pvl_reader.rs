//! `PvlReader`: create records from the containers of a PVL file.

use miner_pvl::PvlObject;
use miner_types::{KeywordMap, MinerError, Resource, ResourceList, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategy::{get_globals, Strategy, StrategyCore};

pub struct PvlReaderStrategy {
    core: StrategyCore,
    targets: Vec<String>,
}

impl PvlReaderStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        if !core.keys().exists("FromFile") && !core.keys().exists("FromFileKeyword") {
            return Err(MinerError::Config(format!(
                "PvlReader strategy [{}] requires keyword FromFile",
                core.name()
            )));
        }
        let targets = core.keys().all_values("Target");
        Ok(Self { core, targets })
    }

    /// `(name, keywords)` for every selected container of `doc`.
    fn containers(&self, doc: &PvlObject) -> Vec<(String, KeywordMap)> {
        let wanted = |name: &str| {
            self.targets.is_empty() || self.targets.iter().any(|t| t.eq_ignore_ascii_case(name))
        };
        let mut found: Vec<(String, KeywordMap)> = doc
            .objects
            .iter()
            .filter(|o| wanted(&o.name))
            .map(|o| (o.name.clone(), o.definition_map()))
            .collect();
        found.extend(
            doc.groups
                .iter()
                .filter(|g| wanted(&g.name))
                .map(|g| (g.name.clone(), g.to_map())),
        );
        if found.is_empty() && self.targets.is_empty() && !doc.keywords.is_empty() {
            found.push((doc.name.clone(), doc.keywords.iter().cloned().collect()));
        }
        found
    }
}

impl Strategy for PvlReaderStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    /// Appends one record per container and returns how many were added.
    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        let path = self.core.translate_keyword_args("FromFile", globals, "");
        let doc = miner_pvl::read_file(&path).map_err(|err| {
            MinerError::Config(format!("PvlReader could not read [{path}]: {err}"))
        })?;
        let containers = self.containers(&doc);
        self.core.init_progress(containers.len());

        let mut added = 0;
        for (index, (container, keys)) in containers.into_iter().enumerate() {
            let resource = Resource::shared(container.clone());
            for keyword in keys.iter() {
                resource.add_keyword(keyword.clone());
            }
            let pool = get_globals(&resource, globals);
            let identity = self
                .core
                .translate_keyword_args("Identity", &pool, &format!("{container}{}", index + 1));
            resource.set_name(identity);
            self.core.import_geometry(&resource, globals)?;
            resources.push(resource);
            added += 1;
            self.core.processed();
        }
        self.core
            .debug(&format!("read {added} resources from {path}"));
        Ok(added)
    }
}
