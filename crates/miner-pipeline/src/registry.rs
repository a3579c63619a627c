//! Strategy registry, plugin libraries and the factory that turns `Miner`
//! definitions into runnable strategies.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use miner_pvl::{PvlGroup, PvlObject};
use miner_types::{GeometryFactory, Keyword, MinerError, Resource, ResourceList, Result, SharedResource};

use crate::gis::EnvelopeFactory;
use crate::strategies::{
    AssetSidebarStrategy, CalculatorStrategy, CsvReaderStrategy, CsvWriterStrategy,
    FilterStrategy, GisIntersectStrategy, GisOverlapStrategy, GisUnionStrategy,
    IsNumericStrategy, LimitStrategy, NumericalSortStrategy, PvlReaderStrategy,
    ResourceManagerStrategy, RunCommandStrategy, SidebarStrategy, StereoPairStrategy,
};
use crate::strategy::Strategy;

/// Builds a strategy from its definition.
pub type StrategyConstructor =
    fn(&PvlObject, &[SharedResource], &StrategyFactory) -> Result<Box<dyn Strategy>>;

// ---------------------------------------------------------------------------
// StrategyRegistry
// ---------------------------------------------------------------------------

/// Maps a case-insensitive `Type` name to its constructor.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    constructors: HashMap<String, (String, StrategyConstructor)>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: &str, constructor: StrategyConstructor) {
        self.constructors.insert(
            type_name.to_ascii_lowercase(),
            (type_name.to_string(), constructor),
        );
    }

    pub fn get(&self, type_name: &str) -> Option<StrategyConstructor> {
        self.constructors
            .get(&type_name.to_ascii_lowercase())
            .map(|(_, ctor)| *ctor)
    }

    pub fn has(&self, type_name: &str) -> bool {
        self.constructors
            .contains_key(&type_name.to_ascii_lowercase())
    }

    /// Registered type names as written at registration, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.values().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }
}

/// Every built-in strategy type.
pub fn default_registry() -> StrategyRegistry {
    let mut reg = StrategyRegistry::new();
    reg.register("Filter", |d, g, f| Ok(Box::new(FilterStrategy::new(d, g, f)?)));
    reg.register("Calculator", |d, g, f| Ok(Box::new(CalculatorStrategy::new(d, g, f)?)));
    reg.register("Limit", |d, g, f| Ok(Box::new(LimitStrategy::new(d, g, f)?)));
    reg.register("NumericalSort", |d, g, f| {
        Ok(Box::new(NumericalSortStrategy::new(d, g, f)?))
    });
    reg.register("ResourceManager", |d, g, f| {
        Ok(Box::new(ResourceManagerStrategy::new(d, g, f)?))
    });
    reg.register("IsNumeric", |d, g, f| Ok(Box::new(IsNumericStrategy::new(d, g, f)?)));
    reg.register("Sidebar", |d, g, f| Ok(Box::new(SidebarStrategy::new(d, g, f)?)));
    reg.register("AssetSidebar", |d, g, f| {
        Ok(Box::new(AssetSidebarStrategy::new(d, g, f)?))
    });
    reg.register("GisOverlap", |d, g, f| Ok(Box::new(GisOverlapStrategy::new(d, g, f)?)));
    reg.register("StereoPair", |d, g, f| Ok(Box::new(StereoPairStrategy::new(d, g, f)?)));
    reg.register("GisIntersect", |d, g, f| {
        Ok(Box::new(GisIntersectStrategy::new(d, g, f)?))
    });
    reg.register("GisUnion", |d, g, f| Ok(Box::new(GisUnionStrategy::new(d, g, f)?)));
    reg.register("PvlReader", |d, g, f| Ok(Box::new(PvlReaderStrategy::new(d, g, f)?)));
    reg.register("CsvReader", |d, g, f| Ok(Box::new(CsvReaderStrategy::new(d, g, f)?)));
    reg.register("CsvWriter", |d, g, f| Ok(Box::new(CsvWriterStrategy::new(d, g, f)?)));
    reg.register("RunCommand", |d, g, f| Ok(Box::new(RunCommandStrategy::new(d, g, f)?)));
    reg
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// A named set of exported constructors, addressed by library path.
///
/// A definition with a `Plugin` group is resolved against registered
/// libraries instead of the built-in table.
#[derive(Clone)]
pub struct PluginLibrary {
    path: PathBuf,
    routines: HashMap<String, StrategyConstructor>,
}

impl PluginLibrary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: normalize(&path.into()),
            routines: HashMap::new(),
        }
    }

    /// Export a constructor under `name`.
    pub fn with_routine(mut self, name: &str, constructor: StrategyConstructor) -> Self {
        self.routines.insert(name.to_string(), constructor);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn routine(&self, name: &str) -> Option<StrategyConstructor> {
        self.routines.get(name).copied()
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn config_message(err: MinerError) -> String {
    match err {
        MinerError::Config(message) => message,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// StrategyFactory
// ---------------------------------------------------------------------------

/// Creates strategies from definitions.
pub struct StrategyFactory {
    registry: StrategyRegistry,
    globals: ResourceList,
    geometry: Rc<dyn GeometryFactory>,
    plugins: Vec<PluginLibrary>,
    manufactured: Cell<usize>,
}

impl StrategyFactory {
    /// A factory with every built-in type and the envelope geometry backend.
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    pub fn with_registry(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            globals: Vec::new(),
            geometry: Rc::new(EnvelopeFactory),
            plugins: Vec::new(),
            manufactured: Cell::new(0),
        }
    }

    /// Replace the geometry backend handed to new strategies.
    pub fn with_geometry(mut self, geometry: Rc<dyn GeometryFactory>) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.registry
    }

    pub fn geometry_factory(&self) -> Rc<dyn GeometryFactory> {
        Rc::clone(&self.geometry)
    }

    /// Add a resource consulted ahead of the globals passed to each build.
    pub fn add_global(&mut self, global: SharedResource) {
        self.globals.push(global);
    }

    pub fn globals(&self) -> &[SharedResource] {
        &self.globals
    }

    pub fn register_plugin(&mut self, library: PluginLibrary) {
        self.plugins.push(library);
    }

    /// Number of strategies created so far.
    pub fn manufactured(&self) -> usize {
        self.manufactured.get()
    }

    fn pool(&self, globals: &[SharedResource]) -> ResourceList {
        self.globals.iter().chain(globals.iter()).cloned().collect()
    }

    /// Build the strategies of the `Miner` object in a PVL file.
    pub fn build_run_file(
        &self,
        path: impl AsRef<Path>,
        globals: &[SharedResource],
    ) -> Result<Vec<Box<dyn Strategy>>> {
        let path = path.as_ref();
        let doc = miner_pvl::read_file(path)?;
        let miner = doc.object("Miner").ok_or_else(|| {
            MinerError::Config(format!(
                "Strategy config file [{}] does not contain Miner strategies object.",
                path.display()
            ))
        })?;
        self.build_run(miner, globals)
    }

    /// Build every `Object = Strategy` of a `Miner` object, in order.
    pub fn build_run(
        &self,
        miner: &PvlObject,
        globals: &[SharedResource],
    ) -> Result<Vec<Box<dyn Strategy>>> {
        let pool = self.pool(globals);
        self.validate_user_parameters(miner, &pool)?;
        let strategies = miner
            .objects_named("Strategy")
            .map(|def| self.create(def, &pool))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            miner = %miner.value("Name").unwrap_or(miner.name.as_str()),
            strategies = strategies.len(),
            "built strategy run"
        );
        Ok(strategies)
    }

    /// Check that every `RequiredParameters` name resolves in the pool.
    pub fn validate_user_parameters(
        &self,
        miner: &PvlObject,
        globals: &[SharedResource],
    ) -> Result<()> {
        let Some(required) = miner.keyword("RequiredParameters") else {
            return Ok(());
        };
        let missing: Vec<&str> = required
            .values
            .iter()
            .filter(|name| !globals.iter().any(|g| g.exists(name)))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(MinerError::Config(format!(
            "Users of this configuration must provide the following parameter(s) but they were not found: {}",
            missing.join(", ")
        )))
    }

    /// Create one strategy from its definition.
    pub fn create(
        &self,
        definition: &PvlObject,
        globals: &[SharedResource],
    ) -> Result<Box<dyn Strategy>> {
        let name = definition.value("Name").unwrap_or("UNKNOWN");
        let Some(strategy_type) = definition.value("Type") else {
            return Err(MinerError::Config(format!(
                "Strategy Type does not exist in configuration for {name} strategy!"
            )));
        };

        let strategy = match definition.group("Plugin") {
            Some(plugin) => self
                .load_plugin(definition, plugin, globals)
                .map_err(|err| {
                    MinerError::Config(format!(
                        "Failed to load {name} Strategy plugin! {}",
                        config_message(err)
                    ))
                })?,
            None => match self.registry.get(strategy_type) {
                Some(constructor) => constructor(definition, globals, self)?,
                None => {
                    return Err(MinerError::Config(format!(
                        "Could not create a {name} strategy for type [{strategy_type}]."
                    )))
                }
            },
        };

        self.manufactured.set(self.manufactured.get() + 1);
        tracing::debug!(strategy = %name, r#type = %strategy_type, "created strategy");
        Ok(strategy)
    }

    fn load_plugin(
        &self,
        definition: &PvlObject,
        plugin: &PvlGroup,
        globals: &[SharedResource],
    ) -> Result<Box<dyn Strategy>> {
        let first = |key: &str| plugin.keyword(key).and_then(Keyword::first).map(str::to_string);
        let library = first("Library")
            .ok_or_else(|| MinerError::Config("Plugin group requires a Library keyword".into()))?;
        let routine = first("Routine")
            .ok_or_else(|| MinerError::Config("Plugin group requires a Routine keyword".into()))?;

        let mut dirs = vec![".".to_string()];
        for key in ["StrategyPluginPath", "PluginPath"] {
            if let Some(keyword) = plugin.keyword(key) {
                dirs.extend(keyword.values.iter().cloned());
            }
        }
        for global in globals {
            dirs.extend(global.all_values("StrategyPluginPath"));
        }

        let mut tried = Vec::new();
        for dir in &dirs {
            let candidate = normalize(&Path::new(dir).join(&library));
            if let Some(lib) = self.plugins.iter().find(|p| p.path == candidate) {
                let constructor = lib.routine(&routine).ok_or_else(|| {
                    MinerError::Config(format!(
                        "Unable to resolve Routine name [{routine}] in Strategy plugin [{}]",
                        candidate.display()
                    ))
                })?;
                tracing::debug!(library = %candidate.display(), routine = %routine, "loaded strategy plugin");
                return constructor(definition, globals, self);
            }
            tried.push(candidate.display().to_string());
        }
        Err(MinerError::Config(format!(
            "Cannot find/load Strategy plugin library {library}. Tried: {}",
            tried.join(", ")
        )))
    }
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// A `Parameters` resource built from `KEY=VALUE` pairs.
pub fn parameters_resource<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> SharedResource {
    let params = Resource::shared("Parameters");
    for (key, value) in pairs {
        params.add(key, value);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyCore;

    struct Marker {
        core: StrategyCore,
    }

    impl Strategy for Marker {
        fn core(&self) -> &StrategyCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut StrategyCore {
            &mut self.core
        }
    }

    fn marker(d: &PvlObject, g: &[SharedResource], f: &StrategyFactory) -> Result<Box<dyn Strategy>> {
        Ok(Box::new(Marker {
            core: StrategyCore::new(d, g, f.geometry_factory())?,
        }))
    }

    fn strategy(text: &str) -> PvlObject {
        miner_pvl::parse(text)
            .unwrap()
            .object("strategy")
            .unwrap()
            .clone()
    }

    #[test]
    fn default_registry_has_builtins() {
        let reg = default_registry();
        for t in [
            "filter", "CALCULATOR", "Limit", "stereopair", "RunCommand", "gisunion", "CsvReader",
        ] {
            assert!(reg.has(t), "{t}");
        }
        assert_eq!(reg.types().len(), 16);
    }

    #[test]
    fn create_counts_and_resolves_case_insensitively() {
        let mut factory = StrategyFactory::with_registry(StrategyRegistry::new());
        factory.registry_mut().register("Marker", marker);
        let s = factory
            .create(&strategy("Object = Strategy\n Name = m\n Type = MARKER\nEnd_Object"), &[])
            .unwrap();
        assert_eq!(s.name(), "m");
        assert_eq!(factory.manufactured(), 1);
    }

    #[test]
    fn unknown_and_missing_type() {
        let factory = StrategyFactory::new();
        let err = factory
            .create(&strategy("Object = Strategy\n Name = x\n Type = Bogus\nEnd_Object"), &[])
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Configuration error: Could not create a x strategy for type [Bogus]."
        );

        let err = factory
            .create(&strategy("Object = Strategy\n Name = x\nEnd_Object"), &[])
            .err()
            .unwrap();
        assert!(err.to_string().contains("Strategy Type does not exist"));
        assert_eq!(factory.manufactured(), 0);
    }

    #[test]
    fn required_parameters_reported_together() {
        let factory = StrategyFactory::new();
        let doc = miner_pvl::parse(
            "Object = Miner\n RequiredParameters = (Alpha, Beta, Gamma)\nEnd_Object",
        )
        .unwrap();
        let miner = doc.object("miner").unwrap();
        let g = parameters_resource([("beta", "1")]);
        let err = factory.build_run(miner, &[g]).err().unwrap();
        assert!(err
            .to_string()
            .ends_with("but they were not found: Alpha, Gamma"));
    }

    #[test]
    fn factory_globals_come_first() {
        let mut factory = StrategyFactory::new();
        factory.add_global(parameters_resource([("Alpha", "1")]));
        let doc = miner_pvl::parse("Object = Miner\n RequiredParameters = Alpha\nEnd_Object").unwrap();
        assert!(factory.build_run(doc.object("miner").unwrap(), &[]).unwrap().is_empty());
    }

    #[test]
    fn plugin_resolution() {
        let mut factory = StrategyFactory::with_registry(StrategyRegistry::new());
        factory.register_plugin(PluginLibrary::new("plugins/libextra.so").with_routine("makeMarker", marker));

        let ok = strategy(
            "Object = Strategy\n Name = p\n Type = Extra\n Group = Plugin\n \
             PluginPath = plugins\n Library = libextra.so\n Routine = makeMarker\n End_Group\nEnd_Object",
        );
        assert_eq!(factory.create(&ok, &[]).unwrap().name(), "p");

        let bad_routine = strategy(
            "Object = Strategy\n Name = p\n Type = Extra\n Group = Plugin\n \
             PluginPath = plugins\n Library = libextra.so\n Routine = nope\n End_Group\nEnd_Object",
        );
        let msg = factory.create(&bad_routine, &[]).err().unwrap().to_string();
        assert!(msg.contains("Failed to load p Strategy plugin!"));
        assert!(msg.contains("Unable to resolve Routine name [nope]"));

        let missing = strategy(
            "Object = Strategy\n Name = p\n Type = Extra\n Group = Plugin\n \
             Library = libother.so\n Routine = makeMarker\n End_Group\nEnd_Object",
        );
        let msg = factory.create(&missing, &[]).err().unwrap().to_string();
        assert!(msg.contains("Cannot find/load Strategy plugin library libother.so"));
    }

    #[test]
    fn plugin_path_from_globals() {
        let mut factory = StrategyFactory::with_registry(StrategyRegistry::new());
        factory.register_plugin(PluginLibrary::new("/opt/miner/libx.so").with_routine("make", marker));
        let g = parameters_resource([("StrategyPluginPath", "/opt/miner")]);
        let def = strategy(
            "Object = Strategy\n Name = p\n Type = X\n Group = Plugin\n \
             Library = libx.so\n Routine = make\n End_Group\nEnd_Object",
        );
        assert!(factory.create(&def, &[g]).is_ok());
    }

    #[test]
    fn build_run_file_requires_miner_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.conf");
        std::fs::write(&path, "Object = Other\nEnd_Object\n").unwrap();
        let err = StrategyFactory::new().build_run_file(&path, &[]).err().unwrap();
        assert!(err.to_string().contains("does not contain Miner strategies object"));
    }
}
