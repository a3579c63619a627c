//! The `Strategy` trait, the shared `StrategyCore` state every strategy
//! carries, and the helpers strategies use for keyword substitution,
//! composites, geometry import and set bookkeeping.

use std::rc::Rc;

use miner_pvl::PvlObject;
use miner_types::{
    to_bool, to_double, Geometry, GeometryFactory, Keyword, KeywordMap, MinerError, Resource,
    ResourceList, Result, SharedResource,
};
use regex::{NoExpand, RegexBuilder};

use crate::gis::EnvelopeIndex;
use crate::progress::Progress;

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

/// A named step of a miner run.
///
/// Per-record strategies override [`Strategy::apply_one`] and inherit the
/// set-level [`Strategy::apply`]; strategies that need the whole set (sorts,
/// pairing, report writers) override `apply` instead.
pub trait Strategy {
    fn core(&self) -> &StrategyCore;
    fn core_mut(&mut self) -> &mut StrategyCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn strategy_type(&self) -> &str {
        self.core().strategy_type()
    }

    fn description(&self) -> String {
        self.core().description()
    }

    /// Apply to a record set and return the strategy-specific count.
    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        apply_to_resources(self, resources, globals)
    }

    /// Apply to one record. Returning 0 does not discard the record; a
    /// strategy that rejects a record discards it explicitly.
    fn apply_one(&mut self, resource: &SharedResource, globals: &[SharedResource]) -> Result<usize> {
        let _ = globals;
        tracing::trace!(strategy = %self.name(), resource = %resource.name(), "no-op apply");
        Ok(1)
    }

    fn total_processed(&self) -> usize {
        self.core().total_processed()
    }
}

/// Run `apply_one` over every active record (every record when
/// `ApplyToDiscarded` is set), summing the results.
pub fn apply_to_resources<S: Strategy + ?Sized>(
    strategy: &mut S,
    resources: &mut ResourceList,
    globals: &[SharedResource],
) -> Result<usize> {
    let apply_discarded = strategy.core().apply_discarded();
    let steps = if apply_discarded {
        resources.len()
    } else {
        count_active(resources)
    };
    strategy.core_mut().init_progress(steps);

    let mut result = 0;
    for resource in resources.iter() {
        if resource.is_discarded() && !apply_discarded {
            continue;
        }
        result += strategy.apply_one(resource, globals)?;
        strategy.core_mut().processed();
    }
    strategy
        .core()
        .debug(&format!("applied to {steps} resources, result {result}"));
    Ok(result)
}

/// Restrict `apply_one` to active records whose geometry intersects `geom`.
///
/// Every other active record is discarded. `GisMethod` selects a direct
/// pairwise test (`direct`) or an `EnvelopeIndex` query (`rtree`). The index
/// prunes by envelope with a linear scan, so `rtree` names the method only.
pub fn apply_to_intersected_geometry<S: Strategy + ?Sized>(
    strategy: &mut S,
    resources: &mut ResourceList,
    geom: &dyn Geometry,
    globals: &[SharedResource],
) -> Result<usize> {
    let method = strategy
        .core()
        .keys()
        .value_or("GisMethod", "direct")
        .to_ascii_lowercase();
    if method != "direct" && method != "rtree" {
        return Err(MinerError::Config(format!(
            "GisMethod = {method} is not a recognized option (direct or rtree)"
        )));
    }
    if let Some(reason) = geom.invalid_reason() {
        return Err(MinerError::Geometry(format!(
            "{} intersection geometry is invalid: {reason}",
            strategy.name()
        )));
    }

    let actives = active_list(resources);
    let hits = |r: &SharedResource| {
        r.geometry()
            .is_some_and(|g| g.is_valid() && g.intersects(geom))
    };
    let overlaps: ResourceList = match (method.as_str(), geom.bounds()) {
        ("rtree", Some(bounds)) => {
            let mut index = EnvelopeIndex::new();
            for resource in actives.iter().filter(|r| r.has_valid_geometry()) {
                if let Some(b) = resource.geometry().and_then(|g| g.bounds()) {
                    index.insert(b, Rc::clone(resource));
                }
            }
            index.query(&bounds).into_iter().filter(|r| hits(r)).collect()
        }
        ("rtree", None) => Vec::new(),
        _ => actives.iter().filter(|r| hits(r)).cloned().collect(),
    };
    strategy.core().debug(&format!(
        "{} of {} active resources intersect ({method})",
        overlaps.len(),
        actives.len()
    ));

    deactivate_list(&actives);
    strategy.core_mut().init_progress(overlaps.len());
    let mut result = 0;
    for resource in &overlaps {
        resource.activate();
        result += strategy.apply_one(resource, globals)?;
        strategy.core_mut().processed();
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// StrategyCore
// ---------------------------------------------------------------------------

/// What to do with a record whose geometry cannot be built or repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidGeometryAction {
    /// Discard the record.
    Disable,
    /// Leave the record as is, without a geometry.
    Continue,
    /// Fail the run.
    Error,
}

impl InvalidGeometryAction {
    /// Unrecognized values fall back to `Disable`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "continue" => InvalidGeometryAction::Continue,
            "error" => InvalidGeometryAction::Error,
            _ => InvalidGeometryAction::Disable,
        }
    }
}

/// State shared by every strategy: identity, definition, flags, the
/// processed counter and the geometry backend.
pub struct StrategyCore {
    name: String,
    strategy_type: String,
    definition: PvlObject,
    keys: KeywordMap,
    globals: ResourceList,
    geometry: Rc<dyn GeometryFactory>,
    apply_discarded: bool,
    debug: bool,
    total: usize,
    progress: Option<Progress>,
}

impl std::fmt::Debug for StrategyCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyCore")
            .field("name", &self.name)
            .field("strategy_type", &self.strategy_type)
            .field("geometry", &self.geometry.name())
            .field("apply_discarded", &self.apply_discarded)
            .field("total", &self.total)
            .finish()
    }
}

impl StrategyCore {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        geometry: Rc<dyn GeometryFactory>,
    ) -> Result<Self> {
        let keys = definition.definition_map();
        let name = keys.value_or("Name", "UNKNOWN");
        let strategy_type = keys.value_or("Type", "UNKNOWN");
        let mut core = Self {
            name,
            strategy_type,
            definition: definition.clone(),
            keys,
            globals: globals.to_vec(),
            geometry,
            apply_discarded: false,
            debug: false,
            total: 0,
            progress: None,
        };
        core.apply_discarded = core.bool_or("ApplyToDiscarded", false)?;
        core.debug = core.bool_or("Debug", false)?;
        if core.bool_or("ShowProgress", false)? {
            core.progress = Some(Progress::new(format!(
                "{}::{}",
                core.strategy_type, core.name
            )));
        }
        Ok(core)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy_type(&self) -> &str {
        &self.strategy_type
    }

    pub fn description(&self) -> String {
        let configured = self.keys.value_or("Description", "");
        if configured.is_empty() {
            format!(
                "Strategy::{} is running a {} algorithm.",
                self.name, self.strategy_type
            )
        } else {
            configured
        }
    }

    pub fn definition(&self) -> &PvlObject {
        &self.definition
    }

    /// Object and group keywords of the definition, flattened.
    pub fn keys(&self) -> &KeywordMap {
        &self.keys
    }

    /// Globals the strategy was built with.
    pub fn globals(&self) -> &[SharedResource] {
        &self.globals
    }

    pub fn geometry_factory(&self) -> &Rc<dyn GeometryFactory> {
        &self.geometry
    }

    pub fn apply_discarded(&self) -> bool {
        self.apply_discarded
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    // ------------------------------------------------------------------
    // Definition access
    // ------------------------------------------------------------------

    /// A keyword that must be present in the definition.
    pub fn required(&self, key: &str) -> Result<String> {
        self.keys.get(key, 0).map_err(|_| {
            MinerError::Config(format!(
                "{} strategy [{}] requires keyword {key}",
                self.strategy_type, self.name
            ))
        })
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.keys.keyword(key).and_then(Keyword::first) {
            Some(value) => to_bool(value).map_err(|_| {
                MinerError::Config(format!(
                    "{key} = {value} in strategy [{}] is not a valid boolean",
                    self.name
                ))
            }),
            None => Ok(default),
        }
    }

    pub fn double_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.keys.keyword(key).and_then(Keyword::first) {
            Some(value) => to_double(value).map_err(|_| {
                MinerError::Config(format!(
                    "{key} = {value} in strategy [{}] is not a valid number",
                    self.name
                ))
            }),
            None => Ok(default),
        }
    }

    /// Diagnostic message; raised to `debug` level when `Debug = true`.
    pub fn debug(&self, message: &str) {
        if self.debug {
            tracing::debug!(strategy = %self.name, r#type = %self.strategy_type, "{message}");
        } else {
            tracing::trace!(strategy = %self.name, r#type = %self.strategy_type, "{message}");
        }
    }

    // ------------------------------------------------------------------
    // Processed counter and progress
    // ------------------------------------------------------------------

    /// Reset the processed count and size the progress reporter.
    pub fn init_progress(&mut self, steps: usize) {
        self.total = 0;
        if let Some(progress) = self.progress.as_mut() {
            progress.set_maximum_steps(steps);
            if steps > 0 {
                progress.check_status();
            }
        }
    }

    /// Count one processed record.
    pub fn processed(&mut self) -> usize {
        self.total += 1;
        if let Some(progress) = self.progress.as_mut() {
            progress.check_status();
        }
        self.total
    }

    pub fn reset_processed(&mut self) {
        self.total = 0;
    }

    pub fn total_processed(&self) -> usize {
        self.total
    }

    // ------------------------------------------------------------------
    // Keyword translation
    // ------------------------------------------------------------------

    /// Read `<base>` and substitute its `%N` placeholders from `<base>Args`.
    ///
    /// When `<base>Keyword` is present it names the single argument and the
    /// template defaults to `%1`.
    pub fn translate_keyword_args(
        &self,
        base: &str,
        globals: &[SharedResource],
        default: &str,
    ) -> String {
        let indirect = format!("{base}Keyword");
        let (value, args) = if self.keys.exists(&indirect) {
            (
                self.keys.get_or(base, "%1", 0),
                vec![self.keys.value_or(&indirect, "")],
            )
        } else {
            (
                self.keys.get_or(base, default, 0),
                self.keys.all_values(&format!("{base}Args")),
            )
        };
        process_args(&value, &args, globals, default)
    }

    /// Copy every `PropagateKeywords` key present in `source` to `target`.
    pub fn propagate_keys(&self, source: &Resource, target: &Resource) -> usize {
        let mut copied = 0;
        for key in self.keys.all_values("PropagateKeywords") {
            if let Some(keyword) = source.keyword(&key) {
                target.add_keyword(keyword);
                copied += 1;
            }
        }
        copied
    }

    /// Merge two records into a new one named `A_B`. Every copied key gets
    /// its side's suffix; `PropagateKeywords` restricts which keys are copied.
    pub fn composite(
        &self,
        a: &Resource,
        b: &Resource,
        suffixes: (&str, &str),
    ) -> SharedResource {
        let composite = Resource::shared(format!("{}_{}", a.name(), b.name()));
        let propagate = self.keys.all_values("PropagateKeywords");
        for (side, suffix) in [(a, suffixes.0), (b, suffixes.1)] {
            if propagate.is_empty() {
                for keyword in side.keys().iter() {
                    composite.add_keyword(Keyword::with_values(
                        format!("{}{suffix}", keyword.name),
                        keyword.values.clone(),
                    ));
                }
            } else {
                for key in &propagate {
                    if let Some(keyword) = side.keyword(key) {
                        composite.add_keyword(Keyword::with_values(
                            format!("{}{suffix}", keyword.name),
                            keyword.values,
                        ));
                    }
                }
            }
        }
        composite
    }

    // ------------------------------------------------------------------
    // Geometry import
    // ------------------------------------------------------------------

    /// Build the resource's geometry from the `Gis*` keywords.
    ///
    /// Returns `Ok(false)` when no geometry source is configured or the
    /// geometry is rejected under `InvalidGeometryAction = disable|continue`.
    pub fn import_geometry(
        &self,
        resource: &SharedResource,
        globals: &[SharedResource],
    ) -> Result<bool> {
        let mut source = self.keys.value_or("GisGeometry", "");
        let reference = ["GisGeometryRef", "GisGeometryKey"]
            .into_iter()
            .find(|k| self.keys.exists(k))
            .map(|k| self.keys.value_or(k, ""));
        if let Some(key) = reference.filter(|k| !k.is_empty()) {
            if !resource.is_null(&key, 0) {
                source = resource.value(&key, 0)?;
                if self.bool_or("RemoveGisKeywordAfterImport", false)? {
                    resource.erase(&key);
                }
            }
        }
        if source.is_empty() {
            return Ok(false);
        }

        let repair = self.bool_or("RepairInvalidGeometry", true)?;
        let action =
            InvalidGeometryAction::parse(&self.keys.value_or("InvalidGeometryAction", "disable"));
        let pool = get_globals(resource, globals);
        let source = process_args(&source, &self.keys.all_values("GisGeometryArgs"), &pool, "");
        let gis_type = self.keys.value_or("GisType", "wkt");

        let geometry = match self.geometry.create(&source, &gis_type) {
            Ok(geometry) => geometry,
            Err(err) => return self.reject_geometry(resource, action, &err.to_string()),
        };
        let geometry = match geometry.invalid_reason() {
            None => geometry,
            Some(reason) => {
                let repaired = if repair {
                    geometry.buffer(0.0).ok().filter(|g| g.is_valid())
                } else {
                    None
                };
                match repaired {
                    Some(fixed) => {
                        self.debug(&format!(
                            "repaired invalid geometry of {} ({reason})",
                            resource.name()
                        ));
                        fixed
                    }
                    None => return self.reject_geometry(resource, action, &reason),
                }
            }
        };

        let original_points = geometry.points();
        let tolerance = self.translate_keyword_args("GisSimplifyTolerance", &pool, "");
        let geometry = if tolerance.is_empty() {
            geometry
        } else {
            let tol = to_double(&tolerance).map_err(|_| {
                MinerError::Config(format!(
                    "GisSimplifyTolerance = {tolerance} in strategy [{}] is not a number",
                    self.name
                ))
            })?;
            geometry.simplify(tol)?
        };

        let points_key = self.translate_keyword_args("GisGeometryPointsKey", &pool, "");
        if !points_key.is_empty() {
            resource.add(&points_key, geometry.points().to_string());
            resource.add(&format!("{points_key}Original"), original_points.to_string());
            let tolerance = if tolerance.is_empty() { "0".to_string() } else { tolerance };
            resource.add(&format!("{points_key}Tolerance"), tolerance);
        }
        resource.set_geometry(Some(geometry));
        Ok(true)
    }

    fn reject_geometry(
        &self,
        resource: &SharedResource,
        action: InvalidGeometryAction,
        reason: &str,
    ) -> Result<bool> {
        match action {
            InvalidGeometryAction::Continue => {
                self.debug(&format!("skipping geometry of {}: {reason}", resource.name()));
                Ok(false)
            }
            InvalidGeometryAction::Disable => {
                self.debug(&format!("discarding {}: {reason}", resource.name()));
                resource.discard();
                Ok(false)
            }
            InvalidGeometryAction::Error => Err(MinerError::Geometry(format!(
                "{} failed to construct geometry - Error: {reason}",
                resource.name()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// The lookup pool for one record: the record itself, then the globals.
pub fn get_globals(resource: &SharedResource, globals: &[SharedResource]) -> ResourceList {
    let mut pool = Vec::with_capacity(globals.len() + 1);
    pool.push(Rc::clone(resource));
    pool.extend(globals.iter().cloned());
    pool
}

/// Value `index` of `target` from the first pool entry that has it.
pub fn find_replacement(
    target: &str,
    globals: &[SharedResource],
    index: usize,
    default: &str,
) -> String {
    globals
        .iter()
        .find(|g| g.count(target) > index)
        .map(|g| g.get_or(target, default, index))
        .unwrap_or_else(|| default.to_string())
}

/// Substitute `%1..%N` in `value` with the pool values of `args`, highest
/// index first so `%10` is never read as `%1` followed by `0`.
pub fn process_args(
    value: &str,
    args: &[String],
    globals: &[SharedResource],
    default: &str,
) -> String {
    let mut out = value.to_string();
    for (i, arg) in args.iter().enumerate().rev() {
        let replacement = find_replacement(arg, globals, 0, default);
        out = scan_and_replace(&out, &format!("%{}", i + 1), &replacement);
    }
    out
}

/// Case-insensitive replace-all of a literal target.
pub fn scan_and_replace(input: &str, target: &str, replacement: &str) -> String {
    if target.is_empty() {
        return input.to_string();
    }
    match RegexBuilder::new(&regex::escape(target))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.replace_all(input, NoExpand(replacement)).into_owned(),
        Err(_) => input.to_string(),
    }
}

/// Split an operator specification such as `DeleteAsset::Name`.
pub fn qualifiers(text: &str, delimiter: &str) -> Vec<String> {
    text.split(delimiter)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Set bookkeeping
// ---------------------------------------------------------------------------

pub fn count_active(resources: &[SharedResource]) -> usize {
    resources.iter().filter(|r| r.is_active()).count()
}

pub fn count_discarded(resources: &[SharedResource]) -> usize {
    resources.iter().filter(|r| r.is_discarded()).count()
}

/// The active records, sharing handles with `resources`.
pub fn active_list(resources: &[SharedResource]) -> ResourceList {
    resources.iter().filter(|r| r.is_active()).cloned().collect()
}

pub fn activate_list(resources: &[SharedResource]) {
    resources.iter().for_each(|r| r.activate());
}

pub fn deactivate_list(resources: &[SharedResource]) {
    resources.iter().for_each(|r| r.discard());
}

/// New handles over the same data whose status is tracked separately.
pub fn copy_list(resources: &[SharedResource]) -> ResourceList {
    resources.iter().map(|r| r.copy()).collect()
}

/// Independent, active copies of every record.
pub fn clone_list(resources: &[SharedResource], with_assets: bool) -> ResourceList {
    resources
        .iter()
        .map(|r| r.deep_clone(&r.name(), with_assets))
        .collect()
}

/// Every record-set asset `name` of `resources`, concatenated.
pub fn asset_resource_list(resources: &[SharedResource], name: &str) -> ResourceList {
    resources
        .iter()
        .filter_map(|r| r.asset_list(name).ok())
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gis::{EnvelopeFactory, EnvelopeGeometry};
    use miner_types::Bounds;

    fn core_from(text: &str) -> StrategyCore {
        let doc = miner_pvl::parse(text).unwrap();
        let def = doc.object("strategy").unwrap();
        StrategyCore::new(def, &[], Rc::new(EnvelopeFactory)).unwrap()
    }

    struct Counter {
        core: StrategyCore,
    }

    impl Strategy for Counter {
        fn core(&self) -> &StrategyCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut StrategyCore {
            &mut self.core
        }
        fn apply_one(&mut self, resource: &SharedResource, _: &[SharedResource]) -> Result<usize> {
            resource.append("Seen", "yes");
            Ok(1)
        }
    }

    #[test]
    fn core_reads_identity_and_flags() {
        let core = core_from(
            "Object = Strategy\n Name = Keep\n Type = Filter\n ApplyToDiscarded = yes\nEnd_Object",
        );
        assert_eq!(core.name(), "Keep");
        assert_eq!(core.strategy_type(), "Filter");
        assert!(core.apply_discarded());
        assert_eq!(
            core.description(),
            "Strategy::Keep is running a Filter algorithm."
        );
    }

    #[test]
    fn bad_boolean_is_config_error() {
        let doc = miner_pvl::parse("Object = Strategy\n Name = x\n Debug = maybe\nEnd_Object").unwrap();
        let err = StrategyCore::new(doc.object("strategy").unwrap(), &[], Rc::new(EnvelopeFactory))
            .unwrap_err();
        assert!(matches!(err, MinerError::Config(_)));
    }

    #[test]
    fn default_apply_skips_discarded() {
        let mut s = Counter {
            core: core_from("Object = Strategy\n Name = c\n Type = Counter\nEnd_Object"),
        };
        let a = Resource::shared("a");
        let b = Resource::shared("b");
        b.discard();
        let mut list = vec![Rc::clone(&a), Rc::clone(&b)];
        assert_eq!(s.apply(&mut list, &[]).unwrap(), 1);
        assert_eq!(s.total_processed(), 1);
        assert!(a.exists("Seen"));
        assert!(!b.exists("Seen"));
        assert!(b.is_discarded());
    }

    #[test]
    fn apply_to_discarded_visits_everything() {
        let mut s = Counter {
            core: core_from("Object = Strategy\n Name = c\n ApplyToDiscarded = true\nEnd_Object"),
        };
        let b = Resource::shared("b");
        b.discard();
        let mut list = vec![Resource::shared("a"), Rc::clone(&b)];
        assert_eq!(s.apply(&mut list, &[]).unwrap(), 2);
        assert!(b.exists("Seen"));
    }

    #[test]
    fn process_args_substitutes_high_index_first() {
        let record = Resource::shared("r");
        for i in 1..=10 {
            record.add(&format!("K{i}"), format!("v{i}"));
        }
        let args: Vec<String> = (1..=10).map(|i| format!("K{i}")).collect();
        let out = process_args("%10 and %1", &args, &[record], "");
        assert_eq!(out, "v10 and v1");
    }

    #[test]
    fn find_replacement_scans_pool_in_order() {
        let first = Resource::shared("first");
        let second = Resource::shared("second");
        second.add("Target", "from-second");
        first.append("Multi", "0");
        second.add("Multi", "a");
        second.append("Multi", "b");
        let pool = vec![first, second];
        assert_eq!(find_replacement("target", &pool, 0, "none"), "from-second");
        assert_eq!(find_replacement("Multi", &pool, 1, "none"), "b");
        assert_eq!(find_replacement("missing", &pool, 0, "none"), "none");
    }

    #[test]
    fn translate_with_args_and_keyword_indirection() {
        let core = core_from(
            "Object = Strategy\n Name = t\n File = \"%1/%2.cub\"\n FileArgs = (Dir, Base)\n \
             Other = \"x\"\n OtherKeyword = Base\nEnd_Object",
        );
        let r = Resource::shared("r");
        r.add("Dir", "/data");
        r.add("Base", "img");
        assert_eq!(core.translate_keyword_args("File", &[Rc::clone(&r)], ""), "/data/img.cub");
        assert_eq!(core.translate_keyword_args("Other", &[Rc::clone(&r)], ""), "x");
        assert_eq!(core.translate_keyword_args("Missing", &[r], "dflt"), "dflt");
    }

    #[test]
    fn keyword_indirection_defaults_to_placeholder() {
        let core = core_from("Object = Strategy\n Name = t\n KeyKeyword = Base\nEnd_Object");
        let r = Resource::shared("r");
        r.add("Base", "img");
        assert_eq!(core.translate_keyword_args("Key", &[r], ""), "img");
    }

    #[test]
    fn scan_and_replace_ignores_case() {
        assert_eq!(scan_and_replace("a %X b %x", "%x", "$1"), "a $1 b $1");
        assert_eq!(scan_and_replace("abc", "", "z"), "abc");
    }

    #[test]
    fn qualifier_split() {
        assert_eq!(qualifiers("DeleteAsset::Foo", "::"), vec!["DeleteAsset", "Foo"]);
        assert_eq!(qualifiers("HasAsset::", "::"), vec!["HasAsset"]);
    }

    #[test]
    fn composite_suffixes_every_key() {
        let core = core_from("Object = Strategy\n Name = o\nEnd_Object");
        let a = Resource::shared("A");
        a.add("Res", "1");
        let b = Resource::shared("B");
        b.add("Res", "2");
        let c = core.composite(&a, &b, ("A", "B"));
        assert_eq!(c.name(), "A_B");
        assert_eq!(c.value("ResA", 0).unwrap(), "1");
        assert_eq!(c.value("ResB", 0).unwrap(), "2");
        assert_eq!(c.value("IdentityA", 0).unwrap(), "A");
        assert_eq!(c.value("Identity", 0).unwrap(), "A_B");
    }

    #[test]
    fn composite_respects_propagate_list() {
        let core = core_from(
            "Object = Strategy\n Name = o\n PropagateKeywords = (Res)\nEnd_Object",
        );
        let a = Resource::shared("A");
        a.add("Res", "1");
        a.add("Other", "x");
        let b = Resource::shared("B");
        let c = core.composite(&a, &b, ("_1", "_2"));
        assert!(c.exists("Res_1"));
        assert!(!c.exists("Other_1"));
        assert!(!c.exists("Res_2"));

        let target = Resource::new("t");
        assert_eq!(core.propagate_keys(&a, &target), 1);
        assert_eq!(target.value("res", 0).unwrap(), "1");
    }

    #[test]
    fn import_geometry_from_reference_with_points_key() {
        let core = core_from(
            "Object = Strategy\n Name = g\n GisGeometryRef = Footprint\n \
             GisGeometryPointsKey = Points\nEnd_Object",
        );
        let r = Resource::shared("r");
        r.add("Footprint", "POLYGON((0 0, 2 0, 2 2, 0 2, 0 0))");
        assert!(core.import_geometry(&r, &[]).unwrap());
        assert!(r.has_valid_geometry());
        assert_eq!(r.value("Points", 0).unwrap(), "5");
        assert_eq!(r.value("PointsOriginal", 0).unwrap(), "5");
        assert_eq!(r.value("PointsTolerance", 0).unwrap(), "0");
        assert!(r.exists("Footprint"));
    }

    #[test]
    fn import_geometry_with_args_and_removal() {
        let core = core_from(
            "Object = Strategy\n Name = g\n GisGeometry = \"ENVELOPE(%1, %2, 1, 0)\"\n \
             GisGeometryArgs = (MinX, MaxX)\nEnd_Object",
        );
        let r = Resource::shared("r");
        r.add("MinX", "0");
        r.add("MaxX", "4");
        assert!(core.import_geometry(&r, &[]).unwrap());
        let g = r.geometry().unwrap();
        assert_eq!(g.bounds(), Some(Bounds::new(0.0, 0.0, 4.0, 1.0)));

        let core = core_from(
            "Object = Strategy\n Name = g\n GisGeometryKey = Wkt\n \
             RemoveGisKeywordAfterImport = true\nEnd_Object",
        );
        let r = Resource::shared("r");
        r.add("Wkt", "POINT(1 1)");
        assert!(core.import_geometry(&r, &[]).unwrap());
        assert!(!r.exists("Wkt"));
    }

    #[test]
    fn import_geometry_without_source_is_false() {
        let core = core_from("Object = Strategy\n Name = g\n GisGeometryRef = Wkt\nEnd_Object");
        let r = Resource::shared("r");
        r.add("Wkt", "NULL");
        assert!(!core.import_geometry(&r, &[]).unwrap());
        assert!(r.is_active());
    }

    #[test]
    fn invalid_geometry_policies() {
        let broken = "POLYGON((0 0, 1 0, 1 1, 0 1))";
        let run = |action: &str, repair: &str| {
            let core = core_from(&format!(
                "Object = Strategy\n Name = g\n GisGeometry = \"{broken}\"\n \
                 RepairInvalidGeometry = {repair}\n InvalidGeometryAction = {action}\nEnd_Object"
            ));
            let r = Resource::shared("r");
            (core.import_geometry(&r, &[]), r)
        };

        let (ok, r) = run("disable", "true");
        assert!(ok.unwrap());
        assert!(r.has_valid_geometry());

        let (ok, r) = run("disable", "false");
        assert!(!ok.unwrap());
        assert!(r.is_discarded());

        let (ok, r) = run("continue", "false");
        assert!(!ok.unwrap());
        assert!(r.is_active());
        assert!(!r.has_geometry());

        let (err, _) = run("error", "false");
        assert!(matches!(err, Err(MinerError::Geometry(_))));

        let (ok, r) = run("bogus", "false");
        assert!(!ok.unwrap());
        assert!(r.is_discarded());
    }

    #[test]
    fn intersected_geometry_limits_to_hits() {
        for method in ["direct", "rtree"] {
            let mut s = Counter {
                core: core_from(&format!(
                    "Object = Strategy\n Name = c\n GisMethod = {method}\nEnd_Object"
                )),
            };
            let inside = Resource::shared("inside");
            inside.set_geometry(Some(EnvelopeGeometry::rectangle(Bounds::new(0.0, 0.0, 1.0, 1.0)).shared()));
            let outside = Resource::shared("outside");
            outside.set_geometry(Some(EnvelopeGeometry::rectangle(Bounds::new(5.0, 5.0, 6.0, 6.0)).shared()));
            let bare = Resource::shared("bare");
            let mut list = vec![Rc::clone(&inside), Rc::clone(&outside), Rc::clone(&bare)];
            let query = EnvelopeGeometry::rectangle(Bounds::new(0.5, 0.5, 2.0, 2.0));
            let n = apply_to_intersected_geometry(&mut s, &mut list, &query, &[]).unwrap();
            assert_eq!(n, 1, "{method}");
            assert!(inside.is_active());
            assert!(outside.is_discarded());
            assert!(bare.is_discarded());
        }
    }

    #[test]
    fn list_helpers() {
        let a = Resource::shared("a");
        let b = Resource::shared("b");
        b.discard();
        let list = vec![Rc::clone(&a), Rc::clone(&b)];
        assert_eq!(count_active(&list), 1);
        assert_eq!(count_discarded(&list), 1);
        assert_eq!(active_list(&list).len(), 1);

        let copies = copy_list(&list);
        copies[1].activate();
        assert!(b.is_discarded());
        copies[0].add("Shared", "yes");
        assert!(a.exists("Shared"));

        let clones = clone_list(&list, false);
        clones[0].add("Private", "yes");
        assert!(!a.exists("Private"));
        assert!(clones[1].is_active());

        a.add_asset("Kids", miner_types::Asset::Resources(vec![Resource::shared("k")]));
        assert_eq!(asset_resource_list(&list, "kids").len(), 1);
    }
}
