//! Built-in strategy implementations.

pub mod asset_sidebar;
pub mod calculator;
pub mod csv_reader;
pub mod csv_writer;
pub mod filter;
pub mod gis_intersect;
pub mod gis_overlap;
pub mod gis_union;
pub mod is_numeric;
pub mod numerical_sort;
pub mod pvl_reader;
pub mod resource_manager;
pub mod run_command;
pub mod sidebar;
pub mod stereo_pair;

pub use asset_sidebar::AssetSidebarStrategy;
pub use calculator::{CalculatorStrategy, LimitStrategy};
pub use csv_reader::CsvReaderStrategy;
pub use csv_writer::CsvWriterStrategy;
pub use filter::FilterStrategy;
pub use gis_intersect::GisIntersectStrategy;
pub use gis_overlap::{GisOverlapStrategy, NoPairHooks, OverlapMerge, PairHooks};
pub use gis_union::GisUnionStrategy;
pub use is_numeric::IsNumericStrategy;
pub use numerical_sort::NumericalSortStrategy;
pub use pvl_reader::PvlReaderStrategy;
pub use resource_manager::{ResourceManagerStrategy, ResourceOperation};
pub use run_command::RunCommandStrategy;
pub use sidebar::{NoHooks, SidebarHooks, SidebarStrategy};
pub use stereo_pair::{Constraint, StereoPairStrategy};

use miner_types::{MinerError, Result};

use crate::registry::StrategyFactory;
use crate::strategy::{Strategy, StrategyCore};

/// Nested strategies from `<config_key>` (a run file, with `<config_key>Args`)
/// or from an embedded object named `object_name`.
pub(crate) fn nested_strategies(
    core: &StrategyCore,
    factory: &StrategyFactory,
    config_key: &str,
    object_name: &str,
) -> Result<Option<Vec<Box<dyn Strategy>>>> {
    let config = core.translate_keyword_args(config_key, core.globals(), "");
    if !config.is_empty() {
        core.debug(&format!("loading nested strategies from {config}"));
        return factory.build_run_file(&config, core.globals()).map(Some);
    }
    match core.definition().object(object_name) {
        Some(miner) => factory.build_run(miner, core.globals()).map(Some),
        None => Ok(None),
    }
}

/// Parse a keyword whose value must be one of `options` (case-insensitive).
pub(crate) fn choice(
    core: &StrategyCore,
    key: &str,
    default: &str,
    options: &[&str],
) -> Result<String> {
    let value = core.keys().value_or(key, default);
    let lower = value.to_ascii_lowercase();
    if options.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(MinerError::Config(format!(
            "{key} = {value} is not a recognized/valid option for strategy [{}] (expected one of {})",
            core.name(),
            options.join(", ")
        )))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by strategy unit tests.

    use miner_pvl::PvlObject;
    use miner_types::{Resource, ResourceList, SharedResource};

    use crate::registry::StrategyFactory;
    use crate::strategy::Strategy;

    /// The first `Object = Strategy` of a PVL snippet.
    pub fn definition(text: &str) -> PvlObject {
        let doc = miner_pvl::parse(text).expect("valid PVL");
        doc.object("strategy").expect("Strategy object").clone()
    }

    pub fn build(text: &str) -> Box<dyn Strategy> {
        StrategyFactory::new()
            .create(&definition(text), &[])
            .unwrap_or_else(|e| panic!("build failed: {e}"))
    }

    /// Records named `r0..` with `key` set to each value.
    pub fn records(key: &str, values: &[&str]) -> ResourceList {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let r = Resource::shared(format!("r{i}"));
                r.add(key, *v);
                r
            })
            .collect()
    }

    pub fn names(list: &[SharedResource]) -> Vec<String> {
        list.iter().map(|r| r.name()).collect()
    }

    pub fn active_names(list: &[SharedResource]) -> Vec<String> {
        list.iter().filter(|r| r.is_active()).map(|r| r.name()).collect()
    }
}
