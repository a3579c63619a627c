//! Runs a built strategy list over a record set in declaration order.

use std::path::Path;

use miner_pvl::PvlObject;
use miner_types::{ResourceList, Result, SharedResource};
use serde::Serialize;

use crate::registry::StrategyFactory;
use crate::strategy::{count_active, Strategy};

/// Outcome of one strategy application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub name: String,
    pub strategy_type: String,
    /// The strategy's return value.
    pub result: usize,
    pub processed: usize,
    /// Records in the set after the step.
    pub total: usize,
    pub active: usize,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    pub total: usize,
    pub active: usize,
    pub discarded: usize,
}

/// Apply each strategy in turn. The first error aborts, tagged with the
/// strategy that raised it.
pub fn apply_all(
    strategies: &mut [Box<dyn Strategy>],
    resources: &mut ResourceList,
    globals: &[SharedResource],
) -> Result<Vec<StepReport>> {
    let mut steps = Vec::with_capacity(strategies.len());
    for strategy in strategies.iter_mut() {
        tracing::debug!(strategy = %strategy.name(), "{}", strategy.description());
        let result = strategy
            .apply(resources, globals)
            .map_err(|err| err.in_strategy(strategy.name(), strategy.strategy_type()))?;
        let step = StepReport {
            name: strategy.name().to_string(),
            strategy_type: strategy.strategy_type().to_string(),
            result,
            processed: strategy.total_processed(),
            total: resources.len(),
            active: count_active(resources),
        };
        tracing::debug!(
            strategy = %step.name,
            result = step.result,
            processed = step.processed,
            active = step.active,
            total = step.total,
            "strategy applied"
        );
        steps.push(step);
    }
    Ok(steps)
}

/// The top-level strategy list of a miner run.
pub struct MinerRunner {
    strategies: Vec<Box<dyn Strategy>>,
}

impl MinerRunner {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Build from a `Miner` object.
    pub fn from_config(
        factory: &StrategyFactory,
        miner: &PvlObject,
        globals: &[SharedResource],
    ) -> Result<Self> {
        Ok(Self::new(factory.build_run(miner, globals)?))
    }

    /// Build from a file containing a `Miner` object.
    pub fn from_file(
        factory: &StrategyFactory,
        path: impl AsRef<Path>,
        globals: &[SharedResource],
    ) -> Result<Self> {
        Ok(Self::new(factory.build_run_file(path, globals)?))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    pub fn run(
        &mut self,
        resources: &mut ResourceList,
        globals: &[SharedResource],
    ) -> Result<RunReport> {
        tracing::info!(
            strategies = self.strategies.len(),
            resources = resources.len(),
            "starting miner run"
        );
        let steps = apply_all(&mut self.strategies, resources, globals)?;
        let active = count_active(resources);
        let report = RunReport {
            steps,
            total: resources.len(),
            active,
            discarded: resources.len() - active,
        };
        tracing::info!(
            total = report.total,
            active = report.active,
            discarded = report.discarded,
            "miner run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_types::{MinerError, Resource};

    fn runner(text: &str) -> MinerRunner {
        let doc = miner_pvl::parse(text).unwrap();
        MinerRunner::from_config(&StrategyFactory::new(), doc.object("miner").unwrap(), &[]).unwrap()
    }

    #[test]
    fn runs_in_order_and_reports() {
        let mut r = runner(
            r#"
            Object = Miner
              Object = Strategy
                Name = Double
                Type = Calculator
                Equation = "Value * 2"
                Result = Doubled
              End_Object
              Object = Strategy
                Name = Big
                Type = Limit
                Equation = "Doubled > 5"
              End_Object
            End_Object
            "#,
        );
        let mut list: ResourceList = (1..=4)
            .map(|i| {
                let res = Resource::shared(format!("r{i}"));
                res.add("Value", i.to_string());
                res
            })
            .collect();
        let report = r.run(&mut list, &[]).unwrap();
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[0].processed, 4);
        assert_eq!(report.steps[1].result, 2);
        assert_eq!(report.active, 2);
        assert_eq!(report.discarded, 2);
        assert_eq!(list[3].value("Doubled", 0).unwrap(), "8");
    }

    #[test]
    fn errors_name_the_strategy() {
        let mut r = runner(
            r#"
            Object = Miner
              Object = Strategy
                Name = SortIt
                Type = NumericalSort
                SortKey = Score
              End_Object
            End_Object
            "#,
        );
        let mut list = vec![Resource::shared("a"), Resource::shared("b")];
        list[0].add("Score", "1");
        let err = r.run(&mut list, &[]).unwrap_err();
        match err {
            MinerError::Strategy { name, strategy_type, .. } => {
                assert_eq!(name, "SortIt");
                assert_eq!(strategy_type, "NumericalSort");
            }
            other => panic!("expected Strategy error, got {other:?}"),
        }
    }

    #[test]
    fn report_serializes() {
        let report = RunReport {
            steps: vec![],
            total: 2,
            active: 1,
            discarded: 1,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["active"], 1);
    }
}
