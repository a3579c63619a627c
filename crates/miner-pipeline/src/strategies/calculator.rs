//! `Calculator` and `Limit`: evaluate equations per record.

use miner_pvl::{PvlGroup, PvlObject};
use miner_types::{Keyword, MinerError, Result, SharedResource};

use crate::calculator::{format_number, Calculator, ResourcePool};
use crate::registry::StrategyFactory;
use crate::strategy::{get_globals, process_args, Strategy, StrategyCore};

/// Evaluates `Equation` values in order, storing each into the matching
/// `Result` keyword. Any evaluation failure discards the record.
pub struct CalculatorStrategy {
    core: StrategyCore,
    equations: Vec<Calculator>,
    results: Vec<String>,
    initializers: Option<PvlGroup>,
}

impl CalculatorStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let equations = core
            .keys()
            .all_values("Equation")
            .iter()
            .map(|text| {
                Calculator::compile(text).map_err(|err| {
                    MinerError::Config(format!(
                        "Equation \"{text}\" in strategy [{}] is invalid: {err}",
                        core.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let results = core.keys().all_values("Result");
        if results.len() > equations.len() {
            return Err(MinerError::Config(format!(
                "strategy [{}] has {} Result keys but only {} equations",
                core.name(),
                results.len(),
                equations.len()
            )));
        }
        Ok(Self {
            core,
            equations,
            results,
            initializers: definition.group("Initializers").cloned(),
        })
    }

    pub fn equations(&self) -> &[Calculator] {
        &self.equations
    }

    /// Apply the `Initializers` group to `resource`. `<Key>Args` entries
    /// supply substitution arguments for `<Key>`.
    pub fn initialize(&self, resource: &SharedResource, globals: &[SharedResource]) -> usize {
        let Some(group) = &self.initializers else {
            return 0;
        };
        let pool = get_globals(resource, globals);
        let mut count = 0;
        for keyword in &group.keywords {
            if keyword.name.to_ascii_lowercase().ends_with("args") {
                continue;
            }
            let args = group
                .keyword(&format!("{}Args", keyword.name))
                .map(|k| k.values.clone())
                .unwrap_or_default();
            let values = keyword
                .values
                .iter()
                .map(|v| process_args(v, &args, &pool, ""))
                .collect();
            resource.add_keyword(Keyword::with_values(keyword.name.clone(), values));
            count += 1;
        }
        count
    }

    /// Initialize and evaluate every equation. Returns the last result.
    pub fn calculate(
        &self,
        resource: &SharedResource,
        globals: &[SharedResource],
    ) -> Result<Option<f64>> {
        let initialized = self.initialize(resource, globals);
        if initialized > 0 {
            self.core
                .debug(&format!("{initialized} initializers applied to {}", resource.name()));
        }
        let pool = ResourcePool::new(resource, globals);
        let mut last = None;
        for (i, equation) in self.equations.iter().enumerate() {
            let value = equation.evaluate(&pool)?;
            if let Some(key) = self.results.get(i) {
                resource.add(key, format_number(value));
            }
            last = Some(value);
        }
        Ok(last)
    }

    /// `calculate`, discarding the record on a per-record failure.
    fn evaluate_or_discard(
        &self,
        resource: &SharedResource,
        globals: &[SharedResource],
    ) -> Result<Option<f64>> {
        match self.calculate(resource, globals) {
            Ok(value) => Ok(value),
            Err(err) if err.is_contained() || matches!(err, MinerError::NotFound(_)) => {
                self.core
                    .debug(&format!("{} discarded: {err}", resource.name()));
                resource.discard();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl Strategy for CalculatorStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn apply_one(&mut self, resource: &SharedResource, globals: &[SharedResource]) -> Result<usize> {
        let before = resource.is_active();
        self.evaluate_or_discard(resource, globals)?;
        Ok(usize::from(before && resource.is_active()))
    }
}

/// A calculator whose final equation gates the record: zero discards.
pub struct LimitStrategy {
    calculator: CalculatorStrategy,
}

impl LimitStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let calculator = CalculatorStrategy::new(definition, globals, factory)?;
        if calculator.equations.is_empty() {
            return Err(MinerError::Config(format!(
                "Limit strategy [{}] requires at least one Equation",
                calculator.core.name()
            )));
        }
        Ok(Self { calculator })
    }
}

impl Strategy for LimitStrategy {
    fn core(&self) -> &StrategyCore {
        &self.calculator.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.calculator.core
    }

    fn apply_one(&mut self, resource: &SharedResource, globals: &[SharedResource]) -> Result<usize> {
        match self.calculator.evaluate_or_discard(resource, globals)? {
            Some(value) if value != 0.0 => Ok(1),
            Some(_) => {
                resource.discard();
                Ok(0)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::strategies::testing::{active_names, build, definition, records};
    use miner_types::Resource;

    #[test]
    fn equations_store_results_in_order() {
        let mut s = build(
            "Object = Strategy\n Name = c\n Type = Calculator\n \
             Equation = (\"A + 1\", \"Sum * Scale\")\n Result = (Sum, Scaled)\nEnd_Object",
        );
        let mut list = records("A", &["1", "4"]);
        let g = Resource::shared("globals");
        g.add("Scale", "10");
        assert_eq!(s.apply(&mut list, &[g]).unwrap(), 2);
        assert_eq!(list[0].value("Sum", 0).unwrap(), "2");
        assert_eq!(list[1].value("Scaled", 0).unwrap(), "50");
    }

    #[test]
    fn failure_discards_whole_record() {
        let mut s = build(
            "Object = Strategy\n Name = c\n Type = Calculator\n \
             Equation = (\"Missing + 1\", \"A * 2\")\n Result = (X, Y)\nEnd_Object",
        );
        let mut list = records("A", &["3"]);
        assert_eq!(s.apply(&mut list, &[]).unwrap(), 0);
        assert!(list[0].is_discarded());
        assert!(!list[0].exists("Y"));
    }

    #[test]
    fn initializers_run_first_with_args() {
        let mut s = build(
            "Object = Strategy\n Name = c\n Type = Calculator\n \
             Group = Initializers\n Base = \"%1\"\n BaseArgs = Start\n Zero = 0\n End_Group\n \
             Equation = \"Base + Zero\"\n Result = Out\nEnd_Object",
        );
        let mut list = records("Start", &["7"]);
        s.apply(&mut list, &[]).unwrap();
        assert_eq!(list[0].value("Out", 0).unwrap(), "7");
        assert!(!list[0].exists("BaseArgs"));
    }

    #[test]
    fn limit_gates_on_last_equation() {
        let mut s = build(
            "Object = Strategy\n Name = l\n Type = Limit\n Equation = \"A > 2\"\nEnd_Object",
        );
        let mut list = records("A", &["1", "3", "abc"]);
        assert_eq!(s.apply(&mut list, &[]).unwrap(), 1);
        assert_eq!(active_names(&list), vec!["r1"]);
    }

    #[test]
    fn bad_equation_and_empty_limit_are_config_errors() {
        let factory = crate::registry::StrategyFactory::new();
        let bad = definition("Object = Strategy\n Name = c\n Type = Calculator\n Equation = \"1 +\"\nEnd_Object");
        let err = factory.create(&bad, &[]).err().unwrap();
        assert!(err.is_config());
        let empty = definition("Object = Strategy\n Name = l\n Type = Limit\nEnd_Object");
        assert!(factory.create(&empty, &[]).is_err());
        let extra = definition(
            "Object = Strategy\n Name = c\n Type = Calculator\n Equation = \"1\"\n Result = (a, b)\nEnd_Object",
        );
        assert!(factory.create(&extra, &[]).is_err());
    }
}
