//! `NumericalSort`: stable sort of the whole set by a numeric keyword.

use std::cmp::Ordering;
use std::rc::Rc;

use miner_pvl::PvlObject;
use miner_types::{to_double, ResourceList, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategies::choice;
use crate::strategy::{Strategy, StrategyCore};

pub struct NumericalSortStrategy {
    core: StrategyCore,
    sort_key: String,
    descending: bool,
}

impl NumericalSortStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let sort_key = core.required("SortKey")?;
        let order = choice(&core, "Order", "Ascending", &["ascending", "descending"])?;
        Ok(Self {
            core,
            sort_key,
            descending: order == "descending",
        })
    }
}

impl Strategy for NumericalSortStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    /// Active records sort before discarded ones in either order. Active
    /// records must carry a numeric sort key; discarded records that lack
    /// one compare equal.
    fn apply(&mut self, resources: &mut ResourceList, _globals: &[SharedResource]) -> Result<usize> {
        self.core.init_progress(resources.len());
        let mut keyed = Vec::with_capacity(resources.len());
        for resource in resources.iter() {
            let value = if resource.is_active() {
                Some(to_double(&resource.value(&self.sort_key, 0)?)?)
            } else {
                resource
                    .value(&self.sort_key, 0)
                    .ok()
                    .and_then(|v| to_double(&v).ok())
            };
            keyed.push((Rc::clone(resource), value));
            self.core.processed();
        }

        let descending = self.descending;
        keyed.sort_by(|(a, va), (b, vb)| {
            match (a.is_discarded(), b.is_discarded()) {
                (false, true) => return Ordering::Less,
                (true, false) => return Ordering::Greater,
                _ => {}
            }
            let ord = match (va, vb) {
                (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });

        *resources = keyed.into_iter().map(|(r, _)| r).collect();
        self.core.debug(&format!(
            "sorted {} resources by {} ({})",
            resources.len(),
            self.sort_key,
            if descending { "descending" } else { "ascending" }
        ));
        Ok(resources.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::strategies::testing::{build, definition, names, records};

    fn sorter(order: &str) -> Box<dyn crate::strategy::Strategy> {
        build(&format!(
            "Object = Strategy\n Name = s\n Type = NumericalSort\n SortKey = V\n Order = {order}\nEnd_Object"
        ))
    }

    #[test]
    fn discarded_always_last() {
        for order in ["Ascending", "Descending"] {
            let mut list = records("V", &["5", "3", "1"]);
            list[0].discard();
            sorter(order).apply(&mut list, &[]).unwrap();
            let expected = if order == "Ascending" {
                vec!["r2", "r1", "r0"]
            } else {
                vec!["r1", "r2", "r0"]
            };
            assert_eq!(names(&list), expected, "{order}");
            assert!(list[2].is_discarded());
        }
    }

    #[test]
    fn sort_is_stable() {
        let mut list = records("V", &["2", "1", "2", "1"]);
        sorter("ascending").apply(&mut list, &[]).unwrap();
        assert_eq!(names(&list), vec!["r1", "r3", "r0", "r2"]);
    }

    #[test]
    fn non_numeric_active_value_is_error() {
        let mut list = records("V", &["1", "x"]);
        assert!(sorter("ascending").apply(&mut list, &[]).is_err());

        let mut list = records("V", &["1", "x"]);
        list[1].discard();
        assert!(sorter("ascending").apply(&mut list, &[]).is_ok());
    }

    #[test]
    fn bad_order_is_config_error() {
        let def = definition(
            "Object = Strategy\n Name = s\n Type = NumericalSort\n SortKey = V\n Order = Sideways\nEnd_Object",
        );
        let err = crate::registry::StrategyFactory::new().create(&def, &[]).err().unwrap();
        assert!(err.is_config());
    }
}
