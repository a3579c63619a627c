//! `Filter`: keep or discard records by the values of one keyword.

use globset::{GlobBuilder, GlobMatcher};
use miner_pvl::PvlObject;
use miner_types::{MinerError, Resource, Result, SharedResource};
use regex::{Regex, RegexBuilder};

use crate::registry::StrategyFactory;
use crate::strategies::choice;
use crate::strategy::{Strategy, StrategyCore};

#[derive(Debug)]
enum Pattern {
    Literal { text: String, case_sensitive: bool },
    Wildcard(GlobMatcher),
    Regex(Regex),
}

impl Pattern {
    fn is_match(&self, value: &str) -> bool {
        match self {
            Pattern::Literal {
                text,
                case_sensitive: true,
            } => value.contains(text.as_str()),
            Pattern::Literal { text, .. } => value
                .to_lowercase()
                .contains(&text.to_lowercase()),
            Pattern::Wildcard(glob) => glob.is_match(value),
            Pattern::Regex(re) => re.is_match(value),
        }
    }
}

/// Include list, then pattern, then exclude list, checked per value.
pub struct FilterStrategy {
    core: StrategyCore,
    keyword: String,
    check_multiple: bool,
    include: Vec<String>,
    exclude: Vec<String>,
    pattern: Option<Pattern>,
}

impl FilterStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        let keyword = core.required("Keyword")?;
        let check_multiple = core.bool_or("CheckMultipleValues", false)?;
        let include = core.keys().all_values("Include");
        let exclude = core.keys().all_values("Exclude");

        let pattern = match core.keys().keyword("Pattern").and_then(|k| k.first()) {
            None => None,
            Some(text) => {
                let case_sensitive = core.bool_or("PatternCaseSensitive", false)?;
                let syntax = choice(&core, "PatternSyntax", "RegExp", &["literal", "wildcard", "regexp"])?;
                let bad = |err: String| {
                    MinerError::Config(format!(
                        "Pattern \"{text}\" in strategy [{}] is invalid: {err}",
                        core.name()
                    ))
                };
                Some(match syntax.as_str() {
                    "literal" => Pattern::Literal {
                        text: text.to_string(),
                        case_sensitive,
                    },
                    "wildcard" => Pattern::Wildcard(
                        GlobBuilder::new(text)
                            .case_insensitive(!case_sensitive)
                            .build()
                            .map_err(|e| bad(e.to_string()))?
                            .compile_matcher(),
                    ),
                    _ => Pattern::Regex(
                        RegexBuilder::new(text)
                            .case_insensitive(!case_sensitive)
                            .build()
                            .map_err(|e| bad(e.to_string()))?,
                    ),
                })
            }
        };

        Ok(Self {
            core,
            keyword,
            check_multiple,
            include,
            exclude,
            pattern,
        })
    }

    fn listed(list: &[String], value: &str) -> bool {
        list.iter().any(|item| item.eq_ignore_ascii_case(value))
    }

    /// Decide whether `resource` is kept.
    fn keep(&self, resource: &Resource) -> bool {
        let values = if self.check_multiple {
            resource.all_values(&self.keyword)
        } else {
            resource.value(&self.keyword, 0).into_iter().collect()
        };

        for value in &values {
            if Self::listed(&self.include, value) {
                return true;
            }
            if self.pattern.as_ref().is_some_and(|p| p.is_match(value)) {
                return true;
            }
            if Self::listed(&self.exclude, value) {
                return false;
            }
        }

        if !self.include.is_empty() && self.exclude.is_empty() {
            return false;
        }
        self.pattern.is_none()
    }
}

impl Strategy for FilterStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    fn apply_one(&mut self, resource: &SharedResource, _globals: &[SharedResource]) -> Result<usize> {
        if self.keep(resource) {
            return Ok(1);
        }
        self.core
            .debug(&format!("{} = {:?} rejected", self.keyword, resource.all_values(&self.keyword)));
        resource.discard();
        Ok(0)
    }
}
