//! `CsvWriter`: write selected keywords of the active records as CSV rows.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};

use miner_pvl::PvlObject;
use miner_types::{MinerError, ResourceList, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategies::choice;
use crate::strategy::{Strategy, StrategyCore};

pub struct CsvWriterStrategy {
    core: StrategyCore,
    keywords: Vec<String>,
    header: bool,
    delimiter: char,
    append: bool,
    default_value: String,
    skip_empty: bool,
}

impl CsvWriterStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        if !core.keys().exists("CsvFile") && !core.keys().exists("CsvFileKeyword") {
            return Err(MinerError::Config(format!(
                "CsvWriter strategy [{}] requires keyword CsvFile",
                core.name()
            )));
        }
        let keywords = core.keys().all_values("Keywords");
        if keywords.is_empty() {
            return Err(MinerError::Config(format!(
                "CsvWriter strategy [{}] requires a Keywords list",
                core.name()
            )));
        }
        let delimiter_text = core.keys().value_or("Delimiter", ",");
        let mut chars = delimiter_text.chars();
        let delimiter = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(MinerError::Config(format!(
                    "Delimiter = \"{delimiter_text}\" in strategy [{}] must be a single character",
                    core.name()
                )))
            }
        };
        let append = choice(&core, "Mode", "Create", &["create", "append"])? == "append";
        let header = core.bool_or("Header", true)?;
        let skip_empty = core.bool_or("SkipEmptyLists", false)?;
        let default_value = core.keys().value_or("DefaultValue", "NULL");
        Ok(Self {
            core,
            keywords,
            header,
            delimiter,
            append,
            default_value,
            skip_empty,
        })
    }

    /// Quote a field that contains the delimiter, a quote or a line break.
    fn field(&self, value: &str) -> String {
        if value.contains(self.delimiter) || value.contains('"') || value.contains('\n') {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    fn row(&self, values: impl Iterator<Item = String>) -> String {
        let fields: Vec<String> = values.map(|v| self.field(&v)).collect();
        fields.join(&self.delimiter.to_string())
    }
}

impl Strategy for CsvWriterStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    /// Returns the number of rows written.
    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        let rows: ResourceList = resources
            .iter()
            .filter(|r| r.is_active() || self.core.apply_discarded())
            .cloned()
            .collect();
        if rows.is_empty() && self.skip_empty {
            self.core.debug("no resources to write, skipping");
            return Ok(0);
        }

        let path = self.core.translate_keyword_args("CsvFile", globals, "");
        if path.is_empty() {
            return Err(MinerError::Config(format!(
                "CsvWriter strategy [{}] resolved an empty CsvFile",
                self.core.name()
            )));
        }
        let exists = std::fs::metadata(&path).is_ok_and(|m| m.len() > 0);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.append)
            .truncate(!self.append)
            .open(&path)?;
        let mut out = BufWriter::new(file);

        if self.header && !(self.append && exists) {
            writeln!(out, "{}", self.row(self.keywords.iter().cloned()))?;
        }
        self.core.init_progress(rows.len());
        for resource in &rows {
            let line = self.row(
                self.keywords
                    .iter()
                    .map(|k| resource.get_or(k, &self.default_value, 0)),
            );
            writeln!(out, "{line}")?;
            self.core.processed();
        }
        out.flush()?;
        self.core
            .debug(&format!("wrote {} rows to {path}", rows.len()));
        Ok(rows.len())
    }
}
