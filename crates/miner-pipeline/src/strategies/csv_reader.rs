//! `CsvReader`: create records from the rows of a delimited text file.

use std::path::Path;

use miner_pvl::PvlObject;
use miner_types::{MinerError, Resource, ResourceList, Result, SharedResource};

use crate::registry::StrategyFactory;
use crate::strategy::{get_globals, Strategy, StrategyCore};

/// Split one line into fields. Double-quoted fields may hold the delimiter
/// and `""` escapes a quote.
pub fn split_row(line: &str, delimiter: char) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            c if c == delimiter && !quoted => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            c => field.push(c),
        }
    }
    if quoted {
        return Err(MinerError::Evaluation(format!(
            "unterminated quoted field in row [{line}]"
        )));
    }
    fields.push(field.trim().to_string());
    Ok(fields)
}

/// Header plus data rows of `text`. Blank lines are skipped, and so are
/// lines starting with `#` when `comments` is set.
fn rows(text: &str, delimiter: char, skip: usize, comments: bool) -> Result<Vec<Vec<String>>> {
    text.lines()
        .skip(skip)
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !(comments && line.trim_start().starts_with('#')))
        .map(|line| split_row(line, delimiter))
        .collect()
}

/// Keyword names for a row: the header where it reaches, `Column<n>` past it.
fn column_name(header: &[String], index: usize) -> String {
    header
        .get(index)
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| format!("Column{}", index + 1))
}

fn to_record(name: String, header: &[String], row: Vec<String>) -> SharedResource {
    let resource = Resource::shared(name);
    for (index, value) in row.into_iter().enumerate() {
        resource.add(&column_name(header, index), value);
    }
    resource
}

/// Records from a CSV file whose first row is the header. Records are named
/// from an `Identity` column when there is one, otherwise `Row<n>`.
pub fn read_records(path: impl AsRef<Path>, delimiter: char) -> Result<ResourceList> {
    let text = std::fs::read_to_string(path)?;
    let mut all = rows(&text, delimiter, 0, true)?.into_iter();
    let header = all.next().unwrap_or_default();
    Ok(all
        .enumerate()
        .map(|(index, row)| {
            let record = to_record(format!("Row{}", index + 1), &header, row);
            if let Some(identity) = record.value("Identity", 0).ok().filter(|v| !v.is_empty()) {
                record.set_name(identity);
            }
            record
        })
        .collect())
}

pub struct CsvReaderStrategy {
    core: StrategyCore,
    delimiter: char,
    has_header: bool,
    header: Vec<String>,
    skip_lines: usize,
    comments: bool,
}

impl CsvReaderStrategy {
    pub fn new(
        definition: &PvlObject,
        globals: &[SharedResource],
        factory: &StrategyFactory,
    ) -> Result<Self> {
        let core = StrategyCore::new(definition, globals, factory.geometry_factory())?;
        if !core.keys().exists("CsvFile") && !core.keys().exists("CsvFileKeyword") {
            return Err(MinerError::Config(format!(
                "CsvReader strategy [{}] requires keyword CsvFile",
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
        let has_header = core.bool_or("HasHeader", true)?;
        let header = core.keys().all_values("Header");
        let skip_lines = core.double_or("SkipLines", 0.0)?;
        if skip_lines < 0.0 || skip_lines.fract() != 0.0 {
            return Err(MinerError::Config(format!(
                "SkipLines = {skip_lines} in strategy [{}] must be a whole number",
                core.name()
            )));
        }
        let comments = core.bool_or("IgnoreComments", true)?;
        Ok(Self {
            core,
            delimiter,
            has_header,
            header,
            skip_lines: skip_lines as usize,
            comments,
        })
    }
}

impl Strategy for CsvReaderStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    /// Appends one record per data row and returns how many were added.
    fn apply(&mut self, resources: &mut ResourceList, globals: &[SharedResource]) -> Result<usize> {
        let path = self.core.translate_keyword_args("CsvFile", globals, "");
        let text = std::fs::read_to_string(&path).map_err(|err| {
            MinerError::Config(format!("CsvReader could not read [{path}]: {err}"))
        })?;
        let mut all = rows(&text, self.delimiter, self.skip_lines, self.comments)
            .map_err(|err| MinerError::Config(format!("CsvReader [{path}]: {err}")))?
            .into_iter();
        let file_header = if self.has_header {
            all.next().unwrap_or_default()
        } else {
            Vec::new()
        };
        let header = if self.header.is_empty() {
            file_header
        } else {
            self.header.clone()
        };
        let data: Vec<Vec<String>> = all.collect();
        self.core.init_progress(data.len());

        let mut added = 0;
        for (index, row) in data.into_iter().enumerate() {
            let resource = to_record(format!("Row{}", index + 1), &header, row);
            let pool = get_globals(&resource, globals);
            let identity = self
                .core
                .translate_keyword_args("Identity", &pool, &resource.name());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::parameters_resource;
    use crate::strategies::testing::{build, definition, names};

    const FILE: &str = "# footprints\n\
        Id,Res,Wkt\n\
        left,10,\"POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))\"\n\
        \n\
        right,\"2,5\",\n\
        extra,1,,tail\n";

    fn reader(extra: &str) -> Box<dyn Strategy> {
        build(&format!(
            "Object = Strategy\n Name = csv\n Type = CsvReader\n CsvFile = \"%1/in.csv\"\n \
             CsvFileArgs = Dir\n {extra}\nEnd_Object"
        ))
    }

    #[test]
    fn split_row_handles_quotes() {
        assert_eq!(split_row("a, \"b,c\" ,d", ',').unwrap(), vec!["a", "b,c", "d"]);
        assert_eq!(split_row("\"say \"\"hi\"\"\"|x", '|').unwrap(), vec!["say \"hi\"", "x"]);
        assert_eq!(split_row("", ',').unwrap(), vec![""]);
        assert!(split_row("\"open,x", ',').is_err());
    }

    #[test]
    fn reads_rows_with_identity_and_geometry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in.csv"), FILE).unwrap();
        let g = parameters_resource([("Dir", dir.path().to_str().unwrap())]);
        let mut s = reader(
            "Identity = \"%1\"\n IdentityArgs = Id\n GisGeometryRef = Wkt\n \
             InvalidGeometryAction = continue",
        );
        let mut list = vec![Resource::shared("existing")];
        assert_eq!(s.apply(&mut list, &[g]).unwrap(), 3);
        assert_eq!(names(&list), vec!["existing", "left", "right", "extra"]);
        assert!(list[1].has_valid_geometry());
        assert_eq!(list[2].value("Res", 0).unwrap(), "2,5");
        assert!(!list[2].has_geometry());
        assert_eq!(list[3].value("Column4", 0).unwrap(), "tail");
    }

    #[test]
    fn explicit_header_and_skipped_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in.csv"), "title line\n1;2\n3;4\n").unwrap();
        let g = parameters_resource([("Dir", dir.path().to_str().unwrap())]);
        let mut s = reader("Delimiter = \";\"\n HasHeader = false\n SkipLines = 1\n Header = (A, B)");
        let mut list = Vec::new();
        assert_eq!(s.apply(&mut list, &[g]).unwrap(), 2);
        assert_eq!(names(&list), vec!["Row1", "Row2"]);
        assert_eq!(list[1].value("B", 0).unwrap(), "4");
    }

    #[test]
    fn read_records_names_from_identity_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "Identity,V\nfirst,1\n,2\n").unwrap();
        let list = read_records(&path, ',').unwrap();
        assert_eq!(names(&list), vec!["first", "Row2"]);
        std::fs::write(&path, "V\n1\n").unwrap();
        assert_eq!(names(&read_records(&path, ',').unwrap()), vec!["Row1"]);
    }

    #[test]
    fn configuration_errors() {
        let factory = StrategyFactory::new();
        let missing = definition("Object = Strategy\n Name = csv\n Type = CsvReader\nEnd_Object");
        assert!(factory.create(&missing, &[]).err().unwrap().is_config());

        let mut s = build(
            "Object = Strategy\n Name = csv\n Type = CsvReader\n CsvFile = \"/no/such/in.csv\"\nEnd_Object",
        );
        assert!(s.apply(&mut Vec::new(), &[]).unwrap_err().is_config());
    }
}
