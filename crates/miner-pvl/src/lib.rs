//! Parser for the PVL subset used by miner strategy definitions.
//!
//! Parses `Object = ... End_Object`, `Group = ... End_Group` and
//! `Keyword = value` / `Keyword = (v1, v2)` statements into a typed tree:
//! [`PvlObject`], [`PvlGroup`] and [`miner_types::Keyword`].
//!
//! # Example
//! ```
//! let text = r#"
//! Object = Miner
//!   Object = Strategy
//!     Name = KeepRed
//!     Type = Filter
//!     Include = (red, crimson)
//!   End_Object
//! End_Object
//! "#;
//! let doc = miner_pvl::parse(text).unwrap();
//! let miner = doc.object("miner").unwrap();
//! let strategy = miner.objects_named("Strategy").next().unwrap();
//! assert_eq!(strategy.value("type"), Some("Filter"));
//! ```

pub mod ast;
mod parser;

use std::path::Path;

pub use ast::*;
pub use parser::parse;

use miner_types::Result;

/// Read and parse a PVL file.
pub fn read_file(path: impl AsRef<Path>) -> Result<PvlObject> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "parsing PVL file");
    parse(&text)
}
