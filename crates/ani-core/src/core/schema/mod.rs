//! The MolSSI `cms_schema` workflow document.
//!
//! A schema file is a single `!MolSSI cms_schema <version>` header line followed by one JSON
//! document. [`document`] holds the typed model, [`io`] reads and writes the file layout, and
//! [`format`] renders JSON with short leaf containers collapsed onto one line.

pub mod document;
pub mod format;
pub mod io;

pub use document::{Configuration, Coordinates, Document, ModelSpec, Results, Step, System};
pub use io::{FormatError, read, read_from, write, write_to};
