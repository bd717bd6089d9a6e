use super::document::Document;
use super::format::to_compact_string;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// First token of every schema file header.
pub const HEADER_MARKER: &str = "!MolSSI";
/// Second token of the header for the schemas this driver understands.
pub const SCHEMA_TAG: &str = "cms_schema";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("File is empty; expected a '!MolSSI cms_schema' header line")]
    MissingHeader,
    #[error("File is not a MolSSI schema file, organization is not MolSSI: '{0}'")]
    NotMolssi(String),
    #[error("File is not a MolSSI schema file: '{0}'")]
    IncompleteHeader(String),
    #[error("File is not a CMS schema file: '{0}'")]
    NotCmsSchema(String),
    #[error("Invalid schema document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Checks a header line such as `!MolSSI cms_schema 1.0`.
pub fn check_header(line: &str) -> Result<(), FormatError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.starts_with(HEADER_MARKER) {
        return Err(FormatError::NotMolssi(line.to_string()));
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(FormatError::IncompleteHeader(line.to_string()));
    }
    if tokens[1] != SCHEMA_TAG {
        return Err(FormatError::NotCmsSchema(line.to_string()));
    }
    Ok(())
}

/// Reads a schema document: the header line is validated before any of the JSON body is
/// consumed.
pub fn read_from(reader: &mut impl BufRead) -> Result<Document, FormatError> {
    let mut header = String::new();
    if reader.read_line(&mut header)? == 0 {
        return Err(FormatError::MissingHeader);
    }
    check_header(&header)?;
    debug!(header = header.trim_end(), "Schema header accepted.");

    let document: Document = serde_json::from_reader(reader)?;
    debug!(
        steps = document.workflow.len(),
        systems = document.systems.len(),
        "Schema document parsed."
    );
    Ok(document)
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<Document, FormatError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_from(&mut reader)
}

/// Writes the header line and the compact JSON rendering of the document.
pub fn write_to(document: &Document, writer: &mut impl Write) -> Result<(), FormatError> {
    let value = serde_json::to_value(document)?;
    writeln!(
        writer,
        "{} {} {}",
        HEADER_MARKER,
        document.schema_name,
        document.version_label()
    )?;
    writeln!(writer, "{}", to_compact_string(&value))?;
    writer.flush()?;
    Ok(())
}

pub fn write<P: AsRef<Path>>(document: &Document, path: P) -> Result<(), FormatError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_to(document, &mut writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::io::Cursor;
    use tempfile::tempdir;

    const BODY: &str = r#"{
        "schema name": "cms_schema",
        "schema version": "1.0",
        "control parameters": {},
        "workflow": [{"model": {"model": "ANI", "parameterization": "ANI-1x"}}],
        "systems": [{"configurations": [{
            "periodicity": 0,
            "symbols": ["C", "H"],
            "coordinates": {"values": [[0.0, 0.0, 0.0], [1.1, 0.0, 0.0]],
                            "units": "Å", "coordinate system": "Cartesian"}
        }]}]
    }"#;

    fn input(header: &str) -> String {
        format!("{}\n{}", header, BODY)
    }

    #[test]
    fn accepts_a_well_formed_header() {
        assert!(check_header("!MolSSI cms_schema 1.0").is_ok());
        assert!(check_header("!MolSSI   cms_schema   1.0 extra\r\n").is_ok());
    }

    #[test]
    fn rejects_header_without_marker() {
        assert!(matches!(
            check_header("MolSSI cms_schema 1.0"),
            Err(FormatError::NotMolssi(_))
        ));
    }

    #[test]
    fn rejects_header_with_too_few_tokens() {
        assert!(matches!(
            check_header("!MolSSI cms_schema"),
            Err(FormatError::IncompleteHeader(_))
        ));
    }

    #[test]
    fn rejects_header_for_another_schema() {
        assert!(matches!(
            check_header("!MolSSI qc_schema 1.0"),
            Err(FormatError::NotCmsSchema(_))
        ));
    }

    #[test]
    fn read_from_parses_the_body() {
        let mut reader = Cursor::new(input("!MolSSI cms_schema 1.0"));
        let document = read_from(&mut reader).unwrap();
        assert_eq!(document.schema_name, "cms_schema");
        assert_eq!(document.workflow.len(), 1);
        assert_eq!(document.configuration_count(), 1);
    }

    #[test]
    fn malformed_header_fails_before_the_json_is_touched() {
        let mut reader = Cursor::new("#MolSSI cms_schema 1.0\n{ this is not json".to_string());
        let result = read_from(&mut reader);
        assert!(matches!(result, Err(FormatError::NotMolssi(_))));
        assert_eq!(reader.position(), "#MolSSI cms_schema 1.0\n".len() as u64);
    }

    #[test]
    fn invalid_json_is_a_format_error() {
        let mut reader = Cursor::new("!MolSSI cms_schema 1.0\n{\"schema name\": ".to_string());
        assert!(matches!(read_from(&mut reader), Err(FormatError::Json(_))));
    }

    #[test]
    fn document_missing_required_keys_is_a_format_error() {
        let mut reader = Cursor::new("!MolSSI cms_schema 1.0\n{\"systems\": []}".to_string());
        assert!(matches!(read_from(&mut reader), Err(FormatError::Json(_))));
    }

    #[test]
    fn empty_file_is_missing_its_header() {
        let mut reader = Cursor::new(String::new());
        assert!(matches!(
            read_from(&mut reader),
            Err(FormatError::MissingHeader)
        ));
    }

    #[test]
    fn write_emits_header_and_compact_body() {
        let mut reader = Cursor::new(input("!MolSSI cms_schema 1.0"));
        let document = read_from(&mut reader).unwrap();

        let mut out = Vec::new();
        write_to(&document, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("!MolSSI cms_schema 1.0"));
        assert!(text.contains("\"symbols\": [\"C\", \"H\"]"));
        assert!(text.contains("\"values\": [\n"));
        assert!(text.contains("[1.1, 0, 0]"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn write_then_read_round_trips_logical_content() {
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("input.json");
        let output_path = dir.path().join("output.json");
        std::fs::write(&input_path, input("!MolSSI cms_schema 1.0")).unwrap();

        let document = read(&input_path).unwrap();
        write(&document, &output_path).unwrap();
        let reread = read(&output_path).unwrap();

        let original: Value = serde_json::from_str(BODY).unwrap();
        let written = serde_json::to_value(&reread).unwrap();
        let normalize = |v: &Value| serde_json::from_str::<Value>(&to_compact_string(v)).unwrap();
        assert_eq!(normalize(&written), normalize(&original));
    }

    #[test]
    fn reading_a_missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = read(dir.path().join("does-not-exist.json"));
        assert!(matches!(result, Err(FormatError::Io(_))));
    }
}
