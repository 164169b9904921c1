use crate::error::{LayersError, Result};
use crate::models::{ModelRecord, DEFAULT_MODEL_TYPE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Columns of the ledger, in order
pub const LEDGER_FIELDS: [&str; 5] = ["name", "gpu_layers", "context", "prompt_format", "type"];

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    name: String,
    gpu_layers: u32,
    context: u32,
    #[serde(default)]
    prompt_format: String,
    #[serde(rename = "type", default = "default_type")]
    model_type: String,
}

fn default_type() -> String {
    DEFAULT_MODEL_TYPE.to_string()
}

impl From<LedgerRow> for ModelRecord {
    fn from(row: LedgerRow) -> Self {
        let mut record = Self::ledger_entry(row.name, row.gpu_layers, row.context);
        record.prompt_format = row.prompt_format;
        if !row.model_type.is_empty() {
            record.model_type = row.model_type;
        }
        record
    }
}

impl From<&ModelRecord> for LedgerRow {
    fn from(record: &ModelRecord) -> Self {
        Self {
            name: record.name.clone(),
            gpu_layers: record.gpu_layers,
            context: record.context,
            prompt_format: record.prompt_format.clone(),
            model_type: record.model_type.clone(),
        }
    }
}

/// Rows read from ledger text
#[derive(Debug, Default)]
pub struct ParsedLedger {
    pub records: Vec<ModelRecord>,
    /// One message per row that was skipped, naming its line
    pub rejected: Vec<String>,
}

/// Parse ledger-format text. Lines starting with `#` are ignored.
///
/// Rows that don't hold a name, a whole number of GPU layers and a context
/// above 0 are skipped and listed in [`ParsedLedger::rejected`]; the other
/// rows are kept. If a name appears twice the later row wins, keeping the
/// position of the first occurrence.
pub fn parse_ledger(text: &str) -> std::result::Result<ParsedLedger, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut parsed = ParsedLedger::default();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map_or(0, csv::Position::line);
        let record = match row.deserialize::<LedgerRow>(Some(&headers)) {
            Ok(entry) if entry.name.is_empty() => {
                parsed.rejected.push(format!("line {line}: missing name"));
                continue;
            }
            Ok(entry) if entry.context == 0 => {
                parsed
                    .rejected
                    .push(format!("line {line}: context of {} must be greater than 0", entry.name));
                continue;
            }
            Ok(entry) => ModelRecord::from(entry),
            Err(e) => {
                parsed.rejected.push(format!("line {line}: {e}"));
                continue;
            }
        };
        match parsed.records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => parsed.records.push(record),
        }
    }
    Ok(parsed)
}

/// Load the ledger at `path`, keeping track of rows that had to be skipped.
///
/// A missing file is an empty ledger. A file that can't be read at all is an
/// error.
pub fn load_ledger(path: &Path) -> Result<ParsedLedger> {
    let parse_error = |reason: String| LayersError::Parse {
        path: path.display().to_string(),
        reason,
    };

    if !path.exists() {
        return Ok(ParsedLedger::default());
    }
    if path.is_dir() {
        return Err(parse_error("is a directory".to_string()));
    }
    let text = fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
    parse_ledger(&text).map_err(|e| parse_error(e.to_string()))
}

/// Read the ledger at `path`, warning about anything that couldn't be used.
///
/// A broken ledger never stops script generation: unreadable files read as
/// empty and bad rows are left out.
#[must_use]
pub fn read_ledger(path: &Path) -> Vec<ModelRecord> {
    match load_ledger(path) {
        Ok(parsed) => {
            for reason in &parsed.rejected {
                tracing::warn!("Skipping row in {}: {reason}", path.display());
            }
            parsed.records
        }
        Err(e) => {
            tracing::warn!("{e}");
            Vec::new()
        }
    }
}

/// Render rows as ledger text, sorted by name, with a comment header.
pub fn render_ledger(rows: &[ModelRecord], command_line: &str) -> Result<String> {
    let mut sorted: Vec<&ModelRecord> = rows.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = format!(
        "# Generated on {} with\n# {command_line}\n\
         # Listed values are what will be used for a particular model by the backend, not the maximum model capability. \
         Regenerating this file will keep existing settings, though your comments will be lost\n",
        chrono::Local::now().format("%Y-%m-%d-%H:%M:%S")
    );

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(LEDGER_FIELDS).map_err(csv_error)?;
    for record in sorted {
        writer.serialize(LedgerRow::from(record)).map_err(csv_error)?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| LayersError::Other(format!("Failed to flush ledger: {e}")))?;
    out.push_str(&String::from_utf8_lossy(&body));
    Ok(out)
}

fn csv_error(e: csv::Error) -> LayersError {
    LayersError::Other(format!("Failed to write ledger row: {e}"))
}

/// Where the ledger gets written
#[derive(Debug)]
pub enum LedgerSink {
    /// The real ledger file
    Persist(PathBuf),
    /// A throwaway file, removed when the sink is dropped
    Preview(NamedTempFile),
}

impl LedgerSink {
    /// Sink for preview runs
    pub fn preview() -> Result<Self> {
        Ok(Self::Preview(NamedTempFile::new()?))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Persist(path) => path,
            Self::Preview(file) => file.path(),
        }
    }

    #[must_use]
    pub const fn is_preview(&self) -> bool {
        matches!(self, Self::Preview(_))
    }
}

/// Write rows to the sink. Persistent writes go through a temporary file in
/// the same directory, renamed over the ledger.
pub fn write_ledger(sink: &LedgerSink, rows: &[ModelRecord], command_line: &str) -> Result<()> {
    let content = render_ledger(rows, command_line)?;

    match sink {
        LedgerSink::Preview(file) => {
            fs::write(file.path(), content)?;
        }
        LedgerSink::Persist(path) => {
            if path.is_dir() {
                return Err(LayersError::Other(format!(
                    "Ledger {} is a directory",
                    path.display()
                )));
            }
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            fs::create_dir_all(parent)?;

            let mut tmp = NamedTempFile::new_in(parent)?;
            tmp.write_all(content.as_bytes())?;
            tmp.persist(path).map_err(|e| LayersError::Io(e.error))?;
        }
    }
    Ok(())
}
