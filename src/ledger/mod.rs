//! The layers ledger: a tab-separated table of per-model runtime settings.
//!
//! Generated scripts read their GPU layer count and context length from this
//! file, so rows the user has edited must survive regeneration untouched.

pub mod file;
pub mod merge;

pub use file::{
    load_ledger, parse_ledger, read_ledger, render_ledger, write_ledger, LedgerSink, ParsedLedger,
    LEDGER_FIELDS,
};
pub use merge::{dedup_sources, merge_ledger, MergeOutcome};
