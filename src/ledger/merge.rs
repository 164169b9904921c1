use crate::models::{ModelRecord, Origin};
use std::collections::HashSet;

/// Result of merging freshly found records into an existing ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Rows to write back: every existing row, then every novel record
    pub rows: Vec<ModelRecord>,
    /// New records whose name was already in the ledger
    pub already_present: Vec<ModelRecord>,
}

/// Collapse records from several sources into one record per name.
///
/// A filesystem record never displaces a ledger-derived record of the same
/// name. Otherwise the later record wins. Each name keeps the position where
/// it first appeared.
#[must_use]
pub fn dedup_sources<I>(records: I) -> Vec<ModelRecord>
where
    I: IntoIterator<Item = ModelRecord>,
{
    let mut out: Vec<ModelRecord> = Vec::new();
    for record in records {
        match out.iter_mut().find(|r| r.name == record.name) {
            None => out.push(record),
            Some(existing) => {
                if existing.origin == Origin::Ledger && record.origin == Origin::Filesystem {
                    // Keep the ledger values but remember where the weights are
                    if existing.file.is_none() {
                        existing.file = record.file;
                    }
                    if existing.mmproj.is_none() {
                        existing.mmproj = record.mmproj;
                    }
                    continue;
                }
                let (file, mmproj) = (existing.file.take(), existing.mmproj.take());
                *existing = record;
                if existing.file.is_none() {
                    existing.file = file;
                }
                if existing.mmproj.is_none() {
                    existing.mmproj = mmproj;
                }
            }
        }
    }
    out
}

/// Merge `new` into the `existing` ledger rows.
///
/// Existing rows are never modified. Only records with names not yet in the
/// ledger are appended, so merging the same input twice changes nothing.
#[must_use]
pub fn merge_ledger(existing: Vec<ModelRecord>, new: &[ModelRecord]) -> MergeOutcome {
    let mut known: HashSet<String> = existing.iter().map(|r| r.name.clone()).collect();
    let mut outcome = MergeOutcome {
        rows: existing,
        already_present: Vec::new(),
    };

    for record in new {
        if known.contains(&record.name) {
            outcome.already_present.push(record.clone());
        } else {
            known.insert(record.name.clone());
            outcome.rows.push(record.clone());
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scanned(name: &str, layers: u32) -> ModelRecord {
        ModelRecord::from_file(PathBuf::from(format!("/models/{name}")), layers, 2048)
    }

    fn ledger(name: &str, layers: u32) -> ModelRecord {
        ModelRecord::ledger_entry(name, layers, 4096)
    }

    #[test]
    fn test_empty_ledger_gets_new_rows() {
        let outcome = merge_ledger(Vec::new(), &[scanned("b.gguf", 1), scanned("a.gguf", 1)]);
        assert_eq!(outcome.rows.len(), 2);
        assert!(outcome.already_present.is_empty());
    }

    #[test]
    fn test_existing_rows_are_never_overwritten() {
        let existing = vec![ledger("a.gguf", 40)];
        let outcome = merge_ledger(existing, &[scanned("a.gguf", 1), scanned("c.gguf", 1)]);

        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0].gpu_layers, 40);
        assert_eq!(outcome.rows[0].context, 4096);
        assert_eq!(outcome.already_present.len(), 1);
        assert_eq!(outcome.already_present[0].name, "a.gguf");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let new = vec![scanned("a.gguf", 1), scanned("b.gguf", 2)];
        let first = merge_ledger(vec![ledger("z.gguf", 9)], &new);
        let second = merge_ledger(first.rows.clone(), &new);
        assert_eq!(first.rows, second.rows);
        assert_eq!(second.already_present.len(), 2);
    }

    #[test]
    fn test_filesystem_never_displaces_ledger() {
        let records = dedup_sources(vec![ledger("a.gguf", 30), scanned("a.gguf", 1)]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gpu_layers, 30);
        assert_eq!(records[0].origin, Origin::Ledger);
        assert_eq!(records[0].file, Some(PathBuf::from("/models/a.gguf")));

        let records = dedup_sources(vec![scanned("a.gguf", 1), ledger("a.gguf", 30)]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gpu_layers, 30);
        assert_eq!(records[0].file, Some(PathBuf::from("/models/a.gguf")));
    }

    #[test]
    fn test_later_ledger_source_wins() {
        let records = dedup_sources(vec![
            ledger("a.gguf", 10),
            ledger("b.gguf", 5),
            ledger("a.gguf", 20),
        ]);
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a.gguf", "b.gguf"]);
        assert_eq!(records[0].gpu_layers, 20);
    }
}
