use crate::error::{LayersError, RegistryError};
use crate::inventory::scanner::{MMPROJ_MARKER, MODEL_EXTENSION};
use crate::models::{basename, ModelRecord};
use crate::registry::{Registry, Resolver};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Files fetched alongside the weights
pub const AUXILIARY_PATTERNS: &[&str] = &[
    "README*", "LICENSE*", "*.txt", "*.md", "*.json", "*mmproj*",
];

/// A model fetched into the local cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub name: String,
    pub repo_id: String,
    pub path: PathBuf,
    /// Projector file fetched alongside the weights, if any
    pub mmproj: Option<PathBuf>,
}

/// Outcome of a download run
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub downloaded: Vec<Downloaded>,
    /// Models no repository could be found for
    pub unresolved: Vec<String>,
    pub failed: Vec<(String, LayersError)>,
}

impl DownloadReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty() && self.failed.is_empty()
    }

    /// Download record for a model name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Downloaded> {
        self.downloaded.iter().find(|d| d.name == name)
    }
}

/// Glob patterns for one model: its exact file name plus the auxiliary files
#[must_use]
pub fn download_patterns(filename: &str) -> Vec<String> {
    std::iter::once(glob::Pattern::escape(filename))
        .chain(AUXILIARY_PATTERNS.iter().map(ToString::to_string))
        .collect()
}

/// Fetch every model in `records` whose name isn't in `exclude`.
///
/// Models are handled one at a time. Failing to resolve or download one
/// model is recorded in the report and the rest carry on.
pub fn download_missing<R: Registry + ?Sized>(
    registry: &R,
    resolver: &Resolver<'_, R>,
    records: &[ModelRecord],
    exclude: &HashSet<String>,
    mut on_resolve: impl FnMut(&str),
) -> DownloadReport {
    let mut report = DownloadReport::default();

    for record in records.iter().filter(|r| !exclude.contains(&r.name)) {
        on_resolve(&record.name);
        let Some(repo_id) = resolver.resolve(&record.name) else {
            report.unresolved.push(record.name.clone());
            continue;
        };

        match registry.fetch_matching(&repo_id, &download_patterns(&record.name)) {
            Ok(paths) => match paths.iter().find(|p| basename(p) == record.name) {
                Some(path) => {
                    tracing::info!("Downloaded {} from {repo_id}", record.name);
                    let mmproj = paths.iter().find(|p| is_projector(p)).cloned();
                    report.downloaded.push(Downloaded {
                        name: record.name.clone(),
                        repo_id,
                        path: path.clone(),
                        mmproj,
                    });
                }
                None => report.failed.push((
                    record.name.clone(),
                    LayersError::Download(format!("{} was not fetched from {repo_id}", record.name)),
                )),
            },
            Err(e) => {
                let error = match e {
                    RegistryError::Restricted(_) => LayersError::Registry(e),
                    other => LayersError::Download(format!("{repo_id}: {other}")),
                };
                report.failed.push((record.name.clone(), error));
            }
        }
    }
    report
}

fn is_projector(path: &Path) -> bool {
    let name = basename(path).to_lowercase();
    name.contains(MMPROJ_MARKER) && name.ends_with(&format!(".{MODEL_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{matching_paths, RemoteRepository};
    use std::cell::RefCell;

    struct OneRepo {
        fetched: RefCell<Vec<String>>,
    }

    const FILES: &[&str] = &["have.gguf", "want.gguf", "other.gguf", "README.md", "mmproj-f16.gguf"];

    impl Registry for OneRepo {
        fn search(&self, query: &str) -> Result<Vec<String>, RegistryError> {
            Ok(if query == "want" || query == "have" {
                vec!["solo/repo".to_string()]
            } else {
                Vec::new()
            })
        }

        fn list_paths(&self, _: &str, _: &str) -> Result<Vec<String>, RegistryError> {
            Ok(FILES.iter().map(ToString::to_string).collect())
        }

        fn metadata(&self, repo_id: &str) -> Result<RemoteRepository, RegistryError> {
            Ok(RemoteRepository {
                id: repo_id.to_string(),
                author: "solo".to_string(),
                downloads: 1,
                likes: 1,
            })
        }

        fn fetch_matching(
            &self,
            _: &str,
            patterns: &[String],
        ) -> Result<Vec<PathBuf>, RegistryError> {
            let paths: Vec<String> = FILES.iter().map(ToString::to_string).collect();
            let matched = matching_paths(&paths, patterns);
            self.fetched.borrow_mut().extend(matched.iter().cloned());
            Ok(matched
                .into_iter()
                .map(|p| PathBuf::from("/cache").join(p))
                .collect())
        }
    }

    #[test]
    fn test_download_patterns() {
        let patterns = download_patterns("model[1].gguf");
        assert_eq!(patterns[0], "model[[]1[]].gguf");
        assert!(patterns.contains(&"*mmproj*".to_string()));
    }

    #[test]
    fn test_downloads_only_missing_models() {
        let registry = OneRepo {
            fetched: RefCell::new(Vec::new()),
        };
        let resolver = Resolver::new(&registry, "TheBloke");
        let records = vec![
            ModelRecord::ledger_entry("have.gguf", 1, 2048),
            ModelRecord::ledger_entry("want.gguf", 1, 2048),
            ModelRecord::ledger_entry("nowhere.gguf", 1, 2048),
        ];
        let exclude: HashSet<String> = ["have.gguf".to_string()].into_iter().collect();

        let mut attempted = Vec::new();
        let report = download_missing(&registry, &resolver, &records, &exclude, |name| {
            attempted.push(name.to_string());
        });

        assert_eq!(attempted, vec!["want.gguf", "nowhere.gguf"]);
        let want = report.get("want.gguf").unwrap();
        assert_eq!(want.repo_id, "solo/repo");
        assert_eq!(want.path, PathBuf::from("/cache/want.gguf"));
        assert_eq!(want.mmproj, Some(PathBuf::from("/cache/mmproj-f16.gguf")));
        assert_eq!(report.unresolved, vec!["nowhere.gguf"]);
        assert!(!report.is_complete());

        let fetched = registry.fetched.borrow();
        assert!(fetched.contains(&"README.md".to_string()));
        assert!(fetched.contains(&"mmproj-f16.gguf".to_string()));
        assert!(!fetched.contains(&"other.gguf".to_string()));
    }
}
