//! Remote model registry access.
//!
//! [`Registry`] is the seam between the resolution logic and the network:
//! [`HubRegistry`] talks to the Hugging Face Hub, tests substitute an
//! in-memory registry.

pub mod download;
pub mod hub;
pub mod resolver;

pub use crate::error::RegistryError;
pub use download::{download_missing, DownloadReport};
pub use hub::HubRegistry;
pub use resolver::{split_fragments, Resolver};

use std::path::PathBuf;

/// Registry metadata for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    pub id: String,
    pub author: String,
    pub downloads: u64,
    pub likes: u64,
}

impl RemoteRepository {
    /// Popularity score used to rank candidate repositories
    #[must_use]
    pub const fn score(&self) -> u64 {
        self.downloads.saturating_add(self.likes)
    }
}

/// Operations the resolver and downloader need from a model registry
pub trait Registry {
    /// Repository ids matching a free-text query, in the registry's order
    fn search(&self, query: &str) -> Result<Vec<String>, RegistryError>;

    /// Paths in a repository that match a glob pattern
    fn list_paths(&self, repo_id: &str, pattern: &str) -> Result<Vec<String>, RegistryError>;

    /// Author and popularity of a repository
    fn metadata(&self, repo_id: &str) -> Result<RemoteRepository, RegistryError>;

    /// Download every file matching any of `patterns`, returning local paths
    fn fetch_matching(
        &self,
        repo_id: &str,
        patterns: &[String],
    ) -> Result<Vec<PathBuf>, RegistryError>;
}

/// Paths matching any of the glob patterns, case-insensitively
#[must_use]
pub fn matching_paths(paths: &[String], patterns: &[String]) -> Vec<String> {
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let compiled: Vec<glob::Pattern> = patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!("Ignoring invalid pattern '{p}': {e}");
                None
            }
        })
        .collect();

    paths
        .iter()
        .filter(|path| compiled.iter().any(|p| p.matches_with(path, options)))
        .cloned()
        .collect()
}
