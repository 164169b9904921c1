use crate::registry::Registry;
use std::collections::{HashMap, HashSet};

/// Default cap on repositories checked for the exact file per search pass
pub const DEFAULT_MAX_CANDIDATES: usize = 64;

/// Split a file name at every `.` and `-`.
///
/// Each fragment after the first keeps its leading delimiter, so the
/// fragments concatenate back to the original name:
/// `"llava-1.6-7b.gguf"` becomes `["llava", "-1", ".6", "-7b", ".gguf"]`.
#[must_use]
pub fn split_fragments(filename: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    for c in filename.chars() {
        if matches!(c, '.' | '-') && !current.is_empty() {
            fragments.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchMode {
    /// Keep the smallest non-empty result set, stop at the first empty one
    Narrowest,
    /// Union every non-empty result set over all query prefixes
    Exhaustive,
}

/// Finds the registry repository that hosts a given weights file
pub struct Resolver<'a, R: Registry + ?Sized> {
    registry: &'a R,
    trusted_curator: String,
    max_candidates: usize,
}

impl<'a, R: Registry + ?Sized> Resolver<'a, R> {
    #[must_use]
    pub fn new(registry: &'a R, trusted_curator: impl Into<String>) -> Self {
        Self {
            registry,
            trusted_curator: trusted_curator.into(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    /// Limit how many repositories get checked for the exact file per pass
    #[must_use]
    pub const fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Repository id hosting `filename`, or `None` if no candidate has it.
    ///
    /// Remote failures are skipped per query or per candidate and never
    /// abort resolution.
    pub fn resolve(&self, filename: &str) -> Option<String> {
        let fragments = split_fragments(filename);
        let mut searches = HashMap::new();
        let mut checked = HashSet::new();

        let candidates = self.candidates(&fragments, SearchMode::Narrowest, &mut searches);
        let mut survivors = self.exact_matches(filename, &candidates, &mut checked);

        if survivors.is_empty() {
            tracing::debug!("No exact match for {filename}, retrying exhaustively");
            let candidates = self.candidates(&fragments, SearchMode::Exhaustive, &mut searches);
            survivors = self.exact_matches(filename, &candidates, &mut checked);
        }

        let chosen = self.rank(&survivors);
        match &chosen {
            Some(repo) => tracing::info!("Resolved {filename} to {repo}"),
            None => tracing::warn!("Could not find a repository for {filename}"),
        }
        chosen
    }

    fn search(&self, query: &str, searches: &mut HashMap<String, Vec<String>>) -> Option<Vec<String>> {
        if let Some(ids) = searches.get(query) {
            return Some(ids.clone());
        }
        match self.registry.search(query) {
            Ok(ids) => {
                searches.insert(query.to_string(), ids.clone());
                Some(ids)
            }
            Err(e) => {
                tracing::warn!("Search for '{query}' failed: {e}");
                None
            }
        }
    }

    fn candidates(
        &self,
        fragments: &[String],
        mode: SearchMode,
        searches: &mut HashMap<String, Vec<String>>,
    ) -> Vec<String> {
        let mut query = String::new();
        let mut narrowest: Vec<String> = Vec::new();
        let mut union: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        for fragment in fragments {
            query.push_str(fragment);
            let Some(ids) = self.search(&query, searches) else {
                continue;
            };
            tracing::debug!("Query '{query}' matched {} repositories", ids.len());

            match mode {
                SearchMode::Narrowest => {
                    if ids.is_empty() {
                        break;
                    }
                    if narrowest.is_empty() || ids.len() <= narrowest.len() {
                        narrowest = ids;
                    }
                }
                SearchMode::Exhaustive => {
                    for id in ids {
                        if seen.insert(id.clone()) {
                            union.push(id);
                        }
                    }
                }
            }
        }

        match mode {
            SearchMode::Narrowest => narrowest,
            SearchMode::Exhaustive => union,
        }
    }

    fn exact_matches(
        &self,
        filename: &str,
        candidates: &[String],
        checked: &mut HashSet<String>,
    ) -> Vec<String> {
        let pattern = glob::Pattern::escape(filename);
        candidates
            .iter()
            .filter(|id| checked.insert((*id).clone()))
            .take(self.max_candidates)
            .filter(|id| match self.registry.list_paths(id, &pattern) {
                Ok(paths) => paths.iter().any(|p| p == filename),
                Err(e) => {
                    if e.is_soft() {
                        tracing::debug!("Skipping {id}: {e}");
                    } else {
                        tracing::warn!("Skipping {id}: {e}");
                    }
                    false
                }
            })
            .cloned()
            .collect()
    }

    fn rank(&self, survivors: &[String]) -> Option<String> {
        let mut best: Option<(&String, u64)> = None;
        for id in survivors {
            let repo = match self.registry.metadata(id) {
                Ok(repo) => repo,
                Err(e) => {
                    tracing::debug!("Excluding {id} from ranking: {e}");
                    continue;
                }
            };
            if repo.author == self.trusted_curator {
                return Some(id.clone());
            }
            let score = repo.score();
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((id, score));
            }
        }
        best.map(|(id, _)| id.clone())
    }
}
