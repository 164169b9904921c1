use crate::config::RegistryConfig;
use crate::error::{LayersError, RegistryError, Result};
use crate::registry::{matching_paths, Registry, RemoteRepository};
use hf_hub::api::sync::{Api, ApiBuilder, ApiError};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Hugging Face Hub registry
///
/// Search and metadata go through the Hub's JSON API, downloads through
/// `hf-hub`, which places files in the shared Hugging Face cache.
pub struct HubRegistry {
    client: Client,
    endpoint: String,
    search_limit: usize,
    api: Api,
}

impl std::fmt::Debug for HubRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubRegistry")
            .field("client", &"Client { ... }")
            .field("endpoint", &self.endpoint)
            .field("search_limit", &self.search_limit)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    id: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    downloads: Option<u64>,
    #[serde(default)]
    likes: Option<u64>,
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

impl HubRegistry {
    /// Create a registry client from config
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("llm-layers/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LayersError::Other(format!("Failed to create HTTP client: {e}")))?;

        let api = ApiBuilder::new().with_progress(true).build().map_err(|e| {
            LayersError::Download(format!("Failed to initialize HuggingFace API: {e}"))
        })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            search_limit: config.search_limit,
            api,
        })
    }

    fn model_info(&self, repo_id: &str) -> std::result::Result<ModelInfo, RegistryError> {
        let response = self
            .client
            .get(api_url(&self.endpoint, &format!("models/{repo_id}")))
            .send()
            .map_err(transport_error)?;
        check_status(repo_id, response.status())?;
        response
            .json()
            .map_err(|e| RegistryError::Invalid(format!("{repo_id}: {e}")))
    }
}

fn api_url(endpoint: &str, path: &str) -> String {
    format!("{}/api/{path}", endpoint.trim_end_matches('/'))
}

fn transport_error(e: reqwest::Error) -> RegistryError {
    if e.is_decode() {
        RegistryError::Invalid(e.to_string())
    } else {
        RegistryError::Network(e.to_string())
    }
}

fn check_status(subject: &str, status: StatusCode) -> std::result::Result<(), RegistryError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RegistryError::Restricted(subject.to_string()))
        }
        StatusCode::NOT_FOUND => Err(RegistryError::NotFound(subject.to_string())),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            Err(RegistryError::Network(format!("{subject}: HTTP {s}")))
        }
        s => Err(RegistryError::Invalid(format!("{subject}: HTTP {s}"))),
    }
}

fn download_error(repo_id: &str, e: &ApiError) -> RegistryError {
    match e {
        ApiError::RequestError(inner) => match inner.as_ref() {
            ureq::Error::Status(401 | 403, _) => RegistryError::Restricted(repo_id.to_string()),
            ureq::Error::Status(404, _) => RegistryError::NotFound(repo_id.to_string()),
            _ => RegistryError::Network(format!("{repo_id}: {e}")),
        },
        _ => RegistryError::Network(format!("{repo_id}: {e}")),
    }
}

impl Registry for HubRegistry {
    fn search(&self, query: &str) -> std::result::Result<Vec<String>, RegistryError> {
        let limit = self.search_limit.to_string();
        let response = self
            .client
            .get(api_url(&self.endpoint, "models"))
            .query(&[("search", query), ("limit", limit.as_str())])
            .send()
            .map_err(transport_error)?;
        check_status(query, response.status())?;

        let hits: Vec<SearchHit> = response
            .json()
            .map_err(|e| RegistryError::Invalid(format!("search '{query}': {e}")))?;
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }

    fn list_paths(
        &self,
        repo_id: &str,
        pattern: &str,
    ) -> std::result::Result<Vec<String>, RegistryError> {
        let info = self.model_info(repo_id)?;
        let paths: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
        Ok(matching_paths(&paths, &[pattern.to_string()]))
    }

    fn metadata(&self, repo_id: &str) -> std::result::Result<RemoteRepository, RegistryError> {
        let info = self.model_info(repo_id)?;
        let author = info
            .author
            .or_else(|| info.id.split_once('/').map(|(a, _)| a.to_string()))
            .unwrap_or_default();
        Ok(RemoteRepository {
            id: info.id,
            author,
            downloads: info.downloads.unwrap_or(0),
            likes: info.likes.unwrap_or(0),
        })
    }

    fn fetch_matching(
        &self,
        repo_id: &str,
        patterns: &[String],
    ) -> std::result::Result<Vec<PathBuf>, RegistryError> {
        let info = self.model_info(repo_id)?;
        let paths: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
        let wanted = matching_paths(&paths, patterns);

        let repo = self.api.model(repo_id.to_string());
        let mut fetched = Vec::with_capacity(wanted.len());
        for file in wanted {
            tracing::info!("Fetching {repo_id}/{file}");
            match repo.get(&file) {
                Ok(path) => fetched.push(path),
                Err(e) => {
                    let error = download_error(repo_id, &e);
                    if matches!(error, RegistryError::Restricted(_)) {
                        return Err(error);
                    }
                    tracing::warn!("Failed to download {repo_id}/{file}: {e}");
                }
            }
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        assert!(check_status("a/b", StatusCode::OK).is_ok());
        assert_eq!(
            check_status("a/b", StatusCode::FORBIDDEN),
            Err(RegistryError::Restricted("a/b".into()))
        );
        assert_eq!(
            check_status("a/b", StatusCode::UNAUTHORIZED),
            Err(RegistryError::Restricted("a/b".into()))
        );
        assert_eq!(
            check_status("a/b", StatusCode::NOT_FOUND),
            Err(RegistryError::NotFound("a/b".into()))
        );
        assert!(matches!(
            check_status("a/b", StatusCode::BAD_GATEWAY),
            Err(RegistryError::Network(_))
        ));
        assert!(matches!(
            check_status("a/b", StatusCode::BAD_REQUEST),
            Err(RegistryError::Invalid(_))
        ));
    }

    #[test]
    fn test_model_info_deserializes_sparse_response() {
        let info: ModelInfo = serde_json::from_str(
            r#"{"id":"TheBloke/Llama-2-7B-GGUF","siblings":[{"rfilename":"README.md"}]}"#,
        )
        .unwrap();
        assert_eq!(info.id, "TheBloke/Llama-2-7B-GGUF");
        assert!(info.author.is_none());
        assert_eq!(info.siblings.len(), 1);
    }

    #[test]
    fn test_api_url() {
        assert_eq!(
            api_url("https://example.org/", "models"),
            "https://example.org/api/models"
        );
        assert_eq!(
            api_url("https://huggingface.co", "models/a/b"),
            "https://huggingface.co/api/models/a/b"
        );
    }

    #[test]
    fn test_download_error_uses_status_code() {
        let forbidden = ureq::Response::new(403, "Forbidden", "").unwrap();
        let error = ApiError::RequestError(Box::new(ureq::Error::Status(403, forbidden)));
        assert_eq!(
            download_error("a/b", &error),
            RegistryError::Restricted("a/b".into())
        );

        let missing = ureq::Response::new(404, "Not Found", "").unwrap();
        let error = ApiError::RequestError(Box::new(ureq::Error::Status(404, missing)));
        assert_eq!(
            download_error("a/b", &error),
            RegistryError::NotFound("a/b".into())
        );

        // Digits in a file name or hash are not a status code
        let error = ApiError::IoError(std::io::Error::other("blob 4031abc truncated"));
        assert!(matches!(
            download_error("a/b", &error),
            RegistryError::Network(_)
        ));
    }
}
