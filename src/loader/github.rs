use log::{info, warn};
use reqwest::{header, Client, StatusCode};
use url::Url;

use crate::config::GitHubConfig;
use crate::error::{AtlasError, Result};

/// Creates the HTTP client used for archive downloads
///
/// A token, when given, is sent as `Authorization: token ...`.
pub fn create_github_client(token: Option<&str>) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static("codeatlas"));
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        let value = header::HeaderValue::from_str(&format!("token {}", token.trim()))
            .map_err(|_| AtlasError::Config("GitHub token contains invalid characters".into()))?;
        headers.insert(header::AUTHORIZATION, value);
    }

    Client::builder()
        .default_headers(headers)
        .build()
        .map_err(AtlasError::Http)
}

/// Extracts `(owner, repo)` from a GitHub URL
///
/// Accepts URLs with or without scheme, trailing slashes, a `.git` suffix and
/// extra path segments such as `/tree/main`.
pub fn parse_github_url(input: &str) -> Result<(String, String)> {
    let mut url = input.trim().trim_end_matches('/').to_string();
    if let Some(stripped) = url.strip_suffix(".git") {
        url = stripped.to_string();
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("https://{}", url);
    }

    let parsed = Url::parse(&url)
        .map_err(|_| AtlasError::Validation("Please provide a valid GitHub URL".into()))?;
    match parsed.host_str() {
        Some("github.com") | Some("www.github.com") => {}
        _ => return Err(AtlasError::Validation("Please provide a valid GitHub URL".into())),
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    if segments.len() < 2 {
        return Err(AtlasError::Validation(format!("Invalid GitHub URL format: {}", input.trim())));
    }

    let owner = segments[0].to_string();
    let repo = segments[1].trim_end_matches(".git").to_string();
    let valid = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid(&owner) || !valid(&repo) || repo == "." || repo == ".." {
        return Err(AtlasError::Validation(format!("Invalid GitHub URL format: {}", input.trim())));
    }
    Ok((owner, repo))
}

/// Downloads a repository archive, trying each configured ref in turn
///
/// Only a 404 moves on to the next ref; any other failure is returned at once.
pub async fn download_archive(
    client: &Client,
    github: &GitHubConfig,
    owner: &str,
    repo: &str,
    max_bytes: u64,
) -> Result<Vec<u8>> {
    let base = github.base_url.trim_end_matches('/');

    for git_ref in &github.archive_refs {
        let archive_url = format!("{}/{}/{}/archive/{}.zip", base, owner, repo, git_ref);
        info!("Trying: {}", archive_url);

        let response = client
            .get(&archive_url)
            .send()
            .await
            .map_err(|e| AtlasError::Fetch(format!("Network error: {}", e)))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => continue,
            status => {
                return Err(AtlasError::Fetch(format!(
                    "Failed to download {}/{}: HTTP {}",
                    owner, repo, status
                )));
            }
        }

        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(AtlasError::InvalidSource(format!(
                    "Archive for {}/{} is {} bytes, over the {} byte limit",
                    owner, repo, length, max_bytes
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AtlasError::Fetch(format!("Network error: {}", e)))?;
        if bytes.len() as u64 > max_bytes {
            return Err(AtlasError::InvalidSource(format!(
                "Archive for {}/{} exceeds the {} byte limit",
                owner, repo, max_bytes
            )));
        }
        info!("Downloaded {}/{}@{} ({} bytes)", owner, repo, git_ref, bytes.len());
        return Ok(bytes.to_vec());
    }

    warn!("No archive ref found for {}/{}", owner, repo);
    Err(AtlasError::Fetch(format!("Repository not found: {}/{}", owner, repo)))
}
