//! Reads bundles from local files and HTTP(S) URLs.
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use netcheck_common::Bundle;

use crate::version::user_agent;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialization of a bundle document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    /// The format implied by a file name's extension, if any.
    pub fn from_extension(path: &str) -> Option<Self> {
        let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }

    /// The format implied by an HTTP `Content-Type` value, if any.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime.ends_with("json") {
            Some(Format::Json)
        } else if mime.ends_with("yaml") || mime.ends_with("yml") {
            Some(Format::Yaml)
        } else if mime.ends_with("toml") {
            Some(Format::Toml)
        } else {
            None
        }
    }

    /// Guesses the format from the document itself; YAML when unsure.
    pub fn sniff(text: &str) -> Self {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            Format::Json
        } else {
            Format::Yaml
        }
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read bundle file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch bundle from {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to parse {source_name} as JSON: {error}")]
    Json {
        source_name: String,
        error: serde_json::Error,
    },
    #[error("failed to parse {source_name} as YAML: {error}")]
    Yaml {
        source_name: String,
        error: serde_yaml::Error,
    },
    #[error("failed to parse {source_name} as TOML: {error}")]
    Toml {
        source_name: String,
        error: toml::de::Error,
    },
}

/// A bundle document and whatever its transport says about its format.
struct Fetched {
    text: String,
    hint: Option<Format>,
}

fn is_url(source: &str) -> bool {
    ["http://", "https://", "https-://"]
        .iter()
        .any(|scheme| source.starts_with(scheme))
}

async fn fetch_url(source: &str) -> Result<Fetched, LoadError> {
    // `https-://` fetches over TLS without verifying the server certificate.
    let (url, insecure) = match source.strip_prefix("https-://") {
        Some(rest) => (format!("https://{rest}"), true),
        None => (source.to_string(), false),
    };
    let http_error = |source: reqwest::Error| LoadError::Http {
        url: url.clone(),
        source,
    };

    let client = reqwest::Client::builder()
        .user_agent(user_agent())
        .timeout(FETCH_TIMEOUT)
        .danger_accept_invalid_certs(insecure)
        .build()
        .map_err(http_error)?;
    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(http_error)?;

    let hint = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(Format::from_content_type);
    let text = response.text().await.map_err(http_error)?;
    debug!(url = %url, bytes = text.len(), ?hint, "Fetched bundle.");
    Ok(Fetched { text, hint })
}

async fn fetch(source: &str) -> Result<Fetched, LoadError> {
    if is_url(source) {
        let fetched = fetch_url(source).await?;
        // an extension in the URL path wins over the server's content type
        let hint = Format::from_extension(source.split(['?', '#']).next().unwrap_or(source))
            .or(fetched.hint);
        return Ok(Fetched { hint, ..fetched });
    }
    let text = tokio::fs::read_to_string(source)
        .await
        .map_err(|e| LoadError::Read {
            path: PathBuf::from(source),
            source: e,
        })?;
    Ok(Fetched {
        text,
        hint: Format::from_extension(source),
    })
}

/// Deserializes a bundle document in the given format.
pub fn parse(text: &str, format: Format, source_name: &str) -> Result<Bundle, LoadError> {
    let source_name = source_name.to_string();
    match format {
        Format::Json => {
            serde_json::from_str(text).map_err(|error| LoadError::Json { source_name, error })
        }
        Format::Yaml => {
            serde_yaml::from_str(text).map_err(|error| LoadError::Yaml { source_name, error })
        }
        Format::Toml => toml::from_str(text).map_err(|error| LoadError::Toml { source_name, error }),
    }
}

/// Loads one bundle from a path or URL.
///
/// The format is, in order of precedence: `format` when given, the source's
/// extension, the HTTP content type, and finally a guess from the content.
pub async fn load(source: &str, format: Option<Format>) -> Result<Bundle, LoadError> {
    let fetched = fetch(source).await?;
    let format = format
        .or(fetched.hint)
        .unwrap_or_else(|| Format::sniff(&fetched.text));
    let bundle = parse(&fetched.text, format, source)?;
    info!(source, ?format, bundle = %bundle.id, checks = bundle.checks.len(), "Loaded bundle.");
    Ok(bundle)
}
