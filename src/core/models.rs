use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;

pub type CompanyId = i64;

/// A company as the collections service reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub company_name: String,
    #[serde(default)]
    pub liked: bool,
}

/// One page of a collection plus the collection's total size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPage {
    pub id: String,
    pub collection_name: String,
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub id: String,
    pub collection_name: String,
}

/// A page of the global company listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyBatch {
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikedCollectionResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyIdsResponse {
    pub company_ids: Vec<CompanyId>,
}

/// Body shared by the add/remove endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyIdsRequest {
    pub company_ids: Vec<CompanyId>,
}

/// Acknowledgement returned by mutating endpoints; the body may be empty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// Which Liked-collection mutation a batch operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchKind {
    Add,
    Remove,
}

impl BatchKind {
    pub fn display_name(&self) -> &str {
        match self {
            BatchKind::Add => "Add to Liked",
            BatchKind::Remove => "Remove from Liked",
        }
    }

    /// Only adds are estimable: removal latency on the server is not linear
    pub fn tracks_progress(&self) -> bool {
        matches!(self, BatchKind::Add)
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Add => write!(f, "add"),
            BatchKind::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataPath {
    pub root: PathBuf,
}

impl DataPath {
    pub fn new(data_path: Option<PathBuf>) -> io::Result<Self> {
        let root = match data_path {
            Some(path) => path,
            None => dirs::home_dir()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        "Home directory not found. Please specify --data-path.",
                    )
                })?
                .join(".collectr"),
        };

        Ok(Self { root })
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.root.join("error.log")
    }

    pub fn app_log_path(&self) -> PathBuf {
        self.root.join("collectr.log")
    }
}

pub fn validate_base_url(base_url: &str) -> io::Result<()> {
    if base_url.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Base URL cannot be empty",
        ));
    }

    let parsed = url::Url::parse(base_url).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Base URL is not a valid URL: {e}"),
        )
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Base URL must start with http:// or https://",
        ));
    }

    if parsed.host_str().is_none() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Base URL must include a host",
        ));
    }

    Ok(())
}

/// Parses ids typed on the command line, accepting commas or whitespace
pub fn parse_company_ids(inputs: &[String]) -> io::Result<Vec<CompanyId>> {
    let mut ids = Vec::new();
    for raw in inputs.iter().flat_map(|s| s.split(',')) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let id = raw.parse::<CompanyId>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{raw}' is not a valid company id"),
            )
        })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
