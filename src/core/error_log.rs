//! Structured failure records appended to `error.log` as JSON lines

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Structured error context for detailed error reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    pub timestamp: String,
    pub error_type: String,
    pub error_message: String,
    pub request_url: Option<String>,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            error_type: String::new(),
            error_message: String::new(),
            request_url: None,
            status_code: None,
            response_body: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_error(mut self, error_type: &str, message: &str) -> Self {
        self.error_type = error_type.to_string();
        self.error_message = message.to_string();
        self
    }

    pub fn with_request_details(
        mut self,
        url: &str,
        status_code: Option<u16>,
        response_body: Option<&str>,
    ) -> Self {
        self.request_url = Some(url.to_string());
        self.status_code = status_code;
        self.response_body = response_body.map(|s| s.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Emit through `log` and, when a log file is configured, persist it
    pub fn report(&self, error_log: Option<&ErrorLog>) {
        log::error!(
            target: "collectr_errors",
            "Operation: {} | Type: {} | Message: {} | URL: {:?} | Status: {:?} | Context: {:?}",
            self.operation,
            self.error_type,
            self.error_message,
            self.request_url,
            self.status_code,
            self.metadata
        );

        if let Some(error_log) = error_log {
            if let Err(e) = error_log.append(self) {
                log::warn!("Failed to write to error log file: {e}");
            }
        }
    }
}

/// Statistics about recorded errors for one operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub error_types: HashMap<String, usize>,
    pub last_error_time: Option<String>,
}

/// Append-only JSON-lines error log
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, context: &ErrorContext) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let error_json = serde_json::to_string(context).map_err(io::Error::other)?;
        writeln!(file, "{error_json}")?;
        Ok(())
    }

    /// Most recent first, optionally restricted to one operation
    pub fn read_recent(
        &self,
        limit: usize,
        operation_filter: Option<&str>,
    ) -> io::Result<Vec<ErrorContext>> {
        let mut errors: Vec<ErrorContext> = self
            .read_all()?
            .into_iter()
            .filter(|e| operation_filter.is_none_or(|op| e.operation == op))
            .collect();

        errors.reverse();
        errors.truncate(limit);
        Ok(errors)
    }

    pub fn stats(&self) -> io::Result<HashMap<String, ErrorStats>> {
        let mut stats: HashMap<String, ErrorStats> = HashMap::new();

        for error in self.read_all()? {
            let entry = stats.entry(error.operation.clone()).or_default();
            entry.total_errors += 1;
            *entry.error_types.entry(error.error_type.clone()).or_insert(0) += 1;
            entry.last_error_time = Some(error.timestamp.clone());
        }

        Ok(stats)
    }

    /// Returns `false` when there was nothing to clear
    pub fn clear(&self) -> io::Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }

    fn read_all(&self) -> io::Result<Vec<ErrorContext>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut errors = Vec::new();
        for line in reader.lines() {
            let line = line?;
            // Skip lines written by an incompatible version
            if let Ok(error) = serde_json::from_str::<ErrorContext>(&line) {
                errors.push(error);
            }
        }
        Ok(errors)
    }
}
