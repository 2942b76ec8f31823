//! File-backed capture store
//!
//! One JSON file per capture, named
//! `<label>_<model>_<hash prefix>_<timestamp>.json`, with a short unique
//! suffix on the rare same-millisecond collision. Lookup is by exact
//! request hash first; otherwise the most recently written capture for the
//! same provider, label and model is used, unless the store is exact-only.

use super::canonical::request_hash;
use super::error::{RecorderError, RecorderResult};
use super::exchange::{RecordedExchange, ResponseData};
use crate::protocol::{ChatRequest, ProviderKind};
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.-]+").expect("static pattern"));

/// Make a label or model id safe for use inside a capture filename
pub fn sanitize_component(raw: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(raw, "-");
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// How a capture was matched to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    /// Degraded: newest capture for the label and model, hash differs
    MostRecent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedExchange {
    pub exchange: RecordedExchange,
    pub match_kind: MatchKind,
    pub path: PathBuf,
}

/// Where and how a recorded capture was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCapture {
    pub request_hash: String,
    pub path: PathBuf,
}

/// Capture directory scoped to one test label
#[derive(Debug, Clone)]
pub struct ReplayStore {
    dir: PathBuf,
    label: String,
    exact_match_only: bool,
}

impl ReplayStore {
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
            exact_match_only: false,
        }
    }

    /// Refuse the most-recent fallback
    pub fn with_exact_match_only(mut self, exact_match_only: bool) -> Self {
        self.exact_match_only = exact_match_only;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn exact_match_only(&self) -> bool {
        self.exact_match_only
    }

    /// Persist a capture and return its request hash
    pub fn record(
        &self,
        provider: ProviderKind,
        request: &ChatRequest,
        response: ResponseData,
    ) -> RecorderResult<RecordedCapture> {
        let exchange = RecordedExchange::new(provider, request, self.label.clone(), response)?;
        fs::create_dir_all(&self.dir).map_err(|err| RecorderError::io(&self.dir, err))?;

        let stem = format!(
            "{}{}_{}",
            self.file_prefix(&request.model),
            &exchange.request_hash[..8],
            exchange.recorded_at.format("%Y%m%dT%H%M%S%3fZ"),
        );
        let body = serde_json::to_vec_pretty(&exchange)?;
        let path = write_new(&self.dir, &stem, &body)?;

        info!(
            provider = %provider,
            model = %request.model,
            hash = %exchange.request_hash,
            chunks = exchange.chunk_count,
            path = %path.display(),
            "recorded capture"
        );
        Ok(RecordedCapture {
            request_hash: exchange.request_hash,
            path,
        })
    }

    /// Find the capture for a request
    pub fn load(&self, provider: ProviderKind, request: &ChatRequest) -> RecorderResult<LoadedExchange> {
        let hash = request_hash(request)?;
        let not_found = || RecorderError::ReplayNotFound {
            provider,
            model: request.model.clone(),
            label: self.label.clone(),
            hash: hash.clone(),
        };

        let candidates = self.candidates(&request.model)?;
        let mut newest: Option<(SystemTime, PathBuf, RecordedExchange)> = None;

        for (modified, path) in candidates {
            let exchange = match read_exchange(&path) {
                Ok(exchange) => exchange,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring unreadable capture");
                    continue;
                }
            };
            // Distinct labels or models can sanitize to the same prefix
            if exchange.provider != provider
                || exchange.test_label != self.label
                || exchange.model_id != request.model
            {
                continue;
            }
            if exchange.request_hash == hash {
                debug!(path = %path.display(), "exact capture match");
                return Ok(LoadedExchange {
                    exchange,
                    match_kind: MatchKind::Exact,
                    path,
                });
            }
            let newer = match &newest {
                Some((best, _, best_exchange)) => {
                    (modified, exchange.recorded_at) > (*best, best_exchange.recorded_at)
                }
                None => true,
            };
            if newer {
                newest = Some((modified, path, exchange));
            }
        }

        if self.exact_match_only {
            return Err(not_found());
        }
        let Some((_, path, exchange)) = newest else {
            return Err(not_found());
        };
        warn!(
            provider = %provider,
            model = %request.model,
            label = %self.label,
            expected_hash = %hash,
            replayed_hash = %exchange.request_hash,
            path = %path.display(),
            "no exact capture match, replaying most recent capture"
        );
        Ok(LoadedExchange {
            exchange,
            match_kind: MatchKind::MostRecent,
            path,
        })
    }

    fn file_prefix(&self, model: &str) -> String {
        format!(
            "{}_{}_",
            sanitize_component(&self.label),
            sanitize_component(model)
        )
    }

    fn candidates(&self, model: &str) -> RecorderResult<Vec<(SystemTime, PathBuf)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(RecorderError::io(&self.dir, err)),
        };

        let prefix = self.file_prefix(model);
        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| RecorderError::io(&self.dir, err))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((modified, entry.path()));
        }
        Ok(candidates)
    }
}

/// Create `<stem>.json`, never replacing an existing capture. A second
/// capture in the same millisecond gets a short unique suffix.
fn write_new(dir: &Path, stem: &str, body: &[u8]) -> RecorderResult<PathBuf> {
    let mut path = dir.join(format!("{}.json", stem));
    loop {
        let file = OpenOptions::new().write(true).create_new(true).open(&path);
        match file {
            Ok(mut file) => {
                file.write_all(body).map_err(|err| RecorderError::io(&path, err))?;
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let suffix = Uuid::new_v4().simple().to_string();
                path = dir.join(format!("{}-{}.json", stem, &suffix[..8]));
            }
            Err(err) => return Err(RecorderError::io(&path, err)),
        }
    }
}

fn read_exchange(path: &Path) -> RecorderResult<RecordedExchange> {
    let body = fs::read(path).map_err(|err| RecorderError::io(path, err))?;
    Ok(serde_json::from_slice(&body)?)
}
