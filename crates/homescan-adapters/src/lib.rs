//! Contracts for the external collaborators (candidate discovery and item
//! processing) plus fixture-first and command-backed implementations.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use homescan_core::{validate_external_id, Candidate, ExtractedItem, KeyError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "homescan-adapters";

const STDERR_TAIL_CHARS: usize = 400;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing candidates from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("candidate command {program} failed: {detail}")]
    Command { program: String, detail: String },
}

/// Why one item could not be turned into a record. Always recoverable at run level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemFailure {
    #[error("item {id} is unavailable: {reason}")]
    Unavailable { id: String, reason: String },
    #[error("transcription failed for {id}: {reason}")]
    Transcription { id: String, reason: String },
    #[error("extraction failed for {id}: {reason}")]
    Extraction { id: String, reason: String },
    #[error("no property fields were extracted for {id}")]
    EmptyExtraction { id: String },
    #[error("processor error for {id}: {reason}")]
    Processor { id: String, reason: String },
}

impl ItemFailure {
    /// Stable label stored next to failed ids in the tracker.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::Transcription { .. } => "transcription",
            Self::Extraction { .. } => "extraction",
            Self::EmptyExtraction { .. } => "empty_extraction",
            Self::Processor { .. } => "processor",
        }
    }

    fn from_kind(kind: &str, id: &str, reason: String) -> Self {
        let id = id.to_string();
        match kind {
            "unavailable" => Self::Unavailable { id, reason },
            "transcription" => Self::Transcription { id, reason },
            "extraction" => Self::Extraction { id, reason },
            "empty_extraction" => Self::EmptyExtraction { id },
            _ => Self::Processor { id, reason },
        }
    }
}

/// Result of probing one collaborator before a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub component: String,
    pub ready: bool,
    pub detail: String,
}

impl Readiness {
    pub fn ready(component: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ready: true,
            detail: detail.into(),
        }
    }

    pub fn missing(component: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ready: false,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `limit` candidates for `query`, in source order.
    async fn find(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceError>;

    /// Metadata for one item named by id or url, when this source knows it.
    async fn lookup(&self, reference: &str) -> Result<Option<Candidate>, SourceError> {
        debug!(reference, source = self.name(), "source has no single-item lookup");
        Ok(None)
    }

    async fn check(&self) -> Readiness {
        Readiness::ready(format!("candidate source ({})", self.name()), "no probe available")
    }
}

#[async_trait]
pub trait ItemProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Turn one candidate into extracted fields. May take minutes per item.
    async fn process(&self, candidate: &Candidate) -> Result<ExtractedItem, ItemFailure>;

    async fn check(&self) -> Readiness {
        Readiness::ready(format!("item processor ({})", self.name()), "no probe available")
    }
}

/// Bare candidate for an id or a url such as `https://host/watch?v=<id>` or `https://host/<id>`.
pub fn candidate_from_reference(reference: &str) -> Result<Candidate, KeyError> {
    let reference = reference.trim();
    let (external_id, url) = if reference.contains("://") {
        (id_from_url(reference), reference.to_string())
    } else {
        (reference.to_string(), String::new())
    };
    validate_external_id(&external_id)?;
    Ok(Candidate {
        external_id,
        url,
        title: String::new(),
        channel: String::new(),
        channel_url: None,
        upload_date: None,
        duration_seconds: None,
        view_count: None,
    })
}

fn id_from_url(url: &str) -> String {
    let url = url.split('#').next().unwrap_or(url);
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    if let Some(id) = query.and_then(|q| q.split('&').find_map(|pair| pair.strip_prefix("v="))) {
        return id.to_string();
    }
    let without_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    without_scheme
        .split('/')
        .skip(1)
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

/// Where `program` would be found when spawned, searching `PATH` for bare names.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

fn command_readiness(component: String, program: &str) -> Readiness {
    match resolve_program(program) {
        Some(path) => Readiness::ready(component, path.display().to_string()),
        None => Readiness::missing(component, format!("{program} not found")),
    }
}

/// Reject extractions that describe nothing.
pub fn ensure_populated(id: &str, item: ExtractedItem) -> Result<ExtractedItem, ItemFailure> {
    if item.extracted_data.is_empty() {
        return Err(ItemFailure::EmptyExtraction { id: id.to_string() });
    }
    Ok(item)
}

fn keep_valid_candidates(candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| match validate_external_id(&c.external_id) {
            Ok(()) => true,
            Err(err) => {
                warn!(id = %c.external_id, error = %err, "dropping candidate with unusable id");
                false
            }
        })
        .take(limit)
        .collect()
}

/// Which implementation backs an adapter, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterBackend {
    Fixture {
        dir: PathBuf,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

pub fn candidate_source_for(backend: &AdapterBackend) -> Box<dyn CandidateSource> {
    match backend {
        AdapterBackend::Fixture { dir } => Box::new(FixtureCandidateSource::new(dir)),
        AdapterBackend::Command { program, args } => {
            Box::new(CommandCandidateSource::new(program, args.clone()))
        }
    }
}

pub fn item_processor_for(backend: &AdapterBackend) -> Box<dyn ItemProcessor> {
    match backend {
        AdapterBackend::Fixture { dir } => Box::new(FixtureItemProcessor::new(dir)),
        AdapterBackend::Command { program, args } => {
            Box::new(CommandItemProcessor::new(program, args.clone()))
        }
    }
}

/// Candidates read from `<dir>/candidates.json` (a JSON array).
#[derive(Debug, Clone)]
pub struct FixtureCandidateSource {
    dir: PathBuf,
}

impl FixtureCandidateSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl CandidateSource for FixtureCandidateSource {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn find(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        let path = self.dir.join("candidates.json");
        let candidates: Vec<Candidate> = read_json_file(&path).await?;
        debug!(query, found = candidates.len(), "fixture candidates loaded");
        Ok(keep_valid_candidates(candidates, limit))
    }

    async fn lookup(&self, reference: &str) -> Result<Option<Candidate>, SourceError> {
        let path = self.dir.join("candidates.json");
        let candidates: Vec<Candidate> = read_json_file(&path).await?;
        Ok(candidates
            .into_iter()
            .find(|c| c.external_id == reference || c.url == reference))
    }

    async fn check(&self) -> Readiness {
        let component = "candidate source (fixture)";
        let path = self.dir.join("candidates.json");
        match read_json_file::<Vec<Candidate>>(&path).await {
            Ok(candidates) => Readiness::ready(
                component,
                format!("{} candidates in {}", candidates.len(), path.display()),
            ),
            Err(err) => Readiness::missing(component, err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixtureOutcome {
    Failure { failure: FixtureFailure },
    Item(ExtractedItem),
}

#[derive(Debug, Deserialize)]
struct FixtureFailure {
    kind: String,
    #[serde(default)]
    reason: String,
}

/// Extracted items read from `<dir>/records/<external_id>.json`.
///
/// A file of the form `{"failure": {"kind": "transcription", "reason": "..."}}`
/// replays that failure instead.
#[derive(Debug, Clone)]
pub struct FixtureItemProcessor {
    dir: PathBuf,
}

impl FixtureItemProcessor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ItemProcessor for FixtureItemProcessor {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn process(&self, candidate: &Candidate) -> Result<ExtractedItem, ItemFailure> {
        let id = candidate.external_id.as_str();
        let path = self.dir.join("records").join(format!("{id}.json"));
        let text = fs::read_to_string(&path)
            .await
            .map_err(|err| ItemFailure::Unavailable {
                id: id.to_string(),
                reason: format!("{}: {err}", path.display()),
            })?;
        let outcome: FixtureOutcome =
            serde_json::from_str(&text).map_err(|err| ItemFailure::Extraction {
                id: id.to_string(),
                reason: err.to_string(),
            })?;
        match outcome {
            FixtureOutcome::Failure { failure } => {
                Err(ItemFailure::from_kind(&failure.kind, id, failure.reason))
            }
            FixtureOutcome::Item(item) => ensure_populated(id, item),
        }
    }

    async fn check(&self) -> Readiness {
        let component = "item processor (fixture)";
        let records = self.dir.join("records");
        match fs::metadata(&records).await {
            Ok(meta) if meta.is_dir() => Readiness::ready(component, records.display().to_string()),
            Ok(_) => Readiness::missing(component, format!("{} is not a directory", records.display())),
            Err(err) => Readiness::missing(component, format!("{}: {err}", records.display())),
        }
    }
}

/// Runs `<program> <args..> <query> <limit>` and reads a JSON array of candidates from stdout.
#[derive(Debug, Clone)]
pub struct CommandCandidateSource {
    program: String,
    args: Vec<String>,
}

impl CommandCandidateSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl CandidateSource for CommandCandidateSource {
    fn name(&self) -> &str {
        &self.program
    }

    async fn find(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(query)
            .arg(limit.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| SourceError::Command {
                program: self.program.clone(),
                detail: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(SourceError::Command {
                program: self.program.clone(),
                detail: format!("{}: {}", output.status, stderr_tail(&output)),
            });
        }
        let candidates: Vec<Candidate> =
            serde_json::from_slice(&output.stdout).map_err(|source| SourceError::Parse {
                origin: format!("{} stdout", self.program),
                source,
            })?;
        Ok(keep_valid_candidates(candidates, limit))
    }

    async fn check(&self) -> Readiness {
        command_readiness(format!("candidate source ({})", self.program), &self.program)
    }
}

/// Runs `<program> <args..> <external_id> <source_url>` and reads one extracted item
/// as JSON from stdout.
///
/// Exit status 3 means unavailable, 4 transcription failure, 5 extraction failure;
/// any other non-zero status is a generic processor failure.
#[derive(Debug, Clone)]
pub struct CommandItemProcessor {
    program: String,
    args: Vec<String>,
}

impl CommandItemProcessor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl ItemProcessor for CommandItemProcessor {
    fn name(&self) -> &str {
        &self.program
    }

    async fn process(&self, candidate: &Candidate) -> Result<ExtractedItem, ItemFailure> {
        let id = candidate.external_id.as_str();
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(id)
            .arg(&candidate.url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ItemFailure::Processor {
                id: id.to_string(),
                reason: format!("spawning {}: {err}", self.program),
            })?;

        if !output.status.success() {
            let kind = match output.status.code() {
                Some(3) => "unavailable",
                Some(4) => "transcription",
                Some(5) => "extraction",
                _ => "processor",
            };
            return Err(ItemFailure::from_kind(
                kind,
                id,
                format!("{}: {}", output.status, stderr_tail(&output)),
            ));
        }

        let item: ExtractedItem =
            serde_json::from_slice(&output.stdout).map_err(|err| ItemFailure::Extraction {
                id: id.to_string(),
                reason: format!("unparsable processor output: {err}"),
            })?;
        ensure_populated(id, item)
    }

    async fn check(&self) -> Readiness {
        command_readiness(format!("item processor ({})", self.program), &self.program)
    }
}

fn stderr_tail(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    text.chars().skip(skip).collect()
}

async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
    let data = fs::read_to_string(path).await.map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| SourceError::Parse {
        origin: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use homescan_core::PropertyType;
    use tempfile::tempdir;

    fn candidate(id: &str) -> Candidate {
        Candidate {
            external_id: id.to_string(),
            url: format!("https://example.test/watch?v={id}"),
            title: String::new(),
            channel: String::new(),
            channel_url: None,
            upload_date: None,
            duration_seconds: None,
            view_count: None,
        }
    }

    fn write_fixtures(dir: &Path) {
        std::fs::create_dir_all(dir.join("records")).unwrap();
        std::fs::write(
            dir.join("candidates.json"),
            r#"[
                {"external_id": "v1", "url": "https://example.test/v1", "title": "150 sq yd house"},
                {"external_id": "../escape", "url": "https://example.test/x"},
                {"external_id": "v2", "url": "https://example.test/v2"},
                {"external_id": "v3", "url": "https://example.test/v3"}
            ]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("records").join("v1.json"),
            r#"{"extracted_data": {"property_type": "independent_house", "price": {"amount": 9500000}},
                "stages": [{"stage": "extraction", "id": "fixture"}]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("records").join("v2.json"),
            r#"{"failure": {"kind": "transcription", "reason": "garbage transcript"}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("records").join("v3.json"),
            r#"{"extracted_data": {"additional_notes": ["call for details"]}}"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn fixture_source_drops_bad_ids_and_honors_limit() {
        let dir = tempdir().expect("tempdir");
        write_fixtures(dir.path());
        let source = FixtureCandidateSource::new(dir.path());

        let all = source.find("houses", 10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);

        let limited = source.find("houses", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn fixture_processor_replays_items_and_failures() {
        let dir = tempdir().expect("tempdir");
        write_fixtures(dir.path());
        let processor = FixtureItemProcessor::new(dir.path());

        let item = processor.process(&candidate("v1")).await.unwrap();
        assert_eq!(item.extracted_data.property_type, Some(PropertyType::IndependentHouse));
        assert_eq!(item.extracted_data.price_amount(), Some(9_500_000));

        let failure = processor.process(&candidate("v2")).await.unwrap_err();
        assert_eq!(failure.kind(), "transcription");

        let empty = processor.process(&candidate("v3")).await.unwrap_err();
        assert_eq!(empty, ItemFailure::EmptyExtraction { id: "v3".into() });

        let missing = processor.process(&candidate("v9")).await.unwrap_err();
        assert_eq!(missing.kind(), "unavailable");
    }

    #[tokio::test]
    async fn missing_candidate_file_is_a_source_error() {
        let dir = tempdir().expect("tempdir");
        let source = candidate_source_for(&AdapterBackend::Fixture {
            dir: dir.path().to_path_buf(),
        });
        assert!(matches!(
            source.find("q", 5).await.unwrap_err(),
            SourceError::Io { .. }
        ));
    }

    #[tokio::test]
    async fn fixture_lookup_matches_id_or_url() {
        let dir = tempdir().expect("tempdir");
        write_fixtures(dir.path());
        let source = FixtureCandidateSource::new(dir.path());

        let by_id = source.lookup("v1").await.unwrap().unwrap();
        assert_eq!(by_id.title, "150 sq yd house");
        let by_url = source.lookup("https://example.test/v2").await.unwrap().unwrap();
        assert_eq!(by_url.external_id, "v2");
        assert!(source.lookup("v9").await.unwrap().is_none());
    }

    #[test]
    fn references_resolve_to_ids() {
        let watch = candidate_from_reference("https://www.youtube.com/watch?v=dQ9xLbN4k2s&t=30").unwrap();
        assert_eq!(watch.external_id, "dQ9xLbN4k2s");
        assert_eq!(watch.url, "https://www.youtube.com/watch?v=dQ9xLbN4k2s&t=30");

        let short = candidate_from_reference("https://youtu.be/Rk2mP8vWq0A").unwrap();
        assert_eq!(short.external_id, "Rk2mP8vWq0A");

        let bare = candidate_from_reference(" t7YhCz3uJfE ").unwrap();
        assert_eq!(bare.external_id, "t7YhCz3uJfE");
        assert!(bare.url.is_empty());

        assert!(candidate_from_reference("https://example.test/").is_err());
        assert!(candidate_from_reference("").is_err());
    }

    #[tokio::test]
    async fn fixture_checks_report_missing_files() {
        let dir = tempdir().expect("tempdir");
        let source = FixtureCandidateSource::new(dir.path());
        let processor = FixtureItemProcessor::new(dir.path());
        assert!(!source.check().await.ready);
        assert!(!processor.check().await.ready);

        write_fixtures(dir.path());
        let ready = source.check().await;
        assert!(ready.ready);
        assert!(ready.detail.starts_with("4 candidates"));
        assert!(processor.check().await.ready);
    }

    #[tokio::test]
    async fn command_check_resolves_program() {
        let missing = CommandItemProcessor::new("homescan-no-such-extractor", Vec::new());
        let readiness = missing.check().await;
        assert!(!readiness.ready);
        assert!(readiness.detail.contains("not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_check_finds_programs_on_path() {
        let source = CommandCandidateSource::new("sh", Vec::new());
        assert!(source.check().await.ready);
    }

    #[test]
    fn backend_config_parses_tagged_form() {
        let backend: AdapterBackend =
            serde_json::from_str(r#"{"kind": "command", "program": "yt-search", "args": ["--json"]}"#)
                .unwrap();
        assert_eq!(
            backend,
            AdapterBackend::Command {
                program: "yt-search".into(),
                args: vec!["--json".into()],
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_processor_maps_exit_status_to_failure_kind() {
        let processor = CommandItemProcessor::new(
            "sh",
            vec!["-c".into(), "echo 'no audio' >&2; exit 4".into(), "sh".into()],
        );
        let failure = processor.process(&candidate("v1")).await.unwrap_err();
        assert_eq!(failure.kind(), "transcription");
        assert!(failure.to_string().contains("no audio"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_source_reads_stdout_json() {
        let source = CommandCandidateSource::new(
            "sh",
            vec![
                "-c".into(),
                r#"echo '[{"external_id":"q1","url":"https://example.test/q1"}]'"#.into(),
                "sh".into(),
            ],
        );
        let found = source.find("anything", 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_id, "q1");
    }
}
