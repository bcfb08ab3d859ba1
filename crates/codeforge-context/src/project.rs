//! Project context — indexed repository facts behind a read-mostly lock
//!
//! The index is eventually consistent with the filesystem: scans and
//! invalidations are the single writer, readers get a snapshot per call and
//! tolerate staleness. Writes through the editor or filesystem tool call
//! `note_modified` to refresh the affected entry.

use chrono::{DateTime, Utc};
use codeforge_core::{CodebaseSize, Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default exclusions on top of .gitignore.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/.git/**",
    "**/*.min.js",
    "**/*.lock",
];

/// Files whose contents never enter a context slice.
const MAX_INDEXED_FILE_SIZE: u64 = 1_000_000;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FileInfo {
    pub relative_path: String,
    pub language: Option<&'static str>,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Relevance prior; higher sorts earlier into context slices.
    pub importance: f64,
}

pub struct ProjectContext {
    root: PathBuf,
    exclude: GlobSet,
    index: RwLock<HashMap<String, FileInfo>>,
}

impl ProjectContext {
    pub fn new(root: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::with_excludes(root, &[])
    }

    /// Extra exclusion patterns are applied on top of the defaults and the
    /// repository's .gitignore.
    pub fn with_excludes(root: impl AsRef<Path>, patterns: &[String]) -> Result<Arc<Self>> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(Error::Io)?;

        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_EXCLUDES.iter().copied() {
            builder.add(Glob::new(pattern).map_err(|e| Error::validation(e.to_string()))?);
        }
        for pattern in patterns {
            builder.add(Glob::new(pattern).map_err(|e| Error::validation(e.to_string()))?);
        }
        let exclude = builder
            .build()
            .map_err(|e| Error::validation(e.to_string()))?;

        Ok(Arc::new(Self {
            root,
            exclude,
            index: RwLock::new(HashMap::new()),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the repository and rebuild the index. Honors .gitignore and the
    /// exclusion list; hidden directories are skipped. Returns the number of
    /// files indexed.
    pub async fn scan(&self) -> Result<usize> {
        let root = self.root.clone();
        let exclude = self.exclude.clone();

        let entries = tokio::task::spawn_blocking(move || {
            let mut entries: HashMap<String, FileInfo> = HashMap::new();
            for entry in WalkBuilder::new(&root).build() {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        debug!("scan: skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let relative = match entry.path().strip_prefix(&root) {
                    Ok(r) => r.to_string_lossy().replace('\\', "/"),
                    Err(_) => continue,
                };
                if exclude.is_match(&relative) {
                    continue;
                }
                if let Some(info) = stat_file(entry.path(), &relative) {
                    entries.insert(relative, info);
                }
            }
            entries
        })
        .await
        .map_err(|e| Error::validation(format!("scan task failed: {}", e)))?;

        let count = entries.len();
        *self.index.write().await = entries;
        debug!("scan: indexed {} files under {}", count, self.root.display());
        Ok(count)
    }

    pub async fn file_count(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn files(&self) -> Vec<FileInfo> {
        self.index.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, relative_path: &str) -> bool {
        self.index.read().await.contains_key(relative_path)
    }

    /// Drop or refresh a single entry after the file changed on disk.
    pub async fn invalidate(&self, relative_path: &str) {
        let absolute = self.root.join(relative_path);
        let mut index = self.index.write().await;
        match stat_file(&absolute, relative_path) {
            Some(info) => {
                index.insert(relative_path.to_string(), info);
            }
            None => {
                index.remove(relative_path);
            }
        }
    }

    /// Refresh an entry and boost its importance: recently touched files are
    /// the most likely subjects of the next request.
    pub async fn note_modified(&self, relative_path: &str) {
        self.invalidate(relative_path).await;
        let mut index = self.index.write().await;
        if let Some(info) = index.get_mut(relative_path) {
            info.importance += 2.0;
        }
    }

    /// Distinct languages in the index, most common first.
    pub async fn languages(&self) -> Vec<String> {
        let index = self.index.read().await;
        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for info in index.values() {
            if let Some(lang) = info.language {
                *counts.entry(lang).or_default() += 1;
            }
        }
        let mut languages: Vec<(&str, usize)> = counts.into_iter().collect();
        languages.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        languages.into_iter().map(|(l, _)| l.to_string()).collect()
    }

    pub async fn codebase_size(&self) -> CodebaseSize {
        match self.index.read().await.len() {
            0..=100 => CodebaseSize::Small,
            101..=2000 => CodebaseSize::Medium,
            _ => CodebaseSize::Large,
        }
    }

    /// A bounded, relevance-ranked slice of the repository for grounding an
    /// LLM prompt. Always includes a one-line project summary; file bodies
    /// are appended best-match-first until the token budget runs out.
    pub async fn relevant_context(&self, prompt: &str, max_tokens: usize) -> String {
        let index = self.index.read().await;
        let terms = query_terms(prompt);

        let mut scored: Vec<(&FileInfo, f64)> = index
            .values()
            .map(|info| (info, relevance(info, &terms)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.relative_path.cmp(&b.0.relative_path))
        });

        let languages = {
            let mut counts: HashMap<&'static str, usize> = HashMap::new();
            for info in index.values() {
                if let Some(lang) = info.language {
                    *counts.entry(lang).or_default() += 1;
                }
            }
            let mut langs: Vec<(&str, usize)> = counts.into_iter().collect();
            langs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            langs
                .into_iter()
                .map(|(l, _)| l.to_string())
                .collect::<Vec<_>>()
        };

        let mut out = format!(
            "Project root: {}\nFiles indexed: {}\nLanguages: {}\n",
            self.root.display(),
            index.len(),
            if languages.is_empty() {
                "unknown".to_string()
            } else {
                languages.join(", ")
            }
        );
        let mut budget = max_tokens.saturating_sub(estimate_tokens(&out));

        for (info, score) in scored {
            if budget < 32 {
                break;
            }
            if score <= 0.0 || info.size > MAX_INDEXED_FILE_SIZE {
                continue;
            }
            let absolute = self.root.join(&info.relative_path);
            let content = match std::fs::read_to_string(&absolute) {
                Ok(c) => c,
                Err(e) => {
                    debug!("context: cannot read {}: {}", info.relative_path, e);
                    continue;
                }
            };
            let header = format!("\n--- {} ---\n", info.relative_path);
            let available = budget.saturating_sub(estimate_tokens(&header));
            let body = truncate_to_tokens(&content, available);
            if body.is_empty() {
                continue;
            }
            budget = budget
                .saturating_sub(estimate_tokens(&header))
                .saturating_sub(estimate_tokens(&body));
            out.push_str(&header);
            out.push_str(&body);
        }

        out
    }
}

fn stat_file(absolute: &Path, relative: &str) -> Option<FileInfo> {
    let meta = match std::fs::metadata(absolute) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return None,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("stat failed for {}: {}", absolute.display(), e);
            }
            return None;
        }
    };
    let modified = meta.modified().ok().map(DateTime::<Utc>::from);
    let language = detect_language(relative);
    Some(FileInfo {
        relative_path: relative.to_string(),
        language,
        size: meta.len(),
        modified,
        importance: base_importance(relative, language),
    })
}

fn detect_language(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    let lang = match ext {
        "rs" => "Rust",
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "py" => "Python",
        "go" => "Go",
        "java" => "Java",
        "c" | "h" => "C",
        "cpp" | "cc" | "hpp" => "C++",
        "rb" => "Ruby",
        "sh" => "Shell",
        "md" => "Markdown",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "html" => "HTML",
        "css" | "scss" => "CSS",
        "sql" => "SQL",
        _ => return None,
    };
    Some(lang)
}

/// Entry points and manifests outrank ordinary sources, which outrank
/// assets and documentation.
fn base_importance(path: &str, language: Option<&'static str>) -> f64 {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut score: f64 = match name.as_str() {
        "main.rs" | "lib.rs" | "mod.rs" | "index.ts" | "index.js" | "main.py" | "__init__.py" => {
            5.0
        }
        "Cargo.toml" | "package.json" | "pyproject.toml" | "go.mod" => 4.0,
        "README.md" => 3.0,
        _ => 1.0,
    };
    if matches!(
        language,
        Some("Rust" | "TypeScript" | "JavaScript" | "Python" | "Go" | "Java" | "C" | "C++")
    ) {
        score += 1.0;
    }
    score
}

fn query_terms(prompt: &str) -> Vec<String> {
    prompt
        .split(|c: char| !c.is_alphanumeric() && c != '.' && c != '/' && c != '_' && c != '-')
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

fn relevance(info: &FileInfo, terms: &[String]) -> f64 {
    let path = info.relative_path.to_lowercase();
    let name = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut score = info.importance * 0.1;
    for term in terms {
        if name == *term || path == *term {
            score += 10.0;
        } else if name.contains(term.as_str()) {
            score += 4.0;
        } else if path.contains(term.as_str()) {
            score += 2.0;
        }
    }
    score
}

/// The 4-chars-per-token estimate used everywhere context budgets apply.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_bytes = max_tokens.saturating_mul(4);
    if text.len() <= max_bytes {
        return text.to_string();
    }
    // Cut at a line boundary so the slice stays readable
    let mut end = 0;
    for line in text.lines() {
        let next = end + line.len() + 1;
        if next > max_bytes {
            break;
        }
        end = next;
    }
    let mut out = text[..end.min(text.len())].to_string();
    out.push_str("… [truncated]\n");
    out
}
