//! Content store: guide documents and blog posts loaded at start-up.
//!
//! SYSTEM CONTEXT
//! ==============
//! Documents are markdown/MDX files with YAML front matter under
//! `CONTENT_DIR/docs` (guides) and `CONTENT_DIR/blog` (posts). They are read
//! once, never mutated, and looked up by slug. Bodies are kept verbatim;
//! rendering them is someone else's job.
//!
//! A guide's flattened path is its path relative to `docs/` without the
//! extension (`android/installation/tahap-1`); its slug is the flattened path
//! with a trailing `/index` removed (`android/index` -> `android`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

const CONTENT_EXTENSIONS: &[&str] = &["md", "mdx"];

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to walk content directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{0}: missing front matter")]
    MissingFrontMatter(PathBuf),
    #[error("{path}: invalid front matter: {source}")]
    FrontMatter { path: PathBuf, source: serde_yaml::Error },
    #[error("{path}: missing required field `{field}`")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("duplicate slug: {0}")]
    DuplicateSlug(String),
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// A gated piece of documentation addressed by slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuideDocument {
    pub slug: String,
    pub flattened_path: String,
    pub title: String,
    pub description: String,
    /// Raw MDX/markdown source.
    pub body: String,
    /// Asset references in display order.
    pub images: Vec<String>,
}

/// Blog post summary. Post bodies are not served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlogPost {
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    /// ISO date (`YYYY-MM-DD`).
    pub date: String,
    pub published: bool,
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    date: Option<serde_yaml::Value>,
    #[serde(default)]
    published: Option<bool>,
    #[serde(default)]
    image: Option<String>,
}

// =============================================================================
// STORE
// =============================================================================

/// Immutable, slug-indexed content.
#[derive(Debug, Default)]
pub struct ContentStore {
    /// Guides keyed by slug.
    docs: BTreeMap<String, GuideDocument>,
    posts: Vec<BlogPost>,
}

impl ContentStore {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a store from already-parsed content.
    ///
    /// # Errors
    ///
    /// Returns an error if two guides share a slug.
    pub fn from_parts(docs: Vec<GuideDocument>, posts: Vec<BlogPost>) -> Result<Self, ContentError> {
        let mut by_slug = BTreeMap::new();
        for doc in docs {
            if by_slug.contains_key(&doc.slug) {
                return Err(ContentError::DuplicateSlug(doc.slug));
            }
            by_slug.insert(doc.slug.clone(), doc);
        }
        Ok(Self { docs: by_slug, posts })
    }

    /// Load `root/docs/**` and `root/blog/**`.
    ///
    /// A missing `root` yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or has malformed front matter.
    pub fn load(root: &Path) -> Result<Self, ContentError> {
        if !root.is_dir() {
            tracing::warn!(dir = %root.display(), "content directory not found; serving no documents");
            return Ok(Self::empty());
        }
        let docs = load_collection(&root.join("docs"), parse_document)?;
        let posts = load_collection(&root.join("blog"), parse_post)?;
        tracing::info!(docs = docs.len(), posts = posts.len(), "content loaded");
        Self::from_parts(docs, posts)
    }

    /// Exact slug lookup.
    #[must_use]
    pub fn find_by_slug(&self, slug: &str) -> Option<&GuideDocument> {
        self.docs.get(&normalize_slug(slug))
    }

    /// Resolve a section page (`/android/<rest>`) to a document.
    ///
    /// Tries, in order: the section index when `rest` is empty,
    /// `<section>/<rest>` exactly, then documents inside the section whose
    /// flattened path ends with `/<rest>` or `/<rest>/index`.
    #[must_use]
    pub fn resolve_page(&self, section: &str, rest: &str) -> Option<&GuideDocument> {
        let section = normalize_slug(section);
        let rest = normalize_slug(rest);
        if rest.is_empty() {
            return self.docs.get(&section);
        }

        let full = format!("{section}/{rest}");
        if let Some(doc) = self.docs.get(&full) {
            return Some(doc);
        }

        let prefix = format!("{section}/");
        let suffix = format!("/{rest}");
        let index_suffix = format!("/{rest}/index");
        self.docs.values().find(|d| {
            d.flattened_path.starts_with(&prefix)
                && (d.flattened_path.ends_with(&suffix) || d.flattened_path.ends_with(&index_suffix))
        })
    }

    /// Guides inside `section`, index first, in path order.
    #[must_use]
    pub fn section_docs(&self, section: &str) -> Vec<&GuideDocument> {
        let section = normalize_slug(section);
        let prefix = format!("{section}/");
        let mut docs: Vec<_> = self
            .docs
            .values()
            .filter(|d| d.slug == section || d.slug.starts_with(&prefix))
            .collect();
        docs.sort_by_key(|d| (d.slug != section, d.flattened_path.clone()));
        docs
    }

    /// Published posts, newest first.
    #[must_use]
    pub fn published_posts(&self) -> Vec<&BlogPost> {
        let mut posts: Vec<_> = self.posts.iter().filter(|p| p.published).collect();
        posts.sort_by(|a, b| b.date.cmp(&a.date));
        posts
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Trim slashes and drop empty segments: `/a//b/` -> `a/b`.
#[must_use]
pub fn normalize_slug(raw: &str) -> String {
    raw.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Relative path without extension, `/`-separated.
#[must_use]
pub fn flattened_path(relative: &Path) -> String {
    let without_ext = relative.with_extension("");
    without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Slug for a flattened path: a trailing `index` segment is dropped.
#[must_use]
pub fn slug_from_flattened(flattened: &str) -> String {
    if flattened == "index" {
        return String::new();
    }
    flattened
        .strip_suffix("/index")
        .unwrap_or(flattened)
        .to_owned()
}

/// Split `---\n<yaml>\n---\n<body>` into its YAML and body parts.
#[must_use]
pub fn split_front_matter(source: &str) -> Option<(&str, &str)> {
    let rest = source.trim_start_matches('\u{feff}').strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
    let end = rest.find("\n---")?;
    let yaml = &rest[..end];
    let after = &rest[end + "\n---".len()..];
    let body = after.split_once('\n').map_or("", |(_, body)| body);
    Some((yaml, body.trim_start_matches(['\r', '\n'])))
}

/// Markdown image targets (`![alt](src "title")`) in order of appearance.
#[must_use]
pub fn extract_image_refs(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("![") {
        let after = &rest[start + 2..];
        let Some(close) = after.find("](") else { break };
        let target = &after[close + 2..];
        let Some(end) = target.find(')') else { break };
        if let Some(src) = target[..end].split_whitespace().next() {
            out.push(src.to_owned());
        }
        rest = &target[end + 1..];
    }
    out
}

fn read_front_matter(relative: &Path, source: &str) -> Result<(FrontMatter, String), ContentError> {
    let (yaml, body) =
        split_front_matter(source).ok_or_else(|| ContentError::MissingFrontMatter(relative.to_path_buf()))?;
    let front: FrontMatter = serde_yaml::from_str(yaml)
        .map_err(|source| ContentError::FrontMatter { path: relative.to_path_buf(), source })?;
    Ok((front, body.to_owned()))
}

/// Parse one guide file. `relative` is its path under `docs/`.
///
/// # Errors
///
/// Returns an error if front matter is missing, malformed, or lacks a title.
pub fn parse_document(relative: &Path, source: &str) -> Result<GuideDocument, ContentError> {
    let (front, body) = read_front_matter(relative, source)?;
    let title = front
        .title
        .ok_or_else(|| ContentError::MissingField { path: relative.to_path_buf(), field: "title" })?;
    let flattened = flattened_path(relative);
    let images = front.images.unwrap_or_else(|| extract_image_refs(&body));

    Ok(GuideDocument {
        slug: slug_from_flattened(&flattened),
        flattened_path: flattened,
        title,
        description: front.description.unwrap_or_default(),
        body,
        images,
    })
}

/// Parse one blog post file. `relative` is its path under `blog/`.
///
/// # Errors
///
/// Returns an error if front matter is missing, malformed, or lacks a title
/// or date.
pub fn parse_post(relative: &Path, source: &str) -> Result<BlogPost, ContentError> {
    let (front, _) = read_front_matter(relative, source)?;
    let missing = |field| ContentError::MissingField { path: relative.to_path_buf(), field };
    let title = front.title.ok_or_else(|| missing("title"))?;
    let date = front
        .date
        .as_ref()
        .and_then(yaml_scalar)
        .ok_or_else(|| missing("date"))?;

    Ok(BlogPost {
        slug: slug_from_flattened(&flattened_path(relative)),
        title,
        description: front.description,
        date,
        published: front.published.unwrap_or(true),
        image: front.image,
    })
}

/// Unquoted YAML dates arrive as strings; tolerate numbers too.
fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.trim().to_owned()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_content_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext))
}

fn load_collection<T>(
    dir: &Path,
    parse: fn(&Path, &str) -> Result<T, ContentError>,
) -> Result<Vec<T>, ContentError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_content_file(entry.path()) {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let source = std::fs::read_to_string(entry.path())
            .map_err(|source| ContentError::Io { path: entry.path().to_path_buf(), source })?;
        out.push(parse(relative, &source)?);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
