//! Course materials given to the answerer and validator.
//!
//! Documents come from local files and from a URLs file (one URL per line,
//! `#` starts a comment). Each document is prefixed with a
//! `# <filename> (from <source>)` header and documents are joined with a
//! separator line. A document that cannot be loaded is logged and skipped;
//! when nothing loads there is no context, and every prompt has a
//! no-context variant.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Separator placed between documents.
pub const DOCUMENT_SEPARATOR: &str =
    "\n\n================================================================================\n\n";

/// Errors from loading a single context source.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("HTTP error {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("URL sources need the 'context-urls' feature")]
    UrlsUnsupported,
}

/// One loaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDocument {
    pub filename: String,

    /// Path or URL the document came from
    pub source: String,

    pub content: String,
}

impl ContextDocument {
    fn render(&self) -> String {
        format!("# {} (from {})\n\n{}", self.filename, self.source, self.content)
    }
}

/// Combined course materials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseContext {
    text: String,
    documents: usize,
}

impl CourseContext {
    /// Combine documents; `None` when there is nothing to combine.
    pub fn from_documents(documents: &[ContextDocument]) -> Option<Self> {
        let parts: Vec<String> = documents
            .iter()
            .filter(|doc| !doc.content.trim().is_empty())
            .map(ContextDocument::render)
            .collect();

        if parts.is_empty() {
            return None;
        }

        Some(Self {
            documents: parts.len(),
            text: parts.join(DOCUMENT_SEPARATOR),
        })
    }

    /// Full text, as embedded in the answerer's system prompt.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// The first `max_chars` characters, never splitting a character.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((byte_index, _)) => &self.text[..byte_index],
            None => &self.text,
        }
    }
}

/// Read URLs from a file, skipping blank lines and `#` comments.
pub fn read_urls_file(path: &Path) -> Result<Vec<String>, ContextError> {
    let content = fs::read_to_string(path).map_err(|source| ContextError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// A display filename for a URL: its last path segment when that looks like
/// a file, otherwise `content_from_<host>`.
pub fn filename_from_url(url: &str) -> String {
    let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    if !last.is_empty() && last.contains('.') && !url.ends_with(&format!("//{}", last)) {
        return last.to_string();
    }

    let host = url
        .split_once("//")
        .and_then(|(_, rest)| rest.split('/').next())
        .filter(|host| !host.is_empty())
        .unwrap_or("unknown");
    format!("content_from_{}", host)
}

/// Loads course materials from files and URLs.
pub struct ContextLoader {
    #[cfg(feature = "context-urls")]
    client: reqwest::Client,
}

impl ContextLoader {
    pub fn new(timeout: Duration) -> Result<Self, ContextError> {
        #[cfg(feature = "context-urls")]
        {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("stumper/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| ContextError::Fetch {
                    url: String::new(),
                    message: e.to_string(),
                })?;
            Ok(Self { client })
        }

        #[cfg(not(feature = "context-urls"))]
        {
            let _ = timeout;
            Ok(Self {})
        }
    }

    /// Load one local file.
    pub fn load_file(&self, path: &Path) -> Result<ContextDocument, ContextError> {
        let content = fs::read_to_string(path).map_err(|source| ContextError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(ContextDocument {
            filename,
            source: path.display().to_string(),
            content,
        })
    }

    /// Fetch one URL.
    #[cfg(feature = "context-urls")]
    pub async fn fetch_url(&self, url: &str) -> Result<ContextDocument, ContextError> {
        let fetch_error = |e: reqwest::Error| ContextError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ContextError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content = response.text().await.map_err(fetch_error)?;
        info!(url = %url, chars = content.chars().count(), "Loaded context document");

        Ok(ContextDocument {
            filename: filename_from_url(url),
            source: url.to_string(),
            content,
        })
    }

    #[cfg(not(feature = "context-urls"))]
    pub async fn fetch_url(&self, _url: &str) -> Result<ContextDocument, ContextError> {
        Err(ContextError::UrlsUnsupported)
    }

    /// Load every source, skipping the ones that fail.
    pub async fn load(&self, files: &[PathBuf], urls_file: Option<&Path>) -> Option<CourseContext> {
        let mut documents = Vec::new();

        for path in files {
            match self.load_file(path) {
                Ok(doc) => documents.push(doc),
                Err(e) => warn!(error = %e, "Skipping context file"),
            }
        }

        if let Some(urls_file) = urls_file {
            match read_urls_file(urls_file) {
                Ok(urls) if urls.is_empty() => {
                    warn!(path = %urls_file.display(), "No URLs found in URLs file")
                }
                Ok(urls) => {
                    let total = urls.len();
                    for (i, url) in urls.iter().enumerate() {
                        info!(url = %url, "Fetching context URL {}/{}", i + 1, total);
                        match self.fetch_url(url).await {
                            Ok(doc) => documents.push(doc),
                            Err(ContextError::Http { status: 404, .. }) => {
                                warn!(url = %url, "Context URL not found (404)")
                            }
                            Err(e) => warn!(error = %e, "Skipping context URL"),
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Skipping URLs file"),
            }
        }

        let context = CourseContext::from_documents(&documents);
        match &context {
            Some(ctx) => info!(
                documents = ctx.document_count(),
                chars = ctx.char_count(),
                "Course context loaded"
            ),
            None if !files.is_empty() || urls_file.is_some() => {
                warn!("No course context could be loaded; continuing without it")
            }
            None => {}
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn doc(name: &str, content: &str) -> ContextDocument {
        ContextDocument {
            filename: name.to_string(),
            source: format!("https://example.org/{}", name),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_documents_combined_with_headers() {
        let ctx = CourseContext::from_documents(&[doc("a.md", "alpha"), doc("b.md", "beta")]).unwrap();
        assert_eq!(ctx.document_count(), 2);
        assert!(ctx.text().starts_with("# a.md (from https://example.org/a.md)\n\nalpha"));
        assert!(ctx.text().contains(&format!("alpha{}# b.md", DOCUMENT_SEPARATOR)));
    }

    #[test]
    fn test_no_content_is_no_context() {
        assert!(CourseContext::from_documents(&[]).is_none());
        assert!(CourseContext::from_documents(&[doc("empty.md", "  \n")]).is_none());
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let ctx = CourseContext::from_documents(&[doc("g.md", "Graphe non orienté: é")]).unwrap();
        let full = ctx.char_count();
        assert_eq!(ctx.excerpt(full + 10), ctx.text());
        assert_eq!(ctx.excerpt(full - 1).chars().count(), full - 1);
        assert_eq!(ctx.excerpt(0), "");
    }

    #[test]
    fn test_read_urls_file_skips_comments() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# lecture notes\nhttps://example.org/a.md\n\n  https://example.org/b.md  ").unwrap();

        let urls = read_urls_file(file.path()).unwrap();
        assert_eq!(urls, vec!["https://example.org/a.md", "https://example.org/b.md"]);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://example.org/notes/m01.md"), "m01.md");
        assert_eq!(filename_from_url("https://example.org/notes/"), "content_from_example.org");
        assert_eq!(filename_from_url("https://example.org"), "content_from_example.org");
    }

    #[tokio::test]
    async fn test_load_skips_missing_files() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Euler paths visit every edge once.").unwrap();

        let loader = ContextLoader::new(Duration::from_secs(5)).unwrap();
        let ctx = loader
            .load(&[file.path().to_path_buf(), PathBuf::from("/nonexistent/notes.md")], None)
            .await
            .unwrap();
        assert_eq!(ctx.document_count(), 1);
        assert!(ctx.text().ends_with("Euler paths visit every edge once."));

        assert!(loader.load(&[PathBuf::from("/nonexistent/notes.md")], None).await.is_none());
    }
}
