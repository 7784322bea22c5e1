//! Export to portable formats and blob-store upload.
//!
//! `ExportDocument::render` serializes a rich-text payload into HTML,
//! Markdown or plain text; the result can be written to a local
//! directory (the "download" case) or uploaded to a [`BlobStore`] in
//! fixed-size chunks with incremental progress. Export and upload
//! failures are reported to the caller and never touch editor state; a
//! failed upload removes its partial object.

use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use futures_util::Stream;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use folio_core::{Block, CollabError, RichText, Span};

/// Portable export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Html,
    Markdown,
    PlainText,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Markdown => "md",
            ExportFormat::PlainText => "txt",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Html => "text/html",
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::PlainText => "text/plain",
        }
    }
}

/// A rendered export, ready for download or upload.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    /// Sanitized title plus the format's extension
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportDocument {
    /// Render `content` into `format`, naming the file after the title.
    ///
    /// An empty (or fully unsafe) title falls back to the document id.
    pub fn render(id: Uuid, title: &str, content: &RichText, format: ExportFormat) -> Self {
        let stem = sanitize_file_stem(title).unwrap_or_else(|| id.to_string());
        let body = match format {
            ExportFormat::Html => render_html(content),
            ExportFormat::Markdown => render_markdown(content),
            ExportFormat::PlainText => content.plain_text(),
        };
        Self {
            file_name: format!("{stem}.{}", format.extension()),
            mime_type: format.mime_type(),
            bytes: body.into_bytes(),
        }
    }

    /// Write the export to a local directory. Returns the written path.
    pub async fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, CollabError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CollabError::Transient(format!("create export dir: {e}")))?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes)
            .await
            .map_err(|e| CollabError::Transient(format!("write export: {e}")))?;
        log::info!("export written to {}", path.display());
        Ok(path)
    }
}

/// Strip a title down to a path-safe file stem.
///
/// Keeps alphanumerics, `-` and `_`; spaces become `_`; everything else
/// is dropped. `None` when nothing safe remains.
fn sanitize_file_stem(title: &str) -> Option<String> {
    let stem: String = title
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_html_spans(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        let mut text = escape_html(&span.text);
        if span.style.bold {
            text = format!("<strong>{text}</strong>");
        }
        if span.style.italic {
            text = format!("<em>{text}</em>");
        }
        if span.style.underline {
            text = format!("<u>{text}</u>");
        }
        out.push_str(&text);
    }
    out
}

fn render_html(content: &RichText) -> String {
    let mut out = String::new();
    for block in &content.blocks {
        match block {
            Block::Heading { level, spans } => {
                let level = (*level).clamp(1, 6);
                out.push_str(&format!("<h{level}>{}</h{level}>\n", render_html_spans(spans)));
            }
            Block::Paragraph { spans } => {
                out.push_str(&format!("<p>{}</p>\n", render_html_spans(spans)));
            }
        }
    }
    out
}

fn render_markdown_spans(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        let mut text = span.text.clone();
        if span.style.bold {
            text = format!("**{text}**");
        }
        if span.style.italic {
            text = format!("*{text}*");
        }
        if span.style.underline {
            // Markdown has no underline; inline HTML is the convention
            text = format!("<u>{text}</u>");
        }
        out.push_str(&text);
    }
    out
}

fn render_markdown(content: &RichText) -> String {
    let mut blocks = Vec::new();
    for block in &content.blocks {
        match block {
            Block::Heading { level, spans } => {
                let level = (*level).clamp(1, 6) as usize;
                blocks.push(format!("{} {}", "#".repeat(level), render_markdown_spans(spans)));
            }
            Block::Paragraph { spans } => {
                blocks.push(render_markdown_spans(spans));
            }
        }
    }
    blocks.join("\n\n")
}

/// Incremental upload progress, emitted after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

/// Progress receiver; also a [`Stream`] of [`UploadProgress`].
pub struct UploadProgressReceiver {
    rx: mpsc::Receiver<UploadProgress>,
}

impl UploadProgressReceiver {
    pub async fn recv(&mut self) -> Option<UploadProgress> {
        self.rx.recv().await
    }
}

impl Stream for UploadProgressReceiver {
    type Item = UploadProgress;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Terminal result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Awaits the upload's terminal success/failure.
pub struct UploadHandle {
    task: JoinHandle<Result<UploadReceipt, CollabError>>,
}

impl UploadHandle {
    pub async fn wait(self) -> Result<UploadReceipt, CollabError> {
        self.task
            .await
            .map_err(|e| CollabError::Transient(format!("upload task: {e}")))?
    }
}

/// Directory-rooted blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    chunk_size: usize,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: 64 * 1024,
        }
    }

    /// Override the chunk size (progress granularity).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Upload `bytes` under `path` (relative to the root), in fixed-size
    /// chunks.
    ///
    /// Progress is reported after each chunk; the terminal result comes
    /// through the handle. On failure the partial object is removed — no
    /// torn blob is left behind.
    pub fn upload(&self, path: &str, bytes: Vec<u8>) -> (UploadProgressReceiver, UploadHandle) {
        let (progress_tx, progress_rx) = mpsc::channel(32);
        let root = self.root.clone();
        let chunk_size = self.chunk_size;
        let rel = PathBuf::from(path);

        let task = tokio::spawn(async move {
            // Reject traversal out of the root before touching the disk
            if rel.is_absolute()
                || rel
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(CollabError::Validation(format!(
                    "invalid blob path '{}'",
                    rel.display()
                )));
            }
            let target = root.join(&rel);

            let result = write_chunked(&target, &bytes, chunk_size, &progress_tx).await;
            match result {
                Ok(written) => {
                    log::info!("blob uploaded to {} ({written} bytes)", target.display());
                    Ok(UploadReceipt {
                        path: target,
                        bytes_written: written,
                    })
                }
                Err(e) => {
                    log::warn!("blob upload to {} failed: {e}", target.display());
                    let _ = tokio::fs::remove_file(&target).await;
                    Err(e)
                }
            }
        });

        (
            UploadProgressReceiver { rx: progress_rx },
            UploadHandle { task },
        )
    }
}

async fn write_chunked(
    target: &Path,
    bytes: &[u8],
    chunk_size: usize,
    progress_tx: &mpsc::Sender<UploadProgress>,
) -> Result<u64, CollabError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CollabError::Transient(format!("create blob dir: {e}")))?;
    }

    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| CollabError::Transient(format!("create blob: {e}")))?;

    let total = bytes.len() as u64;
    let mut sent = 0u64;

    if bytes.is_empty() {
        let _ = progress_tx
            .send(UploadProgress {
                bytes_sent: 0,
                total_bytes: 0,
            })
            .await;
    }

    for chunk in bytes.chunks(chunk_size) {
        file.write_all(chunk)
            .await
            .map_err(|e| CollabError::Transient(format!("write blob: {e}")))?;
        sent += chunk.len() as u64;
        let _ = progress_tx
            .send(UploadProgress {
                bytes_sent: sent,
                total_bytes: total,
            })
            .await;
    }

    file.flush()
        .await
        .map_err(|e| CollabError::Transient(format!("flush blob: {e}")))?;
    Ok(sent)
}
