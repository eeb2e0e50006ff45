//! Document rendering: merged page text → template → encoded Markdown file.
//!
//! The template is a Jinja-style file (rendered with `minijinja`) that sees
//! the merged transcription as `{{ content }}` along with metadata about the
//! source document. User variables from `template.variables` are layered on
//! top and win over the built-in keys.
//!
//! ## Built-in context keys
//!
//! | key                    | value                                          |
//! |------------------------|------------------------------------------------|
//! | `content`              | merged page text                               |
//! | `filename`             | source file name, with extension               |
//! | `absolute_pdf_path`    | absolute source path                           |
//! | `relative_pdf_path`    | source path relative to the output directory   |
//! | `source_path_absolute` | same as `absolute_pdf_path`                    |
//! | `source_path_relative` | same as `relative_pdf_path`                    |
//! | `datetime_processed`   | local time, RFC 3339                           |
//! | `page_count`           | pages extracted from the source                |
//! | `model_used`           | OCR model identifier                           |
//!
//! The `*_pdf_path` names are kept for templates written against them; they
//! hold the same value for image inputs.

use crate::error::DocumentError;
use crate::output::PageTranscription;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use minijinja::Environment;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Separator placed between consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Template written by `handwrite config --setup`.
pub const DEFAULT_NOTE_TEMPLATE: &str = r#"---
source: "{{ source_path_relative }}"
processed: "{{ datetime_processed }}"
pages: {{ page_count }}
model: "{{ model_used }}"
---

# {{ filename }}

{{ content }}
"#;

/// Join page texts, in page order, with a blank line between pages.
pub fn merge_pages(pages: &[PageTranscription]) -> String {
    pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// Where the Markdown for `source` goes: `<output_dir>/<stem>.md`.
pub fn output_path_for(source: &Path, output_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    output_dir.join(format!("{stem}.md"))
}

/// Values exposed to the template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderContext {
    values: BTreeMap<String, Value>,
}

impl RenderContext {
    /// Build the built-in context for one document.
    pub fn new(
        content: impl Into<String>,
        source: &Path,
        output_dir: &Path,
        page_count: usize,
        model: &str,
    ) -> Self {
        let absolute = absolutize(source);
        let relative = relative_to(&absolute, &absolutize(output_dir));
        let absolute = absolute.to_string_lossy().into_owned();
        let relative = relative.to_string_lossy().into_owned();
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content: String = content.into();

        let mut values = BTreeMap::new();
        values.insert("content".to_string(), Value::from(content));
        values.insert("filename".to_string(), Value::from(filename));
        values.insert("absolute_pdf_path".to_string(), Value::from(absolute.clone()));
        values.insert("relative_pdf_path".to_string(), Value::from(relative.clone()));
        values.insert("source_path_absolute".to_string(), Value::from(absolute));
        values.insert("source_path_relative".to_string(), Value::from(relative));
        values.insert(
            "datetime_processed".to_string(),
            Value::from(chrono::Local::now().to_rfc3339()),
        );
        values.insert("page_count".to_string(), Value::from(page_count));
        values.insert("model_used".to_string(), Value::from(model));

        Self { values }
    }

    /// Overlay user variables; they replace built-in keys of the same name.
    pub fn with_variables(mut self, variables: &BTreeMap<String, Value>) -> Self {
        for (key, value) in variables {
            self.values.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Render `template_path` with `ctx` and write it to `output_path`.
///
/// With `builtin_fallback`, a template file that does not exist is replaced
/// by [`DEFAULT_NOTE_TEMPLATE`]; otherwise it is
/// [`DocumentError::TemplateNotFound`].
///
/// The file is written to a temporary sibling first and then renamed, so a
/// failure never leaves a partial Markdown file behind.
pub fn render_document(
    ctx: &RenderContext,
    template_path: &Path,
    builtin_fallback: bool,
    output_path: &Path,
    encoding: &str,
) -> Result<(), DocumentError> {
    let source = read_template(template_path, builtin_fallback)?;
    let text = render_source(ctx, &source, template_path)?;
    let bytes = encode_text(&text, encoding)?;
    write_atomically(output_path, &bytes)?;
    debug!(
        "Wrote {} ({} bytes, {})",
        output_path.display(),
        bytes.len(),
        encoding
    );
    Ok(())
}

/// Load the template file and render it with `ctx`.
pub fn render_template(ctx: &RenderContext, template_path: &Path) -> Result<String, DocumentError> {
    let source = read_template(template_path, false)?;
    render_source(ctx, &source, template_path)
}

fn read_template(template_path: &Path, builtin_fallback: bool) -> Result<String, DocumentError> {
    match std::fs::read_to_string(template_path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if builtin_fallback {
                debug!(
                    "No template at {}, using the built-in note template",
                    template_path.display()
                );
                return Ok(DEFAULT_NOTE_TEMPLATE.to_string());
            }
            Err(DocumentError::TemplateNotFound {
                path: template_path.to_path_buf(),
            })
        }
        Err(e) => Err(DocumentError::TemplateRender {
            path: template_path.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}

/// `template_path` only names the template in error messages.
fn render_source(
    ctx: &RenderContext,
    source: &str,
    template_path: &Path,
) -> Result<String, DocumentError> {
    let render_err = |e: minijinja::Error| DocumentError::TemplateRender {
        path: template_path.to_path_buf(),
        detail: e.to_string(),
    };

    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_template("note", source).map_err(render_err)?;
    let template = env.get_template("note").map_err(render_err)?;
    template.render(ctx).map_err(render_err)
}

/// Resolve an encoding label (`utf-8`, `latin1`, `utf-16le`, ...).
pub fn lookup_encoding(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Encode `text` with the encoding named by `label`.
///
/// Characters the encoding cannot represent are an error rather than being
/// silently replaced. A bare `utf-16` label gets a little-endian BOM.
pub fn encode_text(text: &str, label: &str) -> Result<Vec<u8>, DocumentError> {
    let encoding = lookup_encoding(label).ok_or_else(|| DocumentError::UnsupportedEncoding {
        label: label.to_string(),
    })?;

    if encoding == UTF_16LE || encoding == UTF_16BE {
        let normalized = label.trim().to_ascii_lowercase();
        let with_bom = normalized == "utf-16" || normalized == "utf16";
        let mut out = Vec::with_capacity(text.len() * 2 + 2);
        if with_bom {
            out.extend_from_slice(&[0xFF, 0xFE]);
        }
        for unit in text.encode_utf16() {
            if encoding == UTF_16BE {
                out.extend_from_slice(&unit.to_be_bytes());
            } else {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        }
        return Ok(out);
    }

    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(DocumentError::EncodingFailed {
            label: label.to_string(),
        });
    }
    Ok(bytes.into_owned())
}

fn write_atomically(output_path: &Path, bytes: &[u8]) -> Result<(), DocumentError> {
    let write_err = |source: std::io::Error| DocumentError::OutputWriteFailed {
        path: output_path.to_path_buf(),
        source,
    };

    let dir = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(output_path).map_err(|e| write_err(e.error))?;
    Ok(())
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// `path` expressed relative to `base`. Both are expected to be absolute.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<Component<'_>> = normalize(path);
    let base: Vec<Component<'_>> = normalize(base);

    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for c in &path[common..] {
        out.push(c.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Drop `.` components and fold `..` against preceding normal components.
fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut out: Vec<Component<'_>> = Vec::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(c),
            },
            other => out.push(other),
        }
    }
    out
}
