//! Integration tests for the document pipeline.
//!
//! The Gemini transcriber is replaced by [`Scripted`], a stub whose answers
//! (and failures) are chosen per page, so these tests need no network and
//! no API key. Tests that rasterise PDFs need a pdfium library; they print
//! SKIP and return when none can be bound (see `PDFIUM_LIB_PATH`).
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use edgequake_llm::MockProvider;
use handwrite::pipeline::dispatch::transcribe_pages;
use handwrite::pipeline::extract::pdfium_available;
use handwrite::pipeline::render::merge_pages;
use handwrite::{
    process, process_document, run_batch, BatchPlan, BatchProgressCallback, Config,
    DocumentError, GeminiTranscriber, HandwriteError, NoopProgressCallback, Page, PageTranscriber, ProgressCallback,
    TranscribeError,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

type Script = dyn Fn(&Page) -> Result<String, TranscribeError> + Send + Sync;

/// Stub transcriber: answers from `script`, counts calls, and delays later
/// pages less than earlier ones so completion order is reversed.
struct Scripted {
    script: Box<Script>,
    calls: AtomicUsize,
    stagger_ms: u64,
}

impl Scripted {
    fn new(script: impl Fn(&Page) -> Result<String, TranscribeError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            stagger_ms: 0,
        })
    }

    fn staggered(
        stagger_ms: u64,
        script: impl Fn(&Page) -> Result<String, TranscribeError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            stagger_ms,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageTranscriber for Scripted {
    fn model(&self) -> &str {
        "stub-vision"
    }

    async fn transcribe(&self, page: &Page, _prompt: &str) -> Result<String, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stagger_ms > 0 {
            let delay = self.stagger_ms * (20u64.saturating_sub(page.index as u64));
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        (self.script)(page)
    }
}

#[derive(Default)]
struct Tally {
    docs_ok: AtomicUsize,
    docs_failed: AtomicUsize,
    pages_ok: AtomicUsize,
    pages_failed: AtomicUsize,
}

impl BatchProgressCallback for Tally {
    fn on_page_complete(&self, _page_num: usize, _completed: usize, _total: usize) {
        self.pages_ok.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_error(&self, _page_num: usize, _completed: usize, _total: usize, _e: &str) {
        self.pages_failed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_document_complete(&self, _path: &Path, outcome: Result<&Path, &DocumentError>) {
        match outcome {
            Ok(_) => self.docs_ok.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.docs_failed.fetch_add(1, Ordering::SeqCst),
        };
    }
}

fn blank_pages(n: usize) -> Vec<Page> {
    (0..n)
        .map(|index| Page {
            index,
            image: DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
        })
        .collect()
}

/// A solid image whose width identifies it to the stub.
fn write_image(path: &Path, width: u32, format: image::ImageFormat) {
    RgbImage::from_pixel(width, 10, Rgb([250, 250, 250]))
        .save_with_format(path, format)
        .unwrap();
}

/// A valid PDF with `pages` blank pages.
fn minimal_pdf(pages: usize) -> Vec<u8> {
    let mut objects = vec!["<< /Type /Catalog /Pages 2 0 R >>".to_string()];
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages
    ));
    for _ in 0..pages {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] >>".to_string());
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

/// Config rendering `{{ content }}` through a template in `dir`.
fn config_in(dir: &Path, template: &str) -> Config {
    let tpl = dir.join("note.md");
    std::fs::write(&tpl, template).unwrap();
    Config::builder()
        .template_path(tpl)
        .variable("author", "Ada")
        .build()
        .unwrap()
}

fn noop() -> ProgressCallback {
    Arc::new(NoopProgressCallback)
}

fn md_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "md"))
        .collect();
    files.sort();
    files
}

// ── Page dispatch ────────────────────────────────────────────────────────────

#[tokio::test]
async fn merged_text_follows_page_order_not_completion_order() {
    let stub = Scripted::staggered(2, |p| Ok(format!("page {}", p.index + 1)));
    let t: Arc<dyn PageTranscriber> = stub.clone();

    let pages = transcribe_pages(&t, blank_pages(10), "prompt", &noop()).await;
    let expected: Vec<String> = (1..=10).map(|i| format!("page {i}")).collect();

    assert_eq!(merge_pages(&pages), expected.join("\n\n"));
    assert_eq!(stub.calls(), 10);
}

#[tokio::test]
async fn failing_page_gets_inline_placeholder() {
    let stub = Scripted::new(|p| match p.index {
        1 => Err(TranscribeError::Provider("429 quota exceeded".into())),
        i => Ok(format!("text {}", i + 1)),
    });
    let t: Arc<dyn PageTranscriber> = stub.clone();
    let tally = Arc::new(Tally::default());
    let progress: ProgressCallback = tally.clone();

    let pages = transcribe_pages(&t, blank_pages(3), "prompt", &progress).await;

    assert_eq!(
        merge_pages(&pages),
        "text 1\n\nError processing page 2: 429 quota exceeded\n\ntext 3"
    );
    assert_eq!(tally.pages_ok.load(Ordering::SeqCst), 2);
    assert_eq!(tally.pages_failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_task_does_not_stop_other_pages() {
    let stub = Scripted::new(|p| {
        if p.index == 0 {
            panic!("stub blew up");
        }
        Ok(format!("text {}", p.index + 1))
    });
    let t: Arc<dyn PageTranscriber> = stub.clone();

    let pages = transcribe_pages(&t, blank_pages(3), "prompt", &noop()).await;

    assert_eq!(pages.len(), 3);
    assert!(pages[0].text.starts_with("Error processing page 1: task failed"));
    assert_eq!(pages[1].text, "text 2");
    assert_eq!(pages[2].text, "text 3");
}

// ── Document processing ─────────────────────────────────────────────────────

#[tokio::test]
async fn image_document_renders_template() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let img = dir.path().join("whiteboard.png");
    write_image(&img, 11, image::ImageFormat::Png);

    let config = config_in(
        dir.path(),
        "# {{ filename }} by {{ author }}\n{{ page_count }} page(s) via {{ model_used }}\n\n{{ content }}\n",
    );
    let t: Arc<dyn PageTranscriber> = Scripted::new(|_| Ok("```markdown\n$a^2 + b^2$\n```".into()));

    let report = process_document(&img, &out, &config, &t, &noop()).await.unwrap();

    assert_eq!(report.output, out.join("whiteboard.md"));
    assert_eq!(report.page_count, 1);
    assert_eq!(report.failed_pages, 0);
    assert_eq!(
        std::fs::read_to_string(&report.output).unwrap(),
        "# whiteboard.png by Ada\n1 page(s) via stub-vision\n\n$a^2 + b^2$\n"
    );
}

#[tokio::test]
async fn whitespace_only_transcription_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let img = dir.path().join("blank.jpg");
    write_image(&img, 11, image::ImageFormat::Jpeg);

    let config = config_in(dir.path(), "{{ content }}");
    let t: Arc<dyn PageTranscriber> = Scripted::new(|_| Ok("   \n\t\n".into()));

    let err = process_document(&img, &out, &config, &t, &noop()).await.unwrap_err();
    assert!(matches!(err, DocumentError::EmptyTranscription { .. }), "got {err:?}");
    assert!(md_files(&out).is_empty());
}

#[tokio::test]
async fn blank_gemini_response_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let img = dir.path().join("blank.png");
    write_image(&img, 11, image::ImageFormat::Png);

    let mock = MockProvider::new();
    mock.add_response("   ").await;
    let t: Arc<dyn PageTranscriber> = Arc::new(GeminiTranscriber::from_provider(
        Arc::new(mock),
        "gemini-1.5-pro",
    ));
    let config = config_in(dir.path(), "{{ content }}");

    let err = process_document(&img, &out, &config, &t, &noop()).await.unwrap_err();
    assert!(matches!(err, DocumentError::EmptyTranscription { .. }), "got {err:?}");
    assert!(md_files(&out).is_empty());
}

#[tokio::test]
async fn absent_config_renders_with_builtin_template() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let img = dir.path().join("scan.png");
    write_image(&img, 11, image::ImageFormat::Png);

    let config = Config::load(&dir.path().join("cfg/config.yaml")).unwrap();
    let t: Arc<dyn PageTranscriber> = Scripted::new(|_| Ok("Lemma 2 holds.".into()));

    let report = process_document(&img, &out, &config, &t, &noop()).await.unwrap();
    let written = std::fs::read_to_string(&report.output).unwrap();
    assert!(written.starts_with("---\nsource: \"../scan.png\""), "got: {written}");
    assert!(written.contains("model: \"stub-vision\""));
    assert!(written.contains("# scan.png\n\nLemma 2 holds.\n"));
    assert!(!dir.path().join("cfg").exists());
}

#[tokio::test]
async fn crashed_single_page_still_produces_document() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let img = dir.path().join("scan.png");
    write_image(&img, 11, image::ImageFormat::Png);

    let config = config_in(dir.path(), "{{ content }}");
    let t: Arc<dyn PageTranscriber> = Scripted::new(|_| panic!("boom"));

    let report = process_document(&img, &out, &config, &t, &noop()).await.unwrap();
    assert_eq!(report.failed_pages, 1);
    let written = std::fs::read_to_string(&report.output).unwrap();
    assert!(written.starts_with("Error processing page 1: task failed"));
}

#[tokio::test]
async fn missing_template_fails_document_without_output() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let img = dir.path().join("scan.png");
    write_image(&img, 11, image::ImageFormat::Png);

    let config = Config::builder()
        .template_path(dir.path().join("missing.md"))
        .build()
        .unwrap();
    let t: Arc<dyn PageTranscriber> = Scripted::new(|_| Ok("text".into()));

    let err = process_document(&img, &out, &config, &t, &noop()).await.unwrap_err();
    assert!(matches!(err, DocumentError::TemplateNotFound { .. }), "got {err:?}");
    assert!(md_files(&out).is_empty());
}

// ── Batches ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_only_directory_is_fatal_before_any_call() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    std::fs::create_dir_all(input.join("sub")).unwrap();
    std::fs::create_dir(&out).unwrap();
    std::fs::write(input.join("todo.txt"), "x").unwrap();
    std::fs::write(input.join("sub/notes.docx"), "x").unwrap();

    let config = config_in(dir.path(), "{{ content }}");
    let stub = Scripted::new(|_| Ok("text".into()));
    let t: Arc<dyn PageTranscriber> = stub.clone();

    let err = process(&input, &out, &config, t, None).await.unwrap_err();
    assert!(matches!(err, HandwriteError::NoSupportedFiles { .. }), "got {err:?}");
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn missing_output_dir_is_fatal() {
    let dir = TempDir::new().unwrap();
    let img = dir.path().join("scan.png");
    write_image(&img, 11, image::ImageFormat::Png);
    let out = dir.path().join("does-not-exist");

    let config = config_in(dir.path(), "{{ content }}");
    let stub = Scripted::new(|_| Ok("text".into()));

    let err = process(&img, &out, &config, stub.clone(), None).await.unwrap_err();
    assert!(matches!(err, HandwriteError::OutputDirNotFound { .. }));
    assert!(!out.exists());
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn corrupt_file_fails_alone_and_sets_exit_code() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    std::fs::create_dir_all(input.join("week2")).unwrap();
    std::fs::create_dir(&out).unwrap();

    write_image(&input.join("a.png"), 11, image::ImageFormat::Png);
    write_image(&input.join("week2/b.PNG"), 12, image::ImageFormat::Png);
    write_image(&input.join("c.jpeg"), 13, image::ImageFormat::Jpeg);
    std::fs::write(input.join("d.jpg"), b"\xFF\xD8 truncated").unwrap();
    std::fs::write(input.join("ignored.txt"), "x").unwrap();

    let config = config_in(dir.path(), "{{ content }}");
    let t: Arc<dyn PageTranscriber> = Scripted::new(|p| Ok(format!("width {}", p.image.width())));
    let tally = Arc::new(Tally::default());

    let plan = BatchPlan::prepare(&input, &out).unwrap();
    assert_eq!(plan.documents.len(), 4);

    let summary = run_batch(&plan, &config, t, Some(tally.clone())).await;

    assert_eq!(summary.success_count(), 3);
    assert_eq!(summary.failure_count(), 1);
    assert_eq!(summary.exit_code(), 1);
    assert!(summary.failed[0].0.ends_with("d.jpg"));
    assert!(matches!(summary.failed[0].1, DocumentError::DecodeFailed { .. }));
    assert_eq!(tally.docs_ok.load(Ordering::SeqCst), 3);
    assert_eq!(tally.docs_failed.load(Ordering::SeqCst), 1);

    assert_eq!(
        md_files(&out),
        vec![out.join("a.md"), out.join("b.md"), out.join("c.md")]
    );
    assert_eq!(std::fs::read_to_string(out.join("b.md")).unwrap(), "width 12");
}

#[tokio::test]
async fn clean_batch_exits_zero() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let img = dir.path().join("only.png");
    write_image(&img, 11, image::ImageFormat::Png);

    let config = config_in(dir.path(), "{{ content }}");
    let t: Arc<dyn PageTranscriber> = Scripted::new(|_| Ok("fine".into()));

    let summary = process(&img, &out, &config, t, None).await.unwrap();
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.succeeded[0].output, out.join("only.md"));
}

// ── PDF input (needs pdfium) ────────────────────────────────────────────────

macro_rules! skip_without_pdfium {
    () => {
        if !pdfium_available() {
            println!("SKIP: no pdfium library found (set PDFIUM_LIB_PATH)");
            return;
        }
    };
}

#[tokio::test]
async fn pdfs_and_image_produce_one_file_each() {
    skip_without_pdfium!();

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::create_dir(&out).unwrap();

    std::fs::write(input.join("one.pdf"), minimal_pdf(1)).unwrap();
    std::fs::write(input.join("two.pdf"), minimal_pdf(1)).unwrap();
    write_image(&input.join("three.jpg"), 13, image::ImageFormat::Jpeg);

    let config = config_in(dir.path(), "{{ content }}");
    let stub = Scripted::new(|p| Ok(format!("page {}", p.index + 1)));

    let summary = process(&input, &out, &config, stub.clone(), None).await.unwrap();

    assert_eq!(summary.success_count(), 3);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(stub.calls(), 3);
    assert_eq!(
        md_files(&out),
        vec![out.join("one.md"), out.join("three.md"), out.join("two.md")]
    );
}

#[tokio::test]
async fn multi_page_pdf_keeps_page_order() {
    skip_without_pdfium!();

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let pdf = dir.path().join("lecture.pdf");
    std::fs::write(&pdf, minimal_pdf(5)).unwrap();

    let config = config_in(dir.path(), "{{ content }}");
    let t: Arc<dyn PageTranscriber> = Scripted::staggered(3, |p| match p.index {
        3 => Err(TranscribeError::Provider("503 service unavailable".into())),
        i => Ok(format!("p{}", i + 1)),
    });

    let report = process_document(&pdf, &out, &config, &t, &noop()).await.unwrap();
    assert_eq!(report.page_count, 5);
    assert_eq!(report.failed_pages, 1);
    assert_eq!(
        std::fs::read_to_string(&report.output).unwrap(),
        "p1\n\np2\n\np3\n\nError processing page 4: 503 service unavailable\n\np5"
    );
}

#[tokio::test]
async fn empty_pdf_is_a_document_failure() {
    skip_without_pdfium!();

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let pdf = dir.path().join("empty.pdf");
    std::fs::write(&pdf, minimal_pdf(0)).unwrap();

    let config = config_in(dir.path(), "{{ content }}");
    let stub = Scripted::new(|_| Ok("text".into()));
    let t: Arc<dyn PageTranscriber> = stub.clone();

    let err = process_document(&pdf, &out, &config, &t, &noop()).await.unwrap_err();
    assert!(
        matches!(err, DocumentError::NoPages { .. } | DocumentError::DecodeFailed { .. }),
        "got {err:?}"
    );
    assert_eq!(stub.calls(), 0);
    assert!(md_files(&out).is_empty());
}
