//! Concurrent page dispatch.
//!
//! Every page of a document is transcribed on its own `tokio` task. At most
//! [`default_concurrency`] tasks are in flight at once; results are written
//! into a slot per page so the returned list is always in page order,
//! whatever order the model answers in.
//!
//! A failure never escapes this module. An OCR error or a crashed task turns
//! into that page's placeholder text and the remaining pages carry on.

use crate::error::PageError;
use crate::output::PageTranscription;
use crate::pipeline::extract::Page;
use crate::pipeline::postprocess::clean_transcription;
use crate::pipeline::transcribe::PageTranscriber;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on in-flight page requests.
pub const MAX_CONCURRENCY: usize = 32;

/// Number of pages transcribed at once: `min(32, cpus + 4)`.
pub fn default_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus + 4).min(MAX_CONCURRENCY)
}

/// Transcribe `pages` concurrently and return one result per page, in order.
pub async fn transcribe_pages(
    transcriber: &Arc<dyn PageTranscriber>,
    pages: Vec<Page>,
    prompt: &str,
    progress: &ProgressCallback,
) -> Vec<PageTranscription> {
    transcribe_pages_with_concurrency(transcriber, pages, prompt, progress, default_concurrency())
        .await
}

/// As [`transcribe_pages`], with an explicit bound on in-flight tasks.
pub async fn transcribe_pages_with_concurrency(
    transcriber: &Arc<dyn PageTranscriber>,
    pages: Vec<Page>,
    prompt: &str,
    progress: &ProgressCallback,
    concurrency: usize,
) -> Vec<PageTranscription> {
    let total_pages = pages.len();
    let prompt: Arc<str> = Arc::from(prompt);
    let mut slots: Vec<Option<PageTranscription>> = vec![None; total_pages];

    let mut finished = stream::iter(pages.into_iter().enumerate().map(|(position, page)| {
        let transcriber = Arc::clone(transcriber);
        let prompt = Arc::clone(&prompt);
        async move {
            let handle =
                tokio::spawn(async move { transcriber.transcribe(&page, &prompt).await });
            (position, handle.await)
        }
    }))
    .buffer_unordered(concurrency.max(1));

    let mut completed = 0usize;
    while let Some((position, joined)) = finished.next().await {
        completed += 1;
        let page_num = position + 1;

        let result = match joined {
            Ok(Ok(raw)) => PageTranscription::success(position, clean_transcription(&raw)),
            Ok(Err(e)) => PageTranscription::failed(
                position,
                PageError::TranscriptionFailed {
                    page: page_num,
                    detail: e.to_string(),
                },
            ),
            Err(join_err) => PageTranscription::failed(
                position,
                PageError::TaskFailed {
                    page: page_num,
                    detail: join_err.to_string(),
                },
            ),
        };

        match &result.error {
            None => {
                debug!("Page {}/{} transcribed", page_num, total_pages);
                progress.on_page_complete(page_num, completed, total_pages);
            }
            Some(e) => {
                warn!("{}", e);
                progress.on_page_error(page_num, completed, total_pages, &e.to_string());
            }
        }

        slots[position] = Some(result);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(position, slot)| {
            slot.unwrap_or_else(|| {
                PageTranscription::failed(
                    position,
                    PageError::TaskFailed {
                        page: position + 1,
                        detail: "no result collected".to_string(),
                    },
                )
            })
        })
        .collect()
}
