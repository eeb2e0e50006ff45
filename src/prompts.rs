//! Prompts sent to the vision model alongside each page image.
//!
//! Callers override the default through `gemini.prompt` in the config file;
//! the constant here is used by [`crate::config::Config::default`] and is
//! written verbatim into the file created by `handwrite config --setup`.

/// Default transcription prompt for a page of handwritten notes.
pub const DEFAULT_PROMPT: &str = "Extract the handwritten text from this image.
- Use $ for LaTeX, not ```latex.
- Transcribe the text exactly as it appears.
- The output must be only the transcribed Markdown, with no additional commentary.";

/// Model used when the config does not name one.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
