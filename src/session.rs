//! Summarization session: the active model plus the text and document flows.

use crate::chunker::{self, ChunkMode};
use crate::document::{self, ExtractError, PagedDocument};
use crate::guard::{self, SummaryOutcome};
use crate::models::{ModelError, ModelHandle, ModelLoader, ModelName};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// The summary of one document chunk, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub index: usize,
    pub outcome: SummaryOutcome,
}

/// Owns the active [`ModelHandle`] and the loader used to rebuild it.
pub struct Session {
    loader: Box<dyn ModelLoader>,
    handle: ModelHandle,
    chunk_mode: ChunkMode,
}

impl Session {
    /// Load `model` and start a session with it
    pub async fn open(
        loader: Box<dyn ModelLoader>,
        model: ModelName,
        chunk_mode: ChunkMode,
    ) -> Result<Self, ModelError> {
        let handle = loader.load(model).await?;
        Ok(Self {
            loader,
            handle,
            chunk_mode,
        })
    }

    /// The active model
    pub fn model(&self) -> ModelName {
        self.handle.name()
    }

    /// Switch to `model`, rebuilding the handle.
    ///
    /// Returns `false` when `model` is already active. On failure the previous
    /// model stays active.
    pub async fn select_model(&mut self, model: ModelName) -> Result<bool, ModelError> {
        if model == self.handle.name() {
            return Ok(false);
        }

        info!(from = %self.handle.name(), to = %model, "switching model");
        self.handle = self.loader.load(model).await?;
        Ok(true)
    }

    /// Summarize typed text in one pass
    pub fn summarize_text(&self, text: &str) -> Result<SummaryOutcome, ModelError> {
        guard::summarize(text, &self.handle)
    }

    /// Extract, chunk and summarize a document.
    ///
    /// Each chunk summary is handed to `on_chunk` as soon as it is produced.
    /// Returns the number of chunks.
    pub fn summarize_document<D, F>(&self, doc: &D, mut on_chunk: F) -> Result<usize, SessionError>
    where
        D: PagedDocument + ?Sized,
        F: FnMut(ChunkSummary),
    {
        let text = document::extract_text(doc)?;
        let chunks = chunker::chunk(&text, self.handle.tokenizer(), self.chunk_mode)?;
        debug!(pages = doc.page_count(), chunks = chunks.len(), "summarizing document");

        for (index, chunk) in chunks.iter().enumerate() {
            let outcome = guard::summarize(chunk, &self.handle)?;
            on_chunk(ChunkSummary { index, outcome });
        }

        Ok(chunks.len())
    }
}
