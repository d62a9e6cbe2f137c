//! # Abridge
//!
//! A TUI and CLI for abstractive summarisation of text and PDF documents
//! with pretrained BART models.
//!
//! ## Features
//!
//! - **Length guard**: Inputs over 1024 tokens are rejected with a fixed message instead of being truncated
//! - **Sentence chunking**: Documents are split on sentence boundaries into chunks the model accepts
//! - **Local inference**: Models are fetched from the Hugging Face hub and run on the CPU with candle

pub mod bart;
pub mod chunker;
pub mod config;
pub mod document;
pub mod guard;
pub mod hub;
pub mod logging;
pub mod models;
pub mod session;
pub mod ui;

pub use chunker::ChunkMode;
pub use config::Config;
pub use document::{PagedDocument, PdfDocument};
pub use guard::SummaryOutcome;
pub use hub::HubLoader;
pub use logging::init_logging;
pub use models::{ModelError, ModelHandle, ModelLoader, ModelName};
pub use session::{ChunkSummary, Session, SessionError};
