//! Model catalog and the tokenizer/model pair used for summarization.
//!
//! Only the models in [`ModelName::ALL`] can be selected. Loading is behind the
//! [`ModelLoader`] trait so the Hub-backed loader can be swapped for a fake.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("failed to download {file} for {model}: {reason}")]
    Download {
        model: ModelName,
        file: String,
        reason: String,
    },
    #[error("failed to load {model}: {reason}")]
    Load { model: ModelName, reason: String },
    #[error("tokenization failed: {0}")]
    Tokenize(String),
    #[error("generation failed: {0}")]
    Generate(String),
    #[error("decoding failed: {0}")]
    Decode(String),
}

/// The allow-listed pretrained summarization models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, clap::ValueEnum)]
pub enum ModelName {
    #[default]
    #[value(name = "mabrouk/amazon-review-summarizer-bart")]
    #[serde(rename = "mabrouk/amazon-review-summarizer-bart")]
    AmazonReviewBart,
    #[value(name = "MurkatG/review-summarizer-en")]
    #[serde(rename = "MurkatG/review-summarizer-en")]
    ReviewSummarizerEn,
}

impl ModelName {
    pub const ALL: [ModelName; 2] = [ModelName::AmazonReviewBart, ModelName::ReviewSummarizerEn];

    /// Hub repository identifier
    pub fn as_str(self) -> &'static str {
        match self {
            ModelName::AmazonReviewBart => "mabrouk/amazon-review-summarizer-bart",
            ModelName::ReviewSummarizerEn => "MurkatG/review-summarizer-en",
        }
    }

    /// The following entry in the allow-list, wrapping around
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ModelError::UnknownModel(s.to_string()))
    }
}

/// Counts tokens of a string without special tokens.
pub trait TokenCount {
    fn token_count(&self, text: &str) -> Result<usize, ModelError>;

    /// Ids the tokenizer adds around every encoded input, e.g. `<s>`/`</s>`.
    fn special_token_overhead(&self) -> usize {
        0
    }
}

pub trait TextTokenizer: TokenCount + Send + Sync {
    /// Token ids as the model sees them, special tokens included.
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError>;

    /// Decode generated ids, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> Result<String, ModelError>;
}

pub trait Seq2SeqModel: Send + Sync {
    /// Run conditional generation and return the generated ids.
    fn generate(&self, input_ids: &[u32]) -> Result<Vec<u32>, ModelError>;
}

/// A loaded tokenizer and model pair.
///
/// Never mutated after creation: selecting another model builds a new handle.
pub struct ModelHandle {
    name: ModelName,
    tokenizer: Box<dyn TextTokenizer>,
    model: Box<dyn Seq2SeqModel>,
}

impl ModelHandle {
    pub fn new(
        name: ModelName,
        tokenizer: Box<dyn TextTokenizer>,
        model: Box<dyn Seq2SeqModel>,
    ) -> Self {
        Self {
            name,
            tokenizer,
            model,
        }
    }

    pub fn name(&self) -> ModelName {
        self.name
    }

    pub fn tokenizer(&self) -> &dyn TextTokenizer {
        self.tokenizer.as_ref()
    }

    pub fn model(&self) -> &dyn Seq2SeqModel {
        self.model.as_ref()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("tokenizer", &"<tokenizer>")
            .field("model", &"<model>")
            .finish()
    }
}

#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, name: ModelName) -> Result<ModelHandle, ModelError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the unit tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// One token per whitespace-separated word. Decodes ids as bytes; ids above
    /// 255 count as special tokens and are skipped.
    pub struct WordTokenizer;

    impl TokenCount for WordTokenizer {
        fn token_count(&self, text: &str) -> Result<usize, ModelError> {
            Ok(text.split_whitespace().count())
        }
    }

    impl TextTokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
            Ok((0..text.split_whitespace().count() as u32).collect())
        }

        fn decode(&self, ids: &[u32]) -> Result<String, ModelError> {
            let bytes: Vec<u8> = ids
                .iter()
                .filter_map(|id| u8::try_from(*id).ok())
                .collect();
            String::from_utf8(bytes).map_err(|e| ModelError::Decode(e.to_string()))
        }
    }

    /// Replies with a fixed string and counts calls.
    pub struct ScriptedModel {
        reply: String,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedModel {
        pub fn new(reply: &str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let model = Self {
                reply: reply.to_string(),
                calls: Arc::clone(&calls),
            };
            (model, calls)
        }
    }

    impl Seq2SeqModel for ScriptedModel {
        fn generate(&self, _input_ids: &[u32]) -> Result<Vec<u32>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // leading special token, as a real decoder start would be
            let mut ids = vec![1000];
            ids.extend(self.reply.bytes().map(u32::from));
            Ok(ids)
        }
    }

    pub fn scripted_handle(name: ModelName, reply: &str) -> (ModelHandle, Arc<AtomicUsize>) {
        let (model, calls) = ScriptedModel::new(reply);
        let handle = ModelHandle::new(name, Box::new(WordTokenizer), Box::new(model));
        (handle, calls)
    }
}
