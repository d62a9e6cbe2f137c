//! Hugging Face Hub model loading.
//!
//! Downloads `config.json`, `tokenizer.json`, the optional
//! `generation_config.json` and the weights with the hf-hub
//! tokio API, then builds a tokenizers-backed tokenizer and a candle BART model.

use crate::bart::{BartGenerator, Weights};
use crate::config::Config;
use crate::models::{ModelError, ModelHandle, ModelLoader, ModelName, TextTokenizer, TokenCount};
use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use std::path::{Path, PathBuf};
use tokenizers::{PostProcessor, Tokenizer};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const GENERATION_CONFIG_FILE: &str = "generation_config.json";
const SAFETENSORS_FILE: &str = "model.safetensors";
const PYTORCH_FILE: &str = "pytorch_model.bin";

/// Tokenizer loaded from a Hub `tokenizer.json`.
pub struct HubTokenizer {
    inner: Tokenizer,
    /// Ids the post-processor adds to a single sequence
    special_tokens: usize,
}

impl HubTokenizer {
    /// Load a tokenizer with truncation and padding disabled, so token counts
    /// reflect the full input.
    pub fn from_file(name: ModelName, path: &Path) -> Result<Self, ModelError> {
        let load_error = |reason: String| ModelError::Load {
            model: name,
            reason,
        };

        let mut inner = Tokenizer::from_file(path).map_err(|e| load_error(e.to_string()))?;
        inner
            .with_truncation(None)
            .map_err(|e| load_error(e.to_string()))?;
        inner.with_padding(None);

        let special_tokens = inner
            .get_post_processor()
            .map_or(0, |processor| processor.added_tokens(false));

        Ok(Self {
            inner,
            special_tokens,
        })
    }
}

impl TokenCount for HubTokenizer {
    fn token_count(&self, text: &str) -> Result<usize, ModelError> {
        self.inner
            .encode(text, false)
            .map(|encoding| encoding.len())
            .map_err(|e| ModelError::Tokenize(e.to_string()))
    }

    fn special_token_overhead(&self) -> usize {
        self.special_tokens
    }
}

impl TextTokenizer for HubTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        self.inner
            .encode(text, true)
            .map(|encoding| encoding.get_ids().to_vec())
            .map_err(|e| ModelError::Tokenize(e.to_string()))
    }

    fn decode(&self, ids: &[u32]) -> Result<String, ModelError> {
        self.inner
            .decode(ids, true)
            .map_err(|e| ModelError::Decode(e.to_string()))
    }
}

/// Loads allow-listed models from the Hugging Face Hub.
#[derive(Debug, Clone)]
pub struct HubLoader {
    cache_dir: Option<PathBuf>,
    token: Option<String>,
    max_new_tokens: usize,
}

impl HubLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            cache_dir: config.hub.cache_dir.clone(),
            token: config.hub.token.clone(),
            max_new_tokens: config.generation.max_new_tokens,
        }
    }

    /// Create a configured Hub client
    fn api(&self, name: ModelName) -> Result<Api, ModelError> {
        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(self.token.clone());
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }

        builder.build().map_err(|e| ModelError::Download {
            model: name,
            file: String::new(),
            reason: e.to_string(),
        })
    }
}

/// Fetch one file of a model repository, from the cache when present
async fn fetch(repo: &ApiRepo, name: ModelName, file: &str) -> Result<PathBuf, ModelError> {
    repo.get(file).await.map_err(|e| ModelError::Download {
        model: name,
        file: file.to_string(),
        reason: e.to_string(),
    })
}

/// Fetch a file that older checkpoints do not ship
async fn fetch_optional(repo: &ApiRepo, name: ModelName, file: &str) -> Option<PathBuf> {
    match repo.get(file).await {
        Ok(path) => Some(path),
        Err(e) => {
            debug!(model = %name, error = %e, "no {} in repository", file);
            None
        }
    }
}

/// Prefer safetensors and fall back to the pickled PyTorch checkpoint
async fn fetch_weights(repo: &ApiRepo, name: ModelName) -> Result<Weights, ModelError> {
    match repo.get(SAFETENSORS_FILE).await {
        Ok(path) => Ok(Weights::SafeTensors(path)),
        Err(e) => {
            debug!(model = %name, error = %e, "no safetensors weights, trying {}", PYTORCH_FILE);
            fetch(repo, name, PYTORCH_FILE).await.map(Weights::Pytorch)
        }
    }
}

#[async_trait]
impl ModelLoader for HubLoader {
    async fn load(&self, name: ModelName) -> Result<ModelHandle, ModelError> {
        info!(model = %name, "loading model");

        let repo = self.api(name)?.model(name.as_str().to_string());
        let config_path = fetch(&repo, name, CONFIG_FILE).await?;
        let tokenizer_path = fetch(&repo, name, TOKENIZER_FILE).await?;
        let generation_path = fetch_optional(&repo, name, GENERATION_CONFIG_FILE).await;
        let weights = fetch_weights(&repo, name).await?;

        let tokenizer = HubTokenizer::from_file(name, &tokenizer_path)?;
        let model = BartGenerator::from_files(
            name,
            &config_path,
            generation_path.as_deref(),
            &weights,
            self.max_new_tokens,
        )?;

        info!(model = %name, "model ready");
        Ok(ModelHandle::new(name, Box::new(tokenizer), Box::new(model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{self, ChunkMode};
    use crate::guard::{self, MAX_INPUT_TOKENS};
    use crate::models::testing::ScriptedModel;
    use std::io::Write;
    use std::sync::atomic::Ordering;

    /// A word-level tokenizer with `<s>`/`</s>` added around every input.
    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "<s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 2, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                {"SpecialToken": {"id": "<s>", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}},
                {"SpecialToken": {"id": "</s>", "type_id": 0}}
            ],
            "pair": [
                {"Sequence": {"id": "A", "type_id": 0}},
                {"Sequence": {"id": "B", "type_id": 1}}
            ],
            "special_tokens": {
                "<s>": {"id": "<s>", "ids": [0], "tokens": ["<s>"]},
                "</s>": {"id": "</s>", "ids": [2], "tokens": ["</s>"]}
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"<s>": 0, "<unk>": 1, "</s>": 2, "this": 3, "is": 4, "a": 5, "summary": 6, "Word": 7, "word": 8, ".": 9},
            "unk_token": "<unk>"
        }
    }"#;

    fn tokenizer() -> HubTokenizer {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOKENIZER_JSON.as_bytes()).unwrap();
        HubTokenizer::from_file(ModelName::default(), file.path()).unwrap()
    }

    #[test]
    fn test_encode_adds_special_tokens() {
        assert_eq!(tokenizer().encode("this is a summary").unwrap(), vec![0, 3, 4, 5, 6, 2]);
    }

    #[test]
    fn test_token_count_excludes_special_tokens() {
        assert_eq!(tokenizer().token_count("this is a summary").unwrap(), 4);
    }

    #[test]
    fn test_decode_skips_special_tokens() {
        let decoded = tokenizer().decode(&[2, 0, 3, 4, 5, 6, 2]).unwrap();
        assert_eq!(decoded, "this is a summary");
    }

    #[test]
    fn test_overhead_comes_from_post_processor() {
        assert_eq!(tokenizer().special_token_overhead(), 2);
    }

    /// A sentence of `n` words, the full stop being one more token.
    fn sentence(n: usize) -> String {
        format!("Word{}.", " word".repeat(n - 1))
    }

    #[test]
    fn test_packed_chunks_pass_the_length_guard() {
        // 601 + 422 content tokens, 1025 ids once <s> and </s> are added
        let text = format!("{} {}", sentence(600), sentence(421));
        let (model, calls) = ScriptedModel::new("ok");
        let handle = ModelHandle::new(ModelName::default(), Box::new(tokenizer()), Box::new(model));

        let chunks = chunker::chunk(&text, handle.tokenizer(), ChunkMode::Lossless).unwrap();
        assert_eq!(chunks.len(), 2);

        for chunk in &chunks {
            assert!(handle.tokenizer().encode(chunk).unwrap().len() <= MAX_INPUT_TOKENS);
            assert!(!guard::summarize(chunk, &handle).unwrap().is_rejected());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = HubTokenizer::from_file(ModelName::default(), &dir.path().join(TOKENIZER_FILE));
        assert!(matches!(result, Err(ModelError::Load { .. })));
    }

    #[test]
    fn test_loader_takes_settings_from_config() {
        let config = Config::parse(
            "[generation]\nmax_new_tokens = 42\n[hub]\ncache_dir = \"/tmp/models\"\ntoken = \"hf_x\"",
        )
        .unwrap();
        let loader = HubLoader::new(&config);

        assert_eq!(loader.max_new_tokens, 42);
        assert_eq!(loader.cache_dir, Some(PathBuf::from("/tmp/models")));
        assert_eq!(loader.token.as_deref(), Some("hf_x"));
    }
}
