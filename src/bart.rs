//! BART conditional generation on candle.
//!
//! Post-norm encoder/decoder with learned positional embeddings (offset by 2),
//! an embedding layer norm, and an output projection tied to the shared
//! token embedding plus `final_logits_bias`. Decoding follows the checkpoint's
//! generation settings (beams, n-gram blocking, length limits).

use crate::models::{ModelError, ModelName, Seq2SeqModel};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{embedding, layer_norm, linear, Embedding, LayerNorm, Linear, VarBuilder};
use candle_transformers::generation::LogitsProcessor;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// BART shifts position ids by this much
const POSITION_OFFSET: usize = 2;
const LAYER_NORM_EPS: f64 = 1e-5;
/// Argmax decoding never samples, the seed is irrelevant
const SEED: u64 = 299_792_458;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Gelu,
    GeluNew,
    Relu,
    Silu,
    Swish,
    Tanh,
}

impl Activation {
    fn apply(self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Gelu => xs.gelu_erf(),
            Activation::GeluNew => xs.gelu(),
            Activation::Relu => xs.relu(),
            Activation::Silu | Activation::Swish => xs.silu(),
            Activation::Tanh => xs.tanh(),
        }
    }
}

/// The subset of a Hub `config.json` needed to build and run the model.
#[derive(Debug, Clone, Deserialize)]
pub struct BartConfig {
    pub vocab_size: usize,
    pub d_model: usize,
    pub encoder_layers: usize,
    pub decoder_layers: usize,
    pub encoder_attention_heads: usize,
    pub decoder_attention_heads: usize,
    pub encoder_ffn_dim: usize,
    pub decoder_ffn_dim: usize,
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub activation_function: Activation,
    #[serde(default)]
    pub scale_embedding: bool,
    #[serde(default)]
    pub normalize_before: bool,
    #[serde(default = "default_eos")]
    pub eos_token_id: u32,
    #[serde(default = "default_eos")]
    pub decoder_start_token_id: u32,
    #[serde(flatten)]
    pub generation: GenerationSettings,
}

fn default_eos() -> u32 {
    2
}

fn default_one() -> usize {
    1
}

fn default_length_penalty() -> f64 {
    1.0
}

/// When beam search stops, as `early_stopping` in a Hub config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum EarlyStopping {
    /// `false`: stop once no running beam can beat the finished ones
    #[default]
    Heuristic,
    /// `true`: stop as soon as enough beams have finished
    Eager,
    /// `"never"`: keep going until no beam can improve at the length limit
    Never,
}

impl From<serde_json::Value> for EarlyStopping {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(true) => EarlyStopping::Eager,
            serde_json::Value::String(s) if s == "never" => EarlyStopping::Never,
            _ => EarlyStopping::Heuristic,
        }
    }
}

/// Decoding settings shipped with a checkpoint, in `config.json` or
/// `generation_config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_one")]
    pub num_beams: usize,
    #[serde(default)]
    pub no_repeat_ngram_size: usize,
    /// Minimum decoder length, the start token included
    #[serde(default)]
    pub min_length: usize,
    /// Maximum decoder length, the start token included
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default = "default_length_penalty")]
    pub length_penalty: f64,
    #[serde(default)]
    pub early_stopping: EarlyStopping,
    #[serde(default)]
    pub forced_bos_token_id: Option<u32>,
    #[serde(default)]
    pub forced_eos_token_id: Option<u32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            num_beams: 1,
            no_repeat_ngram_size: 0,
            min_length: 0,
            max_length: None,
            length_penalty: 1.0,
            early_stopping: EarlyStopping::default(),
            forced_bos_token_id: None,
            forced_eos_token_id: None,
        }
    }
}

impl BartConfig {
    /// Read `config.json`, with keys of `generation_config.json` taking precedence
    pub fn from_files(config: &Path, generation: Option<&Path>) -> Result<Self, String> {
        let mut value = read_json(config)?;
        if let Some(path) = generation {
            if let (Some(base), serde_json::Value::Object(overrides)) =
                (value.as_object_mut(), read_json(path)?)
            {
                base.extend(overrides);
            }
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    fn embed_scale(&self) -> f64 {
        if self.scale_embedding {
            (self.d_model as f64).sqrt()
        } else {
            1.0
        }
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value, String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))
}

/// Where the model weights were downloaded to.
#[derive(Debug, Clone)]
pub enum Weights {
    SafeTensors(PathBuf),
    Pytorch(PathBuf),
}

struct Attention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scaling: f64,
}

impl Attention {
    fn load(d_model: usize, num_heads: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let head_dim = d_model / num_heads;
        Ok(Self {
            q_proj: linear(d_model, d_model, vb.pp("q_proj"))?,
            k_proj: linear(d_model, d_model, vb.pp("k_proj"))?,
            v_proj: linear(d_model, d_model, vb.pp("v_proj"))?,
            out_proj: linear(d_model, d_model, vb.pp("out_proj"))?,
            num_heads,
            head_dim,
            scaling: (head_dim as f64).powf(-0.5),
        })
    }

    fn split_heads(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (batch, len, _) = xs.dims3()?;
        xs.reshape((batch, len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    /// Self-attention when `kv` is `None`, cross-attention otherwise.
    fn forward(
        &self,
        xs: &Tensor,
        kv: Option<&Tensor>,
        mask: Option<&Tensor>,
    ) -> candle_core::Result<Tensor> {
        let (batch, tgt_len, d_model) = xs.dims3()?;
        let kv = kv.unwrap_or(xs);

        let q = self.split_heads(&self.q_proj.forward(xs)?.affine(self.scaling, 0.)?)?;
        let k = self.split_heads(&self.k_proj.forward(kv)?)?;
        let v = self.split_heads(&self.v_proj.forward(kv)?)?;

        let mut weights = q.matmul(&k.t()?.contiguous()?)?;
        if let Some(mask) = mask {
            weights = weights.broadcast_add(mask)?;
        }
        let weights = candle_nn::ops::softmax_last_dim(&weights)?;

        weights
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, tgt_len, d_model))?
            .apply(&self.out_proj)
    }
}

struct FeedForward {
    fc1: Linear,
    fc2: Linear,
    activation: Activation,
}

impl FeedForward {
    fn load(cfg: &BartConfig, ffn_dim: usize, vb: &VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            fc1: linear(cfg.d_model, ffn_dim, vb.pp("fc1"))?,
            fc2: linear(ffn_dim, cfg.d_model, vb.pp("fc2"))?,
            activation: cfg.activation_function,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.activation.apply(&self.fc1.forward(xs)?)?;
        self.fc2.forward(&hidden)
    }
}

struct EncoderLayer {
    self_attn: Attention,
    self_attn_layer_norm: LayerNorm,
    ffn: FeedForward,
    final_layer_norm: LayerNorm,
}

impl EncoderLayer {
    fn load(cfg: &BartConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            self_attn: Attention::load(cfg.d_model, cfg.encoder_attention_heads, vb.pp("self_attn"))?,
            self_attn_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("self_attn_layer_norm"))?,
            ffn: FeedForward::load(cfg, cfg.encoder_ffn_dim, &vb)?,
            final_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("final_layer_norm"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let attn = self.self_attn.forward(xs, None, None)?;
        let xs = (xs + attn)?.apply(&self.self_attn_layer_norm)?;
        let ffn = self.ffn.forward(&xs)?;
        (xs + ffn)?.apply(&self.final_layer_norm)
    }
}

struct DecoderLayer {
    self_attn: Attention,
    self_attn_layer_norm: LayerNorm,
    encoder_attn: Attention,
    encoder_attn_layer_norm: LayerNorm,
    ffn: FeedForward,
    final_layer_norm: LayerNorm,
}

impl DecoderLayer {
    fn load(cfg: &BartConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let heads = cfg.decoder_attention_heads;
        Ok(Self {
            self_attn: Attention::load(cfg.d_model, heads, vb.pp("self_attn"))?,
            self_attn_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("self_attn_layer_norm"))?,
            encoder_attn: Attention::load(cfg.d_model, heads, vb.pp("encoder_attn"))?,
            encoder_attn_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("encoder_attn_layer_norm"))?,
            ffn: FeedForward::load(cfg, cfg.decoder_ffn_dim, &vb)?,
            final_layer_norm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("final_layer_norm"))?,
        })
    }

    fn forward(
        &self,
        xs: &Tensor,
        encoder_out: &Tensor,
        causal_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let attn = self.self_attn.forward(xs, None, Some(causal_mask))?;
        let xs = (xs + attn)?.apply(&self.self_attn_layer_norm)?;
        let cross = self.encoder_attn.forward(&xs, Some(encoder_out), None)?;
        let xs = (xs + cross)?.apply(&self.encoder_attn_layer_norm)?;
        let ffn = self.ffn.forward(&xs)?;
        (xs + ffn)?.apply(&self.final_layer_norm)
    }
}

/// Token embedding scaled and summed with learned positions, then normalized.
struct Embeddings {
    positions: Embedding,
    layernorm: LayerNorm,
    scale: f64,
}

impl Embeddings {
    fn load(cfg: &BartConfig, vb: &VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            positions: embedding(
                cfg.max_position_embeddings + POSITION_OFFSET,
                cfg.d_model,
                vb.pp("embed_positions"),
            )?,
            layernorm: layer_norm(cfg.d_model, LAYER_NORM_EPS, vb.pp("layernorm_embedding"))?,
            scale: cfg.embed_scale(),
        })
    }

    fn forward(&self, shared: &Embedding, ids: &Tensor) -> candle_core::Result<Tensor> {
        let (_, seq_len) = ids.dims2()?;
        let tokens = shared.forward(ids)?.affine(self.scale, 0.)?;
        let position_ids = Tensor::arange(
            POSITION_OFFSET as u32,
            (seq_len + POSITION_OFFSET) as u32,
            ids.device(),
        )?;
        let positions = self.positions.forward(&position_ids)?;
        tokens.broadcast_add(&positions)?.apply(&self.layernorm)
    }
}

/// `BartForConditionalGeneration` weights and forward passes.
pub struct BartModel {
    shared: Embedding,
    encoder_embeddings: Embeddings,
    encoder_layers: Vec<EncoderLayer>,
    decoder_embeddings: Embeddings,
    decoder_layers: Vec<DecoderLayer>,
    lm_head: Linear,
    final_logits_bias: Tensor,
    device: Device,
}

impl BartModel {
    pub fn load(cfg: &BartConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let device = vb.device().clone();
        let final_logits_bias = if vb.contains_tensor("final_logits_bias") {
            vb.get((1, cfg.vocab_size), "final_logits_bias")?
        } else {
            Tensor::zeros((1, cfg.vocab_size), DType::F32, &device)?
        };

        let vb = vb.pp("model");
        let shared = embedding(cfg.vocab_size, cfg.d_model, vb.pp("shared"))?;

        let encoder = vb.pp("encoder");
        let encoder_embeddings = Embeddings::load(cfg, &encoder)?;
        let encoder_layers = (0..cfg.encoder_layers)
            .map(|i| EncoderLayer::load(cfg, encoder.pp(format!("layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let decoder = vb.pp("decoder");
        let decoder_embeddings = Embeddings::load(cfg, &decoder)?;
        let decoder_layers = (0..cfg.decoder_layers)
            .map(|i| DecoderLayer::load(cfg, decoder.pp(format!("layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        // output projection is tied to the shared embedding
        let lm_head = Linear::new(shared.embeddings().clone(), None);

        Ok(Self {
            shared,
            encoder_embeddings,
            encoder_layers,
            decoder_embeddings,
            decoder_layers,
            lm_head,
            final_logits_bias,
            device,
        })
    }

    /// Encode `(batch, seq)` input ids to `(batch, seq, d_model)` hidden states
    pub fn encode(&self, input_ids: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = self.encoder_embeddings.forward(&self.shared, input_ids)?;
        for layer in &self.encoder_layers {
            xs = layer.forward(&xs)?;
        }
        Ok(xs)
    }

    /// Logits `(batch, seq, vocab)` for every decoder position
    pub fn decode(&self, decoder_ids: &Tensor, encoder_out: &Tensor) -> candle_core::Result<Tensor> {
        let (_, seq_len) = decoder_ids.dims2()?;
        let mask = causal_mask(seq_len, &self.device)?;

        let mut xs = self.decoder_embeddings.forward(&self.shared, decoder_ids)?;
        for layer in &self.decoder_layers {
            xs = layer.forward(&xs, encoder_out, &mask)?;
        }

        xs.apply(&self.lm_head)?
            .broadcast_add(&self.final_logits_bias)
    }
}

fn causal_mask(len: usize, device: &Device) -> candle_core::Result<Tensor> {
    let mask: Vec<f32> = (0..len)
        .flat_map(|i| (0..len).map(move |j| if j > i { f32::NEG_INFINITY } else { 0.0 }))
        .collect();
    Tensor::from_slice(&mask, (len, len), device)
}

/// Ban the tokens that would repeat an n-gram of size `n` already in `tokens`.
fn banned_ngram_tokens(tokens: &[u32], n: usize) -> Vec<u32> {
    if n == 0 || tokens.len() + 1 < n {
        return Vec::new();
    }
    let prefix = &tokens[tokens.len() + 1 - n..];
    tokens
        .windows(n)
        .filter(|gram| &gram[..n - 1] == prefix)
        .map(|gram| gram[n - 1])
        .collect()
}

fn mask(scores: &mut [f32], token: u32) {
    if let Some(score) = scores.get_mut(token as usize) {
        *score = f32::NEG_INFINITY;
    }
}

/// Apply the checkpoint's decoding rules to the log-probabilities of the token
/// following `tokens`, for a decoder capped at `max_length` tokens.
fn constrain(
    scores: &mut [f32],
    tokens: &[u32],
    settings: &GenerationSettings,
    eos_token_id: u32,
    max_length: usize,
) {
    let cur_len = tokens.len();

    for token in banned_ngram_tokens(tokens, settings.no_repeat_ngram_size) {
        mask(scores, token);
    }
    if cur_len < settings.min_length {
        mask(scores, eos_token_id);
    }

    let forced = match (settings.forced_bos_token_id, settings.forced_eos_token_id) {
        (Some(bos), _) if cur_len == 1 => Some(bos),
        (_, Some(eos)) if cur_len + 1 == max_length => Some(eos),
        _ => None,
    };
    if let Some(forced) = forced {
        for (token, score) in scores.iter_mut().enumerate() {
            *score = if token == forced as usize {
                0.0
            } else {
                f32::NEG_INFINITY
            };
        }
    }
}

/// Finished beam search hypotheses, the best `size` kept.
struct Hypotheses {
    finished: Vec<(f64, Vec<u32>)>,
    size: usize,
    length_penalty: f64,
    early_stopping: EarlyStopping,
    max_length: usize,
}

impl Hypotheses {
    fn new(settings: &GenerationSettings, max_length: usize) -> Self {
        Self {
            finished: Vec::with_capacity(settings.num_beams + 1),
            size: settings.num_beams,
            length_penalty: settings.length_penalty,
            early_stopping: settings.early_stopping,
            max_length,
        }
    }

    fn score(&self, sum_logprobs: f64, len: usize) -> f64 {
        sum_logprobs / (len as f64).powf(self.length_penalty)
    }

    fn worst(&self) -> f64 {
        self.finished
            .iter()
            .map(|(score, _)| *score)
            .fold(f64::INFINITY, f64::min)
    }

    /// Record a hypothesis whose `len` tokens before EOS sum to `sum_logprobs`
    fn add(&mut self, tokens: Vec<u32>, sum_logprobs: f64, len: usize) {
        let score = self.score(sum_logprobs, len);
        if self.finished.len() == self.size && score <= self.worst() {
            return;
        }

        self.finished.push((score, tokens));
        if self.finished.len() > self.size {
            let worst = self
                .finished
                .iter()
                .enumerate()
                .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                .map(|(idx, _)| idx);
            if let Some(idx) = worst {
                self.finished.remove(idx);
            }
        }
    }

    /// Whether no running beam can still beat the finished ones
    fn is_done(&self, best_sum_logprobs: f64, cur_len: usize) -> bool {
        if self.finished.len() < self.size {
            return false;
        }
        let len = match self.early_stopping {
            EarlyStopping::Eager => return true,
            EarlyStopping::Heuristic => cur_len,
            EarlyStopping::Never if self.length_penalty > 0.0 => self.max_length,
            EarlyStopping::Never => cur_len,
        };
        self.worst() >= self.score(best_sum_logprobs, len)
    }

    fn best(self) -> Option<Vec<u32>> {
        self.finished
            .into_iter()
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, tokens)| tokens)
    }
}

/// Summarizer over a loaded [`BartModel`], decoding with the checkpoint's
/// generation settings: greedy for one beam, beam search otherwise.
pub struct BartGenerator {
    model: BartModel,
    config: BartConfig,
    max_new_tokens: usize,
}

impl BartGenerator {
    pub fn new(model: BartModel, config: BartConfig, max_new_tokens: usize) -> Self {
        Self {
            model,
            config,
            max_new_tokens,
        }
    }

    /// Build the model from a downloaded `config.json`, optional
    /// `generation_config.json` and weights file on CPU
    pub fn from_files(
        name: ModelName,
        config_path: &Path,
        generation_path: Option<&Path>,
        weights: &Weights,
        max_new_tokens: usize,
    ) -> Result<Self, ModelError> {
        let load_error = |reason: String| ModelError::Load {
            model: name,
            reason,
        };

        let config = BartConfig::from_files(config_path, generation_path).map_err(load_error)?;
        if config.normalize_before {
            return Err(load_error(
                "pre-norm (mBART style) checkpoints are not supported".to_string(),
            ));
        }

        let device = Device::Cpu;
        let vb = match weights {
            Weights::SafeTensors(path) => candle_core::safetensors::load(path, &device)
                .map(|tensors| VarBuilder::from_tensors(tensors, DType::F32, &device)),
            Weights::Pytorch(path) => VarBuilder::from_pth(path, DType::F32, &device),
        }
        .map_err(|e| load_error(e.to_string()))?;

        let model = BartModel::load(&config, vb).map_err(|e| load_error(e.to_string()))?;
        Ok(Self::new(model, config, max_new_tokens))
    }

    /// Decoder length cap, the start token included.
    ///
    /// The checkpoint's `max_length` wins over `max_new_tokens`; both are
    /// bounded by the position table.
    fn max_length(&self) -> usize {
        self.config
            .generation
            .max_length
            .unwrap_or(self.max_new_tokens + 1)
            .min(self.config.max_position_embeddings)
    }

    /// Log-probabilities of the next token for each beam
    fn next_scores(&self, beams: &[Vec<u32>], encoder_out: &Tensor) -> candle_core::Result<Vec<Vec<f32>>> {
        let len = beams.first().map_or(0, Vec::len);
        let ids: Vec<u32> = beams.iter().flatten().copied().collect();
        let decoder_ids = Tensor::from_vec(ids, (beams.len(), len), &self.model.device)?;

        let logits = self.model.decode(&decoder_ids, encoder_out)?;
        let last = logits.narrow(1, len - 1, 1)?.squeeze(1)?;
        candle_nn::ops::log_softmax(&last, D::Minus1)?.to_vec2::<f32>()
    }

    fn greedy(&self, encoder_out: &Tensor, max_length: usize) -> candle_core::Result<Vec<u32>> {
        let eos = self.config.eos_token_id;
        let mut processor = LogitsProcessor::new(SEED, None, None);
        let mut tokens = vec![self.config.decoder_start_token_id];

        while tokens.len() < max_length {
            let mut scores = self
                .next_scores(std::slice::from_ref(&tokens), encoder_out)?
                .into_iter()
                .next()
                .ok_or_else(|| candle_core::Error::Msg("decoder returned no logits".into()))?;
            constrain(&mut scores, &tokens, &self.config.generation, eos, max_length);

            let next = processor.sample(&Tensor::new(scores.as_slice(), &self.model.device)?)?;
            tokens.push(next);
            if next == eos {
                break;
            }
        }

        Ok(tokens)
    }

    fn beam_search(&self, encoder_out: &Tensor, max_length: usize) -> candle_core::Result<Vec<u32>> {
        let settings = &self.config.generation;
        let eos = self.config.eos_token_id;
        let num_beams = settings.num_beams;
        let encoder_out = encoder_out.repeat((num_beams, 1, 1))?;

        let mut beams = vec![vec![self.config.decoder_start_token_id]; num_beams];
        // only the first beam is live until the beams diverge
        let mut beam_scores: Vec<f64> = (0..num_beams)
            .map(|i| if i == 0 { 0.0 } else { -1e9 })
            .collect();
        let mut hypotheses = Hypotheses::new(settings, max_length);
        let mut done = false;

        while !done && beams[0].len() < max_length {
            let cur_len = beams[0].len();
            let rows = self.next_scores(&beams, &encoder_out)?;

            let mut candidates: Vec<(f64, usize, u32)> = Vec::new();
            for (beam, mut scores) in rows.into_iter().enumerate() {
                constrain(&mut scores, &beams[beam], settings, eos, max_length);
                candidates.extend(
                    scores
                        .iter()
                        .enumerate()
                        .filter(|(_, score)| score.is_finite())
                        .map(|(token, score)| (beam_scores[beam] + f64::from(*score), beam, token as u32)),
                );
            }
            let keep = 2 * num_beams;
            if candidates.len() > keep {
                candidates.select_nth_unstable_by(keep - 1, |a, b| b.0.total_cmp(&a.0));
                candidates.truncate(keep);
            }
            candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
            let best = candidates.first().map_or(f64::NEG_INFINITY, |c| c.0);

            let mut next_beams = Vec::with_capacity(num_beams);
            let mut next_scores = Vec::with_capacity(num_beams);
            for (rank, (score, beam, token)) in candidates.into_iter().enumerate() {
                let mut tokens = beams[beam].clone();
                tokens.push(token);
                if token == eos {
                    if rank < num_beams {
                        hypotheses.add(tokens, score, cur_len);
                    }
                } else {
                    next_beams.push(tokens);
                    next_scores.push(score);
                }
                if next_beams.len() == num_beams {
                    break;
                }
            }

            if next_beams.is_empty() {
                done = true;
                break;
            }
            while next_beams.len() < num_beams {
                next_beams.push(next_beams[0].clone());
                next_scores.push(-1e9);
            }

            done = hypotheses.is_done(best, cur_len);
            beams = next_beams;
            beam_scores = next_scores;
        }

        if !done {
            for (tokens, score) in beams.iter().zip(&beam_scores) {
                hypotheses.add(tokens.clone(), *score, tokens.len());
            }
        }

        Ok(hypotheses.best().unwrap_or_else(|| beams.swap_remove(0)))
    }
}

impl Seq2SeqModel for BartGenerator {
    fn generate(&self, input_ids: &[u32]) -> Result<Vec<u32>, ModelError> {
        let run = || -> candle_core::Result<Vec<u32>> {
            let input = Tensor::new(input_ids, &self.model.device)?.unsqueeze(0)?;
            let encoder_out = self.model.encode(&input)?;
            let max_length = self.max_length();

            let tokens = if self.config.generation.num_beams > 1 {
                self.beam_search(&encoder_out, max_length)?
            } else {
                self.greedy(&encoder_out, max_length)?
            };
            debug!(
                generated = tokens.len() - 1,
                beams = self.config.generation.num_beams,
                "decoding finished"
            );
            Ok(tokens)
        };

        run().map_err(|e| ModelError::Generate(e.to_string()))
    }
}
