//! Debate-speech dataset loading and batch assembly.
//!
//! A dataset root holds one JSONL manifest per split (`test.jsonl`, ...);
//! each line is a record with the transcript, a WAV path relative to the
//! root, and a binary stance label:
//!
//! ```json
//! {"id":"clip_0421","text":"we should ban ...","audio":"wav/clip_0421.wav","label":1}
//! ```
//!
//! Batches are assembled in manifest order, the last short batch kept. The
//! modality flags in [`DatasetConfig`] decide the batch layout: text-only,
//! audio-only, or both.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::audio::{chunk_or_pad, downmix_mono, read_wav};
use crate::config::DatasetConfig;
use crate::{Error, Result};

/// One manifest line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StanceRecord {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub audio: String,
    pub label: u32,
}

/// Tokenized text for one batch: `input_ids` and `attention_mask`, both
/// `[B, T]` (u32), padded to the longest member.
#[derive(Debug, Clone)]
pub struct TokenBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
}

/// One evaluation batch. The layout matches the model being evaluated.
#[derive(Debug, Clone)]
pub enum Batch {
    Text { tokens: TokenBatch, labels: Tensor },
    Audio { waves: Tensor, labels: Tensor },
    Multimodal { tokens: TokenBatch, waves: Tensor, labels: Tensor },
}

impl Batch {
    /// The `[B]` (u32) label tensor.
    pub fn labels(&self) -> &Tensor {
        match self {
            Batch::Text { labels, .. }
            | Batch::Audio { labels, .. }
            | Batch::Multimodal { labels, .. } => labels,
        }
    }
}

/// Fetch a tokenizer.json from the HuggingFace Hub and configure batch
/// padding plus truncation at `max_len`.
pub fn load_tokenizer(model_id: &str, max_len: usize) -> Result<Tokenizer> {
    let api = hf_hub::api::sync::Api::new()?;
    let path = api.model(model_id.to_string()).get("tokenizer.json")?;
    let mut tokenizer = Tokenizer::from_file(path)?;
    configure_tokenizer(&mut tokenizer, max_len)?;
    Ok(tokenizer)
}

/// Batch-longest padding, truncation at `max_len`.
pub fn configure_tokenizer(tokenizer: &mut Tokenizer, max_len: usize) -> Result<()> {
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..Default::default()
    }));
    tokenizer.with_truncation(Some(TruncationParams {
        max_length: max_len,
        ..Default::default()
    }))?;
    Ok(())
}

/// A split of the debate-speech dataset.
pub struct DebaterDataset {
    records: Vec<StanceRecord>,
    root: PathBuf,
    cfg: DatasetConfig,
    tokenizer: Option<Tokenizer>,
}

impl DebaterDataset {
    /// Load `{data_path}/{split}.jsonl`. A tokenizer is required whenever
    /// `load_text` is set.
    pub fn load(cfg: &DatasetConfig, split: &str, tokenizer: Option<Tokenizer>) -> Result<Self> {
        let root = PathBuf::from(&cfg.data_path);
        let manifest = manifest_path(cfg, split);
        let text = std::fs::read_to_string(&manifest).map_err(|e| {
            Error::Dataset(format!("cannot read manifest {}: {e}", manifest.display()))
        })?;

        let mut records = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: StanceRecord = serde_json::from_str(line).map_err(|e| {
                Error::Dataset(format!(
                    "{}:{}: malformed record: {e}",
                    manifest.display(),
                    lineno + 1
                ))
            })?;
            records.push(record);
        }

        Self::from_records(records, root, cfg.clone(), tokenizer)
    }

    /// Build a dataset from in-memory records (tests, synthetic data).
    pub fn from_records(
        records: Vec<StanceRecord>,
        root: PathBuf,
        cfg: DatasetConfig,
        tokenizer: Option<Tokenizer>,
    ) -> Result<Self> {
        if cfg.loader.batch_size == 0 {
            return Err(Error::Config(
                "dataset.loader.batch_size must be at least 1".into(),
            ));
        }
        if cfg.load_text && tokenizer.is_none() {
            return Err(Error::Config(
                "dataset.load_text = true requires a tokenizer".into(),
            ));
        }
        if !cfg.load_text && !cfg.load_audio {
            return Err(Error::Config(
                "at least one of dataset.load_text / dataset.load_audio must be set".into(),
            ));
        }
        Ok(Self {
            records,
            root,
            cfg,
            tokenizer,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate batches in manifest order.
    pub fn batches<'a>(&'a self, device: &'a Device) -> Batches<'a> {
        Batches {
            dataset: self,
            device,
            pos: 0,
        }
    }

    fn tokenize(&self, records: &[StanceRecord], device: &Device) -> Result<TokenBatch> {
        let tokenizer = self
            .tokenizer
            .as_ref()
            .expect("tokenizer presence checked at construction");
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let encodings = tokenizer.encode_batch(texts, true)?;

        let batch = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());
        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
        }

        Ok(TokenBatch {
            input_ids: Tensor::from_vec(ids, (batch, seq_len), device)?,
            attention_mask: Tensor::from_vec(mask, (batch, seq_len), device)?,
        })
    }

    fn load_waves(&self, records: &[StanceRecord], device: &Device) -> Result<Tensor> {
        let target_len = self.cfg.chunk_samples();
        let mut flat = Vec::with_capacity(records.len() * target_len);
        for record in records {
            let path = self.root.join(&record.audio);
            let (samples, sample_rate, channels) = read_wav(&path)?;
            if sample_rate != self.cfg.sample_rate {
                return Err(Error::Audio(format!(
                    "{}: expected {} Hz, got {} Hz",
                    path.display(),
                    self.cfg.sample_rate,
                    sample_rate
                )));
            }
            let mono = downmix_mono(&samples, channels);
            flat.extend_from_slice(&chunk_or_pad(mono, target_len));
        }
        Tensor::from_vec(flat, (records.len(), target_len), device).map_err(Into::into)
    }

    fn assemble(&self, records: &[StanceRecord], device: &Device) -> Result<Batch> {
        let labels: Vec<u32> = records.iter().map(|r| r.label).collect();
        let labels = Tensor::from_vec(labels, records.len(), device)?;

        match (self.cfg.load_text, self.cfg.load_audio) {
            (true, false) => Ok(Batch::Text {
                tokens: self.tokenize(records, device)?,
                labels,
            }),
            (false, true) => Ok(Batch::Audio {
                waves: self.load_waves(records, device)?,
                labels,
            }),
            (true, true) => Ok(Batch::Multimodal {
                tokens: self.tokenize(records, device)?,
                waves: self.load_waves(records, device)?,
                labels,
            }),
            (false, false) => unreachable!("rejected at construction"),
        }
    }
}

/// Iterator over [`Batch`]es of a dataset split.
pub struct Batches<'a> {
    dataset: &'a DebaterDataset,
    device: &'a Device,
    pos: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.dataset.records.len();
        if self.pos >= n {
            return None;
        }
        let end = (self.pos + self.dataset.cfg.loader.batch_size).min(n);
        let slice = &self.dataset.records[self.pos..end];
        self.pos = end;
        Some(self.dataset.assemble(slice, self.device))
    }
}

/// Resolve a manifest path for error messages and tooling.
pub fn manifest_path(cfg: &DatasetConfig, split: &str) -> PathBuf {
    Path::new(&cfg.data_path).join(format!("{split}.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;
    use std::collections::HashMap;
    use tokenizers::models::wordlevel::WordLevel;

    fn word_tokenizer() -> Tokenizer {
        let mut vocab = HashMap::new();
        vocab.insert("[UNK]".to_string(), 0u32);
        vocab.insert("agree".to_string(), 1);
        vocab.insert("disagree".to_string(), 2);
        let model = WordLevel::builder()
            .vocab(vocab.into_iter().collect())
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();
        let mut tokenizer = Tokenizer::new(model);
        configure_tokenizer(&mut tokenizer, 8).unwrap();
        tokenizer
    }

    fn small_cfg(root: &Path) -> DatasetConfig {
        DatasetConfig {
            data_path: root.to_string_lossy().into_owned(),
            chunk_length: 1,
            sample_rate: 40,
            loader: crate::config::LoaderConfig {
                batch_size: 2,
                num_workers: 0,
            },
            ..DatasetConfig::default()
        }
    }

    fn write_split(dir: &Path) {
        let records = [
            StanceRecord {
                id: "a".into(),
                text: "agree".into(),
                audio: "a.wav".into(),
                label: 1,
            },
            StanceRecord {
                id: "b".into(),
                text: "disagree".into(),
                audio: "b.wav".into(),
                label: 0,
            },
            StanceRecord {
                id: "c".into(),
                text: "agree".into(),
                audio: "c.wav".into(),
                label: 1,
            },
        ];
        let manifest: String = records
            .iter()
            .map(|r| serde_json::to_string(r).unwrap() + "\n")
            .collect();
        std::fs::write(dir.join("test.jsonl"), manifest).unwrap();
        for (name, len) in [("a.wav", 40usize), ("b.wav", 60), ("c.wav", 20)] {
            write_wav(dir.join(name), &vec![0.1f32; len], 40, 1).unwrap();
        }
    }

    #[test]
    fn test_multimodal_batches() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path());
        let cfg = small_cfg(dir.path());
        let dataset = DebaterDataset::load(&cfg, "test", Some(word_tokenizer())).unwrap();
        assert_eq!(dataset.len(), 3);

        let device = Device::Cpu;
        let batches: Vec<Batch> = dataset
            .batches(&device)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        // 3 records, batch size 2 → one full batch plus a short one.
        assert_eq!(batches.len(), 2);

        match &batches[0] {
            Batch::Multimodal {
                tokens,
                waves,
                labels,
            } => {
                assert_eq!(tokens.input_ids.dims()[0], 2);
                // All clips truncated/padded to chunk_samples.
                assert_eq!(waves.dims(), &[2, 40]);
                let labels: Vec<u32> = labels.to_vec1().unwrap();
                assert_eq!(labels, vec![1, 0]);
            }
            _ => panic!("expected multimodal batch"),
        }
        match &batches[1] {
            Batch::Multimodal { waves, .. } => assert_eq!(waves.dims(), &[1, 40]),
            _ => panic!("expected multimodal batch"),
        }
    }

    #[test]
    fn test_text_only_batches() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path());
        let mut cfg = small_cfg(dir.path());
        cfg.load_audio = false;
        let dataset = DebaterDataset::load(&cfg, "test", Some(word_tokenizer())).unwrap();

        let device = Device::Cpu;
        let first = dataset.batches(&device).next().unwrap().unwrap();
        match first {
            Batch::Text { tokens, labels } => {
                assert_eq!(tokens.input_ids.dims(), tokens.attention_mask.dims());
                assert_eq!(labels.dims(), &[2]);
            }
            _ => panic!("expected text batch"),
        }
    }

    #[test]
    fn test_wrong_sample_rate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path());
        // Overwrite one clip at the wrong rate.
        write_wav(dir.path().join("a.wav"), &vec![0.0f32; 40], 16_000, 1).unwrap();

        let mut cfg = small_cfg(dir.path());
        cfg.load_text = false;
        let dataset = DebaterDataset::load(&cfg, "test", None).unwrap();
        let device = Device::Cpu;
        let result = dataset.batches(&device).next().unwrap();
        assert!(matches!(result, Err(Error::Audio(_))));
    }

    #[test]
    fn test_missing_manifest_is_dataset_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = small_cfg(dir.path());
        let result = DebaterDataset::load(&cfg, "validation", Some(word_tokenizer()));
        assert!(matches!(result, Err(Error::Dataset(_))));
    }

    #[test]
    fn test_zero_batch_size_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path());
        let mut cfg = small_cfg(dir.path());
        cfg.loader.batch_size = 0;
        // A zero batch size would leave the batch iterator stuck in place.
        let result = DebaterDataset::load(&cfg, "test", Some(word_tokenizer()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_text_without_tokenizer_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path());
        let cfg = small_cfg(dir.path());
        let result = DebaterDataset::load(&cfg, "test", None);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
