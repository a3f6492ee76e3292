//! Deterministic pseudo-embedding for deployments without an embedding model.
//!
//! Each character of the input is spread into a few fixed positions of the
//! vector by independent multiplicative hashes, and the result is
//! L2-normalized. Texts with similar character distributions land close
//! together; nothing more is promised. With `embedding.summarize = true` the
//! input is first condensed by a chat-completion model, and the summary is
//! hashed instead.

use anyhow::Result;
use async_trait::async_trait;

use super::{http_client, l2_normalize, post_json_with_retry, EmbeddingProvider};
use crate::config::EmbeddingConfig;

const SPREAD: [u64; 3] = [0x9E37_79B9_7F4A_7C15, 0xC2B2_AE3D_27D4_EB4F, 0x1656_67B1_9E37_79F9];
const DEFAULT_URL: &str = "https://api.openai.com/v1";
const DEFAULT_SUMMARY_MODEL: &str = "gpt-4o-mini";
const SUMMARY_INPUT_CHARS: usize = 4000;

struct Summarizer {
    url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    client: reqwest::Client,
}

pub struct HashedProvider {
    dims: usize,
    summarizer: Option<Summarizer>,
}

impl HashedProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let dims = config
            .dims
            .filter(|d| *d > 0)
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for hashed provider"))?;

        let summarizer = if config.summarize {
            Some(Summarizer {
                url: config
                    .url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: config
                    .summary_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string()),
                api_key: std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty()),
                max_retries: config.max_retries,
                client: http_client(config)?,
            })
        } else {
            None
        };

        Ok(Self { dims, summarizer })
    }

    /// Hash `text` into a unit vector of `self.dims` components.
    fn hash_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for c in text.chars().flat_map(char::to_lowercase) {
            if c.is_whitespace() {
                continue;
            }
            let code = c as u64 + 1;
            for (k, multiplier) in SPREAD.iter().enumerate() {
                let h = code.wrapping_mul(*multiplier).rotate_left(17 + k as u32 * 7);
                let index = (h % self.dims as u64) as usize;
                vector[index] += 1.0 / (k as f32 + 1.0);
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Summarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let excerpt: String = text.chars().take(SUMMARY_INPUT_CHARS).collect();
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {
                    "role": "system",
                    "content": "Summarize the user's text in one or two sentences naming its topic, kind of document and key entities. Reply with the summary only."
                },
                {"role": "user", "content": excerpt},
            ],
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.url),
            self.api_key.as_deref(),
            &body,
            self.max_retries,
            "Summary",
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Invalid summary response: missing message content"))
    }
}

#[async_trait]
impl EmbeddingProvider for HashedProvider {
    fn model_name(&self) -> &str {
        "hashed"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let vector = match &self.summarizer {
                Some(summarizer) => self.hash_text(&summarizer.summarize(text).await?),
                None => self.hash_text(text),
            };
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    fn provider(dims: usize) -> HashedProvider {
        HashedProvider::new(&EmbeddingConfig {
            provider: "hashed".to_string(),
            dims: Some(dims),
            ..EmbeddingConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn vectors_are_deterministic_unit_length() {
        let p = provider(64);
        let a = p.embed("Pilot license renewal").await.unwrap();
        let b = p.embed("Pilot license renewal").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let p = provider(32);
        let texts = vec!["alpha".to_string(), "omega".to_string()];
        let batch = p.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], p.embed("alpha").await.unwrap());
        assert_eq!(batch[1], p.embed("omega").await.unwrap());
    }

    #[tokio::test]
    async fn similar_text_is_closer_than_unrelated_text() {
        let p = provider(128);
        let a = p.embed("telecom invoice for march").await.unwrap();
        let b = p.embed("Telecom invoice for April").await.unwrap();
        let c = p.embed("zzz 9999 qqq").await.unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[tokio::test]
    async fn health_check_passes_offline() {
        assert!(provider(16).health_check().await);
    }

    #[test]
    fn zero_dims_is_rejected() {
        let config = EmbeddingConfig {
            provider: "hashed".to_string(),
            dims: Some(0),
            ..EmbeddingConfig::default()
        };
        assert!(HashedProvider::new(&config).is_err());
    }
}
