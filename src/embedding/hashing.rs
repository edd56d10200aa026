//! Deterministic feature-hashing embedder.
//!
//! Lowercased words (minus stop words) and their character trigrams are
//! hashed with FNV-1a into signed buckets. Texts sharing vocabulary land
//! close together, which is enough for offline use and reproducible tests.

use crate::errors::Error;

use super::EmbeddingBackend;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "than", "this", "to", "was", "were",
    "will", "with", "more", "most",
];

/// Offline embedding backend based on the hashing trick.
pub struct HashingBackend {
    dimensions: usize,
    name: String,
}

impl HashingBackend {
    pub fn new(dimensions: usize, name: impl Into<String>) -> Self {
        Self {
            dimensions,
            name: name.into(),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbeddingBackend for HashingBackend {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        if self.dimensions == 0 {
            return Err(Error::Embedding(
                "Hashing backend configured with zero dimensions".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        let mut features = 0usize;

        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let word = token.to_lowercase();
            if word.chars().count() < 2 || STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            features += 1;
            self.add_feature(&mut vector, &format!("w:{word}"), WORD_WEIGHT);

            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &format!("t:{trigram}"), TRIGRAM_WEIGHT);
            }
        }

        // Only stop words or single characters: fall back to the whole text.
        if features == 0 {
            let whole = text.trim().to_lowercase();
            self.add_feature(&mut vector, &format!("w:{whole}"), WORD_WEIGHT);
        }

        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    fn backend() -> HashingBackend {
        HashingBackend::new(384, "hashing")
    }

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_embed_is_deterministic() {
        let b = backend();
        let first = b.embed("Solar panels are becoming more affordable").unwrap();
        let second = b.embed("Solar panels are becoming more affordable").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 384);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let b = backend();
        let query = b.embed("rust programming language").unwrap();
        let related = b.embed("rust programming").unwrap();
        let unrelated = b.embed("baking sourdough bread").unwrap();
        let related_sim = cosine_similarity(&query, &related).unwrap();
        let unrelated_sim = cosine_similarity(&query, &unrelated).unwrap();
        assert!(related_sim > 0.7);
        assert!(related_sim > unrelated_sim);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let b = backend();
        let a = b.embed("Climate, Change!").unwrap();
        let c = b.embed("climate change").unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_stop_words_only_is_not_zero() {
        let b = backend();
        let v = b.embed("the").unwrap();
        assert!(v.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let b = HashingBackend::new(0, "broken");
        assert!(matches!(b.embed("text"), Err(Error::Embedding(_))));
    }
}
