use deunicode::deunicode;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

/// The storage engine's embedding function.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;

    fn embed_all(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Hashed character-trigram embedder over accent-folded lowercase text,
/// L2-normalized. Deterministic and local.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

fn fnv1a(bytes: impl IntoIterator<Item = u8>) -> u64 {
    bytes.into_iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let folded: Vec<char> = deunicode(text).to_lowercase().chars().collect();

        for trigram in folded.windows(3) {
            let token: String = trigram.iter().collect();
            let bucket = (fnv1a(token.bytes()) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }
        vector
    }
}

/// Cosine of the angle between two vectors; 0 when either has no magnitude.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

pub fn squared_euclidean(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic_and_sized() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let first = embedder.embed("Capteurs de vibration");
        assert_eq!(first.len(), 32);
        assert_eq!(first, embedder.embed("Capteurs de vibration"));
    }

    #[test]
    fn accents_do_not_change_the_embedding() {
        let embedder = CharacterNgramEmbedder::default();
        assert_eq!(embedder.embed("Gèze"), embedder.embed("geze"));
    }

    #[test]
    fn short_text_embeds_to_zero_vector() {
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        assert!(embedder.embed("ab").iter().all(|value| *value == 0.0));
    }

    #[test]
    fn cosine_similarity_bounds() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn squared_distance_of_identical_vectors_is_zero() {
        assert_eq!(squared_euclidean(&[0.5, 0.5], &[0.5, 0.5]), 0.0);
        assert_eq!(squared_euclidean(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }
}
