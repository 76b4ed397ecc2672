use std::fmt;

use ns_core::{Result, TextEncoder};

pub const DEFAULT_DIMENSION: usize = 256;

pub const PAD_ID: u32 = 0;
pub const CLS_ID: u32 = 1;
pub const SEP_ID: u32 = 2;
const FIRST_WORD_ID: u32 = 3;
const VOCAB_SIZE: u32 = 30_000;

/// Fixed-length token sequence with its attention mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

/// Offline encoder: hashes words into a fixed vocabulary and represents the
/// sequence as an L2-normalised bag of its unmasked tokens.
///
/// Deterministic across runs and platforms. Useful for development without
/// model files and as the encoder in tests.
pub struct HashingEncoder {
    dimension: usize,
    max_length: usize,
}

impl fmt::Debug for HashingEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashingEncoder")
            .field("dimension", &self.dimension)
            .field("max_length", &self.max_length)
            .finish()
    }
}

impl HashingEncoder {
    pub fn new(dimension: usize, max_length: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            // room for [CLS] and [SEP]
            max_length: max_length.max(2),
        }
    }

    /// `[CLS] words.. [SEP] [PAD]..`, truncated and padded to `max_length`.
    pub fn encode_plus(&self, text: &str) -> Encoding {
        let mut input_ids = Vec::with_capacity(self.max_length);
        input_ids.push(CLS_ID);
        input_ids.extend(words(text).take(self.max_length - 2).map(token_id));
        input_ids.push(SEP_ID);

        let mut attention_mask = vec![1; input_ids.len()];
        input_ids.resize(self.max_length, PAD_ID);
        attention_mask.resize(self.max_length, 0);

        Encoding {
            input_ids,
            attention_mask,
        }
    }

    fn forward(&self, encoding: &Encoding) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for (&id, &mask) in encoding.input_ids.iter().zip(&encoding.attention_mask) {
            if mask == 1 && id >= FIRST_WORD_ID {
                vector[id as usize % self.dimension] += 1.0;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl TextEncoder for HashingEncoder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.forward(&self.encode_plus(text)))
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

// FNV-1a, stable across builds unlike std's hasher
fn token_id(word: String) -> u32 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    FIRST_WORD_ID + (hash % u64::from(VOCAB_SIZE - FIRST_WORD_ID)) as u32
}
