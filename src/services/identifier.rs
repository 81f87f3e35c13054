use rand::Rng;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;

/// Characters random short codes are drawn from
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const DEFAULT_CODE_LENGTH: usize = 6;
pub const WORD_SEPARATOR: &str = "-";
pub const DEFAULT_WORD_COUNT: usize = 3;

/// Attempts at the configured strategy before falling back to a longer random code
pub const MAX_CODE_ATTEMPTS: usize = 10;
/// Extra characters added to the random fallback once attempts are exhausted
pub const FALLBACK_EXTRA_LENGTH: usize = 4;

/// Source of candidate short codes. Uniqueness is checked by the caller.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;

    /// `count` words drawn with replacement, joined by [`WORD_SEPARATOR`].
    /// A `count` of zero still yields one word so the code is never empty.
    /// Falls back to a random code when `words` is empty.
    fn generate_from_words(&self, words: &[String], count: usize) -> String;
}

/// Generator backed by the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = OsRng;
        (0..length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    fn generate_from_words(&self, words: &[String], count: usize) -> String {
        if words.is_empty() {
            return self.generate(DEFAULT_CODE_LENGTH);
        }

        let mut rng = OsRng;
        (0..count.max(1))
            .filter_map(|_| words.choose(&mut rng).map(String::as_str))
            .collect::<Vec<_>>()
            .join(WORD_SEPARATOR)
    }
}

/// How a user's codes are shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeStrategy {
    Random { length: usize },
    Words { words: Vec<String>, count: usize },
}

impl CodeStrategy {
    /// Word codes only apply when the user opted in and supplied at least one word.
    pub fn for_user(use_words: bool, words: Vec<String>, length: usize) -> Self {
        if use_words && !words.is_empty() {
            Self::Words {
                words,
                count: DEFAULT_WORD_COUNT,
            }
        } else {
            Self::Random { length }
        }
    }

    fn base_length(&self) -> usize {
        match self {
            Self::Random { length } => *length,
            Self::Words { .. } => DEFAULT_CODE_LENGTH,
        }
    }
}

/// Produce the candidate for a given attempt number.
///
/// Attempts below [`MAX_CODE_ATTEMPTS`] follow the strategy; later attempts use a
/// longer random code so a crowded code space cannot stall allocation.
pub fn candidate(generator: &dyn CodeGenerator, strategy: &CodeStrategy, attempt: usize) -> String {
    if attempt >= MAX_CODE_ATTEMPTS {
        return generator.generate(strategy.base_length() + FALLBACK_EXTRA_LENGTH);
    }

    match strategy {
        CodeStrategy::Random { length } => generator.generate(*length),
        CodeStrategy::Words { words, count } => generator.generate_from_words(words, *count),
    }
}
