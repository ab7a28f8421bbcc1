use super::{Model, Piece, TokenId, Vocab};
use crate::error::{Error, Result};

pub const DEFAULT_CONTINUING_SUBWORD_PREFIX: &str = "##";
pub const DEFAULT_MAX_INPUT_CHARS_PER_WORD: usize = 100;

/// Greedy longest-match-first subword model. Pieces after the first in a
/// word carry the continuing-subword prefix; a word with any unmatched
/// remainder becomes a single unknown token.
#[derive(Debug, Clone)]
pub struct WordPiece {
    vocab: Vocab,
    unk_token: String,
    unk_id: TokenId,
    continuing_subword_prefix: String,
    max_input_chars_per_word: usize,
}

impl WordPiece {
    pub fn new(
        vocab: Vocab,
        unk_token: String,
        continuing_subword_prefix: String,
        max_input_chars_per_word: usize,
    ) -> Result<Self> {
        let unk_id = vocab.token_to_id(&unk_token).ok_or_else(|| {
            Error::invalid(format!("unk_token {unk_token:?} is not in the vocabulary"))
        })?;
        Ok(Self {
            vocab,
            unk_token,
            unk_id,
            continuing_subword_prefix,
            max_input_chars_per_word,
        })
    }

    pub fn continuing_subword_prefix(&self) -> &str {
        &self.continuing_subword_prefix
    }

    fn unknown(&self, word: &str) -> Vec<Piece> {
        vec![Piece::new(self.unk_id, self.unk_token.clone(), (0, word.len()))]
    }

    fn longest_match(&self, word: &str, start: usize) -> Option<Piece> {
        let mut end = word.len();
        while start < end {
            let candidate = if start > 0 {
                format!("{}{}", self.continuing_subword_prefix, &word[start..end])
            } else {
                word[start..end].to_owned()
            };
            if let Some(id) = self.vocab.token_to_id(&candidate) {
                return Some(Piece::new(id, candidate, (start, end)));
            }
            end = word[start..end]
                .char_indices()
                .next_back()
                .map_or(start, |(i, _)| start + i);
        }
        None
    }
}

impl Model for WordPiece {
    fn tokenize(&self, word: &str) -> Result<Vec<Piece>> {
        if word.chars().count() > self.max_input_chars_per_word {
            return Ok(self.unknown(word));
        }
        let mut pieces = Vec::new();
        let mut start = 0;
        while start < word.len() {
            match self.longest_match(word, start) {
                Some(piece) => {
                    start = piece.offsets.1;
                    pieces.push(piece);
                }
                None => return Ok(self.unknown(word)),
            }
        }
        Ok(pieces)
    }

    fn vocab(&self) -> &Vocab {
        &self.vocab
    }
}
