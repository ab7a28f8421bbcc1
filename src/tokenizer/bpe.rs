use rustc_hash::FxHashMap;

use super::{Model, Piece, StringPair, TokenId, Vocab};
use crate::error::{Error, Result};

/// Merge-based subword model: a word starts as single characters and the
/// adjacent pair with the best (lowest) merge rank is fused until no rule
/// applies.
#[derive(Debug, Clone)]
pub struct BpeModel {
    vocab: Vocab,
    /// (left, right) -> (rank, merged id)
    merges: FxHashMap<(TokenId, TokenId), (usize, TokenId)>,
    unk: Option<(String, TokenId)>,
}

impl BpeModel {
    pub fn new(vocab: Vocab, merges: Vec<StringPair>, unk_token: Option<String>) -> Result<Self> {
        let lookup = |token: &str| {
            vocab.token_to_id(token).ok_or_else(|| {
                Error::invalid(format!("merge refers to unknown token {token:?}"))
            })
        };
        let mut ranks = FxHashMap::with_capacity_and_hasher(merges.len(), Default::default());
        for (rank, (left, right)) in merges.iter().enumerate() {
            let pair = (lookup(left)?, lookup(right)?);
            let merged = lookup(&format!("{left}{right}"))?;
            ranks.entry(pair).or_insert((rank, merged));
        }
        let unk = match unk_token {
            Some(token) => {
                let id = vocab.token_to_id(&token).ok_or_else(|| {
                    Error::invalid(format!("unk_token {token:?} is not in the vocabulary"))
                })?;
                Some((token, id))
            }
            None => None,
        };
        Ok(Self {
            vocab,
            merges: ranks,
            unk,
        })
    }

    pub fn num_merges(&self) -> usize {
        self.merges.len()
    }

    fn initial_symbols(&self, word: &str) -> Result<Vec<(TokenId, (usize, usize))>> {
        let mut buf = [0u8; 4];
        word.char_indices()
            .map(|(i, c)| {
                let span = (i, i + c.len_utf8());
                match (self.vocab.token_to_id(c.encode_utf8(&mut buf)), &self.unk) {
                    (Some(id), _) => Ok((id, span)),
                    (None, Some((_, unk_id))) => Ok((*unk_id, span)),
                    (None, None) => Err(Error::Encoding(format!(
                        "character {c:?} is not in the vocabulary and no unk_token is set"
                    ))),
                }
            })
            .collect()
    }
}

impl Model for BpeModel {
    fn tokenize(&self, word: &str) -> Result<Vec<Piece>> {
        let mut symbols = self.initial_symbols(word)?;
        loop {
            let best = symbols
                .windows(2)
                .enumerate()
                .filter_map(|(at, pair)| {
                    self.merges
                        .get(&(pair[0].0, pair[1].0))
                        .map(|&(rank, merged)| (rank, at, merged))
                })
                .min();
            let Some((_, at, merged)) = best else {
                break;
            };
            let right = symbols.remove(at + 1);
            symbols[at] = (merged, (symbols[at].1 .0, right.1 .1));
        }
        symbols
            .into_iter()
            .map(|(id, offsets)| {
                let value = self
                    .vocab
                    .id_to_token(id)
                    .ok_or(Error::UnknownId(id))?
                    .to_owned();
                Ok(Piece::new(id, value, offsets))
            })
            .collect()
    }

    fn vocab(&self) -> &Vocab {
        &self.vocab
    }
}
