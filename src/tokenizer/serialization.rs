use std::collections::HashMap;

use serde::Deserialize;

use super::added::AddedToken;
use super::bpe::BpeModel;
use super::decoder::Decoder;
use super::normalizer::Normalizer;
use super::post_processor::PostProcessor;
use super::pre_tokenizer::PreTokenizer;
use super::wordpiece::{
    WordPiece, DEFAULT_CONTINUING_SUBWORD_PREFIX, DEFAULT_MAX_INPUT_CHARS_PER_WORD,
};
use super::{ModelWrapper, StringPair, Token, TokenId, Vocab};
use crate::encoding::{PaddingParams, TruncationParams};
use crate::error::{Error, Result};

/// On-disk tokenizer definition (`tokenizer.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenizerDefinition {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub truncation: Option<TruncationParams>,
    #[serde(default)]
    pub padding: Option<PaddingParams>,
    #[serde(default)]
    pub added_tokens: Vec<AddedToken>,
    #[serde(default)]
    pub normalizer: Option<Normalizer>,
    #[serde(default)]
    pub pre_tokenizer: Option<PreTokenizer>,
    pub model: ModelDefinition,
    #[serde(default)]
    pub post_processor: Option<PostProcessor>,
    #[serde(default)]
    pub decoder: Option<Decoder>,
}

fn default_unk() -> String {
    "[UNK]".to_owned()
}

fn default_prefix() -> String {
    DEFAULT_CONTINUING_SUBWORD_PREFIX.to_owned()
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS_PER_WORD
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ModelDefinition {
    WordPiece {
        vocab: HashMap<Token, TokenId>,
        #[serde(default = "default_unk")]
        unk_token: String,
        #[serde(default = "default_prefix")]
        continuing_subword_prefix: String,
        #[serde(default = "default_max_chars")]
        max_input_chars_per_word: usize,
    },
    #[serde(rename = "BPE")]
    Bpe {
        vocab: HashMap<Token, TokenId>,
        #[serde(default)]
        merges: Vec<Merge>,
        #[serde(default)]
        unk_token: Option<String>,
    },
}

/// Merge rules come either as `"a b"` or as `["a", "b"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Merge {
    Joined(String),
    Pair(String, String),
}

impl TryFrom<Merge> for StringPair {
    type Error = Error;

    fn try_from(merge: Merge) -> Result<Self> {
        match merge {
            Merge::Pair(left, right) => Ok((left, right)),
            Merge::Joined(joined) => joined
                .split_once(' ')
                .map(|(left, right)| (left.to_owned(), right.to_owned()))
                .ok_or_else(|| Error::invalid(format!("merge {joined:?} is not `left right`"))),
        }
    }
}

impl TryFrom<ModelDefinition> for ModelWrapper {
    type Error = Error;

    fn try_from(definition: ModelDefinition) -> Result<Self> {
        match definition {
            ModelDefinition::WordPiece {
                vocab,
                unk_token,
                continuing_subword_prefix,
                max_input_chars_per_word,
            } => Ok(ModelWrapper::WordPiece(WordPiece::new(
                Vocab::from_map(vocab)?,
                unk_token,
                continuing_subword_prefix,
                max_input_chars_per_word,
            )?)),
            ModelDefinition::Bpe {
                vocab,
                merges,
                unk_token,
            } => {
                let merges = merges
                    .into_iter()
                    .map(StringPair::try_from)
                    .collect::<Result<Vec<_>>>()?;
                Ok(ModelWrapper::Bpe(BpeModel::new(
                    Vocab::from_map(vocab)?,
                    merges,
                    unk_token,
                )?))
            }
        }
    }
}
