use fancy_regex::Regex;
use serde::{Deserialize, Serialize};

use super::ext::CharExt;
use super::utils::bytes_char;
use super::Offsets;
use crate::error::{Error, Result};

const WHITESPACE_PATTERN: &str = r"\w+|[^\w\s]+";
const GPT2_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// A word-like span handed to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub value: String,
    /// Byte range of the span in the normalized text.
    pub offsets: Offsets,
    byte_level: bool,
    prefix: usize,
}

impl Split {
    fn plain(value: &str, offsets: Offsets) -> Self {
        Self {
            value: value.to_owned(),
            offsets,
            byte_level: false,
            prefix: 0,
        }
    }

    /// The whole text as one span, for pipelines without a pre-tokenizer.
    pub(crate) fn whole(text: &str) -> Self {
        Self::plain(text, (0, text.len()))
    }

    /// Maps a byte range of `value` onto the normalized text.
    pub fn normalized_offsets(&self, (start, end): Offsets) -> Offsets {
        if !self.byte_level {
            return (self.offsets.0 + start, self.offsets.0 + end);
        }
        // one alphabet char per normalized byte, minus the injected space
        let to_normalized = |local: usize| {
            let chars = self
                .value
                .get(..local)
                .map_or(0, |head| head.chars().count());
            (self.offsets.0 + chars.saturating_sub(self.prefix)).min(self.offsets.1)
        };
        (to_normalized(start), to_normalized(end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PreTokenizerConfig {
    BertPreTokenizer,
    Whitespace,
    WhitespaceSplit,
    ByteLevel {
        #[serde(default)]
        add_prefix_space: bool,
        #[serde(default = "yes")]
        use_regex: bool,
    },
}

fn yes() -> bool {
    true
}

/// Splits normalized text into coarse spans on whitespace and punctuation.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "PreTokenizerConfig")]
pub struct PreTokenizer {
    config: PreTokenizerConfig,
    pattern: Option<Regex>,
}

impl TryFrom<PreTokenizerConfig> for PreTokenizer {
    type Error = Error;

    fn try_from(config: PreTokenizerConfig) -> Result<Self> {
        let pattern = match &config {
            PreTokenizerConfig::Whitespace => Some(Regex::new(WHITESPACE_PATTERN)?),
            PreTokenizerConfig::ByteLevel {
                use_regex: true, ..
            } => Some(Regex::new(GPT2_PATTERN)?),
            _ => None,
        };
        Ok(Self { config, pattern })
    }
}

impl PreTokenizer {
    pub fn config(&self) -> &PreTokenizerConfig {
        &self.config
    }

    pub fn is_byte_level(&self) -> bool {
        matches!(self.config, PreTokenizerConfig::ByteLevel { .. })
    }

    pub fn pre_tokenize(&self, text: &str) -> Result<Vec<Split>> {
        match &self.config {
            PreTokenizerConfig::BertPreTokenizer => Ok(split_bert(text)),
            PreTokenizerConfig::WhitespaceSplit => Ok(split_whitespace(text)),
            PreTokenizerConfig::Whitespace => self.split_pattern(text),
            PreTokenizerConfig::ByteLevel {
                add_prefix_space, ..
            } => {
                if text.is_empty() {
                    return Ok(Vec::new());
                }
                let prefixed = *add_prefix_space
                    && !text.chars().next().is_some_and(|c| c.is_whitespace());
                let shift = usize::from(prefixed);
                let work = if prefixed {
                    format!(" {text}")
                } else {
                    text.to_owned()
                };
                let alphabet = bytes_char();
                Ok(self
                    .split_pattern(&work)?
                    .into_iter()
                    .map(|span| {
                        let (start, end) = span.offsets;
                        Split {
                            value: span.value.bytes().map(|b| alphabet[b as usize]).collect(),
                            offsets: (start.saturating_sub(shift), end - shift),
                            byte_level: true,
                            prefix: usize::from(prefixed && start == 0),
                        }
                    })
                    .collect())
            }
        }
    }

    fn split_pattern(&self, text: &str) -> Result<Vec<Split>> {
        let Some(pattern) = &self.pattern else {
            return Ok(vec![Split::whole(text)]);
        };
        let mut splits = Vec::new();
        for found in pattern.find_iter(text) {
            let found = found.map_err(|err| Error::Encoding(err.to_string()))?;
            splits.push(Split::plain(
                found.as_str(),
                (found.start(), found.end()),
            ));
        }
        Ok(splits)
    }
}

/// Whitespace separates, each punctuation char stands alone.
fn split_bert(text: &str) -> Vec<Split> {
    let mut splits = Vec::new();
    let mut word_start = None;
    for (i, c) in text.char_indices() {
        if c.is_bert_whitespace() || c.is_bert_punctuation() {
            if let Some(start) = word_start.take() {
                splits.push(Split::plain(&text[start..i], (start, i)));
            }
            if c.is_bert_punctuation() {
                let end = i + c.len_utf8();
                splits.push(Split::plain(&text[i..end], (i, end)));
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        splits.push(Split::plain(&text[start..], (start, text.len())));
    }
    splits
}

fn split_whitespace(text: &str) -> Vec<Split> {
    let mut splits = Vec::new();
    let mut word_start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = word_start.take() {
                splits.push(Split::plain(&text[start..i], (start, i)));
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        splits.push(Split::plain(&text[start..], (start, text.len())));
    }
    splits
}
