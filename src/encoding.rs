use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tokenizer::{Offsets, Piece, Token, TokenId};

/// Result of one `encode` call: parallel per-token sequences of equal length.
///
/// Every accessor returns the whole field; a field that was never filled in
/// reads as an empty slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Encoding {
    ids: Vec<TokenId>,
    type_ids: Vec<u32>,
    tokens: Vec<Token>,
    offsets: Vec<Offsets>,
    special_tokens_mask: Vec<u32>,
    attention_mask: Vec<u32>,
    overflowing: Vec<Encoding>,
}

impl Encoding {
    pub(crate) fn from_pieces(pieces: Vec<Piece>, type_id: u32) -> Self {
        let mut encoding = Self::with_capacity(pieces.len());
        for piece in pieces {
            encoding.push(piece.id, piece.value, piece.offsets, type_id, false);
        }
        encoding
    }

    pub(crate) fn with_capacity(len: usize) -> Self {
        Self {
            ids: Vec::with_capacity(len),
            type_ids: Vec::with_capacity(len),
            tokens: Vec::with_capacity(len),
            offsets: Vec::with_capacity(len),
            special_tokens_mask: Vec::with_capacity(len),
            attention_mask: Vec::with_capacity(len),
            overflowing: Vec::new(),
        }
    }

    pub(crate) fn push(
        &mut self,
        id: TokenId,
        token: Token,
        offsets: Offsets,
        type_id: u32,
        special: bool,
    ) {
        self.ids.push(id);
        self.tokens.push(token);
        self.offsets.push(offsets);
        self.type_ids.push(type_id);
        self.special_tokens_mask.push(u32::from(special));
        self.attention_mask.push(1);
    }

    /// Appends a special token, which points at no input text.
    pub(crate) fn push_special(&mut self, id: TokenId, token: &str, type_id: u32) {
        self.push(id, token.to_owned(), (0, 0), type_id, true);
    }

    /// Appends every position of `other`, overriding its type ids when asked.
    pub(crate) fn extend_from(&mut self, other: &Encoding, type_id: Option<u32>) {
        self.ids.extend_from_slice(&other.ids);
        self.tokens.extend_from_slice(&other.tokens);
        self.offsets.extend_from_slice(&other.offsets);
        match type_id {
            Some(type_id) => self
                .type_ids
                .extend(std::iter::repeat(type_id).take(other.len())),
            None => self.type_ids.extend_from_slice(&other.type_ids),
        }
        self.special_tokens_mask
            .extend_from_slice(&other.special_tokens_mask);
        self.attention_mask.extend_from_slice(&other.attention_mask);
    }

    pub(crate) fn set_overflowing(&mut self, overflowing: Vec<Encoding>) {
        self.overflowing = overflowing;
    }

    pub(crate) fn take_overflowing(&mut self) -> Vec<Encoding> {
        std::mem::take(&mut self.overflowing)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get_ids(&self) -> &[TokenId] {
        &self.ids
    }

    pub fn get_tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn get_type_ids(&self) -> &[u32] {
        &self.type_ids
    }

    pub fn get_special_tokens_mask(&self) -> &[u32] {
        &self.special_tokens_mask
    }

    pub fn get_attention_mask(&self) -> &[u32] {
        &self.attention_mask
    }

    /// Byte offsets into the original input; `(0, 0)` for special tokens and
    /// padding.
    pub fn get_offsets(&self) -> &[Offsets] {
        &self.offsets
    }

    /// Windows cut off by truncation, in input order.
    pub fn get_overflowing(&self) -> &[Encoding] {
        &self.overflowing
    }

    fn slice(&self, start: usize, end: usize) -> Encoding {
        Encoding {
            ids: self.ids[start..end].to_vec(),
            type_ids: self.type_ids[start..end].to_vec(),
            tokens: self.tokens[start..end].to_vec(),
            offsets: self.offsets[start..end].to_vec(),
            special_tokens_mask: self.special_tokens_mask[start..end].to_vec(),
            attention_mask: self.attention_mask[start..end].to_vec(),
            overflowing: Vec::new(),
        }
    }

    /// Keeps at most `max_length` positions. What is cut off becomes
    /// overflowing windows of the same size that overlap by `stride`.
    pub fn truncate(
        &mut self,
        max_length: usize,
        stride: usize,
        direction: TruncationDirection,
    ) -> Result<()> {
        let len = self.len();
        if len <= max_length {
            return Ok(());
        }
        if max_length == 0 {
            let whole = std::mem::take(self);
            self.overflowing = vec![whole];
            return Ok(());
        }
        if stride >= max_length {
            return Err(Error::Encoding(format!(
                "truncation stride {stride} must be smaller than max_length {max_length}"
            )));
        }
        let step = max_length - stride;
        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + max_length).min(len);
            windows.push((start, end));
            if end == len {
                break;
            }
            start += step;
        }
        let mut parts: Vec<Encoding> = match direction {
            TruncationDirection::Right => windows
                .iter()
                .map(|&(start, end)| self.slice(start, end))
                .collect(),
            TruncationDirection::Left => windows
                .iter()
                .map(|&(start, end)| self.slice(len - end, len - start))
                .collect(),
        };
        let mut kept = parts.remove(0);
        kept.overflowing = parts;
        *self = kept;
        Ok(())
    }

    /// Pads up to `target` positions. Padding has attention 0 and counts as
    /// special.
    pub fn pad(&mut self, target: usize, params: &PaddingParams) {
        for overflow in &mut self.overflowing {
            overflow.pad(target, params);
        }
        let missing = target.saturating_sub(self.len());
        if missing == 0 {
            return;
        }
        let mut padding = Encoding::with_capacity(missing);
        for _ in 0..missing {
            padding.push(params.pad_id, params.pad_token.clone(), (0, 0), params.pad_type_id, true);
        }
        padding.attention_mask.iter_mut().for_each(|a| *a = 0);
        match params.direction {
            PaddingDirection::Right => self.extend_from(&padding, None),
            PaddingDirection::Left => {
                let overflowing = self.take_overflowing();
                padding.extend_from(self, None);
                *self = padding;
                self.overflowing = overflowing;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruncationDirection {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruncationStrategy {
    #[default]
    LongestFirst,
    OnlyFirst,
    OnlySecond,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationParams {
    pub max_length: usize,
    #[serde(default)]
    pub stride: usize,
    #[serde(default)]
    pub strategy: TruncationStrategy,
    #[serde(default)]
    pub direction: TruncationDirection,
}

impl TruncationParams {
    /// Truncates a single sequence or a pair so that, together with
    /// `reserved` special tokens, nothing exceeds `max_length`.
    pub(crate) fn apply(
        &self,
        first: &mut Encoding,
        second: Option<&mut Encoding>,
        reserved: usize,
    ) -> Result<()> {
        let input = first.len() + second.as_ref().map_or(0, |s| s.len());
        if reserved >= self.max_length && input > 0 {
            return Err(Error::Encoding(format!(
                "max_length {} leaves no room beside {reserved} special tokens",
                self.max_length
            )));
        }
        let budget = self.max_length.saturating_sub(reserved);
        let Some(second) = second else {
            return first.truncate(budget, self.stride, self.direction);
        };
        let total = first.len() + second.len();
        if total <= budget {
            return Ok(());
        }
        let excess = total - budget;
        match self.strategy {
            TruncationStrategy::LongestFirst => {
                let (mut a, mut b) = (first.len(), second.len());
                for _ in 0..excess {
                    if a >= b {
                        a -= 1;
                    } else {
                        b -= 1;
                    }
                }
                first.truncate(a, 0, self.direction)?;
                second.truncate(b, 0, self.direction)?;
            }
            TruncationStrategy::OnlyFirst | TruncationStrategy::OnlySecond => {
                let target = if self.strategy == TruncationStrategy::OnlyFirst {
                    first
                } else {
                    second
                };
                if target.len() < excess {
                    return Err(Error::Encoding(format!(
                        "cannot drop {excess} tokens from a sequence of {}",
                        target.len()
                    )));
                }
                let keep = target.len() - excess;
                target.truncate(keep, self.stride.min(keep.saturating_sub(1)), self.direction)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingDirection {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingStrategy {
    #[default]
    BatchLongest,
    Fixed(usize),
}

fn pad_token() -> String {
    "[PAD]".to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddingParams {
    #[serde(default)]
    pub strategy: PaddingStrategy,
    #[serde(default)]
    pub direction: PaddingDirection,
    #[serde(default)]
    pub pad_to_multiple_of: Option<usize>,
    #[serde(default)]
    pub pad_id: TokenId,
    #[serde(default)]
    pub pad_type_id: u32,
    #[serde(default = "pad_token")]
    pub pad_token: String,
}

impl Default for PaddingParams {
    fn default() -> Self {
        Self {
            strategy: PaddingStrategy::default(),
            direction: PaddingDirection::default(),
            pad_to_multiple_of: None,
            pad_id: 0,
            pad_type_id: 0,
            pad_token: pad_token(),
        }
    }
}

impl PaddingParams {
    /// Pads every encoding to the fixed length, or to the longest one.
    pub(crate) fn apply(&self, encodings: &mut [Encoding]) {
        let longest = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        let mut target = match self.strategy {
            PaddingStrategy::Fixed(len) => len,
            PaddingStrategy::BatchLongest => longest,
        };
        if let Some(multiple) = self.pad_to_multiple_of.filter(|m| *m > 0) {
            target = target.div_ceil(multiple) * multiple;
        }
        for encoding in encodings {
            encoding.pad(target, self);
        }
    }
}
