use std::collections::{HashMap, HashSet};

use aho_corasick::{AhoCorasick, MatchKind};
use derive_new::new;
use serde::{Deserialize, Serialize};

use super::{Offsets, TokenId, Vocab};
use crate::error::{Error, Result};

/// A token matched verbatim in the raw input and never split.
#[derive(new, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedToken {
    pub id: TokenId,
    pub content: String,
    #[serde(default)]
    pub special: bool,
}

/// A stretch of raw input: either plain text for the segmentation engine or
/// one added token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Text(Offsets),
    Added(TokenId, Offsets),
}

/// Added and special tokens layered over the model vocabulary. Ids either
/// repeat a model entry or extend the model's id range densely.
#[derive(Debug, Clone, Default)]
pub struct AddedVocabulary {
    tokens: Vec<AddedToken>,
    /// Pattern `i` is `tokens[i].content`.
    matcher: Option<AhoCorasick>,
    extra: HashMap<TokenId, String>,
    extra_ids: HashMap<String, TokenId>,
    special: HashSet<TokenId>,
}

impl AddedVocabulary {
    pub fn new(mut tokens: Vec<AddedToken>, model: &Vocab) -> Result<Self> {
        tokens.sort_by_key(|t| t.id);
        let mut added = Self::default();
        for token in &tokens {
            if token.content.is_empty() {
                return Err(Error::invalid(format!("added token {} is empty", token.id)));
            }
            if token.content.contains('\0') {
                return Err(Error::invalid(format!(
                    "added token {} contains a NUL byte",
                    token.id
                )));
            }
            if (token.id as usize) < model.len() {
                if model.id_to_token(token.id) != Some(token.content.as_str()) {
                    return Err(Error::invalid(format!(
                        "added token {:?} conflicts with vocabulary id {}",
                        token.content, token.id
                    )));
                }
            } else {
                let next = (model.len() + added.extra.len()) as TokenId;
                if token.id != next || model.contains(&token.content) {
                    return Err(Error::invalid(format!(
                        "added token {:?} has id {}, expected {next}",
                        token.content, token.id
                    )));
                }
                added.extra.insert(token.id, token.content.clone());
                added.extra_ids.insert(token.content.clone(), token.id);
            }
            if token.special {
                added.special.insert(token.id);
            }
        }
        if !tokens.is_empty() {
            let matcher = AhoCorasick::builder()
                .match_kind(MatchKind::LeftmostLongest)
                .build(tokens.iter().map(|t| t.content.as_str()))
                .map_err(|e| Error::invalid(format!("added tokens: {e}")))?;
            added.matcher = Some(matcher);
        }
        added.tokens = tokens;
        Ok(added)
    }

    pub fn is_special(&self, id: TokenId) -> bool {
        self.special.contains(&id)
    }

    /// Only ids beyond the model vocabulary live here.
    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.extra_ids.get(token).copied()
    }

    pub fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.extra.get(&id).map(String::as_str)
    }

    /// Number of ids beyond the model vocabulary.
    pub fn len(&self) -> usize {
        self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extra.is_empty()
    }

    pub fn tokens(&self) -> &[AddedToken] {
        &self.tokens
    }

    /// Cuts the raw input around every added token occurrence, leftmost
    /// first, longest on ties.
    pub fn split(&self, text: &str) -> Vec<Segment> {
        let Some(matcher) = &self.matcher else {
            return vec![Segment::Text((0, text.len()))];
        };
        let mut segments = Vec::new();
        let mut plain_start = 0;
        for m in matcher.find_iter(text) {
            if plain_start < m.start() {
                segments.push(Segment::Text((plain_start, m.start())));
            }
            let id = self.tokens[m.pattern().as_usize()].id;
            segments.push(Segment::Added(id, (m.start(), m.end())));
            plain_start = m.end();
        }
        if plain_start < text.len() {
            segments.push(Segment::Text((plain_start, text.len())));
        }
        segments
    }
}
