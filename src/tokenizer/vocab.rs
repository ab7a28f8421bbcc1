use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::tokenizer::{Token, TokenId};

/// Immutable two-way mapping between tokens and dense ids.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    tokens: Vec<Token>,
    ids: HashMap<Token, TokenId>,
}

impl Vocab {
    /// Builds the store from a token -> id map. Ids must cover `0..len`
    /// exactly once.
    pub fn from_map(map: HashMap<Token, TokenId>) -> Result<Self> {
        let mut slots: Vec<Option<Token>> = vec![None; map.len()];
        for (token, &id) in &map {
            let slot = slots.get_mut(id as usize).ok_or_else(|| {
                Error::invalid(format!(
                    "vocabulary id {id} for {token:?} is outside 0..{}",
                    map.len()
                ))
            })?;
            if let Some(previous) = slot.replace(token.clone()) {
                return Err(Error::invalid(format!(
                    "vocabulary id {id} is shared by {previous:?} and {token:?}"
                )));
            }
        }
        // every slot is filled: len(map) tokens landed in len(map) distinct slots
        let tokens = slots.into_iter().flatten().collect();
        Ok(Self { tokens, ids: map })
    }

    /// Builds the store from tokens listed in id order.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Token>,
    {
        let mut map = HashMap::new();
        for (id, token) in tokens.into_iter().enumerate() {
            let token = token.into();
            if map.insert(token.clone(), id as TokenId).is_some() {
                return Err(Error::invalid(format!("duplicate token {token:?}")));
            }
        }
        Self::from_map(map)
    }

    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.ids.get(token).copied()
    }

    pub fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get_vocab(&self) -> &HashMap<Token, TokenId> {
        &self.ids
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn map(entries: &[(&str, TokenId)]) -> HashMap<Token, TokenId> {
        entries.iter().map(|(t, i)| (t.to_string(), *i)).collect()
    }

    #[test]
    pub fn check_lookup_both_ways() {
        let vocab = Vocab::from_map(map(&[("[UNK]", 0), ("the", 1), ("##s", 2)])).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.token_to_id("the"), Some(1));
        assert_eq!(vocab.id_to_token(2), Some("##s"));
        assert_eq!(vocab.id_to_token(3), None);
    }

    #[test]
    pub fn rejects_sparse_ids() {
        let err = Vocab::from_map(map(&[("a", 0), ("b", 5)])).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    pub fn rejects_shared_ids() {
        let err = Vocab::from_map(map(&[("a", 0), ("b", 0)])).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }
}
