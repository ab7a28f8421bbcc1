use std::borrow::Cow;
use std::collections::HashMap;
use std::slice;

use serde::{Deserialize, Serialize};

use super::TokenId;
use crate::encoding::Encoding;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceId {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplatePiece {
    Sequence { id: SequenceId, type_id: u32 },
    SpecialToken { id: String, type_id: u32 },
}

impl TemplatePiece {
    fn special(id: &str, type_id: u32) -> Self {
        TemplatePiece::SpecialToken {
            id: id.to_owned(),
            type_id,
        }
    }

    fn sequence(id: SequenceId, type_id: u32) -> Self {
        TemplatePiece::Sequence { id, type_id }
    }
}

/// One template name may expand to several ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialToken {
    pub id: String,
    pub ids: Vec<TokenId>,
    pub tokens: Vec<String>,
}

/// Inserts special tokens around the segmented input and assigns type ids.
/// Pure: (encodings, configuration) -> encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PostProcessor {
    /// `[CLS] A [SEP]` / `[CLS] A [SEP] B [SEP]`, B side with type id 1.
    BertProcessing {
        sep: (String, TokenId),
        cls: (String, TokenId),
    },
    /// `<s> A </s>` / `<s> A </s> </s> B </s>`, all type id 0.
    RobertaProcessing {
        sep: (String, TokenId),
        cls: (String, TokenId),
    },
    TemplateProcessing {
        single: Vec<TemplatePiece>,
        pair: Vec<TemplatePiece>,
        special_tokens: HashMap<String, SpecialToken>,
    },
}

impl PostProcessor {
    pub fn bert(cls: (&str, TokenId), sep: (&str, TokenId)) -> Self {
        PostProcessor::BertProcessing {
            sep: (sep.0.to_owned(), sep.1),
            cls: (cls.0.to_owned(), cls.1),
        }
    }

    /// Checks templates reference declared special tokens and each sequence
    /// exactly once.
    pub fn validate(&self) -> Result<()> {
        let PostProcessor::TemplateProcessing {
            single,
            pair,
            special_tokens,
        } = self
        else {
            return Ok(());
        };
        for (name, token) in special_tokens {
            if token.ids.len() != token.tokens.len() || token.ids.is_empty() {
                return Err(Error::invalid(format!(
                    "special token {name:?} needs as many ids as tokens"
                )));
            }
        }
        let check = |template: &[TemplatePiece], expected: &[SequenceId]| -> Result<()> {
            let mut seen = Vec::new();
            for piece in template {
                match piece {
                    TemplatePiece::Sequence { id, .. } => seen.push(*id),
                    TemplatePiece::SpecialToken { id, .. } => {
                        if !special_tokens.contains_key(id) {
                            return Err(Error::invalid(format!(
                                "template uses undeclared special token {id:?}"
                            )));
                        }
                    }
                }
            }
            seen.sort_by_key(|id| *id == SequenceId::B);
            if seen != expected {
                return Err(Error::invalid(format!(
                    "template must contain sequences {expected:?}, found {seen:?}"
                )));
            }
            Ok(())
        };
        check(single, &[SequenceId::A])?;
        check(pair, &[SequenceId::A, SequenceId::B])
    }

    fn template(&self, is_pair: bool) -> Cow<'_, [TemplatePiece]> {
        use SequenceId::{A, B};
        match self {
            PostProcessor::BertProcessing { sep, cls } => {
                let mut template = vec![
                    TemplatePiece::special(&cls.0, 0),
                    TemplatePiece::sequence(A, 0),
                    TemplatePiece::special(&sep.0, 0),
                ];
                if is_pair {
                    template.push(TemplatePiece::sequence(B, 1));
                    template.push(TemplatePiece::special(&sep.0, 1));
                }
                Cow::Owned(template)
            }
            PostProcessor::RobertaProcessing { sep, cls } => {
                let mut template = vec![
                    TemplatePiece::special(&cls.0, 0),
                    TemplatePiece::sequence(A, 0),
                    TemplatePiece::special(&sep.0, 0),
                ];
                if is_pair {
                    template.push(TemplatePiece::special(&sep.0, 0));
                    template.push(TemplatePiece::sequence(B, 0));
                    template.push(TemplatePiece::special(&sep.0, 0));
                }
                Cow::Owned(template)
            }
            PostProcessor::TemplateProcessing { single, pair, .. } => {
                Cow::Borrowed(if is_pair { pair.as_slice() } else { single.as_slice() })
            }
        }
    }

    fn special(&self, name: &str) -> Option<(&[TokenId], &[String])> {
        match self {
            PostProcessor::BertProcessing { sep, cls }
            | PostProcessor::RobertaProcessing { sep, cls } => [cls, sep]
                .into_iter()
                .find(|(token, _)| token == name)
                .map(|(token, id)| (slice::from_ref(id), slice::from_ref(token))),
            PostProcessor::TemplateProcessing { special_tokens, .. } => special_tokens
                .get(name)
                .map(|s| (s.ids.as_slice(), s.tokens.as_slice())),
        }
    }

    /// Every (token, id) this processor can insert.
    pub fn special_tokens(&self) -> Vec<(&str, TokenId)> {
        match self {
            PostProcessor::BertProcessing { sep, cls }
            | PostProcessor::RobertaProcessing { sep, cls } => {
                vec![(cls.0.as_str(), cls.1), (sep.0.as_str(), sep.1)]
            }
            PostProcessor::TemplateProcessing { special_tokens, .. } => special_tokens
                .values()
                .flat_map(|s| s.tokens.iter().map(String::as_str).zip(s.ids.iter().copied()))
                .collect(),
        }
    }

    /// How many positions `process` inserts.
    pub fn added_tokens(&self, is_pair: bool) -> usize {
        self.template(is_pair)
            .iter()
            .map(|piece| match piece {
                TemplatePiece::SpecialToken { id, .. } => {
                    self.special(id).map_or(0, |(ids, _)| ids.len())
                }
                TemplatePiece::Sequence { .. } => 0,
            })
            .sum()
    }

    pub fn process(
        &self,
        mut first: Encoding,
        mut second: Option<Encoding>,
        add_special_tokens: bool,
    ) -> Encoding {
        let first_overflow = first.take_overflowing();
        let second_overflow = second
            .as_mut()
            .map(Encoding::take_overflowing)
            .unwrap_or_default();

        let mut processed = self.apply(&first, second.as_ref(), add_special_tokens);

        let mut overflowing: Vec<Encoding> = first_overflow
            .iter()
            .map(|overflow| self.apply(overflow, second.as_ref(), add_special_tokens))
            .collect();
        overflowing.extend(
            second_overflow
                .iter()
                .map(|overflow| self.apply(&first, Some(overflow), add_special_tokens)),
        );
        processed.set_overflowing(overflowing);
        processed
    }

    fn apply(&self, first: &Encoding, second: Option<&Encoding>, add_special: bool) -> Encoding {
        let capacity = first.len()
            + second.map_or(0, Encoding::len)
            + self.added_tokens(second.is_some());
        let mut out = Encoding::with_capacity(capacity);
        if !add_special {
            out.extend_from(first, None);
            if let Some(second) = second {
                out.extend_from(second, None);
            }
            return out;
        }
        for piece in self.template(second.is_some()).iter() {
            match piece {
                TemplatePiece::Sequence { id, type_id } => {
                    let sequence = match id {
                        SequenceId::A => Some(first),
                        SequenceId::B => second,
                    };
                    if let Some(sequence) = sequence {
                        out.extend_from(sequence, Some(*type_id));
                    }
                }
                TemplatePiece::SpecialToken { id, type_id } => {
                    if let Some((ids, tokens)) = self.special(id) {
                        for (id, token) in ids.iter().zip(tokens) {
                            out.push_special(*id, token, *type_id);
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::Piece;

    fn words(words: &[&str], first_id: TokenId, type_id: u32) -> Encoding {
        let pieces = words
            .iter()
            .enumerate()
            .map(|(i, w)| Piece::new(first_id + i as TokenId, w.to_string(), (i, i + 1)))
            .collect();
        Encoding::from_pieces(pieces, type_id)
    }

    fn bert() -> PostProcessor {
        PostProcessor::bert(("[CLS]", 101), ("[SEP]", 102))
    }

    #[test]
    pub fn check_bert_single() {
        let out = bert().process(words(&["hello", "world"], 7, 0), None, true);
        assert_eq!(out.get_tokens(), ["[CLS]", "hello", "world", "[SEP]"]);
        assert_eq!(out.get_ids(), [101, 7, 8, 102]);
        assert_eq!(out.get_special_tokens_mask(), [1, 0, 0, 1]);
        assert_eq!(out.get_type_ids(), [0, 0, 0, 0]);
        assert_eq!(out.get_attention_mask(), [1, 1, 1, 1]);
        assert_eq!(bert().added_tokens(false), 2);
    }

    #[test]
    pub fn check_bert_pair() {
        let out = bert().process(words(&["a"], 1, 0), Some(words(&["b", "c"], 2, 1)), true);
        assert_eq!(out.get_tokens(), ["[CLS]", "a", "[SEP]", "b", "c", "[SEP]"]);
        assert_eq!(out.get_type_ids(), [0, 0, 0, 1, 1, 1]);
        assert_eq!(bert().added_tokens(true), 3);
    }

    #[test]
    pub fn check_without_special_tokens() {
        let out = bert().process(words(&["a"], 1, 0), Some(words(&["b"], 2, 1)), false);
        assert_eq!(out.get_tokens(), ["a", "b"]);
        assert_eq!(out.get_type_ids(), [0, 1]);
        assert_eq!(out.get_special_tokens_mask(), [0, 0]);
    }

    #[test]
    pub fn check_roberta_pair() {
        let roberta = PostProcessor::RobertaProcessing {
            sep: ("</s>".into(), 2),
            cls: ("<s>".into(), 0),
        };
        let out = roberta.process(words(&["a"], 5, 0), Some(words(&["b"], 6, 1)), true);
        assert_eq!(out.get_tokens(), ["<s>", "a", "</s>", "</s>", "b", "</s>"]);
        assert_eq!(out.get_type_ids(), [0; 6]);
        assert_eq!(roberta.added_tokens(true), 4);
    }

    #[test]
    pub fn check_template_from_json() {
        let processor: PostProcessor = serde_json::from_str(
            r#"{
                "type": "TemplateProcessing",
                "single": [{"SpecialToken": {"id": "<bos>", "type_id": 0}},
                           {"Sequence": {"id": "A", "type_id": 0}}],
                "pair": [{"SpecialToken": {"id": "<bos>", "type_id": 0}},
                         {"Sequence": {"id": "A", "type_id": 0}},
                         {"Sequence": {"id": "B", "type_id": 1}}],
                "special_tokens": {"<bos>": {"id": "<bos>", "ids": [1], "tokens": ["<bos>"]}}
            }"#,
        )
        .unwrap();
        processor.validate().unwrap();
        let out = processor.process(words(&["x", "y"], 4, 0), None, true);
        assert_eq!(out.get_tokens(), ["<bos>", "x", "y"]);
        assert_eq!(processor.added_tokens(false), 1);
    }

    #[test]
    pub fn rejects_undeclared_template_tokens() {
        let processor = PostProcessor::TemplateProcessing {
            single: vec![
                TemplatePiece::special("<cls>", 0),
                TemplatePiece::sequence(SequenceId::A, 0),
            ],
            pair: vec![
                TemplatePiece::sequence(SequenceId::A, 0),
                TemplatePiece::sequence(SequenceId::B, 1),
            ],
            special_tokens: HashMap::new(),
        };
        assert!(matches!(processor.validate(), Err(Error::InvalidFormat(_))));
    }

    #[test]
    pub fn check_overflow_is_processed() {
        let mut first = words(&["a", "b", "c"], 1, 0);
        first
            .truncate(2, 0, crate::encoding::TruncationDirection::Right)
            .unwrap();
        let out = bert().process(first, None, true);
        assert_eq!(out.get_tokens(), ["[CLS]", "a", "b", "[SEP]"]);
        assert_eq!(out.get_overflowing()[0].get_tokens(), ["[CLS]", "c", "[SEP]"]);
    }
}
