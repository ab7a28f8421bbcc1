use serde::{Deserialize, Serialize};

use super::utils::char_bytes;
use super::wordpiece::DEFAULT_CONTINUING_SUBWORD_PREFIX;
use super::Token;

fn default_prefix() -> String {
    DEFAULT_CONTINUING_SUBWORD_PREFIX.to_owned()
}

fn default_suffix() -> String {
    "</w>".to_owned()
}

fn yes() -> bool {
    true
}

/// Turns token strings back into text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Decoder {
    /// Glues `##` continuations onto the previous piece, spaces elsewhere.
    WordPiece {
        #[serde(default = "default_prefix")]
        prefix: String,
        #[serde(default = "yes")]
        cleanup: bool,
    },
    /// Maps the byte alphabet back to bytes.
    ByteLevel,
    #[serde(rename = "BPEDecoder")]
    Bpe {
        #[serde(default = "default_suffix")]
        suffix: String,
    },
}

impl Decoder {
    pub fn decode(&self, tokens: &[Token]) -> String {
        match self {
            Decoder::WordPiece { prefix, cleanup } => {
                let mut text = String::new();
                for (i, token) in tokens.iter().enumerate() {
                    match token.strip_prefix(prefix.as_str()) {
                        Some(rest) if i > 0 => text.push_str(rest),
                        _ => {
                            if i > 0 {
                                text.push(' ');
                            }
                            text.push_str(token);
                        }
                    }
                }
                if *cleanup {
                    cleanup_spacing(&text)
                } else {
                    text
                }
            }
            Decoder::ByteLevel => {
                let alphabet = char_bytes();
                let mut bytes = Vec::new();
                let mut buf = [0u8; 4];
                for c in tokens.iter().flat_map(|t| t.chars()) {
                    match alphabet.get(&c) {
                        Some(byte) => bytes.push(*byte),
                        None => bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
                    }
                }
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Decoder::Bpe { suffix } => {
                let last = tokens.len().saturating_sub(1);
                tokens
                    .iter()
                    .enumerate()
                    .map(|(i, token)| token.replace(suffix.as_str(), if i == last { "" } else { " " }))
                    .collect()
            }
        }
    }
}

/// Removes the spaces word-level joining puts before punctuation and
/// English contractions.
pub fn cleanup_spacing(text: &str) -> String {
    text.replace(" .", ".")
        .replace(" ?", "?")
        .replace(" !", "!")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokens(list: &[&str]) -> Vec<Token> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    pub fn check_wordpiece() {
        let decoder = Decoder::WordPiece {
            prefix: "##".into(),
            cleanup: true,
        };
        let text = decoder.decode(&tokens(&["the", "un", "##aff", "##able", "dog", "."]));
        assert_eq!(text, "the unaffable dog.");
        let text = decoder.decode(&tokens(&["it", "isn", "'", "t", "?"]));
        assert_eq!(text, "it isn't?");
    }

    #[test]
    pub fn check_leading_continuation_is_kept() {
        let decoder = Decoder::WordPiece {
            prefix: "##".into(),
            cleanup: false,
        };
        assert_eq!(decoder.decode(&tokens(&["##s", "a"])), "##s a");
    }

    #[test]
    pub fn check_byte_level() {
        let text = Decoder::ByteLevel.decode(&tokens(&["Hello", "Ġw", "orld", "ĠÃ©"]));
        assert_eq!(text, "Hello world é");
    }

    #[test]
    pub fn check_bpe_suffix() {
        let decoder = Decoder::Bpe {
            suffix: "</w>".into(),
        };
        assert_eq!(decoder.decode(&tokens(&["hel", "lo</w>", "there</w>"])), "hello there");
    }

    #[test]
    pub fn check_deserialize_defaults() {
        let decoder: Decoder = serde_json::from_str(r#"{"type":"WordPiece"}"#).unwrap();
        assert_eq!(
            decoder,
            Decoder::WordPiece {
                prefix: "##".into(),
                cleanup: true
            }
        );
    }
}
