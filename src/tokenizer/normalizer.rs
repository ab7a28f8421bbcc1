use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::ext::CharExt;
use super::Offsets;

/// Text being normalized, remembering for every byte the span of the
/// original input it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedString {
    normalized: String,
    alignments: Vec<Offsets>,
    base: usize,
}

impl NormalizedString {
    /// `base` is where `original` starts inside the full input text.
    pub fn new(original: &str, base: usize) -> Self {
        let alignments = original
            .char_indices()
            .flat_map(|(i, c)| {
                let span = (base + i, base + i + c.len_utf8());
                std::iter::repeat(span).take(c.len_utf8())
            })
            .collect();
        Self {
            normalized: original.to_owned(),
            alignments,
            base,
        }
    }

    pub fn get(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Maps a byte range of the normalized text back onto the original input.
    pub fn original_offsets(&self, (start, end): Offsets) -> Offsets {
        if start >= end {
            let at = self
                .alignments
                .get(start)
                .map(|a| a.0)
                .or_else(|| self.alignments.last().map(|a| a.1))
                .unwrap_or(self.base);
            return (at, at);
        }
        match (self.alignments.get(start), self.alignments.get(end - 1)) {
            (Some(first), Some(last)) => (first.0, last.1),
            _ => {
                let at = self.alignments.last().map_or(self.base, |a| a.1);
                (at, at)
            }
        }
    }

    pub fn lowercase(&mut self) {
        self.rewrite(false, |unit, out| {
            out.extend(unit.chars().flat_map(char::to_lowercase))
        });
    }

    pub fn nfd(&mut self) {
        self.rewrite(false, |unit, out| out.extend(unit.nfd()));
    }

    pub fn nfkd(&mut self) {
        self.rewrite(false, |unit, out| out.extend(unit.nfkd()));
    }

    pub fn nfc(&mut self) {
        self.rewrite(true, |unit, out| out.extend(unit.nfc()));
    }

    pub fn nfkc(&mut self) {
        self.rewrite(true, |unit, out| out.extend(unit.nfkc()));
    }

    pub fn filter(&mut self, keep: impl Fn(char) -> bool) {
        self.rewrite(false, |unit, out| out.extend(unit.chars().filter(|c| keep(*c))));
    }

    pub fn strip_accents(&mut self) {
        self.nfd();
        self.filter(|c| !c.is_combining_mark());
    }

    fn clean_text(&mut self) {
        self.rewrite(false, |unit, out| {
            for c in unit.chars() {
                if c == '\0' || c == '\u{FFFD}' || c.is_bert_control() {
                    continue;
                }
                out.push(if c.is_bert_whitespace() { ' ' } else { c });
            }
        });
    }

    fn pad_chinese_chars(&mut self) {
        self.rewrite(false, |unit, out| {
            for c in unit.chars() {
                if c.is_chinese_char() {
                    out.push(' ');
                    out.push(c);
                    out.push(' ');
                } else {
                    out.push(c);
                }
            }
        });
    }

    /// Rebuilds the text unit by unit. A unit is one char, or with
    /// `clusters` one char plus the combining marks that follow it. All
    /// bytes written for a unit align to that unit's original span.
    fn rewrite<F>(&mut self, clusters: bool, mut f: F)
    where
        F: FnMut(&str, &mut String),
    {
        let mut normalized = String::with_capacity(self.normalized.len());
        let mut alignments = Vec::with_capacity(self.alignments.len());
        let mut buf = String::new();
        for (start, end) in self.units(clusters) {
            buf.clear();
            f(&self.normalized[start..end], &mut buf);
            let span = (self.alignments[start].0, self.alignments[end - 1].1);
            normalized.push_str(&buf);
            alignments.extend(std::iter::repeat(span).take(buf.len()));
        }
        self.normalized = normalized;
        self.alignments = alignments;
    }

    fn units(&self, clusters: bool) -> Vec<(usize, usize)> {
        let mut units: Vec<(usize, usize)> = Vec::new();
        for (i, c) in self.normalized.char_indices() {
            let end = i + c.len_utf8();
            match units.last_mut() {
                Some(last) if clusters && c.is_combining_mark() => last.1 = end,
                _ => units.push((i, end)),
            }
        }
        units
    }
}

fn yes() -> bool {
    true
}

/// Normalization policy applied before pre-tokenization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Normalizer {
    BertNormalizer {
        #[serde(default = "yes")]
        clean_text: bool,
        #[serde(default = "yes")]
        handle_chinese_chars: bool,
        /// Follows `lowercase` when unset.
        #[serde(default)]
        strip_accents: Option<bool>,
        #[serde(default = "yes")]
        lowercase: bool,
    },
    Lowercase,
    StripAccents,
    #[serde(rename = "NFC")]
    Nfc,
    #[serde(rename = "NFD")]
    Nfd,
    #[serde(rename = "NFKC")]
    Nfkc,
    #[serde(rename = "NFKD")]
    Nfkd,
    Sequence {
        normalizers: Vec<Normalizer>,
    },
}

impl Normalizer {
    pub fn normalize(&self, text: &mut NormalizedString) {
        match self {
            Normalizer::BertNormalizer {
                clean_text,
                handle_chinese_chars,
                strip_accents,
                lowercase,
            } => {
                if *clean_text {
                    text.clean_text();
                }
                if *handle_chinese_chars {
                    text.pad_chinese_chars();
                }
                if strip_accents.unwrap_or(*lowercase) {
                    text.strip_accents();
                }
                if *lowercase {
                    text.lowercase();
                }
            }
            Normalizer::Lowercase => text.lowercase(),
            Normalizer::StripAccents => text.strip_accents(),
            Normalizer::Nfc => text.nfc(),
            Normalizer::Nfd => text.nfd(),
            Normalizer::Nfkc => text.nfkc(),
            Normalizer::Nfkd => text.nfkd(),
            Normalizer::Sequence { normalizers } => {
                for normalizer in normalizers {
                    normalizer.normalize(text);
                }
            }
        }
    }
}
