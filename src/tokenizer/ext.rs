use extend::ext;

/// Character classes used by the normalizers and pre-tokenizers.
#[ext(pub(crate), name = CharExt)]
impl char {
    fn is_bert_whitespace(&self) -> bool {
        matches!(*self, ' ' | '\t' | '\n' | '\r') || self.is_whitespace()
    }

    /// Control characters, except the whitespace ones BERT keeps.
    fn is_bert_control(&self) -> bool {
        if matches!(*self, '\t' | '\n' | '\r') {
            return false;
        }
        self.is_control() || matches!(*self as u32, 0x200B..=0x200F | 0xFEFF)
    }

    /// ASCII non-alphanumerics count as punctuation even where Unicode
    /// calls them symbols (`$`, `^`, `` ` ``).
    fn is_bert_punctuation(&self) -> bool {
        if self.is_ascii() {
            return self.is_ascii_punctuation();
        }
        matches!(
            *self as u32,
            0x00A1 | 0x00A7 | 0x00AB | 0x00B6 | 0x00B7 | 0x00BB | 0x00BF
                | 0x2010..=0x2027
                | 0x2030..=0x205E
                | 0x3001..=0x3003
                | 0x3008..=0x3011
                | 0x3014..=0x301F
                | 0xFF01..=0xFF0F
                | 0xFF1A..=0xFF20
                | 0xFF3B..=0xFF40
                | 0xFF5B..=0xFF65
        )
    }

    /// CJK ideographs, which BERT isolates as single-character words.
    fn is_chinese_char(&self) -> bool {
        matches!(
            *self as u32,
            0x4E00..=0x9FFF
                | 0x3400..=0x4DBF
                | 0x20000..=0x2A6DF
                | 0x2A700..=0x2B73F
                | 0x2B740..=0x2B81F
                | 0x2B820..=0x2CEAF
                | 0xF900..=0xFAFF
                | 0x2F800..=0x2FA1F
        )
    }

    fn is_combining_mark(&self) -> bool {
        unicode_normalization::char::is_combining_mark(*self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn check_punctuation() {
        assert!('.'.is_bert_punctuation());
        assert!('$'.is_bert_punctuation());
        assert!('¿'.is_bert_punctuation());
        assert!('—'.is_bert_punctuation());
        assert!(!'a'.is_bert_punctuation());
        assert!(!'é'.is_bert_punctuation());
    }

    #[test]
    pub fn check_control_and_whitespace() {
        assert!('\u{0}'.is_bert_control());
        assert!(!'\n'.is_bert_control());
        assert!('\n'.is_bert_whitespace());
        assert!('\u{3000}'.is_bert_whitespace());
    }

    #[test]
    pub fn check_cjk() {
        assert!('中'.is_chinese_char());
        assert!(!'a'.is_chinese_char());
        assert!('\u{301}'.is_combining_mark());
    }
}
