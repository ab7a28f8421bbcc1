use std::sync::OnceLock;

use rustc_hash::FxHashMap;

static BYTES_CHAR: OnceLock<[char; 256]> = OnceLock::new();
static CHAR_BYTES: OnceLock<FxHashMap<char, u8>> = OnceLock::new();

/// GPT-2 byte alphabet: every byte maps to a printable char so byte-level
/// tokens stay valid strings. Printable Latin-1 bytes map to themselves,
/// the rest are shifted past U+0100.
pub fn bytes_char() -> &'static [char; 256] {
    BYTES_CHAR.get_or_init(build_bytes_char)
}

/// Inverse of [`bytes_char`].
pub fn char_bytes() -> &'static FxHashMap<char, u8> {
    CHAR_BYTES.get_or_init(|| {
        bytes_char()
            .iter()
            .enumerate()
            .map(|(byte, c)| (*c, byte as u8))
            .collect()
    })
}

fn build_bytes_char() -> [char; 256] {
    let mut table = ['\0'; 256];
    let mut shift = 0u32;
    for byte in 0..=255u8 {
        let printable = matches!(byte, b'!'..=b'~' | 0xA1..=0xAC | 0xAE..=0xFF);
        table[byte as usize] = if printable {
            byte as char
        } else {
            let c = char::from_u32(256 + shift).unwrap_or('\u{FFFD}');
            shift += 1;
            c
        };
    }
    table
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn check_alphabet() {
        let table = bytes_char();
        assert_eq!(table[b' ' as usize], 'Ġ');
        assert_eq!(table[b'\n' as usize], 'Ċ');
        assert_eq!(table[b'a' as usize], 'a');
        assert_eq!(char_bytes().len(), 256);
    }

    #[test]
    pub fn check_tables_are_built_once() {
        assert!(std::ptr::eq(bytes_char(), bytes_char()));
        assert!(std::ptr::eq(char_bytes(), char_bytes()));
        assert_eq!(char_bytes()[&'Ġ'], b' ');
    }
}
