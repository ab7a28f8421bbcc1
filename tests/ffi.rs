use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;

use anyhow::Result;
use ctokenizers::ffi::*;

fn fixture(name: &str) -> CString {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    CString::new(path.to_string_lossy().into_owned()).unwrap()
}

unsafe fn u32s(array: *mut u32, length: usize) -> Vec<u32> {
    let values = std::slice::from_raw_parts(array, length).to_vec();
    free_u32_array(array, length);
    values
}

unsafe fn tokens(encoding: *const EncodingHandle) -> Vec<String> {
    let mut length = 0;
    let array = encoding_get_tokens(encoding, &mut length);
    let tokens = std::slice::from_raw_parts(array, length)
        .iter()
        .map(|&token| CStr::from_ptr(token).to_string_lossy().into_owned())
        .collect();
    free_c_char_array(array, length);
    tokens
}

#[test]
fn encode_and_decode_through_handles() -> Result<()> {
    unsafe {
        let mut tokenizer = tokenizer_from_file(fixture("wordpiece.json").as_ptr());
        assert!(!tokenizer.is_null());

        let text = CString::new("The quick brown fox jumps over the lazy dog.")?;
        let mut encoding = tokenizer_encode(tokenizer, text.as_ptr(), true);
        assert!(!encoding.is_null());
        let length = encoding_get_length(encoding);
        assert_eq!(length, 12);

        let mut n = 0;
        let ids = encoding_get_ids(encoding, &mut n);
        assert_eq!(n, length);
        let type_ids = u32s(encoding_get_type_ids(encoding, &mut n), n);
        let special = u32s(encoding_get_special_tokens_mask(encoding, &mut n), n);
        let attention = u32s(encoding_get_attention_mask(encoding, &mut n), n);
        assert_eq!(type_ids, vec![0; length]);
        assert_eq!(special.first(), Some(&1));
        assert_eq!(special.last(), Some(&1));
        assert_eq!(special.iter().sum::<u32>(), 2);
        assert_eq!(attention, vec![1; length]);
        assert_eq!(tokens(encoding)[1], "The");

        // buffers are independent of the encoding
        encoding_release(&mut encoding);
        let decoded = tokenizer_decode(tokenizer, ids, length, true);
        assert_eq!(
            CStr::from_ptr(decoded).to_str()?,
            "The quick brown fox jumps over the lazy dog."
        );
        free_rstring(decoded);
        free_u32_array(ids, length);

        tokenizer_release(&mut tokenizer);
        tokenizer_release(&mut tokenizer);
        assert!(tokenizer.is_null());
    }
    Ok(())
}

#[test]
fn offsets_and_pairs() -> Result<()> {
    unsafe {
        let tokenizer = tokenizer_from_file(fixture("wordpiece.json").as_ptr());
        let first = CString::new("How are you?")?;
        let second = CString::new("Hello world!")?;
        let encoding = tokenizer_encode_pair(tokenizer, first.as_ptr(), second.as_ptr(), true);
        assert!(!encoding.is_null());

        let mut n = 0;
        let type_ids = u32s(encoding_get_type_ids(encoding, &mut n), n);
        assert_eq!(type_ids, [0, 0, 0, 0, 0, 0, 1, 1, 1, 1]);

        let offsets = encoding_get_offsets(encoding, &mut n);
        let copied = std::slice::from_raw_parts(offsets, n).to_vec();
        free_offsets_array(offsets, n);
        assert_eq!(copied[1], COffsets { start: 0, end: 3 });
        assert_eq!(copied[7], COffsets { start: 6, end: 11 });

        encoding_free(encoding);
        tokenizer_free(tokenizer);
    }
    Ok(())
}

#[test]
fn overflowing_windows() -> Result<()> {
    let mut definition: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/wordpiece.json"),
    )?)?;
    definition["truncation"] = serde_json::json!({"max_length": 4});
    let buffer = definition.to_string();

    unsafe {
        let tokenizer = tokenizer_from_buffer(buffer.as_ptr(), buffer.len());
        assert!(!tokenizer.is_null());
        let text = CString::new("The quick brown fox")?;
        let encoding = tokenizer_encode(tokenizer, text.as_ptr(), true);
        assert_eq!(encoding_get_overflowing_count(encoding), 1);
        assert!(encoding_get_overflowing_at(encoding, 1).is_null());

        let overflow = encoding_get_overflowing_at(encoding, 0);
        encoding_free(encoding);
        assert_eq!(tokens(overflow), ["[CLS]", "brown", "fox", "[SEP]"]);
        encoding_free(overflow);
        tokenizer_free(tokenizer);
    }
    Ok(())
}

#[test]
fn failures_return_null() -> Result<()> {
    unsafe {
        let missing = CString::new("/path/to/nonexistent/file")?;
        assert!(tokenizer_from_file(missing.as_ptr()).is_null());

        let unknown = CString::new("no-such-org/no-such-tokenizer")?;
        let params = CFromPretrainedParameters {
            revision: ptr::null(),
            token: ptr::null(),
        };
        assert!(tokenizer_from_pretrained(unknown.as_ptr(), &params).is_null());

        let garbage = [1u8, 2, 3, 4];
        assert!(tokenizer_from_buffer(garbage.as_ptr(), garbage.len()).is_null());

        let tokenizer = tokenizer_from_file(fixture("bpe.json").as_ptr());
        assert!(!tokenizer.is_null());
        let unencodable = CString::new("Hex")?;
        assert!(tokenizer_encode(tokenizer, unencodable.as_ptr(), true).is_null());

        let bad_ids = [13, 5000];
        assert!(tokenizer_decode(tokenizer, bad_ids.as_ptr(), bad_ids.len(), true).is_null());

        let mut n = 7;
        assert!(encoding_get_ids(ptr::null(), &mut n).is_null());
        assert_eq!(n, 7);
        assert_eq!(encoding_get_overflowing_count(ptr::null()), 0);
        tokenizer_free(tokenizer);
    }
    Ok(())
}
