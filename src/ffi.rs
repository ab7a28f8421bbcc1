//! C ABI over [`Tokenizer`] and [`Encoding`].
//!
//! Handles are opaque and owned by the caller until passed to their free or
//! release function. Every array or string handed out is an independent
//! allocation with its own free function, so it stays valid after the
//! encoding it came from is released. Failures return null (or 0 / false)
//! and are logged.

use std::ffi::{c_char, CStr, CString};
use std::path::Path;
use std::ptr;

use crate::encoding::Encoding;
use crate::pretrained::FromPretrainedParameters;
use crate::tokenizer::{TokenId, Tokenizer};

pub struct TokenizerHandle(Tokenizer);

pub struct EncodingHandle(Encoding);

#[repr(C)]
pub struct CFromPretrainedParameters {
    /// Null means `"main"`.
    pub revision: *const c_char,
    pub token: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct COffsets {
    pub start: usize,
    pub end: usize,
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Option<&'a str> {
    if ptr.is_null() {
        log::warn!("{what} is null");
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(err) => {
            log::warn!("{what} is not UTF-8: {err}");
            None
        }
    }
}

unsafe fn params_from_c(
    params: *const CFromPretrainedParameters,
) -> Option<Option<FromPretrainedParameters>> {
    let Some(params) = params.as_ref() else {
        return Some(None);
    };
    let mut parsed = FromPretrainedParameters::default();
    if !params.revision.is_null() {
        parsed.revision = c_str(params.revision, "revision")?.to_owned();
    }
    if !params.token.is_null() {
        parsed.token = Some(c_str(params.token, "token")?.to_owned());
    }
    Some(Some(parsed))
}

fn tokenizer_handle(result: crate::Result<Tokenizer>, from: &str) -> *mut TokenizerHandle {
    match result {
        Ok(tokenizer) => Box::into_raw(Box::new(TokenizerHandle(tokenizer))),
        Err(err) => {
            log::warn!("cannot load tokenizer from {from}: {err}");
            ptr::null_mut()
        }
    }
}

fn encoding_handle(result: crate::Result<Encoding>) -> *mut EncodingHandle {
    match result {
        Ok(encoding) => Box::into_raw(Box::new(EncodingHandle(encoding))),
        Err(err) => {
            log::warn!("encode failed: {err}");
            ptr::null_mut()
        }
    }
}

/// `length` must be writable.
unsafe fn into_raw_array<T: Clone>(values: &[T], length: *mut usize) -> *mut T {
    *length = values.len();
    Box::into_raw(values.to_vec().into_boxed_slice()) as *mut T
}

unsafe fn drop_raw_array<T>(array: *mut T, length: usize) {
    if !array.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(array, length)));
    }
}

/// Loads a tokenizer by pretrained name from the local cache.
///
/// # Safety
/// `name` must be null or a valid C string; `params` must be null or point
/// to a valid `CFromPretrainedParameters`.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_from_pretrained(
    name: *const c_char,
    params: *const CFromPretrainedParameters,
) -> *mut TokenizerHandle {
    let Some(name) = c_str(name, "pretrained name") else {
        return ptr::null_mut();
    };
    let Some(params) = params_from_c(params) else {
        return ptr::null_mut();
    };
    tokenizer_handle(Tokenizer::from_pretrained(name, params), name)
}

/// # Safety
/// `path` must be null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_from_file(path: *const c_char) -> *mut TokenizerHandle {
    let Some(path) = c_str(path, "path") else {
        return ptr::null_mut();
    };
    tokenizer_handle(Tokenizer::from_file(Path::new(path)), path)
}

/// # Safety
/// `buffer` must be null or point to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_from_buffer(
    buffer: *const u8,
    len: usize,
) -> *mut TokenizerHandle {
    if buffer.is_null() || len == 0 {
        log::warn!("tokenizer buffer is empty");
        return ptr::null_mut();
    }
    let bytes = std::slice::from_raw_parts(buffer, len);
    tokenizer_handle(Tokenizer::from_bytes(bytes), "buffer")
}

/// # Safety
/// `handle` must be null or come from one of the `tokenizer_from_*`
/// functions and not have been freed.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_free(handle: *mut TokenizerHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Frees `*handle` and sets it to null, so releasing twice is harmless.
///
/// # Safety
/// `handle` must be null or point to a pointer accepted by
/// [`tokenizer_free`].
#[no_mangle]
pub unsafe extern "C" fn tokenizer_release(handle: *mut *mut TokenizerHandle) {
    if let Some(slot) = handle.as_mut() {
        tokenizer_free(std::mem::replace(slot, ptr::null_mut()));
    }
}

/// # Safety
/// `handle` must be a live tokenizer handle or null; `text` a valid C
/// string or null.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_encode(
    handle: *const TokenizerHandle,
    text: *const c_char,
    add_special_tokens: bool,
) -> *mut EncodingHandle {
    let Some(handle) = handle.as_ref() else {
        return ptr::null_mut();
    };
    let Some(text) = c_str(text, "text") else {
        return ptr::null_mut();
    };
    encoding_handle(handle.0.encode(text, add_special_tokens))
}

/// # Safety
/// As [`tokenizer_encode`], for both strings.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_encode_pair(
    handle: *const TokenizerHandle,
    first: *const c_char,
    second: *const c_char,
    add_special_tokens: bool,
) -> *mut EncodingHandle {
    let Some(handle) = handle.as_ref() else {
        return ptr::null_mut();
    };
    let (Some(first), Some(second)) = (c_str(first, "first text"), c_str(second, "second text"))
    else {
        return ptr::null_mut();
    };
    encoding_handle(handle.0.encode_pair(first, second, add_special_tokens))
}

/// Returns a string to release with [`free_rstring`]. An empty id list
/// decodes to `""`.
///
/// # Safety
/// `handle` must be a live tokenizer handle or null; `ids` must point to
/// `length` ids unless `length` is 0.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_decode(
    handle: *const TokenizerHandle,
    ids: *const u32,
    length: usize,
    skip_special_tokens: bool,
) -> *mut c_char {
    let Some(handle) = handle.as_ref() else {
        return ptr::null_mut();
    };
    let ids: &[TokenId] = if length == 0 {
        &[]
    } else if ids.is_null() {
        log::warn!("decode ids are null");
        return ptr::null_mut();
    } else {
        std::slice::from_raw_parts(ids, length)
    };
    let text = match handle.0.decode(ids, skip_special_tokens) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("decode failed: {err}");
            return ptr::null_mut();
        }
    };
    match CString::new(text) {
        Ok(text) => text.into_raw(),
        Err(err) => {
            log::warn!("decoded text holds a NUL byte: {err}");
            ptr::null_mut()
        }
    }
}

/// Writes the id of `token` to `id` and returns true when it is known.
///
/// # Safety
/// `handle` must be a live tokenizer handle or null; `token` a valid C
/// string or null; `id` writable or null.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_token_to_id(
    handle: *const TokenizerHandle,
    token: *const c_char,
    id: *mut u32,
) -> bool {
    let (Some(handle), Some(id)) = (handle.as_ref(), id.as_mut()) else {
        return false;
    };
    let Some(token) = c_str(token, "token") else {
        return false;
    };
    match handle.0.token_to_id(token) {
        Some(found) => {
            *id = found;
            true
        }
        None => false,
    }
}

/// # Safety
/// `handle` must be a live tokenizer handle or null.
#[no_mangle]
pub unsafe extern "C" fn tokenizer_get_vocab_size(
    handle: *const TokenizerHandle,
    with_added_tokens: bool,
) -> usize {
    handle
        .as_ref()
        .map_or(0, |handle| handle.0.get_vocab_size(with_added_tokens))
}

/// # Safety
/// `encoding` must be null or come from this library and not have been
/// freed.
#[no_mangle]
pub unsafe extern "C" fn encoding_free(encoding: *mut EncodingHandle) {
    if !encoding.is_null() {
        drop(Box::from_raw(encoding));
    }
}

/// Frees `*encoding` and sets it to null.
///
/// # Safety
/// `encoding` must be null or point to a pointer accepted by
/// [`encoding_free`].
#[no_mangle]
pub unsafe extern "C" fn encoding_release(encoding: *mut *mut EncodingHandle) {
    if let Some(slot) = encoding.as_mut() {
        encoding_free(std::mem::replace(slot, ptr::null_mut()));
    }
}

/// # Safety
/// `encoding` must be a live encoding handle or null.
#[no_mangle]
pub unsafe extern "C" fn encoding_get_length(encoding: *const EncodingHandle) -> usize {
    encoding.as_ref().map_or(0, |e| e.0.len())
}

unsafe fn u32_field(
    encoding: *const EncodingHandle,
    length: *mut usize,
    field: fn(&Encoding) -> &[u32],
) -> *mut u32 {
    match encoding.as_ref() {
        Some(encoding) if !length.is_null() => into_raw_array(field(&encoding.0), length),
        _ => ptr::null_mut(),
    }
}

/// Returns a copy to release with [`free_u32_array`].
///
/// # Safety
/// `encoding` must be a live encoding handle or null; `length` writable or
/// null.
#[no_mangle]
pub unsafe extern "C" fn encoding_get_ids(
    encoding: *const EncodingHandle,
    length: *mut usize,
) -> *mut u32 {
    u32_field(encoding, length, Encoding::get_ids)
}

/// # Safety
/// As [`encoding_get_ids`].
#[no_mangle]
pub unsafe extern "C" fn encoding_get_type_ids(
    encoding: *const EncodingHandle,
    length: *mut usize,
) -> *mut u32 {
    u32_field(encoding, length, Encoding::get_type_ids)
}

/// # Safety
/// As [`encoding_get_ids`].
#[no_mangle]
pub unsafe extern "C" fn encoding_get_special_tokens_mask(
    encoding: *const EncodingHandle,
    length: *mut usize,
) -> *mut u32 {
    u32_field(encoding, length, Encoding::get_special_tokens_mask)
}

/// # Safety
/// As [`encoding_get_ids`].
#[no_mangle]
pub unsafe extern "C" fn encoding_get_attention_mask(
    encoding: *const EncodingHandle,
    length: *mut usize,
) -> *mut u32 {
    u32_field(encoding, length, Encoding::get_attention_mask)
}

/// Returns C strings to release with [`free_c_char_array`].
///
/// # Safety
/// As [`encoding_get_ids`].
#[no_mangle]
pub unsafe extern "C" fn encoding_get_tokens(
    encoding: *const EncodingHandle,
    length: *mut usize,
) -> *mut *mut c_char {
    let Some(encoding) = encoding.as_ref().filter(|_| !length.is_null()) else {
        return ptr::null_mut();
    };
    let tokens: Vec<*mut c_char> = encoding
        .0
        .get_tokens()
        .iter()
        .map(|token| {
            CString::new(token.as_str())
                .unwrap_or_else(|err| {
                    log::warn!("token {token:?} holds a NUL byte: {err}");
                    CString::default()
                })
                .into_raw()
        })
        .collect();
    into_raw_array(&tokens, length)
}

/// Returns byte offsets to release with [`free_offsets_array`].
///
/// # Safety
/// As [`encoding_get_ids`].
#[no_mangle]
pub unsafe extern "C" fn encoding_get_offsets(
    encoding: *const EncodingHandle,
    length: *mut usize,
) -> *mut COffsets {
    let Some(encoding) = encoding.as_ref().filter(|_| !length.is_null()) else {
        return ptr::null_mut();
    };
    let offsets: Vec<COffsets> = encoding
        .0
        .get_offsets()
        .iter()
        .map(|&(start, end)| COffsets { start, end })
        .collect();
    into_raw_array(&offsets, length)
}

/// # Safety
/// `encoding` must be a live encoding handle or null.
#[no_mangle]
pub unsafe extern "C" fn encoding_get_overflowing_count(encoding: *const EncodingHandle) -> usize {
    encoding.as_ref().map_or(0, |e| e.0.get_overflowing().len())
}

/// Returns a new handle, released with [`encoding_free`], for overflow
/// window `index`.
///
/// # Safety
/// `encoding` must be a live encoding handle or null.
#[no_mangle]
pub unsafe extern "C" fn encoding_get_overflowing_at(
    encoding: *const EncodingHandle,
    index: usize,
) -> *mut EncodingHandle {
    encoding
        .as_ref()
        .and_then(|e| e.0.get_overflowing().get(index))
        .map_or(ptr::null_mut(), |overflow| {
            Box::into_raw(Box::new(EncodingHandle(overflow.clone())))
        })
}

/// # Safety
/// `array` must be null or come from a `u32` accessor with this `length`.
#[no_mangle]
pub unsafe extern "C" fn free_u32_array(array: *mut u32, length: usize) {
    drop_raw_array(array, length);
}

/// # Safety
/// `array` must be null or come from [`encoding_get_offsets`] with this
/// `length`.
#[no_mangle]
pub unsafe extern "C" fn free_offsets_array(array: *mut COffsets, length: usize) {
    drop_raw_array(array, length);
}

/// # Safety
/// `array` must be null or come from [`encoding_get_tokens`] with this
/// `length`.
#[no_mangle]
pub unsafe extern "C" fn free_c_char_array(array: *mut *mut c_char, length: usize) {
    if array.is_null() {
        return;
    }
    for &token in std::slice::from_raw_parts(array, length) {
        if !token.is_null() {
            drop(CString::from_raw(token));
        }
    }
    drop_raw_array(array, length);
}

/// Strings from this library must come back here, never to `free()`.
///
/// # Safety
/// `s` must be null or come from [`tokenizer_decode`].
#[no_mangle]
pub unsafe extern "C" fn free_rstring(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
