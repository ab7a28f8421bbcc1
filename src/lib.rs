//! Text tokenization for transformer models: WordPiece and BPE segmentation,
//! special-token post-processing and decoding, usable from Rust or through a
//! C ABI.

pub mod encoding;
pub mod error;
pub mod ffi;
pub mod pretrained;
pub mod tokenizer;

pub use encoding::Encoding;
pub use error::{Error, Result};
pub use pretrained::FromPretrainedParameters;
pub use tokenizer::{Token, TokenId, Tokenizer};
