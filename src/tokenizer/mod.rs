mod added;
mod bpe;
mod decoder;
mod ext;
mod normalizer;
mod post_processor;
mod pre_tokenizer;
mod serialization;
mod utils;
mod vocab;
mod wordpiece;

pub use added::*;
pub use bpe::*;
pub use decoder::*;
pub use normalizer::*;
pub use post_processor::*;
pub use pre_tokenizer::*;
pub use serialization::*;
pub use utils::*;
pub use vocab::*;
pub use wordpiece::*;

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use derive_new::new;

use crate::encoding::{Encoding, PaddingParams, PaddingStrategy, TruncationParams};
use crate::error::{Error, Result};
use crate::pretrained::{CacheResolver, FromPretrainedParameters, Resolver};

pub type Token = String;
pub type TokenId = u32;
pub type StringPair = (String, String);
/// Byte range `[start, end)`.
pub type Offsets = (usize, usize);

/// One token produced by a model, with offsets into the text it was given.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub id: TokenId,
    pub value: Token,
    pub offsets: Offsets,
}

/// Subword segmentation over a fixed vocabulary.
pub trait Model: Send + Sync {
    /// Segments one pre-tokenized word. Deterministic.
    fn tokenize(&self, word: &str) -> Result<Vec<Piece>>;
    fn vocab(&self) -> &Vocab;
}

#[derive(Debug, Clone)]
pub enum ModelWrapper {
    WordPiece(WordPiece),
    Bpe(BpeModel),
}

impl ModelWrapper {
    fn kind(&self) -> &'static str {
        match self {
            ModelWrapper::WordPiece(_) => "WordPiece",
            ModelWrapper::Bpe(_) => "BPE",
        }
    }
}

impl Model for ModelWrapper {
    fn tokenize(&self, word: &str) -> Result<Vec<Piece>> {
        match self {
            ModelWrapper::WordPiece(model) => model.tokenize(word),
            ModelWrapper::Bpe(model) => model.tokenize(word),
        }
    }

    fn vocab(&self) -> &Vocab {
        match self {
            ModelWrapper::WordPiece(model) => model.vocab(),
            ModelWrapper::Bpe(model) => model.vocab(),
        }
    }
}

impl From<WordPiece> for ModelWrapper {
    fn from(model: WordPiece) -> Self {
        ModelWrapper::WordPiece(model)
    }
}

impl From<BpeModel> for ModelWrapper {
    fn from(model: BpeModel) -> Self {
        ModelWrapper::Bpe(model)
    }
}

/// Text -> normalizer -> pre-tokenizer -> model -> post-processor -> Encoding,
/// and ids -> vocabulary -> decoder -> text.
///
/// Immutable once built, so one instance serves any number of threads.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    normalizer: Option<Normalizer>,
    pre_tokenizer: Option<PreTokenizer>,
    model: ModelWrapper,
    post_processor: Option<PostProcessor>,
    decoder: Option<Decoder>,
    added: AddedVocabulary,
    special_ids: HashSet<TokenId>,
    truncation: Option<TruncationParams>,
    padding: Option<PaddingParams>,
}

impl Tokenizer {
    pub fn new(model: impl Into<ModelWrapper>) -> Self {
        Self {
            normalizer: None,
            pre_tokenizer: None,
            model: model.into(),
            post_processor: None,
            decoder: None,
            added: AddedVocabulary::default(),
            special_ids: HashSet::new(),
            truncation: None,
            padding: None,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_pre_tokenizer(mut self, pre_tokenizer: PreTokenizer) -> Self {
        self.pre_tokenizer = Some(pre_tokenizer);
        self
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_truncation(mut self, truncation: TruncationParams) -> Self {
        self.truncation = Some(truncation);
        self
    }

    pub fn with_padding(mut self, padding: PaddingParams) -> Self {
        self.padding = Some(padding);
        self
    }

    pub fn with_added_tokens(mut self, tokens: Vec<AddedToken>) -> Result<Self> {
        self.added = AddedVocabulary::new(tokens, self.model.vocab())?;
        self.refresh_special_ids();
        Ok(self)
    }

    /// Every token the processor inserts must already be in the vocabulary
    /// under the same id.
    pub fn with_post_processor(mut self, post_processor: PostProcessor) -> Result<Self> {
        post_processor.validate()?;
        for (token, id) in post_processor.special_tokens() {
            if self.id_to_token(id) != Some(token) {
                return Err(Error::invalid(format!(
                    "post-processor token {token:?} does not have id {id} in the vocabulary"
                )));
            }
        }
        self.post_processor = Some(post_processor);
        self.refresh_special_ids();
        Ok(self)
    }

    fn refresh_special_ids(&mut self) {
        let mut ids: HashSet<TokenId> = self
            .added
            .tokens()
            .iter()
            .filter(|t| t.special)
            .map(|t| t.id)
            .collect();
        if let Some(processor) = &self.post_processor {
            ids.extend(processor.special_tokens().into_iter().map(|(_, id)| id));
        }
        self.special_ids = ids;
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let tokenizer = Self::from_bytes(&bytes)?;
        log::debug!("loaded tokenizer from {}", path.display());
        Ok(tokenizer)
    }

    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let definition: TokenizerDefinition = serde_json::from_slice(bytes.as_ref())?;
        Self::try_from(definition)
    }

    /// Resolves `name` in the local tokenizer cache.
    pub fn from_pretrained(name: &str, params: Option<FromPretrainedParameters>) -> Result<Self> {
        Self::from_pretrained_with(&CacheResolver::from_env(), name, params)
    }

    pub fn from_pretrained_with(
        resolver: &dyn Resolver,
        name: &str,
        params: Option<FromPretrainedParameters>,
    ) -> Result<Self> {
        let params = params.unwrap_or_default();
        let path = resolver.resolve(name, &params)?;
        Self::from_file(path)
    }

    pub fn get_model(&self) -> &ModelWrapper {
        &self.model
    }

    pub fn get_normalizer(&self) -> Option<&Normalizer> {
        self.normalizer.as_ref()
    }

    pub fn get_pre_tokenizer(&self) -> Option<&PreTokenizer> {
        self.pre_tokenizer.as_ref()
    }

    pub fn get_post_processor(&self) -> Option<&PostProcessor> {
        self.post_processor.as_ref()
    }

    pub fn get_decoder(&self) -> Option<&Decoder> {
        self.decoder.as_ref()
    }

    pub fn get_truncation(&self) -> Option<&TruncationParams> {
        self.truncation.as_ref()
    }

    pub fn get_padding(&self) -> Option<&PaddingParams> {
        self.padding.as_ref()
    }

    pub fn get_vocab_size(&self, with_added_tokens: bool) -> usize {
        let base = self.model.vocab().len();
        if with_added_tokens {
            base + self.added.len()
        } else {
            base
        }
    }

    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.model
            .vocab()
            .token_to_id(token)
            .or_else(|| self.added.token_to_id(token))
    }

    pub fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.model
            .vocab()
            .id_to_token(id)
            .or_else(|| self.added.id_to_token(id))
    }

    pub fn is_special(&self, id: TokenId) -> bool {
        self.special_ids.contains(&id)
    }

    /// Number of special tokens `encode(.., true)` adds on top of
    /// `encode(.., false)`.
    pub fn num_special_tokens_to_add(&self, is_pair: bool) -> usize {
        self.post_processor
            .as_ref()
            .map_or(0, |p| p.added_tokens(is_pair))
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding> {
        self.encode_inner(text, None, add_special_tokens, true)
    }

    /// Like [`Tokenizer::encode`] for raw bytes, which must be UTF-8.
    pub fn encode_bytes(&self, text: &[u8], add_special_tokens: bool) -> Result<Encoding> {
        let text = std::str::from_utf8(text).map_err(|err| Error::Encoding(err.to_string()))?;
        self.encode(text, add_special_tokens)
    }

    pub fn encode_pair(
        &self,
        first: &str,
        second: &str,
        add_special_tokens: bool,
    ) -> Result<Encoding> {
        self.encode_inner(first, Some(second), add_special_tokens, true)
    }

    /// Encodes every input, then pads them together when padding is set.
    pub fn encode_batch<S: AsRef<str>>(
        &self,
        inputs: &[S],
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>> {
        let mut encodings = inputs
            .iter()
            .map(|text| self.encode_inner(text.as_ref(), None, add_special_tokens, false))
            .collect::<Result<Vec<_>>>()?;
        if let Some(padding) = &self.padding {
            padding.apply(&mut encodings);
        }
        Ok(encodings)
    }

    fn encode_inner(
        &self,
        first: &str,
        second: Option<&str>,
        add_special_tokens: bool,
        pad: bool,
    ) -> Result<Encoding> {
        let mut first = self.encode_sequence(first, 0)?;
        let mut second = second
            .map(|text| self.encode_sequence(text, 1))
            .transpose()?;

        if let Some(truncation) = &self.truncation {
            let reserved = if add_special_tokens {
                self.num_special_tokens_to_add(second.is_some())
            } else {
                0
            };
            truncation.apply(&mut first, second.as_mut(), reserved)?;
        }

        let mut encoding = match &self.post_processor {
            Some(processor) => processor.process(first, second, add_special_tokens),
            None => {
                if let Some(second) = &second {
                    first.extend_from(second, None);
                }
                first
            }
        };

        // batch-longest padding of a single encoding only matters for multiples
        if let Some(padding) = self.padding.as_ref().filter(|_| pad) {
            if matches!(padding.strategy, PaddingStrategy::Fixed(_))
                || padding.pad_to_multiple_of.is_some()
            {
                padding.apply(std::slice::from_mut(&mut encoding));
            }
        }
        log::trace!("encoded {} tokens", encoding.len());
        Ok(encoding)
    }

    /// Runs one input through added-token matching, normalization,
    /// pre-tokenization and the model. Offsets point into `text`.
    fn encode_sequence(&self, text: &str, type_id: u32) -> Result<Encoding> {
        let mut pieces = Vec::new();
        for segment in self.added.split(text) {
            match segment {
                Segment::Added(id, (start, end)) => {
                    pieces.push(Piece::new(id, text[start..end].to_owned(), (start, end)));
                }
                Segment::Text((start, end)) => {
                    let mut normalized = NormalizedString::new(&text[start..end], start);
                    if let Some(normalizer) = &self.normalizer {
                        normalizer.normalize(&mut normalized);
                    }
                    let splits = match &self.pre_tokenizer {
                        Some(pre_tokenizer) => pre_tokenizer.pre_tokenize(normalized.get())?,
                        None if normalized.is_empty() => Vec::new(),
                        None => vec![Split::whole(normalized.get())],
                    };
                    for split in splits {
                        for piece in self.model.tokenize(&split.value)? {
                            let offsets =
                                normalized.original_offsets(split.normalized_offsets(piece.offsets));
                            pieces.push(Piece { offsets, ..piece });
                        }
                    }
                }
            }
        }
        Ok(Encoding::from_pieces(pieces, type_id))
    }

    /// Maps ids back to text. Every id must be known, including the ones
    /// `skip_special_tokens` drops.
    pub fn decode(&self, ids: &[TokenId], skip_special_tokens: bool) -> Result<String> {
        let mut tokens = Vec::with_capacity(ids.len());
        for &id in ids {
            let token = self.id_to_token(id).ok_or(Error::UnknownId(id))?;
            if skip_special_tokens && self.is_special(id) {
                continue;
            }
            tokens.push(token.to_owned());
        }
        Ok(match &self.decoder {
            Some(decoder) => decoder.decode(&tokens),
            None => tokens.join(" "),
        })
    }

    pub fn decode_batch(
        &self,
        sequences: &[&[TokenId]],
        skip_special_tokens: bool,
    ) -> Result<Vec<String>> {
        sequences
            .iter()
            .map(|ids| self.decode(ids, skip_special_tokens))
            .collect()
    }
}

impl TryFrom<TokenizerDefinition> for Tokenizer {
    type Error = Error;

    fn try_from(definition: TokenizerDefinition) -> Result<Self> {
        let model = ModelWrapper::try_from(definition.model)?;
        let kind = model.kind();
        let mut tokenizer = Tokenizer::new(model).with_added_tokens(definition.added_tokens)?;
        tokenizer.normalizer = definition.normalizer;
        tokenizer.pre_tokenizer = definition.pre_tokenizer;
        tokenizer.decoder = definition.decoder;
        tokenizer.truncation = definition.truncation;
        tokenizer.padding = definition.padding;
        if let Some(processor) = definition.post_processor {
            tokenizer = tokenizer.with_post_processor(processor)?;
        }
        log::debug!(
            "built {kind} tokenizer with {} tokens ({} added)",
            tokenizer.get_vocab_size(true),
            tokenizer.added.len()
        );
        Ok(tokenizer)
    }
}

impl FromStr for Tokenizer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_bytes(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::{TruncationDirection, TruncationStrategy};

    const VOCAB: &[&str] = &[
        "[PAD]", "[UNK]", "[CLS]", "[SEP]", "the", "quick", "brown", "fox", "jumps", "over",
        "lazy", "dog", ".", "un", "##aff", "##able", "hello", ",",
    ];

    fn bert_like() -> Tokenizer {
        let vocab = Vocab::from_tokens(VOCAB.iter().copied()).unwrap();
        let model = WordPiece::new(vocab, "[UNK]".into(), "##".into(), 100).unwrap();
        let pre_tokenizer: PreTokenizer =
            serde_json::from_str(r#"{"type":"BertPreTokenizer"}"#).unwrap();
        Tokenizer::new(model)
            .with_normalizer(Normalizer::BertNormalizer {
                clean_text: true,
                handle_chinese_chars: true,
                strip_accents: None,
                lowercase: true,
            })
            .with_pre_tokenizer(pre_tokenizer)
            .with_decoder(Decoder::WordPiece {
                prefix: "##".into(),
                cleanup: true,
            })
            .with_added_tokens(vec![
                AddedToken::new(0, "[PAD]".into(), true),
                AddedToken::new(2, "[CLS]".into(), true),
                AddedToken::new(3, "[SEP]".into(), true),
            ])
            .unwrap()
            .with_post_processor(PostProcessor::bert(("[CLS]", 2), ("[SEP]", 3)))
            .unwrap()
    }

    #[test]
    pub fn check_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Tokenizer>();
        assert_send_sync::<Encoding>();
    }

    #[test]
    pub fn check_encode_with_offsets() {
        let tokenizer = bert_like();
        let encoding = tokenizer.encode("Hello, Unaffable dog", false).unwrap();
        assert_eq!(
            encoding.get_tokens(),
            ["hello", ",", "un", "##aff", "##able", "dog"]
        );
        assert_eq!(encoding.get_offsets()[3], (9, 12));
        assert_eq!(encoding.get_offsets()[5], (17, 20));
    }

    #[test]
    pub fn check_special_tokens_are_added() {
        let tokenizer = bert_like();
        let plain = tokenizer.encode("the dog", false).unwrap();
        let special = tokenizer.encode("the dog", true).unwrap();
        assert_eq!(special.len(), plain.len() + tokenizer.num_special_tokens_to_add(false));
        assert_eq!(special.get_ids(), [2, 4, 11, 3]);
        assert_eq!(special.get_special_tokens_mask(), [1, 0, 0, 1]);
    }

    #[test]
    pub fn check_added_tokens_in_input() {
        let tokenizer = bert_like();
        let encoding = tokenizer.encode("the [SEP] dog", false).unwrap();
        assert_eq!(encoding.get_tokens(), ["the", "[SEP]", "dog"]);
        assert_eq!(encoding.get_offsets()[1], (4, 9));
    }

    #[test]
    pub fn check_unknown_words() {
        let tokenizer = bert_like();
        let encoding = tokenizer.encode("the cat", false).unwrap();
        assert_eq!(encoding.get_tokens(), ["the", "[UNK]"]);
        assert_eq!(encoding.get_offsets()[1], (4, 7));
    }

    #[test]
    pub fn check_decode() {
        let tokenizer = bert_like();
        let ids = tokenizer.encode("The lazy dog.", true).unwrap().get_ids().to_vec();
        assert_eq!(tokenizer.decode(&ids, true).unwrap(), "the lazy dog.");
        assert_eq!(
            tokenizer.decode(&ids, false).unwrap(),
            "[CLS] the lazy dog. [SEP]"
        );
        assert_eq!(tokenizer.decode(&[], true).unwrap(), "");
    }

    #[test]
    pub fn check_decode_unknown_id() {
        let tokenizer = bert_like();
        let err = tokenizer.decode(&[4, 999], true).unwrap_err();
        assert!(matches!(err, Error::UnknownId(999)));
    }

    #[test]
    pub fn check_pair() {
        let tokenizer = bert_like();
        let encoding = tokenizer.encode_pair("the fox", "lazy dog", true).unwrap();
        assert_eq!(encoding.get_ids(), [2, 4, 7, 3, 10, 11, 3]);
        assert_eq!(encoding.get_type_ids(), [0, 0, 0, 0, 1, 1, 1]);
        assert_eq!(encoding.get_offsets()[5], (5, 8));
    }

    #[test]
    pub fn check_truncation_reserves_special_tokens() {
        let tokenizer = bert_like().with_truncation(TruncationParams {
            max_length: 4,
            stride: 0,
            strategy: TruncationStrategy::LongestFirst,
            direction: TruncationDirection::Right,
        });
        let encoding = tokenizer.encode("the quick brown fox", true).unwrap();
        assert_eq!(encoding.get_tokens(), ["[CLS]", "the", "quick", "[SEP]"]);
        assert_eq!(encoding.get_overflowing().len(), 1);
        assert_eq!(
            encoding.get_overflowing()[0].get_tokens(),
            ["[CLS]", "brown", "fox", "[SEP]"]
        );
    }

    #[test]
    pub fn check_fixed_padding() {
        let tokenizer = bert_like().with_padding(PaddingParams {
            strategy: PaddingStrategy::Fixed(6),
            ..Default::default()
        });
        let encoding = tokenizer.encode("the dog", true).unwrap();
        assert_eq!(encoding.get_ids(), [2, 4, 11, 3, 0, 0]);
        assert_eq!(encoding.get_attention_mask(), [1, 1, 1, 1, 0, 0]);
    }

    #[test]
    pub fn check_batch_longest_padding() {
        let tokenizer = bert_like().with_padding(PaddingParams::default());
        let batch = tokenizer.encode_batch(&["the dog", "the quick brown fox"], true).unwrap();
        assert_eq!(batch[0].len(), 6);
        assert_eq!(batch[1].len(), 6);
        assert_eq!(batch[0].get_attention_mask(), [1, 1, 1, 1, 0, 0]);
    }

    #[test]
    pub fn check_invalid_utf8() {
        let tokenizer = bert_like();
        let err = tokenizer.encode_bytes(&[0x66, 0xFF, 0x6F], false).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[test]
    pub fn rejects_processor_with_wrong_ids() {
        let result = bert_like().with_post_processor(PostProcessor::bert(("[CLS]", 5), ("[SEP]", 3)));
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    pub fn check_vocab_queries() {
        let tokenizer = bert_like();
        assert_eq!(tokenizer.token_to_id("fox"), Some(7));
        assert_eq!(tokenizer.id_to_token(12), Some("."));
        assert_eq!(tokenizer.get_vocab_size(true), VOCAB.len());
        assert!(tokenizer.is_special(2));
        assert!(!tokenizer.is_special(4));
    }
}
