use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// RFC 2047 encoded word: `=?charset?encoding?text?=`.
const ENCODED_WORD: &str = r"=\?[^?\s]+\?[BbQq]\?[^?\s]*\?=";

#[derive(Debug, Error)]
enum DecodeError {
    #[error("cannot decode {word}: {reason}")]
    Word { word: String, reason: String },
}

fn encoded_word_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ENCODED_WORD).ok()).as_ref()
}

/// Decodes a raw header value to display text.
///
/// Plain text passes through unchanged. Every encoded word is decoded on its
/// own and the results are concatenated; whitespace between two adjacent
/// encoded words is dropped. A word that cannot be decoded is kept as is.
pub fn decode_header(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let Some(pattern) = encoded_word_pattern() else {
        return text.into_owned();
    };

    let mut decoded = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut after_word = false;

    for word in pattern.find_iter(&text) {
        let between = &text[cursor..word.start()];
        if !(after_word && between.trim().is_empty()) {
            decoded.push_str(between);
        }

        match decode_word(word.as_str()) {
            Ok(value) => decoded.push_str(&value),
            Err(err) => {
                tracing::debug!("keeping raw header segment: {err}");
                decoded.push_str(word.as_str());
            }
        }

        cursor = word.end();
        after_word = true;
    }

    decoded.push_str(&text[cursor..]);
    decoded
}

fn decode_word(word: &str) -> Result<String, DecodeError> {
    rfc2047_decoder::decode(word.as_bytes()).map_err(|err| DecodeError::Word {
        word: word.to_string(),
        reason: err.to_string(),
    })
}
