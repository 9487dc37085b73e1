//! PlantUML text encoding.
//!
//! Diagram source is compressed with raw DEFLATE and written in PlantUML's
//! own base64 alphabet (`0-9A-Za-z-_`), three bytes to four characters.
//! A short final group is zero-filled, which in this alphabet shows up as
//! trailing `0` characters. The zero bytes those characters decode to sit
//! after the end of the DEFLATE stream and are ignored by the inflater.

use base64::{
    alphabet::Alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use std::io::{Read, Write};

const PLANTUML_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

/// Prefix announcing plain hex-encoded UTF-8 instead of DEFLATE.
const HEX_PREFIX: &str = "~h";
/// Prefix some clients put in front of the default DEFLATE encoding.
const DEFLATE_PREFIX: &str = "~1";

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Invalid characters in encoded diagram: {0}")]
    InvalidCharacters(String),

    #[error("Encoded diagram is not valid compressed data: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("Decoded diagram is not valid UTF-8")]
    NotUtf8,

    #[error("Encoded diagram is empty")]
    Empty,
}

fn engine() -> Result<GeneralPurpose, EncodingError> {
    let alphabet = Alphabet::new(PLANTUML_ALPHABET)
        .map_err(|e| EncodingError::InvalidCharacters(e.to_string()))?;
    let config = GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true);
    Ok(GeneralPurpose::new(&alphabet, config))
}

/// Encode diagram source into the URL-safe token PlantUML servers accept.
pub fn encode(source: &str) -> Result<String, EncodingError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(source.as_bytes())?;
    let compressed = encoder.finish()?;

    let mut token = engine()?.encode(compressed);
    while token.len() % 4 != 0 {
        token.push('0');
    }
    Ok(token)
}

/// Decode a token produced by [`encode`] (or by any PlantUML client).
pub fn decode(encoded: &str) -> Result<String, EncodingError> {
    let encoded = encoded.trim();

    if let Some(hex) = encoded.strip_prefix(HEX_PREFIX) {
        return decode_hex(hex);
    }
    let encoded = encoded.strip_prefix(DEFLATE_PREFIX).unwrap_or(encoded);
    if encoded.is_empty() {
        return Err(EncodingError::Empty);
    }

    let compressed = engine()?
        .decode(encoded)
        .map_err(|e| EncodingError::InvalidCharacters(e.to_string()))?;

    let mut raw = Vec::new();
    DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut raw)?;
    String::from_utf8(raw).map_err(|_| EncodingError::NotUtf8)
}

fn decode_hex(hex: &str) -> Result<String, EncodingError> {
    if hex.is_empty() {
        return Err(EncodingError::Empty);
    }
    if hex.len() % 2 != 0 {
        return Err(EncodingError::InvalidCharacters(
            "hex payload has an odd length".to_string(),
        ));
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| {
                    EncodingError::InvalidCharacters(format!("invalid hex at offset {}", i))
                })
        })
        .collect::<Result<Vec<u8>, _>>()?;
    String::from_utf8(bytes).map_err(|_| EncodingError::NotUtf8)
}
