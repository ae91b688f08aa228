#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Windows-1252 mappings for 0x80..=0x9F; `None` marks bytes the code page leaves undefined
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "utf-8-sig")]
    Utf8Sig,
    #[serde(rename = "latin-1")]
    Latin1,
    #[serde(rename = "cp1252")]
    Cp1252,
    #[serde(rename = "iso-8859-1")]
    Iso8859_1,
}

/// How a document's bytes were turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    /// The first encoding in the chain succeeded
    Exact(TextEncoding),
    /// A later encoding in the chain succeeded
    Fallback(TextEncoding),
    /// Every encoding failed; invalid sequences were replaced with U+FFFD
    Lossy,
}

impl TextEncoding {
    pub const DEFAULT_CHAIN: [Self; 5] = [
        Self::Utf8,
        Self::Utf8Sig,
        Self::Latin1,
        Self::Cp1252,
        Self::Iso8859_1,
    ];

    /// Strictly decode `bytes`, returning `None` if they are not valid in this encoding
    #[inline]
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Self::Utf8Sig => std::str::from_utf8(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes))
                .ok()
                .map(str::to_owned),
            Self::Latin1 | Self::Iso8859_1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Cp1252 => bytes
                .iter()
                .map(|&b| match b {
                    0x80..=0x9F => CP1252_HIGH[usize::from(b - 0x80)],
                    _ => Some(char::from(b)),
                })
                .collect(),
        }
    }
}

impl fmt::Display for TextEncoding {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Sig => "utf-8-sig",
            Self::Latin1 => "latin-1",
            Self::Cp1252 => "cp1252",
            Self::Iso8859_1 => "iso-8859-1",
        };
        f.write_str(name)
    }
}

/// Decode with the first encoding in `chain` that accepts the bytes,
/// falling back to lossy UTF-8 when none does
#[inline]
pub fn decode_text(bytes: &[u8], chain: &[TextEncoding]) -> (String, Decoding) {
    for (position, encoding) in chain.iter().enumerate() {
        if let Some(text) = encoding.decode(bytes) {
            let decoding = if position == 0 {
                Decoding::Exact(*encoding)
            } else {
                Decoding::Fallback(*encoding)
            };
            return (text, decoding);
        }
    }

    (String::from_utf8_lossy(bytes).into_owned(), Decoding::Lossy)
}
