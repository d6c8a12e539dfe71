//! Text encodings accepted in options objects.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::str::FromStr;
use strum::{Display, EnumString};

use super::error::{HostError, HostResult};

/// Character encoding for string data and string results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Encoding {
    #[strum(to_string = "utf8", serialize = "utf-8")]
    Utf8,
    #[strum(to_string = "latin1", serialize = "binary")]
    Latin1,
    #[strum(to_string = "ascii")]
    Ascii,
    #[strum(to_string = "hex")]
    Hex,
    #[strum(to_string = "base64")]
    Base64,
    /// Raw bytes; results come back as buffers.
    #[strum(to_string = "buffer")]
    Buffer,
}

impl Encoding {
    pub fn parse(name: &str) -> HostResult<Self> {
        Encoding::from_str(name).map_err(|_| HostError::UnknownEncoding(name.to_string()))
    }

    /// Encode a string argument to bytes.
    pub fn encode(self, text: &str) -> HostResult<Vec<u8>> {
        Ok(match self {
            Encoding::Utf8 | Encoding::Buffer => text.as_bytes().to_vec(),
            Encoding::Latin1 => text.chars().map(|c| c as u32 as u8).collect(),
            Encoding::Ascii => text.chars().map(|c| (c as u32 as u8) & 0x7f).collect(),
            Encoding::Hex => decode_hex(text),
            Encoding::Base64 => STANDARD
                .decode(text.trim_end())
                .map_err(|e| HostError::invalid(format!("invalid base64 data: {e}")))?,
        })
    }

    /// Decode bytes to a string result.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 | Encoding::Buffer => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|b| *b as char).collect(),
            Encoding::Ascii => bytes.iter().map(|b| (b & 0x7f) as char).collect(),
            Encoding::Hex => bytes.iter().map(|b| format!("{b:02x}")).collect(),
            Encoding::Base64 => STANDARD.encode(bytes),
        }
    }
}

/// Hex decoding stops at the first pair that is not hex, like the host.
fn decode_hex(text: &str) -> Vec<u8> {
    text.as_bytes()
        .chunks_exact(2)
        .map_while(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}
