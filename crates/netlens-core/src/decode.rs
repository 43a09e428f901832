//! Response body decoding
//!
//! Raw wire bytes become the record's `response_body`: decompress per
//! `content-encoding`, pick the charset from `content-type`, and fall back to
//! base64 for binary payloads. Decoding never fails outright; a payload that
//! cannot be decoded is published as raw base64 with a warning flag.

use std::io::Read;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use encoding_rs::{Encoding, UTF_8};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};

/// Outcome of decoding one response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBody {
    pub text: String,
    /// True when `text` is a base64 rendering of the (decompressed) bytes.
    pub base64_encoded: bool,
    /// True when decompression or charset decoding degraded to raw base64.
    pub warning: bool,
    /// Byte length after decompression; equals the input length for
    /// identity-encoded bodies.
    pub decoded_len: u64,
}

/// Decode `raw` according to its `content-encoding` and `content-type`
/// headers.
pub fn decode_body(
    raw: &[u8],
    content_encoding: Option<&str>,
    content_type: Option<&str>,
) -> DecodedBody {
    let bytes = match decompress(raw, content_encoding) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(kind = "decode", error = %err, "decompression failed, keeping raw payload");
            return DecodedBody {
                text: B64.encode(raw),
                base64_encoded: true,
                warning: true,
                decoded_len: raw.len() as u64,
            };
        }
    };
    let decoded_len = bytes.len() as u64;

    let mime = content_type.map(mime_essence).unwrap_or_default();
    if is_binary_mime(&mime) {
        return DecodedBody {
            text: B64.encode(&bytes),
            base64_encoded: true,
            warning: false,
            decoded_len,
        };
    }

    let encoding = charset_for(content_type);
    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        tracing::debug!(kind = "decode", charset = encoding.name(), "charset decode failed, keeping raw payload");
        return DecodedBody {
            text: B64.encode(&bytes),
            base64_encoded: true,
            warning: true,
            decoded_len,
        };
    }

    DecodedBody {
        text: text.into_owned(),
        base64_encoded: false,
        warning: false,
        decoded_len,
    }
}

/// Undo the `content-encoding` chain. The header lists encodings in the
/// order they were applied, so the outermost one is last and is decoded
/// first.
pub fn decompress(raw: &[u8], content_encoding: Option<&str>) -> std::io::Result<Vec<u8>> {
    let Some(encodings) = content_encoding else {
        return Ok(raw.to_vec());
    };

    let mut bytes = raw.to_vec();
    for encoding in encodings.split(',').rev() {
        bytes = match encoding.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => read_all(GzDecoder::new(bytes.as_slice()))?,
            "deflate" => inflate(&bytes)?,
            "br" => read_all(brotli::Decompressor::new(bytes.as_slice(), 4096))?,
            "identity" | "" => bytes,
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unsupported content-encoding: {other}"),
                ));
            }
        };
    }
    Ok(bytes)
}

/// HTTP `deflate` is zlib-wrapped, but some servers send raw deflate
/// streams. Try zlib first and fall back to the raw stream.
fn inflate(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    read_all(ZlibDecoder::new(bytes)).or_else(|_| read_all(DeflateDecoder::new(bytes)))
}

fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// The mime type without any `; charset=…` suffix, lowercased.
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Payloads DevTools renders from base64 rather than text.
pub fn is_binary_mime(mime: &str) -> bool {
    mime.starts_with("image/")
        || mime.starts_with("video/")
        || mime.starts_with("audio/")
        || mime == "application/octet-stream"
}

/// Charset named by `content-type; charset=…`, defaulting to UTF-8.
fn charset_for(content_type: Option<&str>) -> &'static Encoding {
    let Some(content_type) = content_type else {
        return UTF_8;
    };
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if key.trim().eq_ignore_ascii_case("charset") {
                Encoding::for_label(value.trim().trim_matches('"').as_bytes())
            } else {
                None
            }
        })
        .unwrap_or(UTF_8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn br(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(data).unwrap();
        }
        out
    }

    #[test]
    fn test_round_trip_all_encodings() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(8);

        assert_eq!(decompress(&gzip(&payload), Some("gzip")).unwrap(), payload);
        assert_eq!(
            decompress(&zlib(&payload), Some("deflate")).unwrap(),
            payload
        );
        assert_eq!(decompress(&br(&payload), Some("br")).unwrap(), payload);
        assert_eq!(decompress(&payload, Some("identity")).unwrap(), payload);
        assert_eq!(decompress(&payload, None).unwrap(), payload);
    }

    #[test]
    fn test_chained_encodings_decode_outer_first() {
        let payload = b"layered payload".to_vec();
        let wire = gzip(&br(&payload));

        assert_eq!(decompress(&wire, Some("br, gzip")).unwrap(), payload);
    }

    #[test]
    fn test_raw_deflate_fallback() {
        let payload = b"raw deflate stream";
        let mut enc =
            flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload).unwrap();
        let wire = enc.finish().unwrap();

        assert_eq!(decompress(&wire, Some("deflate")).unwrap(), payload);
    }

    #[test]
    fn test_text_body_decodes_to_string() {
        let decoded = decode_body(b"hello", None, Some("text/plain"));

        assert_eq!(decoded.text, "hello");
        assert!(!decoded.base64_encoded);
        assert!(!decoded.warning);
        assert_eq!(decoded.decoded_len, 5);
    }

    #[test]
    fn test_gzipped_text_reports_decompressed_length() {
        let payload = "x".repeat(300);
        let wire = gzip(payload.as_bytes());
        let decoded = decode_body(&wire, Some("gzip"), Some("text/plain"));

        assert_eq!(decoded.text, payload);
        assert_eq!(decoded.decoded_len, 300);
    }

    #[test]
    fn test_binary_mime_becomes_base64() {
        let decoded = decode_body(&[0x89, 0x50, 0x4e, 0x47], None, Some("image/png"));

        assert!(decoded.base64_encoded);
        assert!(!decoded.warning);
        assert_eq!(decoded.text, B64.encode([0x89, 0x50, 0x4e, 0x47]));
    }

    #[test]
    fn test_corrupt_gzip_degrades_to_base64() {
        let decoded = decode_body(b"not gzip at all", Some("gzip"), Some("text/plain"));

        assert!(decoded.base64_encoded);
        assert!(decoded.warning);
        assert_eq!(decoded.text, B64.encode(b"not gzip at all"));
    }

    #[test]
    fn test_charset_parameter_is_honored() {
        // "héllo" in latin-1.
        let latin1 = [0x68, 0xe9, 0x6c, 0x6c, 0x6f];
        let decoded = decode_body(&latin1, None, Some("text/plain; charset=iso-8859-1"));

        assert_eq!(decoded.text, "héllo");
        assert!(!decoded.base64_encoded);
    }

    #[test]
    fn test_mime_essence_strips_parameters() {
        assert_eq!(mime_essence("text/HTML; charset=utf-8"), "text/html");
        assert_eq!(mime_essence("application/json"), "application/json");
    }
}
