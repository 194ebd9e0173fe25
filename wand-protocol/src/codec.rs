//! Raw UTF-8 text codec
//!
//! There is no framing on the wire: every decode yields whatever text the
//! buffered bytes complete. A multi-byte character split across two reads
//! stays in the buffer until its remaining bytes arrive.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec for outbound commands and inbound text
#[derive(Debug, Default)]
pub struct TextCodec;

impl TextCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode every complete character in `src`, leaving an incomplete
    /// trailing sequence (at most three bytes) in place.
    fn decode_complete(&mut self, src: &mut BytesMut) -> String {
        let mut text = String::new();

        while !src.is_empty() {
            match std::str::from_utf8(&src[..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    src.clear();
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&src[..valid_up_to]));

                    match err.error_len() {
                        Some(invalid_len) => {
                            tracing::warn!(
                                invalid_len,
                                offset = valid_up_to,
                                "Replacing invalid UTF-8 sequence in server output"
                            );
                            text.push(char::REPLACEMENT_CHARACTER);
                            src.advance(valid_up_to + invalid_len);
                        }
                        None => {
                            src.advance(valid_up_to);
                            break;
                        }
                    }
                }
            }
        }

        text
    }
}

impl Decoder for TextCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let text = self.decode_complete(src);
        Ok((!text.is_empty()).then_some(text))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut text = self.decode_complete(src);

        // The stream ended inside a multi-byte character
        if !src.is_empty() {
            tracing::warn!(
                dangling = src.len(),
                "Server output ended inside a UTF-8 sequence"
            );
            text.push(char::REPLACEMENT_CHARACTER);
            src.clear();
        }

        Ok((!text.is_empty()).then_some(text))
    }
}

impl Encoder<&str> for TextCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}
