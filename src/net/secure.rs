//! HAP (`HomeKit` Accessory Protocol) frame codec
//!
//! After a successful pair-verify, every byte on the connection travels in
//! ChaCha20-Poly1305 sealed blocks: a 2-byte little-endian length (also used
//! as AAD), at most 1024 bytes of ciphertext and a 16-byte tag.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, Key, KeyInit, Nonce, Tag};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::AirPlayError;

const MAX_BLOCK_LENGTH: usize = 1024;
const LENGTH_LENGTH: usize = 2;
const TAG_LENGTH: usize = 16;

/// Keys established by pair-verify
#[derive(Clone)]
pub struct SessionKeys {
    /// Key for data we send
    pub output_key: [u8; 32],
    /// Key for data we receive
    pub input_key: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys { .. }")
    }
}

/// Codec sealing outgoing data and opening incoming HAP blocks
pub struct HapFrameCodec {
    encrypt_cipher: ChaCha20Poly1305,
    decrypt_cipher: ChaCha20Poly1305,
    encrypt_count: u64,
    decrypt_count: u64,
}

impl HapFrameCodec {
    /// Create a codec from session keys
    #[must_use]
    pub fn new(keys: &SessionKeys) -> Self {
        Self {
            encrypt_cipher: ChaCha20Poly1305::new(Key::from_slice(&keys.output_key)),
            decrypt_cipher: ChaCha20Poly1305::new(Key::from_slice(&keys.input_key)),
            encrypt_count: 0,
            decrypt_count: 0,
        }
    }

    fn nonce(counter: u64) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&counter.to_le_bytes());
        nonce
    }
}

impl Encoder<Bytes> for HapFrameCodec {
    type Error = AirPlayError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + (item.len() / MAX_BLOCK_LENGTH + 1) * (LENGTH_LENGTH + TAG_LENGTH));

        for chunk in item.chunks(MAX_BLOCK_LENGTH) {
            // chunks() never yields more than MAX_BLOCK_LENGTH bytes
            #[allow(clippy::cast_possible_truncation)]
            let len_bytes = (chunk.len() as u16).to_le_bytes();
            let nonce = Self::nonce(self.encrypt_count);

            let mut buffer = chunk.to_vec();
            let tag = self
                .encrypt_cipher
                .encrypt_in_place_detached(Nonce::from_slice(&nonce), &len_bytes, &mut buffer)
                .map_err(|_| AirPlayError::CodecError {
                    message: "HAP block encryption failed".to_string(),
                })?;

            dst.put_slice(&len_bytes);
            dst.put_slice(&buffer);
            dst.put_slice(tag.as_slice());

            self.encrypt_count += 1;
        }

        Ok(())
    }
}

impl Decoder for HapFrameCodec {
    type Item = Bytes;
    type Error = AirPlayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_LENGTH {
            return Ok(None);
        }

        let len = usize::from(u16::from_le_bytes([src[0], src[1]]));
        if len > MAX_BLOCK_LENGTH {
            return Err(AirPlayError::CodecError {
                message: format!("HAP block of {len} bytes exceeds {MAX_BLOCK_LENGTH}"),
            });
        }

        let frame_len = LENGTH_LENGTH + len + TAG_LENGTH;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        let aad = [frame[0], frame[1]];
        frame.advance(LENGTH_LENGTH);
        let tag_bytes = frame.split_off(len);
        let nonce = Self::nonce(self.decrypt_count);

        self.decrypt_cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                &aad,
                &mut frame,
                Tag::from_slice(&tag_bytes),
            )
            .map_err(|_| AirPlayError::AuthenticationFailed {
                message: "HAP block authentication failed".to_string(),
                recoverable: false,
            })?;

        self.decrypt_count += 1;
        Ok(Some(frame.freeze()))
    }
}
