// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push message signing and AES-256-CBC envelope encryption.
//!
//! Plaintext layout: 16 random bytes, 4-byte big-endian message length, the
//! message, then the receiver app id. Padding is PKCS#7 over 32-byte blocks
//! and the IV is the first 16 bytes of the key.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::Rng;
use ring::digest;

use crate::error::CredentialError;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// Length of an `EncodingAESKey` (base64 of 32 bytes without the trailing `=`).
pub const AES_KEY_LEN: usize = 43;

const PAD_BLOCK: usize = 32;
const RANDOM_LEN: usize = 16;
const HEADER_LEN: usize = RANDOM_LEN + 4;

/// Keys are unpadded and may carry non-zero trailing bits.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Failure codes shared with the platform's reference implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptError {
    #[error("signature mismatch")]
    ValidateSignature,
    #[error("payload is not valid xml: {0}")]
    ParseXml(String),
    #[error("cannot compute signature")]
    ComputeSignature,
    #[error("EncodingAESKey must be {AES_KEY_LEN} base64 characters")]
    IllegalAesKey,
    #[error("receiver {actual} does not match {expected}")]
    ValidateAppId { expected: String, actual: String },
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("decrypted buffer is malformed")]
    IllegalBuffer,
    #[error("base64 encode failed")]
    EncodeBase64,
    #[error("ciphertext is not valid base64")]
    DecodeBase64,
    #[error("cannot generate reply xml")]
    GenXml,
}

impl CryptError {
    pub fn code(&self) -> i32 {
        match self {
            Self::ValidateSignature => -40001,
            Self::ParseXml(_) => -40002,
            Self::ComputeSignature => -40003,
            Self::IllegalAesKey => -40004,
            Self::ValidateAppId { .. } => -40005,
            Self::Encrypt => -40006,
            Self::Decrypt => -40007,
            Self::IllegalBuffer => -40008,
            Self::EncodeBase64 => -40009,
            Self::DecodeBase64 => -40010,
            Self::GenXml => -40011,
        }
    }
}

impl From<CryptError> for CredentialError {
    fn from(e: CryptError) -> Self {
        match e {
            CryptError::ValidateAppId { expected, actual } => {
                CredentialError::TenantMismatch { expected, actual }
            }
            other => CredentialError::Decryption { code: other.code(), reason: other.to_string() },
        }
    }
}

/// Encrypted reply ready to send back to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedReply {
    pub encrypt: String,
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
}

impl EncryptedReply {
    pub fn to_xml(&self) -> String {
        format!(
            "<xml><Encrypt><![CDATA[{}]]></Encrypt><MsgSignature><![CDATA[{}]]></MsgSignature>\
             <TimeStamp>{}</TimeStamp><Nonce><![CDATA[{}]]></Nonce></xml>",
            self.encrypt, self.msg_signature, self.timestamp, self.nonce
        )
    }
}

/// Decrypt-and-verify engine for one (token, key, receiver) triple.
pub struct MsgCrypt {
    token: String,
    key: [u8; 32],
    receive_id: String,
}

impl std::fmt::Debug for MsgCrypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgCrypt").field("receive_id", &self.receive_id).finish_non_exhaustive()
    }
}

impl MsgCrypt {
    pub fn new(token: &str, encoding_aes_key: &str, receive_id: &str) -> Result<Self, CryptError> {
        if encoding_aes_key.len() != AES_KEY_LEN {
            return Err(CryptError::IllegalAesKey);
        }
        let raw = KEY_ENGINE.decode(encoding_aes_key).map_err(|_| CryptError::IllegalAesKey)?;
        let key: [u8; 32] = raw.try_into().map_err(|_| CryptError::IllegalAesKey)?;
        Ok(Self { token: token.to_owned(), key, receive_id: receive_id.to_owned() })
    }

    /// SHA-1 over the lexically sorted `[token, timestamp, nonce, encrypt]`, hex encoded.
    pub fn signature(&self, timestamp: &str, nonce: &str, encrypt: &str) -> String {
        let mut parts = [self.token.as_str(), timestamp, nonce, encrypt];
        parts.sort_unstable();
        hex::encode(digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, parts.concat().as_bytes()))
    }

    /// Authenticate and decrypt an `Encrypt` field, returning the inner message.
    pub fn decrypt(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        encrypt: &str,
    ) -> Result<String, CryptError> {
        let expected = self.signature(timestamp, nonce, encrypt);
        if !constant_time_eq(&expected, &msg_signature.to_ascii_lowercase()) {
            return Err(CryptError::ValidateSignature);
        }

        let mut buf = STANDARD.decode(encrypt).map_err(|_| CryptError::DecodeBase64)?;
        if buf.is_empty() || buf.len() % 16 != 0 {
            return Err(CryptError::Decrypt);
        }
        let cipher = Aes256CbcDec::new_from_slices(&self.key, &self.key[..16])
            .map_err(|_| CryptError::IllegalAesKey)?;
        let plain =
            cipher.decrypt_padded_mut::<NoPadding>(&mut buf).map_err(|_| CryptError::Decrypt)?;
        let plain = strip_padding(plain);

        if plain.len() < HEADER_LEN {
            return Err(CryptError::IllegalBuffer);
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&plain[RANDOM_LEN..HEADER_LEN]);
        let end = HEADER_LEN
            .checked_add(u32::from_be_bytes(len) as usize)
            .filter(|end| *end <= plain.len())
            .ok_or(CryptError::IllegalBuffer)?;

        let message =
            String::from_utf8(plain[HEADER_LEN..end].to_vec()).map_err(|_| CryptError::IllegalBuffer)?;
        let receive_id = String::from_utf8_lossy(&plain[end..]);
        if receive_id != self.receive_id {
            return Err(CryptError::ValidateAppId {
                expected: self.receive_id.clone(),
                actual: receive_id.into_owned(),
            });
        }
        Ok(message)
    }

    /// Encrypt and sign a reply message.
    pub fn encrypt(&self, reply: &str, timestamp: &str, nonce: &str) -> Result<EncryptedReply, CryptError> {
        let mut prefix = [0u8; RANDOM_LEN];
        rand::rng().fill(&mut prefix);
        let encrypt = self.seal(&prefix, reply)?;
        Ok(EncryptedReply {
            msg_signature: self.signature(timestamp, nonce, &encrypt),
            encrypt,
            timestamp: timestamp.to_owned(),
            nonce: nonce.to_owned(),
        })
    }

    fn seal(&self, prefix: &[u8; RANDOM_LEN], message: &str) -> Result<String, CryptError> {
        let msg_len = u32::try_from(message.len()).map_err(|_| CryptError::Encrypt)?;
        let mut buf = Vec::with_capacity(HEADER_LEN + message.len() + self.receive_id.len() + PAD_BLOCK);
        buf.extend_from_slice(prefix);
        buf.extend_from_slice(&msg_len.to_be_bytes());
        buf.extend_from_slice(message.as_bytes());
        buf.extend_from_slice(self.receive_id.as_bytes());
        let pad = PAD_BLOCK - buf.len() % PAD_BLOCK;
        buf.resize(buf.len() + pad, pad as u8);

        let len = buf.len();
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &self.key[..16])
            .map_err(|_| CryptError::IllegalAesKey)?;
        let sealed =
            cipher.encrypt_padded_mut::<NoPadding>(&mut buf, len).map_err(|_| CryptError::Encrypt)?;
        Ok(STANDARD.encode(sealed))
    }
}

/// PKCS#7 over 32-byte blocks; an out-of-range pad byte leaves the buffer as is.
fn strip_padding(plain: &[u8]) -> &[u8] {
    match plain.last() {
        Some(&pad) if (1..=PAD_BLOCK as u8).contains(&pad) && (pad as usize) <= plain.len() => {
            &plain[..plain.len() - pad as usize]
        }
        _ => plain,
    }
}

/// Constant-time string comparison.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
