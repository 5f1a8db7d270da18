//! Double AES-256-CBC encryption for patient data.
//!
//! Each pass uses its own 32-byte key with the first 16 bytes of that key as
//! the IV and PKCS#7 padding. The inner ciphertext is base64-encoded before
//! the outer pass so that the final value is
//! `base64(CBC(k2, base64(CBC(k1, plaintext))))`. The browser client
//! produces the same layout, so ciphertexts move between the two freely.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key must be base64 that decodes to 32 bytes")]
    InvalidKey,
    #[error("ciphertext is not valid base64")]
    InvalidBase64,
    #[error("ciphertext has invalid padding")]
    InvalidPadding,
    #[error("decrypted data is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Clone)]
struct CbcKey([u8; KEY_LEN]);

impl CbcKey {
    fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey)?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(key))
    }

    fn iv(&self) -> &[u8] {
        &self.0[..IV_LEN]
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher =
            Aes256CbcEnc::new_from_slices(&self.0, self.iv()).map_err(|_| CryptoError::InvalidKey)?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher =
            Aes256CbcDec::new_from_slices(&self.0, self.iv()).map_err(|_| CryptoError::InvalidKey)?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::InvalidPadding)
    }
}

/// Encrypt-then-encrypt cipher used for patient fields and browser payloads.
#[derive(Clone)]
pub struct DoubleCipher {
    inner: CbcKey,
    outer: CbcKey,
}

impl std::fmt::Debug for DoubleCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoubleCipher").finish_non_exhaustive()
    }
}

impl DoubleCipher {
    /// Builds the cipher from two base64 keys; `key1` is applied first.
    pub fn from_base64_keys(key1: &str, key2: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            inner: CbcKey::from_base64(key1)?,
            outer: CbcKey::from_base64(key2)?,
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let first = STANDARD.encode(self.inner.encrypt(plaintext.as_bytes())?);
        Ok(STANDARD.encode(self.outer.encrypt(first.as_bytes())?))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let outer = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CryptoError::InvalidBase64)?;
        let first = self.outer.decrypt(&outer)?;
        let inner = STANDARD
            .decode(&first)
            .map_err(|_| CryptoError::InvalidBase64)?;
        let plain = self.inner.decrypt(&inner)?;
        String::from_utf8(plain).map_err(|_| CryptoError::InvalidUtf8)
    }

    /// Encrypts an optional field, keeping `None` and empty values as they are.
    pub fn encrypt_optional(&self, value: Option<&str>) -> Result<Option<String>, CryptoError> {
        match value {
            Some(v) if !v.is_empty() => self.encrypt(v).map(Some),
            Some(v) => Ok(Some(v.to_string())),
            None => Ok(None),
        }
    }

    pub fn decrypt_optional(&self, value: Option<&str>) -> Result<Option<String>, CryptoError> {
        match value {
            Some(v) if !v.is_empty() => self.decrypt(v).map(Some),
            Some(v) => Ok(Some(v.to_string())),
            None => Ok(None),
        }
    }
}
