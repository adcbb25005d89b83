//! Symmetric protection of raw API keys.
//!
//! Payloads are `base64(IV || AES-256-CBC(raw))`; the AES key is the SHA-256 of
//! the resolved master secret. Lookup hashes are plain SHA-256 hex digests of the
//! raw key and never depend on the master secret.

pub mod secret;

pub use secret::MasterSecretSource;

use crate::{Error, Result};
use aes::Aes256;
use base64ct::{Base64, Encoding};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const IV_LEN: usize = 16;
pub const RAW_KEY_BYTES: usize = 32;

#[derive(Clone, Debug)]
pub struct CryptoVault {
    source: MasterSecretSource,
}

impl CryptoVault {
    #[must_use]
    pub fn new(source: MasterSecretSource) -> Self {
        Self { source }
    }

    #[must_use]
    pub fn source(&self) -> &MasterSecretSource {
        &self.source
    }

    /// # Errors
    /// Returns `Error::NoSecretConfigured` if neither source yields a secret.
    pub fn resolve_master_secret(&self) -> Result<&SecretString> {
        self.source.resolve()
    }

    fn cipher_key(&self) -> Result<[u8; 32]> {
        let secret = self.resolve_master_secret()?;
        Ok(Sha256::digest(secret.expose_secret().as_bytes()).into())
    }

    /// Encrypt under a fresh random IV.
    ///
    /// # Errors
    /// Returns `Error::NoSecretConfigured` if the master secret cannot be resolved.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let key = self.cipher_key()?;

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
            .map_err(|_| Error::CryptoUnavailable)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);

        Ok(Base64::encode_string(&blob))
    }

    /// # Errors
    /// Returns `Error::NoSecretConfigured` without a master secret, and
    /// `Error::DecryptionFailed` for malformed blobs, a wrong secret or non UTF-8 output.
    pub fn decrypt(&self, blob: &str) -> Result<SecretString> {
        let key = self.cipher_key()?;

        let data = Base64::decode_vec(blob).map_err(|_| Error::DecryptionFailed)?;
        if data.len() <= IV_LEN {
            return Err(Error::DecryptionFailed);
        }
        let (iv, ciphertext) = data.split_at(IV_LEN);

        let plaintext = Aes256CbcDec::new_from_slices(&key, iv)
            .map_err(|_| Error::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map(SecretString::from)
            .map_err(|_| Error::DecryptionFailed)
    }

    /// Lookup digest of a raw key.
    #[must_use]
    pub fn hash(raw: &str) -> String {
        format!("{:x}", Sha256::digest(raw.as_bytes()))
    }

    /// 32 random bytes, base64 encoded.
    #[must_use]
    pub fn generate_raw_key() -> SecretString {
        let mut bytes = [0u8; RAW_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        SecretString::from(Base64::encode_string(&bytes))
    }

    /// Display label such as `Key-Q7ZK3M`.
    #[must_use]
    pub fn generate_label() -> String {
        let suffix: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|c| char::from(c).to_ascii_uppercase())
            .collect();
        format!("Key-{suffix}")
    }
}
