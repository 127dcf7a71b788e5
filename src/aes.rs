// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Key material, the part cipher seam, and its AES-128-CBC implementation.

use crate::{Error, Result};
use aes::{
    cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit},
    Aes128,
};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub(crate) const KEY_SIZE: usize = 16;
pub(crate) const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;
/// Length of the derived checksum token before hex encoding.
pub(crate) const CHECKSUM_SIZE: usize = 32;

struct Key([u8; KEY_SIZE]);
struct Iv([u8; IV_SIZE]);

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Iv {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Package-level key material shared by every part of every file in a package.
///
/// Built once per retrieval from the server secret followed by the key code.
#[derive(Clone)]
pub struct DecryptionKey(Vec<u8>);

impl DecryptionKey {
    /// Concatenates the two package secrets.
    pub fn new(server_secret: &str, key_code: &str) -> Self {
        let mut material = Vec::with_capacity(server_secret.len() + key_code.len());
        material.extend_from_slice(server_secret.as_bytes());
        material.extend_from_slice(key_code.as_bytes());
        Self(material)
    }

    /// Raw key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "DecryptionKey(<{} bytes>)", self.0.len())
    }
}

/// The cryptographic primitives the engine depends on.
///
/// `derive_checksum` is expensive (its cost grows with `iterations`) and is called once per
/// retrieval; `decrypt` is called once per part, concurrently from several workers.
pub trait PartCipher: Send + Sync {
    /// Derives the token that authorises part requests for a package.
    fn derive_checksum(&self, key_code: &str, package_code: &str, iterations: u32)
        -> Result<String>;

    /// Decrypts one part. Wrong keys and corrupt input fail with [`Error::Decryption`].
    fn decrypt(&self, ciphertext: &[u8], key: &DecryptionKey) -> Result<Bytes>;

    /// Upper bound on the encrypted size of a part holding `plaintext_len` bytes, used to size
    /// part buffers. Implementations saturate rather than overflow.
    fn ciphertext_len(&self, plaintext_len: usize) -> usize {
        plaintext_len
    }
}

impl<C: PartCipher + ?Sized> PartCipher for &C {
    fn derive_checksum(
        &self,
        key_code: &str,
        package_code: &str,
        iterations: u32,
    ) -> Result<String> {
        (**self).derive_checksum(key_code, package_code, iterations)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &DecryptionKey) -> Result<Bytes> {
        (**self).decrypt(ciphertext, key)
    }

    fn ciphertext_len(&self, plaintext_len: usize) -> usize {
        (**self).ciphertext_len(plaintext_len)
    }
}

impl<C: PartCipher + ?Sized> PartCipher for Arc<C> {
    fn derive_checksum(
        &self,
        key_code: &str,
        package_code: &str,
        iterations: u32,
    ) -> Result<String> {
        (**self).derive_checksum(key_code, package_code, iterations)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &DecryptionKey) -> Result<Bytes> {
        (**self).decrypt(ciphertext, key)
    }

    fn ciphertext_len(&self, plaintext_len: usize) -> usize {
        (**self).ciphertext_len(plaintext_len)
    }
}

/// AES-128-CBC with PKCS#7 padding; each part carries its own random IV as a 16 byte prefix.
///
/// The cipher key is the first 16 bytes of SHA-256 over the [`DecryptionKey`] material and the
/// checksum token is PBKDF2-HMAC-SHA256 of the key code salted with the package code.
#[derive(Clone, Copy, Debug, Default)]
pub struct AesPartCipher;

impl AesPartCipher {
    /// Encrypts one part under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8], key: &DecryptionKey) -> Result<Bytes> {
        let iv = Iv(rand::random());
        let cipher = Aes128CbcEnc::new(cipher_key(key).as_ref().into(), iv.as_ref().into());
        let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut content = Vec::with_capacity(IV_SIZE + encrypted.len());
        content.extend_from_slice(iv.as_ref());
        content.extend_from_slice(&encrypted);
        Ok(Bytes::from(content))
    }
}

impl PartCipher for AesPartCipher {
    fn derive_checksum(
        &self,
        key_code: &str,
        package_code: &str,
        iterations: u32,
    ) -> Result<String> {
        if iterations == 0 {
            return Err(Error::InvalidArgument(
                "checksum derivation needs at least one iteration".to_string(),
            ));
        }
        let mut token = [0u8; CHECKSUM_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            key_code.as_bytes(),
            package_code.as_bytes(),
            iterations,
            &mut token,
        );
        Ok(hex::encode(token))
    }

    fn decrypt(&self, ciphertext: &[u8], key: &DecryptionKey) -> Result<Bytes> {
        if ciphertext.len() < IV_SIZE {
            return Err(Error::Decryption(format!(
                "part of {} bytes is shorter than its IV",
                ciphertext.len()
            )));
        }
        let (iv, body) = ciphertext.split_at(IV_SIZE);
        let cipher = Aes128CbcDec::new(cipher_key(key).as_ref().into(), iv.into());
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map(Bytes::from)
            .map_err(|e| Error::Decryption(format!("Decrypt failed with {e}")))
    }

    fn ciphertext_len(&self, plaintext_len: usize) -> usize {
        // PKCS#7 always adds between 1 and a full block of padding.
        (plaintext_len / BLOCK_SIZE + 1)
            .saturating_mul(BLOCK_SIZE)
            .saturating_add(IV_SIZE)
    }
}

fn cipher_key(key: &DecryptionKey) -> Key {
    let digest = Sha256::digest(key.as_bytes());
    let mut cipher_key = [0u8; KEY_SIZE];
    cipher_key.copy_from_slice(&digest[..KEY_SIZE]);
    Key(cipher_key)
}
