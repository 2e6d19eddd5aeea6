// HLS Decryption: fetching AES-128 keys and decrypting segments.

use std::collections::HashMap;

use aes::Aes128;
use bytes::Bytes;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use tracing::debug;
use url::Url;

use crate::error::TransferError;
use crate::hls::manifest::SegmentPlan;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::source::ByteSource;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Parse a hex IV attribute (`0x` prefix optional).
pub fn parse_iv(iv_hex_str: &str) -> Result<[u8; 16], String> {
    let iv_str = iv_hex_str
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let mut iv_bytes = [0u8; 16];
    hex::decode_to_slice(iv_str, &mut iv_bytes)
        .map_err(|e| format!("failed to parse IV '{iv_hex_str}': {e}"))?;
    Ok(iv_bytes)
}

/// IV implied by a media sequence number when the key carries none.
pub fn sequence_iv(sequence: u64) -> [u8; 16] {
    u128::from(sequence).to_be_bytes()
}

/// Keys of one transfer, fetched once per distinct URI.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: HashMap<Url, [u8; 16]>,
}

impl KeyStore {
    pub fn get(&self, uri: &Url) -> Result<&[u8; 16], TransferError> {
        self.keys.get(uri).ok_or_else(|| TransferError::KeyFetch {
            uri: uri.to_string(),
            reason: "key was not fetched".to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Fetch every key referenced by `plan`.
pub async fn fetch_keys(
    source: &dyn ByteSource,
    plan: &SegmentPlan,
    retry: &RetryPolicy,
) -> Result<KeyStore, TransferError> {
    let mut store = KeyStore::default();
    for uri in plan.key_uris() {
        let data = retry_with_backoff(retry, "key", |_| source.fetch(uri, None))
            .await
            .map_err(|e| TransferError::KeyFetch {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;
        // AES-128 keys are 16 bytes
        let key: [u8; 16] = data
            .as_ref()
            .try_into()
            .map_err(|_| TransferError::KeyFetch {
                uri: uri.to_string(),
                reason: format!("incorrect key length: {} bytes (expected 16)", data.len()),
            })?;
        debug!(uri = %uri, "fetched decryption key");
        store.keys.insert(uri.clone(), key);
    }
    Ok(store)
}

/// Offloads CPU-bound decryption to the blocking thread pool.
#[derive(Debug, Clone, Copy)]
pub struct DecryptionOffloader {
    enabled: bool,
}

impl DecryptionOffloader {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Decrypt segment `index`, optionally on the blocking thread pool.
    pub async fn decrypt(
        &self,
        index: usize,
        data: Bytes,
        key: &[u8; 16],
        iv: &[u8; 16],
    ) -> Result<Bytes, TransferError> {
        if !self.enabled {
            return Self::decrypt_sync(index, data, key, iv);
        }
        let key = *key;
        let iv = *iv;
        tokio::task::spawn_blocking(move || Self::decrypt_sync(index, data, &key, &iv))
            .await
            .map_err(|e| TransferError::Decryption {
                index,
                reason: format!("decryption task failed: {e}"),
            })?
    }

    pub fn decrypt_sync(
        index: usize,
        data: Bytes,
        key: &[u8; 16],
        iv: &[u8; 16],
    ) -> Result<Bytes, TransferError> {
        let mut buffer = data.to_vec();
        let cipher =
            Aes128CbcDec::new_from_slices(key, iv).map_err(|_| TransferError::Decryption {
                index,
                reason: "failed to initialize AES decryptor".to_string(),
            })?;
        let decrypted_len = cipher
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map_err(|_| TransferError::Decryption {
                index,
                reason: format!("invalid ciphertext or padding ({} bytes)", data.len()),
            })?
            .len();
        buffer.truncate(decrypted_len);
        Ok(Bytes::from(buffer))
    }
}
