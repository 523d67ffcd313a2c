use crate::{Result, XaalError, NONCE_LEN};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use tracing::debug;

pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

/// Pre-shared symmetric key, fixed for the node's lifetime.
pub struct SharedKey(Secret<[u8; KEY_LEN]>);

impl SharedKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(Secret::new(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            XaalError::Crypto(format!(
                "Invalid key length: expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::new(bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| XaalError::Config(format!("Key is not valid base64: {}", e)))?;
        let key = Self::from_slice(&bytes)
            .map_err(|_| XaalError::Config(format!("Key must be {} bytes", KEY_LEN)));
        bytes.fill(0);
        key
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0.expose_secret())
    }

    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.0.expose_secret()
    }
}

impl Clone for SharedKey {
    fn clone(&self) -> Self {
        Self::new(*self.0.expose_secret())
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey([REDACTED])")
    }
}

/// ChaCha20-Poly1305 output: ciphertext the length of the plaintext plus a
/// detached 16-byte tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl Sealed {
    /// Combined `ciphertext || tag` wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.ciphertext.len() + TAG_LEN);
        bytes.extend_from_slice(&self.ciphertext);
        bytes.extend_from_slice(&self.tag);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TAG_LEN {
            return Err(XaalError::Crypto(
                "Sealed data shorter than tag".to_string(),
            ));
        }

        let (ciphertext, tag) = bytes.split_at(bytes.len() - TAG_LEN);
        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(tag);

        Ok(Self {
            ciphertext: ciphertext.to_vec(),
            tag: tag_bytes,
        })
    }
}

fn cipher(key: &[u8], nonce: &[u8]) -> Result<ChaCha20Poly1305> {
    if nonce.len() != NONCE_LEN {
        return Err(XaalError::Crypto(format!(
            "Invalid nonce length: expected {} bytes, got {}",
            NONCE_LEN,
            nonce.len()
        )));
    }

    ChaCha20Poly1305::new_from_slice(key).map_err(|_| {
        XaalError::Crypto(format!(
            "Invalid key length: expected {} bytes, got {}",
            KEY_LEN,
            key.len()
        ))
    })
}

/// Authenticated-encrypts `plaintext` (IETF ChaCha20-Poly1305, 96-bit nonce).
pub fn seal(key: &[u8], nonce: &[u8], associated_data: &[u8], plaintext: &[u8]) -> Result<Sealed> {
    let cipher = cipher(key, nonce)?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), associated_data, &mut buffer)
        .map_err(|e| XaalError::Crypto(format!("Encryption failed: {}", e)))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    debug!("Sealed {} bytes", plaintext.len());
    Ok(Sealed {
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Verifies and decrypts a sealed envelope. Nodes only publish; this is the
/// check used by tests and diagnostics.
pub fn open(
    key: &[u8],
    nonce: &[u8],
    associated_data: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>> {
    let cipher = cipher(key, nonce)?;

    if tag.len() != TAG_LEN {
        return Err(XaalError::Crypto(format!(
            "Invalid tag length: expected {} bytes, got {}",
            TAG_LEN,
            tag.len()
        )));
    }

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            associated_data,
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|e| XaalError::Crypto(format!("Decryption failed: {}", e)))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::make_nonce;

    const KEY: [u8; KEY_LEN] = [7u8; KEY_LEN];

    #[test]
    fn test_seal_open_round_trip_all_lengths() {
        let nonce = make_nonce(1_000_000, 0);
        for len in 0..=1000 {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let sealed = seal(&KEY, &nonce, b"", &plaintext).unwrap();
            assert_eq!(sealed.ciphertext.len(), plaintext.len());

            let opened = open(&KEY, &nonce, b"", &sealed.ciphertext, &sealed.tag).unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn test_tag_tamper_detected() {
        let nonce = make_nonce(1_000_000, 1);
        let sealed = seal(&KEY, &nonce, b"", b"{\"body\":{}}").unwrap();

        for byte in 0..TAG_LEN {
            for bit in 0..8 {
                let mut tag = sealed.tag;
                tag[byte] ^= 1 << bit;
                assert!(open(&KEY, &nonce, b"", &sealed.ciphertext, &tag).is_err());
            }
        }
    }

    #[test]
    fn test_ciphertext_tamper_detected() {
        let nonce = make_nonce(1_000_000, 2);
        let plaintext = vec![0x42u8; 200];
        let sealed = seal(&KEY, &nonce, b"", &plaintext).unwrap();

        for byte in (0..sealed.ciphertext.len()).step_by(13) {
            let mut ciphertext = sealed.ciphertext.clone();
            ciphertext[byte] ^= 0x01 << (byte % 8);
            assert!(open(&KEY, &nonce, b"", &ciphertext, &sealed.tag).is_err());
        }
    }

    #[test]
    fn test_associated_data_is_bound() {
        let nonce = make_nonce(1_000_000, 3);
        let sealed = seal(&KEY, &nonce, b"", b"reading").unwrap();
        assert!(open(&KEY, &nonce, b"[]", &sealed.ciphertext, &sealed.tag).is_err());
    }

    #[test]
    fn test_invalid_lengths_are_crypto_errors() {
        let nonce = make_nonce(1, 1);
        assert!(matches!(
            seal(&KEY[..31], &nonce, b"", b"x"),
            Err(XaalError::Crypto(_))
        ));
        assert!(matches!(
            seal(&KEY, &nonce[..8], b"", b"x"),
            Err(XaalError::Crypto(_))
        ));
    }

    #[test]
    fn test_sealed_bytes_split_back() {
        let nonce = make_nonce(5, 5);
        let sealed = seal(&KEY, &nonce, b"", b"hello").unwrap();
        let bytes = sealed.to_bytes();
        assert_eq!(bytes.len(), 5 + TAG_LEN);
        assert_eq!(Sealed::from_bytes(&bytes).unwrap(), sealed);
        assert!(Sealed::from_bytes(&bytes[..4]).is_err());
    }

    #[test]
    fn test_shared_key_base64() {
        let key = SharedKey::generate();
        let restored = SharedKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.expose(), restored.expose());

        assert!(matches!(
            SharedKey::from_base64("c2hvcnQ="),
            Err(XaalError::Config(_))
        ));
        assert!(matches!(
            SharedKey::from_base64("not base64!"),
            Err(XaalError::Config(_))
        ));
        assert_eq!(format!("{:?}", key), "SharedKey([REDACTED])");
    }
}
