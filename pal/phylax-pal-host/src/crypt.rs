//! Software crypto primitives (RustCrypto)
//!
//! AES-128-CCM with the wire protocol's 8-byte nonce and tag, the
//! TLS 1.2 PRF, SHA-256, and ES-256 manifest signing. RSA signing is
//! declared but not carried by this implementation; requesting it
//! surfaces `FeatureUnavailable`.

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::U8;
use ccm::Ccm;
use hmac::{Hmac, Mac};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use phylax_pal::crypt::{
    CryptError, CryptOps, SignAlgorithm, SignError, SignOps, AES128_KEY_LEN, CCM_NONCE_LEN,
    CCM_TAG_LEN, SHA256_LEN,
};

/// AES-128-CCM with 8-byte tag and 8-byte nonce
type Aes128Ccm8 = Ccm<Aes128, U8, U8>;

type HmacSha256 = Hmac<Sha256>;

/// Software implementation of [`CryptOps`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftCrypt;

impl SoftCrypt {
    pub fn new() -> Self {
        Self
    }
}

impl CryptOps for SoftCrypt {
    fn encrypt_aes128_ccm(
        &mut self,
        key: &[u8; AES128_KEY_LEN],
        nonce: &[u8; CCM_NONCE_LEN],
        associated_data: &[u8],
        plaintext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, CryptError> {
        let total = plaintext.len() + CCM_TAG_LEN;
        if out.len() < total {
            return Err(CryptError::BufferTooSmall);
        }

        let cipher = Aes128Ccm8::new(GenericArray::from_slice(key));
        out[..plaintext.len()].copy_from_slice(plaintext);
        let tag = cipher
            .encrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                associated_data,
                &mut out[..plaintext.len()],
            )
            .map_err(|_| CryptError::BadParameter)?;
        out[plaintext.len()..total].copy_from_slice(&tag);
        Ok(total)
    }

    fn decrypt_aes128_ccm(
        &mut self,
        key: &[u8; AES128_KEY_LEN],
        nonce: &[u8; CCM_NONCE_LEN],
        associated_data: &[u8],
        ciphertext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, CryptError> {
        if ciphertext.len() < CCM_TAG_LEN {
            return Err(CryptError::BadParameter);
        }
        let plain_len = ciphertext.len() - CCM_TAG_LEN;
        if out.len() < plain_len {
            return Err(CryptError::BufferTooSmall);
        }

        let cipher = Aes128Ccm8::new(GenericArray::from_slice(key));
        let (body, tag) = ciphertext.split_at(plain_len);
        out[..plain_len].copy_from_slice(body);
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                associated_data,
                &mut out[..plain_len],
                GenericArray::from_slice(tag),
            )
            .map_err(|_| {
                // Leave no partial plaintext behind on a tag failure
                out[..plain_len].zeroize();
                CryptError::MacMismatch
            })?;
        Ok(plain_len)
    }

    fn tls_prf_sha256(
        &mut self,
        secret: &[u8],
        label: &[u8],
        seed: &[u8],
        out: &mut [u8],
    ) -> Result<(), CryptError> {
        // P_SHA256(secret, label ‖ seed) per RFC 5246 §5
        let mut label_seed = Vec::with_capacity(label.len() + seed.len());
        label_seed.extend_from_slice(label);
        label_seed.extend_from_slice(seed);

        let mut a = hmac_sha256(secret, &[&label_seed])?;
        let mut offset = 0;
        while offset < out.len() {
            let chunk = hmac_sha256(secret, &[&a, &label_seed])?;
            let take = chunk.len().min(out.len() - offset);
            out[offset..offset + take].copy_from_slice(&chunk[..take]);
            offset += take;
            a = hmac_sha256(secret, &[&a])?;
        }
        Ok(())
    }

    fn sha256(&mut self, data: &[u8], out: &mut [u8; SHA256_LEN]) {
        out.copy_from_slice(&Sha256::digest(data));
    }
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; SHA256_LEN], CryptError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptError::BadParameter)?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; SHA256_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// ES-256 software signer for protected-update manifests
pub struct SoftSigner {
    key: SigningKey,
}

impl SoftSigner {
    /// Build a signer from a raw P-256 scalar (32 bytes)
    pub fn from_secret_scalar(scalar: &[u8; 32]) -> Result<Self, SignError> {
        let key = SigningKey::from_slice(scalar).map_err(|_| SignError::BadKey)?;
        Ok(Self { key })
    }

    /// The corresponding public key, SEC1 uncompressed
    pub fn public_key(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }
}

impl SignOps for SoftSigner {
    fn sign(
        &mut self,
        algorithm: SignAlgorithm,
        message: &[u8],
        out: &mut [u8],
    ) -> Result<usize, SignError> {
        match algorithm {
            SignAlgorithm::Es256 => {
                let signature: Signature = self.key.sign(message);
                let raw = signature.to_bytes();
                if out.len() < raw.len() {
                    return Err(SignError::BufferTooSmall);
                }
                out[..raw.len()].copy_from_slice(&raw);
                Ok(raw.len())
            }
            SignAlgorithm::RsaSsaPkcs1Sha256 => Err(SignError::FeatureUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [0x42; 16];
    const NONCE: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

    #[test]
    fn ccm_seal_open_roundtrip() {
        let mut crypt = SoftCrypt::new();
        let plaintext = b"shielded payload";
        let ad = [0x23, 0, 0, 0, 1, 1, 0, 16];

        let mut sealed = [0u8; 64];
        let n = crypt
            .encrypt_aes128_ccm(&KEY, &NONCE, &ad, plaintext, &mut sealed)
            .unwrap();
        assert_eq!(n, plaintext.len() + CCM_TAG_LEN);

        let mut opened = [0u8; 64];
        let m = crypt
            .decrypt_aes128_ccm(&KEY, &NONCE, &ad, &sealed[..n], &mut opened)
            .unwrap();
        assert_eq!(&opened[..m], plaintext);
    }

    #[test]
    fn ccm_detects_any_single_bit_flip() {
        let mut crypt = SoftCrypt::new();
        let plaintext = b"integrity";
        let ad = [0u8; 8];

        let mut sealed = [0u8; 32];
        let n = crypt
            .encrypt_aes128_ccm(&KEY, &NONCE, &ad, plaintext, &mut sealed)
            .unwrap();

        for byte in 0..n {
            for bit in 0..8 {
                let mut tampered = sealed;
                tampered[byte] ^= 1 << bit;
                let mut out = [0u8; 32];
                let result =
                    crypt.decrypt_aes128_ccm(&KEY, &NONCE, &ad, &tampered[..n], &mut out);
                assert_eq!(result, Err(CryptError::MacMismatch));
            }
        }
    }

    #[test]
    fn ccm_binds_associated_data() {
        let mut crypt = SoftCrypt::new();
        let mut sealed = [0u8; 32];
        let n = crypt
            .encrypt_aes128_ccm(&KEY, &NONCE, &[1, 2, 3], b"data", &mut sealed)
            .unwrap();

        let mut out = [0u8; 32];
        let result = crypt.decrypt_aes128_ccm(&KEY, &NONCE, &[9, 9, 9], &sealed[..n], &mut out);
        assert_eq!(result, Err(CryptError::MacMismatch));
    }

    #[test]
    fn tls_prf_matches_rfc_style_vector() {
        // Self-consistency: output must be deterministic and length-exact
        let mut crypt = SoftCrypt::new();
        let mut a = [0u8; 40];
        let mut b = [0u8; 40];
        crypt
            .tls_prf_sha256(b"secret", b"Platform Binding", b"seed", &mut a)
            .unwrap();
        crypt
            .tls_prf_sha256(b"secret", b"Platform Binding", b"seed", &mut b)
            .unwrap();
        assert_eq!(a, b);

        let mut c = [0u8; 40];
        crypt
            .tls_prf_sha256(b"secret", b"Platform Binding", b"other seed", &mut c)
            .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn tls_prf_prefix_stability() {
        // P_SHA256 is a stream: a shorter read is a prefix of a longer one
        let mut crypt = SoftCrypt::new();
        let mut short = [0u8; 16];
        let mut long = [0u8; 48];
        crypt
            .tls_prf_sha256(b"s", b"l", b"x", &mut short)
            .unwrap();
        crypt.tls_prf_sha256(b"s", b"l", b"x", &mut long).unwrap();
        assert_eq!(short, long[..16]);
    }

    #[test]
    fn es256_signature_is_raw_64_bytes() {
        let scalar = [7u8; 32];
        let mut signer = SoftSigner::from_secret_scalar(&scalar).unwrap();
        let mut out = [0u8; 64];
        let n = signer
            .sign(SignAlgorithm::Es256, b"manifest digest", &mut out)
            .unwrap();
        assert_eq!(n, 64);
    }

    #[test]
    fn rsa_signing_is_unavailable() {
        let scalar = [7u8; 32];
        let mut signer = SoftSigner::from_secret_scalar(&scalar).unwrap();
        let mut out = [0u8; 256];
        assert_eq!(
            signer.sign(SignAlgorithm::RsaSsaPkcs1Sha256, b"x", &mut out),
            Err(SignError::FeatureUnavailable)
        );
    }
}
