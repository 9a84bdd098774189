//! Crypto primitive abstraction
//!
//! The stack consumes these as fixed-function collaborators; it never
//! implements a primitive itself. The shielded channel needs AES-128-CCM
//! with an 8-byte tag plus the TLS 1.2 PRF, the update builder adds
//! digest signing.

/// AES-128 key length in bytes
pub const AES128_KEY_LEN: usize = 16;

/// CCM tag length used by the wire protocol
pub const CCM_TAG_LEN: usize = 8;

/// CCM nonce length used by the wire protocol
pub const CCM_NONCE_LEN: usize = 8;

/// SHA-256 digest length
pub const SHA256_LEN: usize = 32;

/// Errors from symmetric crypto operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CryptError {
    /// Authentication tag did not verify
    MacMismatch,
    /// Output buffer too small for the result
    BufferTooSmall,
    /// Parameter outside the primitive's limits
    BadParameter,
}

/// Symmetric primitives for the shielded connection
pub trait CryptOps {
    /// AES-128-CCM seal: writes ciphertext ‖ tag into `out`, returning the
    /// written length (`plaintext.len() + CCM_TAG_LEN`).
    fn encrypt_aes128_ccm(
        &mut self,
        key: &[u8; AES128_KEY_LEN],
        nonce: &[u8; CCM_NONCE_LEN],
        associated_data: &[u8],
        plaintext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, CryptError>;

    /// AES-128-CCM open: verifies the trailing tag and writes the
    /// plaintext into `out`, returning the written length.
    ///
    /// Must fail with [`CryptError::MacMismatch`] on any tag or ciphertext
    /// tamper; `out` contents are unspecified on failure.
    fn decrypt_aes128_ccm(
        &mut self,
        key: &[u8; AES128_KEY_LEN],
        nonce: &[u8; CCM_NONCE_LEN],
        associated_data: &[u8],
        ciphertext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, CryptError>;

    /// TLS 1.2 PRF with SHA-256 (P_SHA256), filling `out` completely
    fn tls_prf_sha256(
        &mut self,
        secret: &[u8],
        label: &[u8],
        seed: &[u8],
        out: &mut [u8],
    ) -> Result<(), CryptError>;

    /// One-shot SHA-256
    fn sha256(&mut self, data: &[u8], out: &mut [u8; SHA256_LEN]);
}

/// Signature scheme for protected-update manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignAlgorithm {
    /// ECDSA P-256 with SHA-256, raw r ‖ s output (64 bytes)
    Es256,
    /// RSASSA-PKCS1-v1.5 with SHA-256
    RsaSsaPkcs1Sha256,
}

impl SignAlgorithm {
    /// Length of a signature produced by this scheme, in bytes
    pub fn signature_len(self) -> usize {
        match self {
            SignAlgorithm::Es256 => 64,
            SignAlgorithm::RsaSsaPkcs1Sha256 => 256,
        }
    }
}

/// Errors from signing operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignError {
    /// The implementation does not support the requested algorithm
    FeatureUnavailable,
    /// Key material rejected by the implementation
    BadKey,
    /// Output buffer too small for the signature
    BufferTooSmall,
    /// The primitive failed internally
    Failure,
}

/// Digest signing for protected-update manifests
pub trait SignOps {
    /// Sign `message` with the held key under `algorithm`, writing the
    /// signature into `out` and returning its length.
    ///
    /// ES-256 output is raw r ‖ s (not DER). Implementations lacking an
    /// algorithm return [`SignError::FeatureUnavailable`].
    fn sign(
        &mut self,
        algorithm: SignAlgorithm,
        message: &[u8],
        out: &mut [u8],
    ) -> Result<usize, SignError>;
}
