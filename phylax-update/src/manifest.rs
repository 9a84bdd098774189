//! Signed update manifest
//!
//! CBOR COSE_Sign1-style container: protected header naming the
//! signature algorithm, unprotected header carrying the trust anchor
//! (and confidentiality parameters when the payload is encrypted), a
//! byte-string payload describing the update target, and the signature.
//! The signature covers the payload digest, not the raw payload, so the
//! chip verifies fragments independently of the manifest.

use phylax_pal::crypt::{CryptOps, SignAlgorithm, SignError, SignOps, SHA256_LEN};
use zeroize::Zeroize;

use crate::cbor::{self, Writer};
use crate::error::DataSetError;
use crate::fragment::{create_fragments, MAX_PAYLOAD_SIZE};

/// Manifest format version understood by the chip
const MANIFEST_VERSION: u32 = 1;

/// COSE algorithm identifier for SHA-256 payload digests
const COSE_ALG_SHA256: u8 = 0x29;

/// COSE ES256 algorithm identifier (-7)
const ALG_ES256: &[u8] = &[0x26];

/// COSE RSASSA-PKCS1-v1.5-SHA256 identifier (-65539)
const ALG_RSA_SSA_SHA256: &[u8] = &[0x3A, 0x00, 0x01, 0x00, 0xA3];

/// Sig_structure prefix for ES256 ("Signature1" context)
const ES256_SIG_HEADER: &[u8] = &[
    0x84, 0x4A, 0x53, 0x69, 0x67, 0x6E, 0x61, 0x74, 0x75, 0x72, 0x65, 0x31, 0x43, 0xA1, 0x01,
    0x26, 0x40,
];

/// Sig_structure prefix for RSASSA-PKCS1-v1.5-SHA256
const RSA_SIG_HEADER: &[u8] = &[
    0x84, 0x4A, 0x53, 0x69, 0x67, 0x6E, 0x61, 0x74, 0x75, 0x72, 0x65, 0x31, 0x47, 0xA1, 0x01,
    0x3A, 0x00, 0x01, 0x00, 0xA3, 0x40,
];

/// Key-derivation identifier: TLS 1.2 PRF with SHA-256
const KDF_TLS12_PRF_SHA256: u8 = 0x01;

/// Cipher identifier: AES-128 (CCM mode, 8-byte tag)
const CIPHER_AES128: u8 = 0x81;

/// Confidentiality key material derived per update
const DERIVED_KEY_LEN: usize = 16;
const DERIVED_NONCE_LEN: usize = 8;

/// What the payload provisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    /// Arbitrary data object
    Data,
    /// Key object
    Key,
}

/// How the target object is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    /// Write at the given offset
    Write,
    /// Erase the object, then write
    EraseAndWrite,
}

impl WriteType {
    fn wire_value(self) -> u8 {
        match self {
            WriteType::Write => 0x02,
            WriteType::EraseAndWrite => 0x01,
        }
    }
}

/// Payload encryption parameters
///
/// When present, the payload is sealed before digesting and
/// fragmenting: a per-update key and nonce are derived from the update
/// shared secret with the TLS 1.2 PRF over `seed`, and the manifest
/// records the algorithm identifiers and seed so the chip can derive
/// the same key.
pub struct Confidentiality {
    /// Update shared secret provisioned in the chip
    pub secret: Vec<u8>,
    /// Public derivation seed, fresh per update
    pub seed: [u8; 32],
}

/// Manifest parameters
pub struct ManifestParams {
    pub payload_version: u16,
    pub target_oid: u16,
    pub trust_anchor_oid: u16,
    pub offset_in_oid: u16,
    pub write_type: WriteType,
    pub payload_type: PayloadType,
    pub signature_algorithm: SignAlgorithm,
    pub confidentiality: Option<Confidentiality>,
}

/// A complete provisioning artifact: manifest plus payload fragments
pub struct ProtectedUpdateDataSet {
    /// Signed CBOR manifest
    pub manifest: Vec<u8>,
    /// Wire fragments, in order
    pub fragments: Vec<Vec<u8>>,
}

impl ProtectedUpdateDataSet {
    /// Build the data set for `payload`
    ///
    /// Applies confidentiality when requested, splits the (possibly
    /// sealed) payload into fragments, and signs the manifest over its
    /// digest. Fails with [`DataSetError::BadInputData`] for oversized
    /// payloads and [`DataSetError::FeatureUnavailable`] when the
    /// signer lacks the requested algorithm.
    pub fn build(
        params: &ManifestParams,
        payload: &[u8],
        crypt: &mut impl CryptOps,
        signer: &mut impl SignOps,
    ) -> Result<Self, DataSetError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(DataSetError::BadInputData);
        }

        let processed = match &params.confidentiality {
            Some(confidentiality) => seal_payload(crypt, confidentiality, payload)?,
            None => payload.to_vec(),
        };
        if processed.len() > MAX_PAYLOAD_SIZE {
            return Err(DataSetError::BadInputData);
        }

        let fragments = create_fragments(crypt, &processed)?;
        let manifest = encode_manifest(params, &processed, crypt, signer)?;
        Ok(Self {
            manifest,
            fragments,
        })
    }
}

fn seal_payload(
    crypt: &mut impl CryptOps,
    confidentiality: &Confidentiality,
    payload: &[u8],
) -> Result<Vec<u8>, DataSetError> {
    if confidentiality.secret.is_empty() {
        return Err(DataSetError::BadInputData);
    }

    let mut derived = [0u8; DERIVED_KEY_LEN + DERIVED_NONCE_LEN];
    crypt
        .tls_prf_sha256(
            &confidentiality.secret,
            b"Confidentiality",
            &confidentiality.seed,
            &mut derived,
        )
        .map_err(|_| DataSetError::BadInputData)?;

    let mut key = [0u8; DERIVED_KEY_LEN];
    let mut nonce = [0u8; DERIVED_NONCE_LEN];
    key.copy_from_slice(&derived[..DERIVED_KEY_LEN]);
    nonce.copy_from_slice(&derived[DERIVED_KEY_LEN..]);
    derived.zeroize();

    let mut sealed = vec![0u8; payload.len() + phylax_pal::crypt::CCM_TAG_LEN];
    let written = crypt
        .encrypt_aes128_ccm(&key, &nonce, &[], payload, &mut sealed)
        .map_err(|_| DataSetError::BadInputData)?;
    key.zeroize();
    sealed.truncate(written);
    Ok(sealed)
}

fn algorithm_bytes(algorithm: SignAlgorithm) -> (&'static [u8], &'static [u8]) {
    match algorithm {
        SignAlgorithm::Es256 => (ALG_ES256, ES256_SIG_HEADER),
        SignAlgorithm::RsaSsaPkcs1Sha256 => (ALG_RSA_SSA_SHA256, RSA_SIG_HEADER),
    }
}

fn encode_manifest(
    params: &ManifestParams,
    processed_payload: &[u8],
    crypt: &mut impl CryptOps,
    signer: &mut impl SignOps,
) -> Result<Vec<u8>, DataSetError> {
    let (alg_id, sig_header) = algorithm_bytes(params.signature_algorithm);

    let mut digest = [0u8; SHA256_LEN];
    crypt.sha256(processed_payload, &mut digest);

    // Trust manifest: the inner payload byte string
    let mut payload = Writer::new();
    payload.array(6)?;
    payload.unsigned(MANIFEST_VERSION)?;
    payload.null();
    payload.null();
    payload.array(4)?;
    {
        payload.unsigned(u32::from(match params.payload_type {
            PayloadType::Data => 0u8,
            PayloadType::Key => 1u8,
        }))?;
        payload.unsigned(u32::from(params.payload_version))?;
        payload.array(2)?;
        payload.unsigned(u32::from(params.offset_in_oid))?;
        payload.unsigned(u32::from(params.write_type.wire_value()))?;
        payload.array(2)?;
        {
            // Digest fields: algorithm + payload digest
            payload.array(2)?;
            payload.unsigned(u32::from(COSE_ALG_SHA256))?;
            payload.byte_string(&digest)?;
            payload.null();
        }
    }
    payload.array(2)?;
    payload.byte_string(&[])?;
    payload.byte_string(&params.target_oid.to_be_bytes())?;
    let payload = payload.into_bytes();

    // Signature covers the Sig_structure prefix plus the encoded
    // payload byte string, never the raw update payload
    let mut to_sign = Vec::with_capacity(sig_header.len() + payload.len() + 3);
    to_sign.extend_from_slice(sig_header);
    to_sign.extend_from_slice(&cbor::byte_string_header(payload.len())?);
    to_sign.extend_from_slice(&payload);

    let mut signature = vec![0u8; params.signature_algorithm.signature_len()];
    let written = signer
        .sign(params.signature_algorithm, &to_sign, &mut signature)
        .map_err(|e| match e {
            SignError::FeatureUnavailable => DataSetError::FeatureUnavailable,
            _ => DataSetError::SignatureFailed,
        })?;
    signature.truncate(written);

    // Assemble the COSE_Sign1 container
    let mut manifest = Writer::new();
    manifest.array(4)?;

    // Protected header: {1: alg}
    manifest.byte_string_header(alg_id.len() + 2)?;
    manifest.map(1)?;
    manifest.unsigned(1)?;
    manifest.raw_slice(alg_id);

    // Unprotected header: {4: trust anchor} plus confidentiality
    // parameters when the payload is sealed
    match &params.confidentiality {
        Some(confidentiality) => {
            manifest.map(2)?;
            manifest.unsigned(4)?;
            manifest.byte_string(&params.trust_anchor_oid.to_be_bytes())?;
            manifest.unsigned(5)?;
            manifest.array(3)?;
            manifest.unsigned(u32::from(KDF_TLS12_PRF_SHA256))?;
            manifest.unsigned(u32::from(CIPHER_AES128))?;
            manifest.byte_string(&confidentiality.seed)?;
        }
        None => {
            manifest.map(1)?;
            manifest.unsigned(4)?;
            manifest.byte_string(&params.trust_anchor_oid.to_be_bytes())?;
        }
    }

    manifest.byte_string(&payload)?;
    manifest.byte_string(&signature)?;
    Ok(manifest.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylax_pal_host::{SoftCrypt, SoftSigner};

    fn params(algorithm: SignAlgorithm) -> ManifestParams {
        ManifestParams {
            payload_version: 3,
            target_oid: 0xE0E1,
            trust_anchor_oid: 0xE0E8,
            offset_in_oid: 0,
            write_type: WriteType::EraseAndWrite,
            payload_type: PayloadType::Data,
            signature_algorithm: algorithm,
            confidentiality: None,
        }
    }

    fn signer() -> SoftSigner {
        SoftSigner::from_secret_scalar(&[0x11; 32]).unwrap()
    }

    #[test]
    fn build_produces_manifest_and_fragments() {
        let mut crypt = SoftCrypt::new();
        let mut signer = signer();
        let payload: Vec<u8> = (0..700).map(|i| i as u8).collect();

        let set = ProtectedUpdateDataSet::build(
            &params(SignAlgorithm::Es256),
            &payload,
            &mut crypt,
            &mut signer,
        )
        .unwrap();

        assert_eq!(set.fragments.len(), 2);
        // COSE_Sign1 array of four items
        assert_eq!(set.manifest[0], 0x84);
        // Protected header names ES256: bstr(3) {1: -7}
        assert_eq!(&set.manifest[1..5], &[0x43, 0xA1, 0x01, 0x26]);
    }

    #[test]
    fn manifest_signature_verifies_with_es256() {
        use p256::ecdsa::signature::Verifier;
        use p256::ecdsa::{Signature, VerifyingKey};

        let mut crypt = SoftCrypt::new();
        let mut signer = signer();
        let public = signer.public_key();
        let payload = vec![0xAB; 64];

        let set = ProtectedUpdateDataSet::build(
            &params(SignAlgorithm::Es256),
            &payload,
            &mut crypt,
            &mut signer,
        )
        .unwrap();

        // Signature is the last 64 manifest bytes, preceded by its
        // byte-string header
        let sig_bytes = &set.manifest[set.manifest.len() - 64..];
        assert_eq!(set.manifest[set.manifest.len() - 66..][..2], [0x58, 0x40]);

        // Reconstruct the signed bytes: Sig_structure prefix + encoded
        // payload byte string. Layout: 0x84, protected bstr (4 bytes
        // for ES256), unprotected map A1 04 42 oid oid (5 bytes).
        let payload_start = 1 + 4 + 5;
        let inner = &set.manifest[payload_start..set.manifest.len() - 66];
        let mut to_sign = Vec::new();
        to_sign.extend_from_slice(ES256_SIG_HEADER);
        to_sign.extend_from_slice(inner);

        let key = VerifyingKey::from_sec1_bytes(&public).unwrap();
        let signature = Signature::from_slice(sig_bytes).unwrap();
        key.verify(&to_sign, &signature).unwrap();
    }

    #[test]
    fn rsa_surfaces_feature_unavailable() {
        let mut crypt = SoftCrypt::new();
        let mut signer = signer();
        let result = ProtectedUpdateDataSet::build(
            &params(SignAlgorithm::RsaSsaPkcs1Sha256),
            &[1, 2, 3],
            &mut crypt,
            &mut signer,
        );
        assert_eq!(result.err(), Some(DataSetError::FeatureUnavailable));
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut crypt = SoftCrypt::new();
        let mut signer = signer();
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let result = ProtectedUpdateDataSet::build(
            &params(SignAlgorithm::Es256),
            &payload,
            &mut crypt,
            &mut signer,
        );
        assert_eq!(result.err(), Some(DataSetError::BadInputData));
    }

    #[test]
    fn confidential_payload_is_sealed_and_recorded() {
        let mut crypt = SoftCrypt::new();
        let mut signer = signer();
        let mut p = params(SignAlgorithm::Es256);
        p.confidentiality = Some(Confidentiality {
            secret: vec![0x5A; 32],
            seed: [0x0F; 32],
        });
        let payload = vec![0x77; 100];

        let set = ProtectedUpdateDataSet::build(&p, &payload, &mut crypt, &mut signer).unwrap();

        // Sealed payload grows by the CCM tag; one fragment carries it
        assert_eq!(set.fragments.len(), 1);
        let body_len = set.fragments[0].len() - FRAGMENT_DIGEST_OVERHEAD;
        assert_eq!(body_len, payload.len() + 8);

        // Unprotected header is a two-entry map carrying the KDF,
        // cipher and seed; it follows the 4-byte protected header
        let unprotected_start = 1 + 4;
        assert_eq!(set.manifest[unprotected_start], 0xA2);

        // The sealed bytes are not the plaintext
        let body = &set.fragments[0][2..2 + payload.len()];
        assert_ne!(body, payload.as_slice());
    }

    const FRAGMENT_DIGEST_OVERHEAD: usize =
        crate::fragment::FRAGMENT_NUMBER_LENGTH + crate::fragment::FRAGMENT_DIGEST_LENGTH;

    #[test]
    fn payload_digest_is_bound_into_manifest() {
        let mut crypt = SoftCrypt::new();
        let mut signer = signer();
        let payload = vec![0x01; 32];

        let set_a = ProtectedUpdateDataSet::build(
            &params(SignAlgorithm::Es256),
            &payload,
            &mut crypt,
            &mut signer,
        )
        .unwrap();
        let set_b = ProtectedUpdateDataSet::build(
            &params(SignAlgorithm::Es256),
            &[0x02; 32],
            &mut crypt,
            &mut signer,
        )
        .unwrap();

        let mut digest = [0u8; 32];
        crypt.sha256(&payload, &mut digest);
        assert!(set_a
            .manifest
            .windows(digest.len())
            .any(|window| window == digest));
        assert!(!set_b
            .manifest
            .windows(digest.len())
            .any(|window| window == digest));
    }
}
