//! Payload fragmentation
//!
//! The chip streams an update one fragment at a time, so each fragment
//! must be independently checkable: a big-endian fragment number leads,
//! a SHA-256 digest over (number ‖ data) trails. Reassembly rejects
//! missing, duplicated or corrupted fragments without needing the
//! manifest.

use phylax_pal::crypt::{CryptOps, SHA256_LEN};

use crate::error::DataSetError;

/// Upper bound on a complete update payload
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// Payload bytes carried by one fragment
pub const MAX_PAYLOAD_FRAGMENT_SIZE: usize = 608;

/// Fragment number prefix length (u16, big-endian)
pub const FRAGMENT_NUMBER_LENGTH: usize = 2;

/// Trailing digest length
pub const FRAGMENT_DIGEST_LENGTH: usize = SHA256_LEN;

/// Split `payload` into wire fragments
///
/// Every fragment is `number ‖ data ‖ sha256(number ‖ data)`. All
/// fragments except the last carry exactly
/// [`MAX_PAYLOAD_FRAGMENT_SIZE`] payload bytes. An empty payload yields
/// a single empty-bodied fragment so the receiver still gets a
/// verifiable end marker.
pub fn create_fragments(
    crypt: &mut impl CryptOps,
    payload: &[u8],
) -> Result<Vec<Vec<u8>>, DataSetError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(DataSetError::BadInputData);
    }

    let mut fragments = Vec::new();
    let mut chunks = payload.chunks(MAX_PAYLOAD_FRAGMENT_SIZE);
    let mut number: u16 = 0;
    loop {
        let chunk = chunks.next().unwrap_or(&[]);
        fragments.push(encode_fragment(crypt, number, chunk));
        if number as usize * MAX_PAYLOAD_FRAGMENT_SIZE + chunk.len() >= payload.len() {
            break;
        }
        number += 1;
    }
    Ok(fragments)
}

fn encode_fragment(crypt: &mut impl CryptOps, number: u16, data: &[u8]) -> Vec<u8> {
    let mut fragment =
        Vec::with_capacity(FRAGMENT_NUMBER_LENGTH + data.len() + FRAGMENT_DIGEST_LENGTH);
    fragment.extend_from_slice(&number.to_be_bytes());
    fragment.extend_from_slice(data);

    let mut digest = [0u8; SHA256_LEN];
    crypt.sha256(&fragment, &mut digest);
    fragment.extend_from_slice(&digest);
    fragment
}

/// Verify and reassemble fragments back into the payload
///
/// Accepts fragments in any order; numbers must form a gapless range
/// starting at zero and every digest must verify.
pub fn reassemble(
    crypt: &mut impl CryptOps,
    fragments: &[Vec<u8>],
) -> Result<Vec<u8>, DataSetError> {
    let mut parts: Vec<Option<&[u8]>> = vec![None; fragments.len()];

    for fragment in fragments {
        if fragment.len() < FRAGMENT_NUMBER_LENGTH + FRAGMENT_DIGEST_LENGTH {
            return Err(DataSetError::CorruptFragment);
        }
        let body_end = fragment.len() - FRAGMENT_DIGEST_LENGTH;

        let mut digest = [0u8; SHA256_LEN];
        crypt.sha256(&fragment[..body_end], &mut digest);
        if digest != fragment[body_end..] {
            return Err(DataSetError::CorruptFragment);
        }

        let number = u16::from_be_bytes([fragment[0], fragment[1]]) as usize;
        if number >= parts.len() {
            return Err(DataSetError::MissingFragment);
        }
        if parts[number].is_some() {
            return Err(DataSetError::DuplicateFragment);
        }
        parts[number] = Some(&fragment[FRAGMENT_NUMBER_LENGTH..body_end]);
    }

    let mut payload = Vec::new();
    for part in parts {
        payload.extend_from_slice(part.ok_or(DataSetError::MissingFragment)?);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylax_pal_host::SoftCrypt;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn roundtrip_boundary_sizes() {
        let mut crypt = SoftCrypt::new();
        for len in [
            0,
            1,
            MAX_PAYLOAD_FRAGMENT_SIZE,
            MAX_PAYLOAD_FRAGMENT_SIZE + 1,
            MAX_PAYLOAD_SIZE,
        ] {
            let data = payload(len);
            let fragments = create_fragments(&mut crypt, &data).unwrap();
            let rebuilt = reassemble(&mut crypt, &fragments).unwrap();
            assert_eq!(rebuilt, data, "length {len}");
        }
    }

    #[test]
    fn fragment_count_and_sizes() {
        let mut crypt = SoftCrypt::new();
        let data = payload(MAX_PAYLOAD_FRAGMENT_SIZE + 1);
        let fragments = create_fragments(&mut crypt, &data).unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(
            fragments[0].len(),
            FRAGMENT_NUMBER_LENGTH + MAX_PAYLOAD_FRAGMENT_SIZE + FRAGMENT_DIGEST_LENGTH
        );
        assert_eq!(
            fragments[1].len(),
            FRAGMENT_NUMBER_LENGTH + 1 + FRAGMENT_DIGEST_LENGTH
        );
        assert_eq!(&fragments[1][..2], &[0, 1]);
    }

    #[test]
    fn empty_payload_yields_one_marker_fragment() {
        let mut crypt = SoftCrypt::new();
        let fragments = create_fragments(&mut crypt, &[]).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(
            fragments[0].len(),
            FRAGMENT_NUMBER_LENGTH + FRAGMENT_DIGEST_LENGTH
        );
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut crypt = SoftCrypt::new();
        let data = payload(MAX_PAYLOAD_SIZE + 1);
        assert_eq!(
            create_fragments(&mut crypt, &data),
            Err(DataSetError::BadInputData)
        );
    }

    #[test]
    fn out_of_order_fragments_reassemble() {
        let mut crypt = SoftCrypt::new();
        let data = payload(3 * MAX_PAYLOAD_FRAGMENT_SIZE);
        let mut fragments = create_fragments(&mut crypt, &data).unwrap();
        fragments.swap(0, 2);
        assert_eq!(reassemble(&mut crypt, &fragments).unwrap(), data);
    }

    #[test]
    fn corrupt_fragment_detected() {
        let mut crypt = SoftCrypt::new();
        let data = payload(100);
        let mut fragments = create_fragments(&mut crypt, &data).unwrap();
        fragments[0][5] ^= 0x40;
        assert_eq!(
            reassemble(&mut crypt, &fragments),
            Err(DataSetError::CorruptFragment)
        );
    }

    #[test]
    fn missing_fragment_detected() {
        let mut crypt = SoftCrypt::new();
        let data = payload(2 * MAX_PAYLOAD_FRAGMENT_SIZE);
        let mut fragments = create_fragments(&mut crypt, &data).unwrap();
        fragments.pop();
        assert_eq!(
            reassemble(&mut crypt, &fragments),
            Err(DataSetError::MissingFragment)
        );
    }

    #[test]
    fn duplicate_fragment_detected() {
        let mut crypt = SoftCrypt::new();
        let data = payload(2 * MAX_PAYLOAD_FRAGMENT_SIZE);
        let mut fragments = create_fragments(&mut crypt, &data).unwrap();
        let first = fragments[0].clone();
        fragments[1] = first;
        assert_eq!(
            reassemble(&mut crypt, &fragments),
            Err(DataSetError::DuplicateFragment)
        );
    }
}
