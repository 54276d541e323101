use crate::Hash;

/// Computes the merkle root of `hashes`, duplicating the last node of odd levels.
///
/// The root of an empty list is [`Hash::ZERO`], the root of a single hash is the hash itself.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }

    let mut level = hashes.to_vec();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(left.as_bytes());
                buf[32..].copy_from_slice(right.as_bytes());
                Hash::double_sha256(&buf)
            })
            .collect();
    }

    level[0]
}
