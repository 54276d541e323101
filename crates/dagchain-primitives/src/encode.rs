//! Canonical byte encoding used for hashing and size accounting.

/// Types with a canonical byte encoding.
pub trait Encodable {
    /// Appends the canonical encoding of `self` to `out`.
    fn encode_to(&self, out: &mut Vec<u8>);

    /// Returns the canonical encoding of `self`.
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_to(&mut out);
        out
    }

    /// Size of the canonical encoding in bytes.
    fn encoded_size(&self) -> usize {
        self.encode().len()
    }
}

pub fn write_compact_size(out: &mut Vec<u8>, size: u64) {
    if size < 253 {
        out.push(size as u8);
    } else if size <= 0xFFFF {
        out.push(253);
        out.extend_from_slice(&(size as u16).to_le_bytes());
    } else if size <= 0xFFFF_FFFF {
        out.push(254);
        out.extend_from_slice(&(size as u32).to_le_bytes());
    } else {
        out.push(255);
        out.extend_from_slice(&size.to_le_bytes());
    }
}

pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_size_boundaries() {
        let cases: [(u64, usize); 6] = [
            (0, 1),
            (252, 1),
            (253, 3),
            (0xFFFF, 3),
            (0x1_0000, 5),
            (0x1_0000_0000, 9),
        ];
        for (value, len) in cases {
            let mut out = Vec::new();
            write_compact_size(&mut out, value);
            assert_eq!(out.len(), len, "compact size of {value}");
        }
    }
}
