use crate::{Error, Result};
use dagchain_primitives::{Hash, HASH_SIZE};

/// Variable length quantity, most significant group first.
///
/// Every continuation group is stored minus one, so each value has exactly one encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt(pub u64);

impl From<u64> for VarInt {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl VarInt {
    /// Maximum serialized size of a `u64`.
    pub const MAX_SIZE: usize = 10;

    pub fn serialize(&self, out: &mut Vec<u8>) {
        let mut tmp = [0u8; Self::MAX_SIZE];
        let mut len = 0;
        let mut n = self.0;

        loop {
            let continuation = if len > 0 { 0x80 } else { 0x00 };
            tmp[len] = (n & 0x7f) as u8 | continuation;
            if n <= 0x7f {
                break;
            }
            n = (n >> 7) - 1;
            len += 1;
        }

        out.extend(tmp[..=len].iter().rev());
    }

    pub fn serialized_size(&self) -> usize {
        let mut size = 1;
        let mut n = self.0;
        while n > 0x7f {
            n = (n >> 7) - 1;
            size += 1;
        }
        size
    }

    pub fn deserialize(input: &mut &[u8]) -> Result<u64> {
        let mut n: u64 = 0;
        loop {
            let byte = read_array::<1>(input, "vlq")?[0];
            if n > (u64::MAX >> 7) {
                return Err(Error::deserialize("vlq", "value overflows u64"));
            }
            n = (n << 7) | u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(n);
            }
            n = n
                .checked_add(1)
                .ok_or_else(|| Error::deserialize("vlq", "value overflows u64"))?;
        }
    }
}

/// Splits `len` bytes off the front of `input`.
pub(crate) fn read_bytes<'a>(input: &mut &'a [u8], len: usize, what: &'static str) -> Result<&'a [u8]> {
    if input.len() < len {
        return Err(Error::deserialize(
            what,
            format!("unexpected end of data, need {len} bytes, {} left", input.len()),
        ));
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

pub(crate) fn read_array<const N: usize>(input: &mut &[u8], what: &'static str) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(read_bytes(input, N, what)?);
    Ok(out)
}

pub(crate) fn read_hash(input: &mut &[u8], what: &'static str) -> Result<Hash> {
    Ok(Hash::from_byte_array(read_array::<HASH_SIZE>(input, what)?))
}

pub(crate) fn read_u16_be(input: &mut &[u8], what: &'static str) -> Result<u16> {
    Ok(u16::from_be_bytes(read_array(input, what)?))
}

pub(crate) fn read_u32_be(input: &mut &[u8], what: &'static str) -> Result<u32> {
    Ok(u32::from_be_bytes(read_array(input, what)?))
}
