use crate::script::{
    to_compressed_pubkey, to_key_id, to_script_id, OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY,
    OP_HASH160,
};
use crate::serialize::{read_array, read_bytes, VarInt};
use crate::{Error, Result};
use dagchain_primitives::MAX_AMOUNT;

/// Number of reserved script size values marking a special script form.
const NUM_SPECIAL_SCRIPTS: u64 = 6;

/// Largest raw script accepted when decompressing.
const MAX_SCRIPT_SIZE: usize = 10_000;

/// Compresses an amount by stripping trailing decimal zeros into an exponent.
///
/// NOTE: This function is defined only for 0 <= n <= [`MAX_AMOUNT`].
pub fn compress_amount(n: u64) -> u64 {
    debug_assert!(n <= MAX_AMOUNT);

    if n == 0 {
        return 0;
    }

    let mut e = 0;
    let mut n = n;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }

    if e < 9 {
        let d = n % 10;
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    }
}

pub fn decompress_amount(x: u64) -> u64 {
    if x == 0 {
        return 0;
    }

    let mut x = x - 1;
    let e = x % 10;
    x /= 10;

    let mut n = if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        x * 10 + d
    } else {
        x + 1
    };

    for _ in 0..e {
        n *= 10;
    }

    n
}

/// Returns the special form of a pay-to-pubkey-hash, pay-to-script-hash or compressed
/// pay-to-pubkey script.
fn compress_script(script: &[u8]) -> Option<Vec<u8>> {
    if let Some(hash) = to_key_id(script) {
        let mut out = Vec::with_capacity(21);
        out.push(0x00);
        out.extend(hash);
        Some(out)
    } else if let Some(hash) = to_script_id(script) {
        let mut out = Vec::with_capacity(21);
        out.push(0x01);
        out.extend(hash);
        Some(out)
    } else {
        to_compressed_pubkey(script).map(|pubkey| pubkey.to_vec())
    }
}

pub fn compressed_script_size(script: &[u8]) -> usize {
    match compress_script(script) {
        Some(compressed) => compressed.len(),
        None => VarInt(script.len() as u64 + NUM_SPECIAL_SCRIPTS).serialized_size() + script.len(),
    }
}

pub fn write_compressed_script(out: &mut Vec<u8>, script: &[u8]) {
    match compress_script(script) {
        Some(compressed) => out.extend_from_slice(&compressed),
        None => {
            VarInt(script.len() as u64 + NUM_SPECIAL_SCRIPTS).serialize(out);
            out.extend_from_slice(script);
        }
    }
}

pub fn read_compressed_script(input: &mut &[u8]) -> Result<Vec<u8>> {
    let size = VarInt::deserialize(input)?;

    match size {
        0x00 => {
            let hash = read_array::<20>(input, "compressed p2pkh script")?;
            let mut script = Vec::with_capacity(25);
            script.extend([OP_DUP, OP_HASH160, 20]);
            script.extend(hash);
            script.extend([OP_EQUALVERIFY, OP_CHECKSIG]);
            Ok(script)
        }
        0x01 => {
            let hash = read_array::<20>(input, "compressed p2sh script")?;
            let mut script = Vec::with_capacity(23);
            script.extend([OP_HASH160, 20]);
            script.extend(hash);
            script.push(OP_EQUAL);
            Ok(script)
        }
        0x02 | 0x03 => {
            let x = read_array::<32>(input, "compressed p2pk script")?;
            let mut script = Vec::with_capacity(35);
            script.extend([33, size as u8]);
            script.extend(x);
            script.push(OP_CHECKSIG);
            Ok(script)
        }
        0x04 | 0x05 => Err(Error::deserialize(
            "compressed script",
            "uncompressed pubkey scripts are stored raw",
        )),
        _ => {
            let len = (size - NUM_SPECIAL_SCRIPTS) as usize;
            if len > MAX_SCRIPT_SIZE {
                return Err(Error::deserialize(
                    "compressed script",
                    format!("script size {len} exceeds {MAX_SCRIPT_SIZE}"),
                ));
            }
            Ok(read_bytes(input, len, "raw script")?.to_vec())
        }
    }
}

/// Size of `[VLQ compressed amount][compressed script]`.
pub fn compressed_txout_size(amount: u64, script: &[u8]) -> usize {
    VarInt(compress_amount(amount)).serialized_size() + compressed_script_size(script)
}

pub fn write_compressed_txout(out: &mut Vec<u8>, amount: u64, script: &[u8]) {
    VarInt(compress_amount(amount)).serialize(out);
    write_compressed_script(out, script);
}

pub fn read_compressed_txout(input: &mut &[u8]) -> Result<(u64, Vec<u8>)> {
    let amount = decompress_amount(VarInt::deserialize(input)?);
    let script = read_compressed_script(input)?;
    Ok((amount, script))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(script: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_compressed_script(&mut out, script);
        assert_eq!(out.len(), compressed_script_size(script));
        let mut input = out.as_slice();
        let decoded = read_compressed_script(&mut input).unwrap();
        assert!(input.is_empty());
        decoded
    }

    #[test]
    fn test_compress_amount() {
        for n in [0, 1, 10, 50 * 100_000_000, MAX_AMOUNT, fastrand::u64(..MAX_AMOUNT)] {
            assert_eq!(n, decompress_amount(compress_amount(n)), "amount {n}");
        }
        assert_eq!(compress_amount(100_000_000), 9);
        assert_eq!(compress_amount(50 * 100_000_000), 50);
    }

    #[test]
    fn test_special_scripts() {
        let mut p2pkh = vec![OP_DUP, OP_HASH160, 20];
        p2pkh.extend([7; 20]);
        p2pkh.extend([OP_EQUALVERIFY, OP_CHECKSIG]);
        assert_eq!(compressed_script_size(&p2pkh), 21);
        assert_eq!(roundtrip(&p2pkh), p2pkh);

        let mut p2sh = vec![OP_HASH160, 20];
        p2sh.extend([8; 20]);
        p2sh.push(OP_EQUAL);
        assert_eq!(compressed_script_size(&p2sh), 21);
        assert_eq!(roundtrip(&p2sh), p2sh);

        let mut p2pk = vec![33, 0x03];
        p2pk.extend([9; 32]);
        p2pk.push(OP_CHECKSIG);
        assert_eq!(compressed_script_size(&p2pk), 33);
        assert_eq!(roundtrip(&p2pk), p2pk);
    }

    #[test]
    fn test_raw_scripts() {
        let mut uncompressed = vec![65, 0x04];
        uncompressed.extend([1; 64]);
        uncompressed.push(OP_CHECKSIG);
        assert_eq!(compressed_script_size(&uncompressed), 1 + 67);
        assert_eq!(roundtrip(&uncompressed), uncompressed);

        assert_eq!(roundtrip(&[]), Vec::<u8>::new());

        let large = (0..MAX_SCRIPT_SIZE).map(|_| fastrand::u8(..)).collect::<Vec<_>>();
        assert_eq!(roundtrip(&large), large);
    }

    #[test]
    fn test_txout() {
        let script = vec![0x51, 0x52];
        let mut out = Vec::new();
        write_compressed_txout(&mut out, 12_345, &script);
        assert_eq!(out.len(), compressed_txout_size(12_345, &script));
        assert_eq!(read_compressed_txout(&mut out.as_slice()).unwrap(), (12_345, script));
    }
}
