//! Recognition of the standard output script forms.

pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// Standard output script classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptClass {
    PubKeyHash,
    ScriptHash,
    PubKey,
    NullData,
    NonStandard,
}

/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn to_key_id(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[3..23]);
        Some(hash)
    } else {
        None
    }
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`
pub fn to_script_id(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 23 && script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[2..22]);
        Some(hash)
    } else {
        None
    }
}

/// `<33 byte compressed key> OP_CHECKSIG`
pub fn to_compressed_pubkey(script: &[u8]) -> Option<[u8; 33]> {
    if script.len() == 35
        && script[0] == 33
        && script[34] == OP_CHECKSIG
        && (script[1] == 0x02 || script[1] == 0x03)
    {
        let mut pubkey = [0u8; 33];
        pubkey.copy_from_slice(&script[1..34]);
        Some(pubkey)
    } else {
        None
    }
}

fn is_uncompressed_pubkey(script: &[u8]) -> bool {
    script.len() == 67 && script[0] == 65 && script[1] == 0x04 && script[66] == OP_CHECKSIG
}

/// Outputs starting with `OP_RETURN` can never be spent and are kept out of the utxo set.
pub fn is_unspendable(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}

pub fn classify(script: &[u8]) -> ScriptClass {
    if to_key_id(script).is_some() {
        ScriptClass::PubKeyHash
    } else if to_script_id(script).is_some() {
        ScriptClass::ScriptHash
    } else if to_compressed_pubkey(script).is_some() || is_uncompressed_pubkey(script) {
        ScriptClass::PubKey
    } else if is_unspendable(script) {
        ScriptClass::NullData
    } else {
        ScriptClass::NonStandard
    }
}

/// Pay to pubkey hash, pay to script hash and pay to pubkey.
pub fn is_standard(script: &[u8]) -> bool {
    matches!(
        classify(script),
        ScriptClass::PubKeyHash | ScriptClass::ScriptHash | ScriptClass::PubKey
    )
}

/// Counts signature operations the legacy way: `OP_CHECKSIG(VERIFY)` counts one,
/// `OP_CHECKMULTISIG(VERIFY)` counts twenty.
///
/// Parsing stops at the first truncated push, counting what was seen so far.
pub fn count_sig_ops(script: &[u8]) -> usize {
    let mut count = 0;
    let mut pos = 0;

    while pos < script.len() {
        let opcode = script[pos];
        pos += 1;

        let push_len = match opcode {
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => match script.get(pos) {
                Some(len) => {
                    pos += 1;
                    *len as usize
                }
                None => break,
            },
            OP_PUSHDATA2 => match script.get(pos..pos + 2) {
                Some(len) => {
                    pos += 2;
                    u16::from_le_bytes([len[0], len[1]]) as usize
                }
                None => break,
            },
            OP_PUSHDATA4 => match script.get(pos..pos + 4) {
                Some(len) => {
                    pos += 4;
                    u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize
                }
                None => break,
            },
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                count += 1;
                0
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                count += 20;
                0
            }
            _ => 0,
        };

        if push_len > script.len() - pos {
            break;
        }
        pos += push_len;
    }

    count
}
