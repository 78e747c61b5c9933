// Output script decoding: which addresses own an output

use crate::core::{hash160, Network};

/// Opcodes recognised when matching standard output templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    OpPushBytes20 = 0x14,
    OpPushBytes33 = 0x21,
    OpPushBytes65 = 0x41,
    Op1 = 0x51,
    Op16 = 0x60,
    OpDup = 0x76,
    OpEqual = 0x87,
    OpEqualVerify = 0x88,
    OpHash160 = 0xa9,
    OpCheckSig = 0xac,
    OpCheckMultiSig = 0xae,
}

/// Standard output templates that resolve to addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind<'a> {
    /// OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    PubkeyHash(&'a [u8]),
    /// OP_HASH160 <20> OP_EQUAL
    ScriptHash(&'a [u8]),
    /// <pubkey> OP_CHECKSIG
    Pubkey(&'a [u8]),
    /// OP_m <pubkey>... OP_n OP_CHECKMULTISIG
    Multisig(Vec<&'a [u8]>),
    NonStandard,
}

impl<'a> ScriptKind<'a> {
    pub fn classify(script: &'a [u8]) -> Self {
        use OpCode::*;

        if script.len() == 25
            && script[0] == OpDup as u8
            && script[1] == OpHash160 as u8
            && script[2] == OpPushBytes20 as u8
            && script[23] == OpEqualVerify as u8
            && script[24] == OpCheckSig as u8
        {
            return ScriptKind::PubkeyHash(&script[3..23]);
        }

        if script.len() == 23
            && script[0] == OpHash160 as u8
            && script[1] == OpPushBytes20 as u8
            && script[22] == OpEqual as u8
        {
            return ScriptKind::ScriptHash(&script[2..22]);
        }

        if let Some((&last, body)) = script.split_last() {
            if last == OpCheckSig as u8 {
                if let Some(pubkey) = single_pubkey_push(body) {
                    return ScriptKind::Pubkey(pubkey);
                }
            }
            if last == OpCheckMultiSig as u8 {
                if let Some(keys) = multisig_keys(body) {
                    return ScriptKind::Multisig(keys);
                }
            }
        }

        ScriptKind::NonStandard
    }
}

fn small_int(op: u8) -> Option<usize> {
    (OpCode::Op1 as u8..=OpCode::Op16 as u8)
        .contains(&op)
        .then(|| (op - OpCode::Op1 as u8 + 1) as usize)
}

/// Split one 33- or 65-byte key push off the front of `data`
fn take_pubkey_push(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&push, rest) = data.split_first()?;
    let len = match push {
        p if p == OpCode::OpPushBytes33 as u8 => 33,
        p if p == OpCode::OpPushBytes65 as u8 => 65,
        _ => return None,
    };
    (rest.len() >= len).then(|| rest.split_at(len))
}

fn single_pubkey_push(data: &[u8]) -> Option<&[u8]> {
    match take_pubkey_push(data)? {
        (key, []) => Some(key),
        _ => None,
    }
}

fn multisig_keys(body: &[u8]) -> Option<Vec<&[u8]>> {
    let (&first, rest) = body.split_first()?;
    let (&last, mut keys_data) = rest.split_last()?;
    let required = small_int(first)?;
    let total = small_int(last)?;

    let mut keys = Vec::with_capacity(total);
    while !keys_data.is_empty() {
        let (key, remaining) = take_pubkey_push(keys_data)?;
        keys.push(key);
        keys_data = remaining;
    }

    (keys.len() == total && required <= total).then_some(keys)
}

/// Base58Check address from a version byte and a 20-byte hash
pub fn encode_address(version: u8, hash: &[u8]) -> String {
    bs58::encode(hash).with_check_version(version).into_string()
}

/// Whether `address` is a well-formed address of `network`
pub fn is_valid_address(address: &str, network: Network) -> bool {
    match bs58::decode(address).with_check(None).into_vec() {
        Ok(payload) => {
            payload.len() == 21
                && (payload[0] == network.pubkey_hash_version()
                    || payload[0] == network.script_hash_version())
        }
        Err(_) => false,
    }
}

/// Addresses owning an output with this locking script.
///
/// Non-standard and unspendable scripts yield no address. A bare multisig
/// output yields one address per participant key.
pub fn output_addresses(script: &[u8], network: Network) -> Vec<String> {
    let pubkey_address = |key: &[u8]| encode_address(network.pubkey_hash_version(), &hash160(key));

    match ScriptKind::classify(script) {
        ScriptKind::PubkeyHash(hash) => vec![encode_address(network.pubkey_hash_version(), hash)],
        ScriptKind::ScriptHash(hash) => vec![encode_address(network.script_hash_version(), hash)],
        ScriptKind::Pubkey(key) => vec![pubkey_address(key)],
        ScriptKind::Multisig(keys) => keys.into_iter().map(pubkey_address).collect(),
        ScriptKind::NonStandard => Vec::new(),
    }
}

/// P2PKH locking script for a 20-byte public key hash
pub fn p2pkh_script_pubkey(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OpCode::OpDup as u8);
    script.push(OpCode::OpHash160 as u8);
    script.push(OpCode::OpPushBytes20 as u8);
    script.extend_from_slice(pubkey_hash);
    script.push(OpCode::OpEqualVerify as u8);
    script.push(OpCode::OpCheckSig as u8);
    script
}
