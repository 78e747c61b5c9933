// Transaction data structures

use crate::core::serialize::{write_var_bytes, write_varint, Decoder};
use crate::core::{hash256, Hash256, OutPoint};
use crate::error::{Error, Result};
use std::io::{Cursor, Read};

/// Transaction input - references a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Output being spent
    pub prev_output: OutPoint,
    /// Signature script (scriptSig)
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Segregated witness stack, empty for legacy inputs
    pub witness: Vec<Vec<u8>>,
}

impl TxInput {
    pub fn new(prev_output: OutPoint, script_sig: Vec<u8>) -> Self {
        Self {
            prev_output,
            script_sig,
            sequence: 0xffffffff,
            witness: Vec::new(),
        }
    }

    /// Coinbase input: zero hash and max index
    pub fn coinbase(script_sig: Vec<u8>) -> Self {
        Self::new(OutPoint::new(Hash256::zero(), 0xffffffff), script_sig)
    }

    pub fn is_coinbase(&self) -> bool {
        self.prev_output.txid.is_zero() && self.prev_output.index == 0xffffffff
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.prev_output.txid.as_bytes());
        buf.extend_from_slice(&self.prev_output.index.to_le_bytes());
        // Writes into a Vec cannot fail
        let _ = write_var_bytes(buf, &self.script_sig);
        buf.extend_from_slice(&self.sequence.to_le_bytes());
    }

    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self> {
        let txid = Hash256::new(decoder.read_array()?);
        let index = decoder.read_u32()?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32()?;

        Ok(Self {
            prev_output: OutPoint::new(txid, index),
            script_sig,
            sequence,
            witness: Vec::new(),
        })
    }
}

/// Transaction output - amount and locking script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount in satoshis
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        let _ = write_var_bytes(buf, &self.script_pubkey);
    }

    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self> {
        let value = decoder.read_u64()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    /// Transaction id: double SHA256 of the serialization without witness data
    pub fn txid(&self) -> Hash256 {
        hash256(&self.encode(false))
    }

    /// Outputs this transaction spends, coinbase inputs excluded
    pub fn spent_outputs(&self) -> impl Iterator<Item = &OutPoint> {
        self.inputs
            .iter()
            .filter(|input| !input.is_coinbase())
            .map(|input| &input.prev_output)
    }

    /// Full network serialization (BIP144 layout when any input carries a witness)
    pub fn serialize(&self) -> Vec<u8> {
        self.encode(self.has_witness())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    fn encode(&self, with_witness: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        if with_witness {
            buf.extend_from_slice(&[0x00, 0x01]);
        }

        let _ = write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode(&mut buf);
        }

        let _ = write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(&mut buf);
        }

        if with_witness {
            for input in &self.inputs {
                let _ = write_varint(&mut buf, input.witness.len() as u64);
                for item in &input.witness {
                    let _ = write_var_bytes(&mut buf, item);
                }
            }
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    /// Decode one transaction from a stream (legacy or segwit layout)
    pub fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self> {
        let version = decoder.read_u32()?;

        let mut input_count = decoder.read_varint()?;
        let segwit = input_count == 0;
        if segwit {
            let flag = decoder.read_u8()?;
            if flag != 0x01 {
                return Err(Error::Decode(format!("unknown segwit flag {:#04x}", flag)));
            }
            input_count = decoder.read_varint()?;
        }

        let mut inputs = Vec::new();
        for _ in 0..input_count {
            inputs.push(TxInput::decode(decoder)?);
        }

        let output_count = decoder.read_varint()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(TxOutput::decode(decoder)?);
        }

        if segwit {
            for input in inputs.iter_mut() {
                let items = decoder.read_varint()?;
                for _ in 0..items {
                    input.witness.push(decoder.read_var_bytes()?);
                }
            }
        }

        let lock_time = decoder.read_u32()?;

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Decode a complete raw transaction; trailing bytes are rejected
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(Cursor::new(data));
        let tx = Self::decode(&mut decoder)?;
        let consumed = decoder.into_inner().position() as usize;
        if consumed != data.len() {
            return Err(Error::Decode(format!(
                "{} trailing bytes after transaction",
                data.len() - consumed
            )));
        }
        Ok(tx)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(hex_str)?)
    }
}
