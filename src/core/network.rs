// Network parameters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chains the indexer can follow. Only address version bytes differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Bitcoin,
    Testnet,
    Litecoin,
    LitecoinTestnet,
}

impl Network {
    /// Version byte of pay-to-pubkey-hash addresses
    pub fn pubkey_hash_version(&self) -> u8 {
        match self {
            Network::Bitcoin => 0x00,
            Network::Testnet => 0x6f,
            Network::Litecoin => 0x30,
            Network::LitecoinTestnet => 0x6f,
        }
    }

    /// Version byte of pay-to-script-hash addresses
    pub fn script_hash_version(&self) -> u8 {
        match self {
            Network::Bitcoin | Network::Litecoin => 0x05,
            Network::Testnet | Network::LitecoinTestnet => 0xc4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bitcoin",
            Network::Testnet => "testnet",
            Network::Litecoin => "litecoin",
            Network::LitecoinTestnet => "litecoin-testnet",
        }
    }

    /// Whether a node reporting `chain` (getblockchaininfo) serves this network
    pub fn accepts_chain(&self, chain: &str) -> bool {
        match self {
            Network::Bitcoin | Network::Litecoin => chain == "main",
            Network::Testnet | Network::LitecoinTestnet => {
                matches!(chain, "test" | "testnet4" | "regtest" | "signet")
            }
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
