//! Supported coin types
//!
//! Each coin carries the parameters an account needs: its BIP44 coin index,
//! base58 version bytes for addresses, the network kind used when encoding
//! extended keys, and the header prepended to signed messages.

use bitcoin::NetworkKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinType {
    Bitcoin,
    BitcoinTest,
    Litecoin,
    Dogecoin,
}

impl CoinType {
    pub const ALL: [CoinType; 4] = [
        CoinType::Bitcoin,
        CoinType::BitcoinTest,
        CoinType::Litecoin,
        CoinType::Dogecoin,
    ];

    /// Stable identifier, used when deriving account ids
    pub fn id(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin.main",
            Self::BitcoinTest => "bitcoin.test",
            Self::Litecoin => "litecoin.main",
            Self::Dogecoin => "dogecoin.main",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bitcoin => "Bitcoin",
            Self::BitcoinTest => "Bitcoin Test",
            Self::Litecoin => "Litecoin",
            Self::Dogecoin => "Dogecoin",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Bitcoin => "BTC",
            Self::BitcoinTest => "BTC",
            Self::Litecoin => "LTC",
            Self::Dogecoin => "DOGE",
        }
    }

    /// BIP44 coin index (hardened at derivation time)
    ///
    /// - Bitcoin: 0
    /// - Test networks: 1
    pub fn bip44_index(&self) -> u32 {
        match self {
            Self::Bitcoin => 0,
            Self::BitcoinTest => 1,
            Self::Litecoin => 2,
            Self::Dogecoin => 3,
        }
    }

    /// Base58 version byte for pay-to-pubkey-hash addresses
    pub fn p2pkh_header(&self) -> u8 {
        match self {
            Self::Bitcoin => 0x00,
            Self::BitcoinTest => 0x6f,
            Self::Litecoin => 0x30,
            Self::Dogecoin => 0x1e,
        }
    }

    /// Base58 version byte for pay-to-script-hash addresses
    pub fn p2sh_header(&self) -> u8 {
        match self {
            Self::Bitcoin => 0x05,
            Self::BitcoinTest => 0xc4,
            Self::Litecoin => 0x32,
            Self::Dogecoin => 0x16,
        }
    }

    /// Header mixed into the message hash by `signmessage`-style signing
    pub fn signed_message_header(&self) -> &'static str {
        match self {
            Self::Bitcoin | Self::BitcoinTest => "Bitcoin Signed Message:\n",
            Self::Litecoin => "Litecoin Signed Message:\n",
            Self::Dogecoin => "Dogecoin Signed Message:\n",
        }
    }

    /// Network kind used for extended key serialization
    pub fn network_kind(&self) -> NetworkKind {
        match self {
            Self::BitcoinTest => NetworkKind::Test,
            _ => NetworkKind::Main,
        }
    }

    /// BIP44 account path: `m/44'/<coin>'/<account>'`
    pub fn bip44_path(&self, account: u32) -> String {
        format!("m/44'/{}'/{}'", self.bip44_index(), account)
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CoinType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bitcoin" | "btc" | "bitcoin.main" => Ok(Self::Bitcoin),
            "bitcoin-test" | "testnet" | "bitcoin.test" => Ok(Self::BitcoinTest),
            "litecoin" | "ltc" | "litecoin.main" => Ok(Self::Litecoin),
            "dogecoin" | "doge" | "dogecoin.main" => Ok(Self::Dogecoin),
            other => Err(format!("unknown coin type '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_bytes_are_distinct() {
        for coin in CoinType::ALL {
            assert_ne!(coin.p2pkh_header(), coin.p2sh_header(), "{}", coin);
        }
    }

    #[test]
    fn test_parse_coin_names() {
        assert_eq!("bitcoin".parse::<CoinType>().unwrap(), CoinType::Bitcoin);
        assert_eq!("TESTNET".parse::<CoinType>().unwrap(), CoinType::BitcoinTest);
        assert_eq!("doge".parse::<CoinType>().unwrap(), CoinType::Dogecoin);
        assert!("monero".parse::<CoinType>().is_err());
    }

    #[test]
    fn test_bip44_path() {
        assert_eq!(CoinType::Litecoin.bip44_path(3), "m/44'/2'/3'");
    }
}
