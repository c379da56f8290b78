/// Account configuration from environment variables
///
/// Controls the coin, the BIP44 look-ahead window and the Argon2id cost of
/// new key crypters. Defaults to Bitcoin with a 20 key window.

use std::env;

use crate::coins::CoinType;
use crate::crypter::{KdfParams, KeyCrypter};
use crate::keychain::{DEFAULT_LOOKAHEAD, MAX_LOOKAHEAD};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountConfig {
    pub coin: CoinType,
    /// Keys derived ahead of the receive cursor, also the issuance bound
    pub lookahead: u32,
    /// KDF cost used by [`AccountConfig::key_crypter`]
    pub kdf: KdfParams,
}

impl AccountConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `HD_POCKET_COIN`: "bitcoin" (default), "bitcoin-test", "litecoin", "dogecoin"
    /// - `HD_POCKET_LOOKAHEAD`: look-ahead window size, 1 to 1000 (default 20)
    /// - `HD_POCKET_KDF_MEMORY_KB`, `HD_POCKET_KDF_ITERATIONS`,
    ///   `HD_POCKET_KDF_PARALLELISM`: Argon2id cost parameters
    ///
    /// # Examples
    ///
    /// ```bash
    /// HD_POCKET_COIN=dogecoin HD_POCKET_LOOKAHEAD=5 cargo test
    /// ```
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let coin = match env::var("HD_POCKET_COIN") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                log::warn!("⚠️  {}, defaulting to {}", e, defaults.coin);
                defaults.coin
            }),
            Err(_) => defaults.coin,
        };
        log::info!("🪙 Using {} ({})", coin, coin.bip44_path(0));

        let lookahead = match read_u32("HD_POCKET_LOOKAHEAD") {
            Some(0) => {
                log::warn!("⚠️  Look-ahead must be positive, using {}", defaults.lookahead);
                defaults.lookahead
            }
            Some(value) if value > MAX_LOOKAHEAD => {
                log::warn!(
                    "⚠️  Look-ahead {} exceeds {}, using {}",
                    value,
                    MAX_LOOKAHEAD,
                    defaults.lookahead
                );
                defaults.lookahead
            }
            Some(value) => value,
            None => defaults.lookahead,
        };
        log::info!("🔭 Look-ahead window: {} keys", lookahead);

        let kdf = KdfParams {
            memory_kb: read_u32("HD_POCKET_KDF_MEMORY_KB").unwrap_or(defaults.kdf.memory_kb),
            iterations: read_u32("HD_POCKET_KDF_ITERATIONS").unwrap_or(defaults.kdf.iterations),
            parallelism: read_u32("HD_POCKET_KDF_PARALLELISM")
                .unwrap_or(defaults.kdf.parallelism),
        };

        Self {
            coin,
            lookahead,
            kdf,
        }
    }

    /// New key crypter with a random salt and the configured cost
    pub fn key_crypter(&self) -> KeyCrypter {
        KeyCrypter::new(self.kdf)
    }
}

fn read_u32(name: &str) -> Option<u32> {
    let value = env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("⚠️  Ignoring {}={}: not a number", name, value);
            None
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            coin: CoinType::Bitcoin,
            lookahead: DEFAULT_LOOKAHEAD,
            kdf: KdfParams::default(),
        }
    }
}
