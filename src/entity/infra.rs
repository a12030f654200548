use alloy::primitives::Address;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::config::InfraConfig;
use crate::transfer::types::bare_address;

/// Known infrastructure contracts and exchange hot wallets on Ethereum.
const BUILTIN_INFRA: &[(&str, &str)] = &[
    ("0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45", "Uniswap V3 Router"),
    ("0x7a250d5630b4cf539739df2c5dacb4c659f2488d", "Uniswap V2 Router"),
    ("0x1111111254eeb25477b68fb85ed929f73a960582", "1inch Router V4"),
    ("0xdef1c0ded9bec7f1a1670819833240f027b25eff", "0x Exchange Proxy"),
    ("0x00000000006c3852cbef3e08e8df289169ede581", "OpenSea Seaport 1.1"),
    ("0x0000a26b00c1f0df003000390027140000faa719", "OpenSea Seaport 1.4"),
    ("0x000000000000ad05ccc4f10045630fb830b95127", "Blur Marketplace"),
    ("0x0000000000a39bb272e79075ade125fd351887ac", "OpenSea Shared Store"),
    ("0x70423fc4400c3dc01168ebe23f68d0f3ee9a0123", "Blur Execution"),
    ("0x74312363e45dcaba76c59ec49a7aa8a65a67eed3", "X2Y2 Marketplace"),
    ("0x28c6c06298d514db089934071355e5743bf21d60", "Binance 14"),
    ("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "WETH Token"),
    ("0x74de5d4fcbf63e00296fd95d33236b9794016631", "CowSwap Settlement"),
    ("0xa9d1e08c7793af67e9d92fe308d5697fb81d3e43", "Blur Blend"),
    ("0xae45a8240147e6179ec7c9f92c5a18f9a97b3fca", "Blur Lending"),
    ("0x21a31ee1afc51d94c2efccaa2092ad1028285549", "Binance 14"),
    ("0x4976a4a02f38326660d17bf34b431dc6e2eb2327", "Gem V2"),
    ("0x9696f59e4d72e237be84ffd425dcad154bf96976", "Blur Exchange"),
    ("0x56eddb7aa87536c09ccc2793473599fd21a8b17f", "Binance 8"),
    ("0xdfd5293d8e347dfe59e90efd55b2956a1343963d", "Binance 7"),
    ("0x0b95993a39a363d99280ac950f5e4536ab5c5566", "OpenSea/Seaport"),
    ("0x46340b20830761efd32832a74d7169b29feb9758", "Coinbase Hot Wallet"),
];

/// Human-readable name for a built-in infra address.
pub fn describe_address(address: &str) -> &'static str {
    let bare = bare_address(address);
    BUILTIN_INFRA
        .iter()
        .find(|(a, _)| *a == bare)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown infra")
}

/// A whitelisted infrastructure address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraLabel {
    pub label: String,
    pub source: String,
}

/// Immutable set of infrastructure addresses excluded from motif, egonet and
/// scoring computation. Keyed by bare lowercase `0x` address.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    by_address: HashMap<String, InfraLabel>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the exclusion set from config: built-in list, whitelist CSV, inline addresses.
    pub fn from_config(config: &InfraConfig) -> eyre::Result<Self> {
        let mut set = Self::new();

        if config.include_builtin {
            for (address, name) in BUILTIN_INFRA {
                set.insert(address, name, "builtin");
            }
        }

        if let Some(path) = &config.whitelist_path {
            let loaded = set.load_csv(Path::new(path))?;
            tracing::info!(count = loaded, path = %path, "Loaded infra whitelist");
        }

        for address in &config.addresses {
            set.insert(address, describe_address(address), "config");
        }

        tracing::info!(addresses = set.len(), "Built infra exclusion set");
        Ok(set)
    }

    /// Load a CSV with an `address` column and an optional `label` column.
    /// Returns the number of addresses accepted.
    pub fn load_csv(&mut self, path: &Path) -> eyre::Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| eyre::eyre!("Failed to open whitelist CSV '{}': {}", path.display(), e))?;

        let headers = reader.headers()?.clone();
        let address_col = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("address"))
            .ok_or_else(|| {
                eyre::eyre!("Whitelist CSV '{}' has no 'address' column", path.display())
            })?;
        let label_col = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("label"));

        let mut count = 0;
        for result in reader.records() {
            let record = result?;
            let address = record.get(address_col).unwrap_or("").trim();
            if address.is_empty() {
                continue;
            }
            let label = label_col
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or("whitelist");
            if self.insert(address, label, "whitelist_csv") {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Insert an address; invalid hex addresses are skipped. Returns whether it was accepted.
    pub fn insert(&mut self, address: &str, label: &str, source: &str) -> bool {
        let bare = bare_address(address);
        match Address::from_str(&bare) {
            Ok(parsed) => {
                let key = format!("0x{}", hex::encode(parsed.as_slice()));
                self.by_address.insert(
                    key,
                    InfraLabel {
                        label: label.to_string(),
                        source: source.to_string(),
                    },
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    address = %address,
                    error = %e,
                    "Invalid infra address, skipping"
                );
                false
            }
        }
    }

    /// Whether an account (bare or chain-qualified) is infrastructure.
    pub fn contains(&self, account: &str) -> bool {
        self.by_address.contains_key(&bare_address(account))
    }

    pub fn lookup(&self, account: &str) -> Option<&InfraLabel> {
        self.by_address.get(&bare_address(account))
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const UNISWAP_V2: &str = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";

    #[test]
    fn test_builtin_and_chain_qualified_lookup() {
        let set = ExclusionSet::from_config(&InfraConfig::default()).unwrap();
        assert!(set.contains(UNISWAP_V2));
        assert!(set.contains("1_0x7A250D5630B4CF539739DF2C5DACB4C659F2488D"));
        assert_eq!(set.lookup(UNISWAP_V2).unwrap().source, "builtin");
        assert!(!set.contains("0x1234567890123456789012345678901234567890"));
    }

    #[test]
    fn test_builtin_can_be_disabled() {
        let config = InfraConfig {
            whitelist_path: None,
            include_builtin: false,
            addresses: vec![],
        };
        let set = ExclusionSet::from_config(&config).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_configured_addresses_are_described() {
        let config = InfraConfig {
            whitelist_path: None,
            include_builtin: false,
            addresses: vec![
                format!("1_{}", UNISWAP_V2),
                "0x1234567890123456789012345678901234567890".to_string(),
            ],
        };
        let set = ExclusionSet::from_config(&config).unwrap();
        let router = set.lookup(UNISWAP_V2).unwrap();
        assert_eq!(router.label, "Uniswap V2 Router");
        assert_eq!(router.source, "config");
        assert_eq!(
            set.lookup("0x1234567890123456789012345678901234567890").unwrap().label,
            "Unknown infra"
        );
    }

    #[test]
    fn test_invalid_address_skipped() {
        let mut set = ExclusionSet::new();
        assert!(!set.insert("not-an-address", "x", "test"));
        assert!(set.insert(" 0xAbCdEf0123456789aBcDeF0123456789AbCdEf01 ", "x", "test"));
        assert!(set.contains("0xabcdef0123456789abcdef0123456789abcdef01"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "address,label").unwrap();
        writeln!(file, "0x46340b20830761efd32832a74d7169b29feb9758,Coinbase").unwrap();
        writeln!(file, "bogus,Nothing").unwrap();
        writeln!(file, "0x28c6c06298d514db089934071355e5743bf21d60,").unwrap();
        file.flush().unwrap();

        let mut set = ExclusionSet::new();
        let count = set.load_csv(file.path()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            set.lookup("0x46340b20830761efd32832a74d7169b29feb9758").unwrap().label,
            "Coinbase"
        );
        assert_eq!(
            set.lookup("0x28c6c06298d514db089934071355e5743bf21d60").unwrap().label,
            "whitelist"
        );
    }

    #[test]
    fn test_describe_address() {
        assert_eq!(describe_address(UNISWAP_V2), "Uniswap V2 Router");
        assert_eq!(describe_address("0xdeadbeef"), "Unknown infra");
    }
}
