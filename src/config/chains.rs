use crate::error::{AuditError, Result};
use std::fmt;
use std::str::FromStr;

/// Chains the audit knows how to reach. The discriminant is the EVM chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u64)]
pub enum ChainId {
    Mainnet = 1,
    Optimism = 10,
    Bsc = 56,
    Gnosis = 100,
    Polygon = 137,
    PolygonZkevm = 1101,
    Base = 8453,
    Arbitrum = 42161,
    Celo = 42220,
    Avalanche = 43114,
    Linea = 59144,
}

impl ChainId {
    pub const ALL: [ChainId; 11] = [
        Self::Mainnet,
        Self::Optimism,
        Self::Bsc,
        Self::Gnosis,
        Self::Polygon,
        Self::PolygonZkevm,
        Self::Base,
        Self::Arbitrum,
        Self::Celo,
        Self::Avalanche,
        Self::Linea,
    ];

    pub fn from_u64(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|chain| chain.id() == id)
    }

    pub fn id(self) -> u64 {
        self as u64
    }

    pub fn is_mainnet(self) -> bool {
        self == Self::Mainnet
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mainnet => "Ethereum Mainnet",
            Self::Optimism => "Optimism",
            Self::Bsc => "BNB Smart Chain",
            Self::Gnosis => "Gnosis",
            Self::Polygon => "Polygon",
            Self::PolygonZkevm => "Polygon zkEVM",
            Self::Base => "Base",
            Self::Arbitrum => "Arbitrum One",
            Self::Celo => "Celo",
            Self::Avalanche => "Avalanche",
            Self::Linea => "Linea",
        }
    }

    /// Environment variable holding this chain's HTTP RPC endpoint.
    pub fn rpc_env_var(self) -> &'static str {
        match self {
            Self::Mainnet => "ETH_NODE_URI_MAINNET",
            Self::Optimism => "ETH_NODE_URI_OPTIMISM",
            Self::Bsc => "ETH_NODE_URI_BSC",
            Self::Gnosis => "ETH_NODE_URI_GNOSIS",
            Self::Polygon => "ETH_NODE_URI_POLYGON",
            Self::PolygonZkevm => "ETH_NODE_URI_POLYGON_ZKEVM",
            Self::Base => "ETH_NODE_URI_BASE",
            Self::Arbitrum => "ETH_NODE_URI_ARBITRUM",
            Self::Celo => "ETH_NODE_URI_CELO",
            Self::Avalanche => "ETH_NODE_URI_AVALANCHE",
            Self::Linea => "ETH_NODE_URI_LINEA",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for ChainId {
    type Err = AuditError;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        trimmed
            .parse::<u64>()
            .ok()
            .and_then(Self::from_u64)
            .ok_or_else(|| AuditError::UnknownChain(trimmed.to_string()))
    }
}

/// Chains named by `CHAIN_IDS`, split into supported ones and ids nobody can audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainList {
    pub chains: Vec<ChainId>,
    pub unknown: Vec<String>,
}

/// Parse a comma-separated chain list such as `CHAIN_IDS="1,137,42161"`. Duplicates are dropped.
pub fn parse_chain_list(raw: &str) -> ChainList {
    let mut list = ChainList::default();
    for item in raw.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match item.parse::<ChainId>() {
            Ok(chain) if !list.chains.contains(&chain) => list.chains.push(chain),
            Ok(_) => {}
            Err(_) if !list.unknown.iter().any(|seen| seen == item) => {
                list.unknown.push(item.to_string())
            }
            Err(_) => {}
        }
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_round_trips_through_u64() {
        for chain in ChainId::ALL {
            assert_eq!(ChainId::from_u64(chain.id()), Some(chain));
        }
        assert_eq!(ChainId::from_u64(31337), None);
    }

    #[test]
    fn test_parse_chain_list_skips_blanks_and_duplicates() {
        let list = parse_chain_list(" 1, 137,,42161,1 ");
        assert_eq!(
            list.chains,
            vec![ChainId::Mainnet, ChainId::Polygon, ChainId::Arbitrum]
        );
        assert!(list.unknown.is_empty());
    }

    #[test]
    fn test_parse_chain_list_sets_unknown_ids_aside() {
        let list = parse_chain_list("1,999,abc,999");
        assert_eq!(list.chains, vec![ChainId::Mainnet]);
        assert_eq!(list.unknown, vec!["999".to_string(), "abc".to_string()]);
        assert!(matches!(
            "999".parse::<ChainId>(),
            Err(AuditError::UnknownChain(ref raw)) if raw == "999"
        ));
    }
}
