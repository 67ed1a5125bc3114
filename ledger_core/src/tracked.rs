use std::collections::HashMap;
use std::path::Path;

use ethers::types::Address;
use tracing::{debug, info, warn};

use crate::address::parse_address;
use crate::types::{TokenMetadata, TrackedToken};
use crate::{LedgerError, Result};

/// Curated allow-list the ledger is scoped to.
#[derive(Debug, Clone, Default)]
pub struct TrackedTokenList {
    tokens: Vec<TrackedToken>,
    by_address: HashMap<Address, usize>,
}

impl TrackedTokenList {
    pub fn new(tokens: Vec<TrackedToken>) -> Self {
        let mut list = Self::default();
        for token in tokens {
            match parse_address(&token.contract_address) {
                Ok(address) => {
                    if list.by_address.contains_key(&address) {
                        debug!("Duplicate tracked token {} ignored", token.contract_address);
                        continue;
                    }
                    list.by_address.insert(address, list.tokens.len());
                    list.tokens.push(token);
                }
                Err(_) => {
                    warn!("Skipping tracked token {} with malformed address: {}", token.symbol, token.contract_address);
                }
            }
        }
        list
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LedgerError::TokenList(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let tokens: Vec<TrackedToken> = serde_json::from_str(&raw)?;
        let list = Self::new(tokens);
        info!("Loaded {} tracked tokens from {}", list.len(), path.as_ref().display());
        Ok(list)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.tokens)?;
        std::fs::write(path.as_ref(), json).map_err(|e| {
            LedgerError::TokenList(format!("failed to write {}: {}", path.as_ref().display(), e))
        })
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }

    pub fn get(&self, address: &Address) -> Option<&TrackedToken> {
        self.by_address.get(address).map(|&i| &self.tokens[i])
    }

    pub fn metadata(&self, address: &Address) -> Option<TokenMetadata> {
        self.get(address)
            .map(|token| TokenMetadata::new(token.symbol.clone(), token.decimals))
    }

    pub fn tokens(&self) -> &[TrackedToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(address: &str, symbol: &str) -> TrackedToken {
        TrackedToken {
            contract_address: address.to_string(),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            decimals: 18,
            chain_id: "56".to_string(),
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let list = TrackedTokenList::new(vec![token("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", "ALPHA")]);
        let lower = parse_address("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert!(list.contains(&lower));
        assert_eq!(list.metadata(&lower), Some(TokenMetadata::new("ALPHA", 18)));
    }

    #[test]
    fn test_malformed_and_duplicate_entries_dropped() {
        let list = TrackedTokenList::new(vec![
            token("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "ALPHA"),
            token("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", "DUP"),
            token("not-an-address", "BAD"),
        ]);
        assert_eq!(list.len(), 1);
        assert_eq!(list.tokens()[0].symbol, "ALPHA");
    }
}
