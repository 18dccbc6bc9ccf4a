//! Static token registry.

use serde::{Deserialize, Serialize};

/// Symbol rendered for addresses the registry does not know.
pub const UNKNOWN_SYMBOL: &str = "AR";

/// Display metadata for a token process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    /// Remote process identifier of the token.
    pub address: String,
    pub symbol: String,
}

impl Token {
    fn new(name: &str, address: &str, symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// Sentinel for an address missing from the registry. The raw address is kept.
    pub fn unknown(address: &str) -> Self {
        Self::new("Unknown", address, UNKNOWN_SYMBOL)
    }
}

/// Fixed set of tokens the agent can trade.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: Vec<Token>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TokenRegistry {
    /// The tokens known to the shared arbitrage agent.
    pub fn builtin() -> Self {
        Self {
            tokens: vec![
                Token::new("STAR1", "T57pzUiE2jbkgRPgmW9bugDz75F8gPiFq_iqUBDYdJg", "STAR1"),
                Token::new("STAR2", "KRGomAeGRC4m9QJlP2LsulmwyVuYPE0mfsTR2B8m-Ro", "STAR2"),
            ],
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Token> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Resolve an address, falling back to the unknown sentinel.
    pub fn by_address(&self, address: &str) -> Token {
        self.tokens
            .iter()
            .find(|t| t.address == address)
            .cloned()
            .unwrap_or_else(|| Token::unknown(address))
    }

    /// Resolve either a symbol or an address (CLI input).
    pub fn resolve(&self, symbol_or_address: &str) -> Token {
        match self.by_symbol(symbol_or_address) {
            Some(token) => token.clone(),
            None => self.by_address(symbol_or_address),
        }
    }
}
