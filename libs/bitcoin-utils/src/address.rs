//! Address parsing helpers.

use std::str::FromStr;

use bitcoin::{Address, Network, ScriptBuf};

use crate::{BitcoinUtilsError, Result};

/// Parse an address string and require it to belong to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    Address::from_str(address)
        .map_err(|e| BitcoinUtilsError::InvalidAddress(format!("{address}: {e}")))?
        .require_network(network)
        .map_err(|e| BitcoinUtilsError::InvalidAddress(format!("{address}: {e}")))
}

/// Script pubkey paying to `address`.
pub fn output_script(address: &str, network: Network) -> Result<ScriptBuf> {
    Ok(parse_address(address, network)?.script_pubkey())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_addresses() {
        assert!(parse_address(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            Network::Bitcoin
        )
        .is_ok());
        assert!(parse_address(
            "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
            Network::Testnet
        )
        .is_ok());
    }

    #[test]
    fn rejects_wrong_network() {
        assert!(parse_address(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            Network::Testnet
        )
        .is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_address("not an address", Network::Bitcoin).is_err());
        assert!(output_script("", Network::Bitcoin).is_err());
    }
}
