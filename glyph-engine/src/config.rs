use glyphs_types::Network;

/// Static configuration of a protocol instance. Owned by the instance;
/// never a process-wide singleton.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub network: Network,
    /// Default flat fee rate in satoshis per serialized byte.
    pub fee_rate: u64,
    /// Smallest wallet UTXO considered when bootstrapping funding
    /// (0.0001 BTC).
    pub bootstrap_funding_sats: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet4,
            fee_rate: 1,
            bootstrap_funding_sats: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }
}
