//! # Network Presets
//!
//! Known deployments of the PixelBoard contract. A configuration names a
//! preset and may override its RPC URL or contract address.

use std::str::FromStr;

use alloy_primitives::Address;

use pixelwar_core::{CanvasError, CanvasResult, SyncConfig};

/// A chain the PixelBoard contract is deployed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Network {
    /// Preset name used in configuration.
    pub name: &'static str,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Human readable chain name.
    pub display_name: &'static str,
    /// Public RPC endpoint.
    pub rpc_url: &'static str,
    /// Block explorer.
    pub explorer_url: &'static str,
    /// Native currency symbol.
    pub currency: &'static str,
    /// Deployed contract address.
    pub contract: &'static str,
}

/// Every known deployment.
pub const NETWORKS: [Network; 4] = [
    Network {
        name: "celoMainnet",
        chain_id: 42_220,
        display_name: "Celo Mainnet",
        rpc_url: "https://forno.celo.org",
        explorer_url: "https://celoscan.io",
        currency: "CELO",
        contract: "0x698b374C3B664EB5ae7A87f38CB4909eAE1231c1",
    },
    Network {
        name: "celoSepolia",
        chain_id: 11_142_220,
        display_name: "Celo Sepolia Testnet",
        rpc_url: "https://forno.celo-sepolia.celo-testnet.org/",
        explorer_url: "https://celoscan.io",
        currency: "CELO",
        contract: "0xa236159c79b89ac1747d19e7880a6fb58fa7f85c",
    },
    Network {
        name: "baseSepolia",
        chain_id: 84_532,
        display_name: "Base Sepolia",
        rpc_url: "https://sepolia.base.org",
        explorer_url: "https://sepolia-explorer.base.org",
        currency: "ETH",
        contract: "0x3ddc57f7d49c74d76f39a9623fece342e82fe3cd",
    },
    Network {
        name: "baseMainnet",
        chain_id: 8_453,
        display_name: "Base Mainnet",
        rpc_url: "https://mainnet.base.org",
        explorer_url: "https://base.blockscout.com/",
        currency: "ETH",
        contract: "0x2f6326006f29f6c78791b09a9c9911a56df83300",
    },
];

impl Network {
    /// Looks up a preset by its configuration name.
    ///
    /// # Errors
    ///
    /// `UnknownNetwork` if no preset has that name.
    pub fn by_name(name: &str) -> CanvasResult<Self> {
        NETWORKS
            .iter()
            .find(|n| n.name == name)
            .copied()
            .ok_or_else(|| CanvasError::UnknownNetwork(name.to_string()))
    }

    /// Looks up a preset by chain id.
    #[must_use]
    pub fn by_chain_id(chain_id: u64) -> Option<Self> {
        NETWORKS.iter().find(|n| n.chain_id == chain_id).copied()
    }

    /// Parsed contract address.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the preset address is malformed.
    pub fn contract(&self) -> CanvasResult<Address> {
        parse_address(self.contract)
    }

    /// Explorer link for a transaction.
    #[must_use]
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{tx_hash}", self.explorer_url.trim_end_matches('/'))
    }
}

/// Where to connect, after applying configuration overrides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// The preset it was resolved from.
    pub network: Network,
    /// RPC URL to use.
    pub rpc_url: String,
    /// Contract address to use.
    pub contract: Address,
}

impl Endpoint {
    /// Resolves the configured preset and its overrides.
    ///
    /// # Errors
    ///
    /// `UnknownNetwork` for an unknown preset, `InvalidConfig` for a
    /// malformed contract address.
    pub fn resolve(config: &SyncConfig) -> CanvasResult<Self> {
        let network = Network::by_name(&config.network)?;
        let contract = match &config.contract_address {
            Some(address) => parse_address(address)?,
            None => network.contract()?,
        };
        let rpc_url = config
            .rpc_url
            .clone()
            .unwrap_or_else(|| network.rpc_url.to_string());
        Ok(Self {
            network,
            rpc_url,
            contract,
        })
    }
}

fn parse_address(text: &str) -> CanvasResult<Address> {
    Address::from_str(text)
        .map_err(|e| CanvasError::InvalidConfig(format!("bad contract address {text}: {e}")))
}
