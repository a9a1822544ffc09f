//! USDC deployments on well-known EVM networks.
//!
//! These tables feed a [`NetworkRegistry`](pay402::networks::NetworkRegistry)
//! at startup. The EIP-712 domain name differs between the Base mainnet and
//! testnet USDC contracts; both use domain version `"2"`.

use alloy_primitives::address;
use pay402::networks::NetworkConfig;

/// Default public facilitator endpoint.
pub const DEFAULT_FACILITATOR: &str = "https://x402.org/facilitator";

/// USDC on Base mainnet.
pub const BASE: NetworkConfig = NetworkConfig {
    name: "base",
    chain_reference: 8453,
    asset: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
    decimals: 6,
    eip712_name: "USD Coin",
    eip712_version: "2",
    facilitator: DEFAULT_FACILITATOR,
};

/// USDC on Base Sepolia.
pub const BASE_SEPOLIA: NetworkConfig = NetworkConfig {
    name: "base-sepolia",
    chain_reference: 84_532,
    asset: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
    decimals: 6,
    eip712_name: "USDC",
    eip712_version: "2",
    facilitator: DEFAULT_FACILITATOR,
};

/// All supported Base networks.
pub const BASE_NETWORKS: &[NetworkConfig] = &[BASE, BASE_SEPOLIA];
