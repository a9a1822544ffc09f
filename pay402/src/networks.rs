//! Network configuration registry.
//!
//! A [`NetworkConfig`] describes everything the protocol needs to know about
//! one supported chain: its name, numeric EIP-155 chain reference, the
//! stablecoin deployment used for payments, and the default facilitator
//! endpoint. Concrete tables live in chain-specific crates (`pay402-evm`
//! provides `BASE_NETWORKS`); applications assemble a [`NetworkRegistry`]
//! from those slices at startup and treat it as read-only afterwards.

use alloy_primitives::Address;
use std::collections::HashMap;

/// Static description of one supported network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Human-readable network name (e.g. `"base"`, `"base-sepolia"`).
    pub name: &'static str,
    /// Numeric EIP-155 chain reference (e.g. 8453 for Base).
    pub chain_reference: u64,
    /// The stablecoin contract used for payments on this network.
    pub asset: Address,
    /// Decimal precision of the asset (6 for USDC).
    pub decimals: u8,
    /// EIP-712 domain name of the asset contract.
    pub eip712_name: &'static str,
    /// EIP-712 domain version of the asset contract.
    pub eip712_version: &'static str,
    /// Default facilitator base URL for this network.
    pub facilitator: &'static str,
}

/// Registry mapping network names to their configuration.
///
/// Every network name appearing in a requirement or proof must resolve to
/// exactly one entry; registering a duplicate name replaces the earlier
/// entry, keeping the invariant by construction.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    by_name: HashMap<&'static str, NetworkConfig>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated from a configuration slice.
    #[must_use]
    pub fn from_networks(networks: &[NetworkConfig]) -> Self {
        let mut registry = Self {
            by_name: HashMap::with_capacity(networks.len()),
        };
        registry.register(networks);
        registry
    }

    /// Registers additional networks into this registry.
    pub fn register(&mut self, networks: &[NetworkConfig]) {
        for config in networks {
            self.by_name.insert(config.name, *config);
        }
    }

    /// Builder-style method: registers additional networks and returns `self`.
    #[must_use]
    pub fn with_networks(mut self, networks: &[NetworkConfig]) -> Self {
        self.register(networks);
        self
    }

    /// Looks up a network configuration by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&NetworkConfig> {
        self.by_name.get(name)
    }

    /// Returns `true` if the named network is registered.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the number of registered networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if no networks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
