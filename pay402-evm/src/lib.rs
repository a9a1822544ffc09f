#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM payment signing for the x402 payment protocol.
//!
//! This crate produces signed ERC-3009 `transferWithAuthorization` payments
//! for EIP-155 chains. The authorization is signed as EIP-712 typed data
//! with the token contract as the verifying contract, which is the scheme
//! USDC supports natively and the one interoperable facilitators expect.
//!
//! # Modules
//!
//! - [`networks`] - USDC deployments on Base networks
//! - [`signer`] - Signer abstraction and EIP-712 signing
//! - [`types`] - The Solidity-compatible typed-data struct

pub mod networks;
pub mod signer;
pub mod types;

pub use networks::BASE_NETWORKS;
pub use signer::{ExactEvmClient, SignerLike};
