#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the x402 payment protocol.
//!
//! This crate provides the protocol engine shared by the client and server
//! sides of an HTTP 402 Payment Required flow. When a client requests a paid
//! resource, the server responds with payment requirements. The client signs
//! a payment authorization that mirrors one of those requirements, and the
//! server verifies and settles it through a facilitator before serving the
//! resource.
//!
//! # Modules
//!
//! - [`amount`] - Atomic-unit token amounts with string wire encoding
//! - [`encoding`] - Base64 header codec
//! - [`facilitator`] - Trait for payment verification and settlement
//! - [`networks`] - Network configuration registry
//! - [`proto`] - Wire format types for challenges, proofs, and facilitator RPC
//! - [`replay`] - Replay cache with atomic nonce claiming
//! - [`scheme`] - Payment candidate construction and selection
//! - [`timestamp`] - Unix timestamps for authorization validity windows
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod encoding;
pub mod facilitator;
pub mod networks;
pub mod proto;
pub mod replay;
pub mod scheme;
pub mod timestamp;
