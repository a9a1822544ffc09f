//! Solidity-compatible typed-data definitions for the exact EVM scheme.

use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

sol!(
    /// ERC-3009 `transferWithAuthorization` message as EIP-712 typed data.
    ///
    /// Authorizes a transfer from `from` to `to` of exactly `value`, valid
    /// only between `validAfter` and `validBefore`, identified by a unique
    /// `nonce`. The facilitator reconstructs this exact struct from the
    /// wire-format authorization to recover and check the signer, so field
    /// order and types must not change.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);
