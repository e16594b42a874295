// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-20 settlement token bindings.

use alloy::{
    primitives::{Address, U256},
    sol,
    sol_types::SolCall,
};

use super::types::ChainCall;

// Define the ERC-20 interface using alloy's sol! macro
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// Build a `transfer(to, amount)` call against the token contract.
pub fn transfer_call(token: Address, to: Address, amount: U256) -> ChainCall {
    let data = IERC20::transferCall { to, amount }.abi_encode();
    ChainCall::contract(token, data)
}
