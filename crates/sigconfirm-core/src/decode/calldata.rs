//! Recognises the token standard calls a wallet renders natively.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
    }

    interface IERC721 {
        function safeTransferFrom(address from, address to, uint256 tokenId) external;
        function setApprovalForAll(address operator, bool approved) external;
    }

    interface IERC721WithData {
        function safeTransferFrom(address from, address to, uint256 tokenId, bytes data) external;
    }

    interface IERC1155 {
        function safeTransferFrom(address from, address to, uint256 id, uint256 amount, bytes data) external;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    Transfer {
        to: Address,
        amount: U256,
    },
    /// ERC-20 allowance or ERC-721 single-token approval, told apart by
    /// contract metadata.
    Approve {
        spender: Address,
        amount: U256,
    },
    /// ERC-20 `transferFrom` or ERC-721 `transferFrom`; same selector.
    TransferFrom {
        from: Address,
        to: Address,
        amount: U256,
    },
    NftSafeTransfer {
        from: Address,
        to: Address,
        token_id: U256,
    },
    MultiTokenTransfer {
        from: Address,
        to: Address,
        id: U256,
        amount: U256,
    },
    SetApprovalForAll {
        operator: Address,
        approved: bool,
    },
    Unknown {
        selector: Option<[u8; 4]>,
    },
}

pub fn parse_call(data: &[u8]) -> CallAction {
    let Some(selector) = data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()) else {
        return CallAction::Unknown { selector: None };
    };
    let action = if selector == IERC20::transferCall::SELECTOR {
        IERC20::transferCall::abi_decode(data, true)
            .ok()
            .map(|call| CallAction::Transfer {
                to: call.to,
                amount: call.amount,
            })
    } else if selector == IERC20::approveCall::SELECTOR {
        IERC20::approveCall::abi_decode(data, true)
            .ok()
            .map(|call| CallAction::Approve {
                spender: call.spender,
                amount: call.amount,
            })
    } else if selector == IERC20::transferFromCall::SELECTOR {
        IERC20::transferFromCall::abi_decode(data, true)
            .ok()
            .map(|call| CallAction::TransferFrom {
                from: call.from,
                to: call.to,
                amount: call.amount,
            })
    } else if selector == IERC721::safeTransferFromCall::SELECTOR {
        IERC721::safeTransferFromCall::abi_decode(data, true)
            .ok()
            .map(|call| CallAction::NftSafeTransfer {
                from: call.from,
                to: call.to,
                token_id: call.tokenId,
            })
    } else if selector == IERC721WithData::safeTransferFromCall::SELECTOR {
        IERC721WithData::safeTransferFromCall::abi_decode(data, true)
            .ok()
            .map(|call| CallAction::NftSafeTransfer {
                from: call.from,
                to: call.to,
                token_id: call.tokenId,
            })
    } else if selector == IERC721::setApprovalForAllCall::SELECTOR {
        IERC721::setApprovalForAllCall::abi_decode(data, true)
            .ok()
            .map(|call| CallAction::SetApprovalForAll {
                operator: call.operator,
                approved: call.approved,
            })
    } else if selector == IERC1155::safeTransferFromCall::SELECTOR {
        IERC1155::safeTransferFromCall::abi_decode(data, true)
            .ok()
            .map(|call| CallAction::MultiTokenTransfer {
                from: call.from,
                to: call.to,
                id: call.id,
                amount: call.amount,
            })
    } else {
        None
    };

    action.unwrap_or(CallAction::Unknown {
        selector: Some(selector),
    })
}

pub fn encode_approve(spender: Address, amount: U256) -> Vec<u8> {
    IERC20::approveCall { spender, amount }.abi_encode()
}

pub fn encode_transfer(to: Address, amount: U256) -> Vec<u8> {
    IERC20::transferCall { to, amount }.abi_encode()
}

pub fn encode_transfer_from(from: Address, to: Address, amount: U256) -> Vec<u8> {
    IERC20::transferFromCall { from, to, amount }.abi_encode()
}

pub fn encode_set_approval_for_all(operator: Address, approved: bool) -> Vec<u8> {
    IERC721::setApprovalForAllCall { operator, approved }.abi_encode()
}

pub fn encode_safe_transfer_1155(
    from: Address,
    to: Address,
    id: U256,
    amount: U256,
    data: Bytes,
) -> Vec<u8> {
    IERC1155::safeTransferFromCall {
        from,
        to,
        id,
        amount,
        data,
    }
    .abi_encode()
}

pub fn selector_hex(selector: [u8; 4]) -> String {
    format!("0x{}", alloy::primitives::hex::encode(selector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const SPENDER: Address = address!("1111111111111111111111111111111111111111");

    #[test]
    fn approve_selector_is_standard() {
        let data = encode_approve(SPENDER, U256::MAX);
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(
            parse_call(&data),
            CallAction::Approve {
                spender: SPENDER,
                amount: U256::MAX
            }
        );
    }

    #[test]
    fn erc1155_transfer_decodes() {
        let data = encode_safe_transfer_1155(
            Address::ZERO,
            SPENDER,
            U256::from(7u64),
            U256::from(3u64),
            Bytes::new(),
        );
        assert_eq!(
            parse_call(&data),
            CallAction::MultiTokenTransfer {
                from: Address::ZERO,
                to: SPENDER,
                id: U256::from(7u64),
                amount: U256::from(3u64)
            }
        );
    }

    #[test]
    fn short_or_unknown_calldata() {
        assert_eq!(parse_call(&[0x01, 0x02]), CallAction::Unknown { selector: None });
        assert_eq!(
            parse_call(&[0xde, 0xad, 0xbe, 0xef]),
            CallAction::Unknown {
                selector: Some([0xde, 0xad, 0xbe, 0xef])
            }
        );
    }

    #[test]
    fn truncated_known_call_is_unknown() {
        let data = encode_transfer(SPENDER, U256::from(1u64));
        assert!(matches!(
            parse_call(&data[..20]),
            CallAction::Unknown { selector: Some(_) }
        ));
    }
}
