//! ABI bindings for the calls the orchestrator makes.

use alloy::{
    dyn_abi::DynSolValue,
    sol,
    sol_types::SolCall,
};
use alloy_core::primitives::{Address, Bytes};

use crate::LedgerError;

sol! {
    /// The part of `Ownable` the handoff relies on.
    interface Ownable {
        function owner() external view returns (address);
        function transferOwnership(address newOwner) external;
    }
}

/// `owner()` on an Ownable contract.
pub const OWNER_SIGNATURE: &str = <Ownable::ownerCall as SolCall>::SIGNATURE;
/// `transferOwnership(address)` on an Ownable contract.
pub const TRANSFER_OWNERSHIP_SIGNATURE: &str =
    <Ownable::transferOwnershipCall as SolCall>::SIGNATURE;

pub fn owner_call() -> Bytes {
    Ownable::ownerCall {}.abi_encode().into()
}

pub fn transfer_ownership_call(new_owner: Address) -> Bytes {
    Ownable::transferOwnershipCall {
        newOwner: new_owner,
    }
    .abi_encode()
    .into()
}

/// New owner carried by `transferOwnership(address)` calldata, if `data` is such a call.
pub fn decode_transfer_ownership(data: &[u8]) -> Option<Address> {
    Ownable::transferOwnershipCall::abi_decode_validate(data)
        .ok()
        .map(|call| call.newOwner)
}

/// Decode the return value of `owner()`. Dirty upper bytes are rejected.
pub fn decode_owner(data: &[u8]) -> Result<Address, LedgerError> {
    Ownable::ownerCall::abi_decode_returns_validate(data).map_err(|e| {
        LedgerError::Malformed(format!("owner() returned 0x{}: {e}", hex::encode(data)))
    })
}

/// Creation payload: contract bytecode followed by the encoded constructor arguments.
pub fn encode_creation(bytecode: &Bytes, args: Vec<DynSolValue>) -> Bytes {
    let mut data = bytecode.to_vec();
    if !args.is_empty() {
        data.extend(DynSolValue::Tuple(args).abi_encode_params());
    }
    data.into()
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{U256, address};

    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(OWNER_SIGNATURE, "owner()");
        assert_eq!(TRANSFER_OWNERSHIP_SIGNATURE, "transferOwnership(address)");
        assert_eq!(hex::encode(owner_call()), "8da5cb5b");
    }

    #[test]
    fn test_transfer_ownership_call() {
        let new_owner = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        let calldata = transfer_ownership_call(new_owner);

        assert_eq!(
            hex::encode(&calldata),
            "f2fde38b00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8"
        );
        assert_eq!(decode_transfer_ownership(&calldata), Some(new_owner));
        assert_eq!(decode_transfer_ownership(&owner_call()), None);
    }

    #[test]
    fn test_creation_appends_constructor_args() {
        let bytecode = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]);
        let a = address!("0000000000000000000000000000000000000011");

        let data = encode_creation(
            &bytecode,
            vec![
                DynSolValue::Address(a),
                DynSolValue::Uint(U256::from(8386u64), 256),
                DynSolValue::Bool(true),
            ],
        );

        assert_eq!(data.len(), 4 + 3 * 32);
        assert_eq!(&data[..4], bytecode.as_ref());
        assert_eq!(&data[4..36], a.into_word().as_slice());
        assert_eq!(data[66..68], [0x20, 0xc2]);
        assert_eq!(data[99], 1);

        assert_eq!(encode_creation(&bytecode, vec![]), bytecode);
    }

    #[test]
    fn test_decode_owner() {
        let owner = address!("9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F");
        assert_eq!(decode_owner(owner.into_word().as_slice()).unwrap(), owner);

        assert!(matches!(
            decode_owner(&[0u8; 20]),
            Err(LedgerError::Malformed(_))
        ));
        let mut dirty = [0u8; 32];
        dirty[0] = 1;
        assert!(decode_owner(&dirty).is_err());
    }
}
