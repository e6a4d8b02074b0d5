//! ABI bindings for the contracts a user operation talks to.
//!
//! These are fixed encode targets owned by the on-chain code; only the
//! functions this crate builds calls for are declared.

use alloy_sol_types::sol;

sol! {
    /// One call inside an `executeBatch`.
    #[derive(Debug, PartialEq, Eq)]
    struct Call {
        address dest;
        uint256 value;
        bytes data;
    }

    /// WebAuthn signature as decoded by the account's verifier.
    ///
    /// The acting key slot is not part of the tuple; it travels in the
    /// signature prefix.
    #[derive(Debug, PartialEq, Eq)]
    struct WebAuthnSignature {
        bytes authenticatorData;
        string clientDataJSON;
        uint256 challengeLocation;
        uint256 responseTypeLocation;
        uint256 r;
        uint256 s;
    }

    #[derive(Debug)]
    interface IDaimoAccount {
        function executeBatch(Call[] calldata calls) external;
        function addSigningKey(uint8 slot, bytes32[2] memory key) external;
        function removeSigningKey(uint8 slot) external;
        function getActiveSigningKeys()
            external
            view
            returns (bytes32[2][] memory activeSigningKeys, uint8[] memory activeSigningKeySlots);
    }

    #[derive(Debug)]
    interface IDaimoAccountFactory {
        function createAccount(
            uint8 keySlot,
            bytes32[2] memory key,
            Call[] calldata initCalls,
            uint256 salt
        ) external payable returns (address);
    }

    #[derive(Debug)]
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }

    #[derive(Debug)]
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
    }
}
