//! Building, signing and submitting Daimo user operations.
//!
//! [`UserOperationBuilder`] composes contract calls into an `executeBatch`,
//! picks a fresh nonce, adds deployment code for a counterfactual account,
//! has a [`daimo_signer::Signer`] sign the operation hash and hands the result
//! to a [`Bundler`]. On-chain reads go through [`AccountChain`].

pub mod builder;
pub mod bundler;
pub mod calls;
pub mod chain;
pub mod config;
pub mod error;

pub use builder::{Account, SignedOperation, UserOperationBuilder};
pub use bundler::{Bundler, RpcBundler};
pub use calls::AccountInit;
pub use chain::{AccountChain, RpcAccountChain};
pub use config::Config;
pub use error::{Result, UserOpError};
