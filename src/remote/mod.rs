//! Remote object store: the contract the sync engine consumes, an
//! aws-sdk-s3 implementation, and an in-memory fake for tests.

pub mod s3;
pub mod store;

#[cfg(test)]
pub mod fake;

pub use store::{
    ProgressFn, RemoteEntry, RemoteError, RemoteHead, RemoteObjectBody, RemoteStore,
};
