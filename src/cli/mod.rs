//!
//! ferry client support
//! --------------------
//! Client-side protocol plumbing shared by the `ferry_cli` binary and the
//! integration tests.

pub mod connectivity;

pub use connectivity::TransferClient;
