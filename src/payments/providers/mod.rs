//! Payment processor implementations
//!
//! Concrete implementations of the RemoteGateway trait.

pub mod paynl;

pub use paynl::{PaynlConfig, PaynlProvider};
