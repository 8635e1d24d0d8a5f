//! Host platform integration
//!
//! The host platform owns gateway configuration, item prices and the actual
//! enrolment or purchase granted after a payment. This module reaches it over
//! its REST API.

pub mod client;

pub use client::{HostClient, HostConfig};
