//! In-memory storage implementations
//!
//! Suitable for development and testing. Nothing survives a restart.

mod credentials;

pub use credentials::MemoryCredentialStore;
