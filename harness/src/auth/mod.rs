//! Per-actor credential management
//!
//! Each actor authenticates as its own synthetic user. Tokens are cached per
//! actor id and reused until they expire.

mod cache;

pub use cache::{ActorSession, CredentialCache, CredentialConfig, synthetic_credentials};
