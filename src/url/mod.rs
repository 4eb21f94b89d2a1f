//! URL handling for Sumi-Archive
//!
//! Normalization produces the identity key for every dedup and storage
//! operation; the host key drives per-host politeness.

mod host;
mod normalize;

pub use host::host_key;
pub use normalize::normalize_url;
