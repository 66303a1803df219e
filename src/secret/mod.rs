//! Age key resolution, encryption tooling and the decrypted-config cache

pub mod age;
pub mod cache;
pub mod resolver;
pub mod vault;

pub use age::{AgeCli, Decryptor};
pub use cache::ConfigCache;
pub use resolver::{KeySources, SecretKey, resolve_key};
pub use vault::{BitwardenCli, Vault};
