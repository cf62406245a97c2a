//! Backing store provider implementations

pub mod local;
pub mod unavailable;

#[cfg(feature = "store-redis")]
pub mod redis;

pub use local::LocalStore;
pub use unavailable::UnavailableStore;

#[cfg(feature = "store-redis")]
pub use self::redis::RedisStore;
