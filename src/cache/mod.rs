//! # Tiered Cache Module
//!
//! Read-through caching over the backing store with a process-local fallback.
//!
//! ## Architecture
//!
//! ```text
//! CacheFacade                     <- ordered tier walk, strategy fixed at construction
//!   ├── Network (dyn BackingStore)  <- consulted only while the store reports alive
//!   └── Memory (MemoryFallbackCache)<- always available, per-key expiry
//! ```
//!
//! ## Design Decisions
//!
//! - **One serialization**: every value is stored as JSON text in both tiers
//! - **Graceful degradation**: store failure falls through to memory, never to the caller
//! - **Best-effort writes**: cache errors logged but never propagated
//! - **Fetch errors surface**: `get_or_set` returns the fetch error unchanged

pub mod facade;
pub mod memory;

pub use facade::{CacheFacade, CacheStrategy, CacheTier};
pub use memory::{CacheEntry, MemoryFallbackCache};
