//! Proptest strategies

use proptest::prelude::*;
use std::time::Duration;

/// Cache keys shaped like `summary:article-<id>:v<n>`
pub fn cache_key_strategy() -> impl Strategy<Value = String> {
    (1u32..10_000, 1u8..5).prop_map(|(id, version)| format!("summary:article-{id}:v{version}"))
}

/// Client identities: IPv4 addresses and user ids
pub fn identity_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
            .prop_map(|(a, b, c, d)| format!("{a}.{b}.{c}.{d}")),
        "[a-z]{3,12}".prop_map(|name| format!("user:{name}")),
    ]
}

/// Windows between one second and one hour
pub fn window_strategy() -> impl Strategy<Value = Duration> {
    (1u64..=3_600).prop_map(Duration::from_secs)
}

/// (limit, requests) pairs with requests possibly exceeding the limit
pub fn budget_and_load_strategy() -> impl Strategy<Value = (u64, u64)> {
    (1u64..50).prop_flat_map(|limit| (Just(limit), 1u64..(limit * 3)))
}
