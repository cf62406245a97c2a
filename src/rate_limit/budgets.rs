//! Static rate-limit budgets per route class
//!
//! Paths map to a class by prefix at segment boundaries, so `/api/auth`
//! covers `/api/auth` and `/api/auth/login` but not `/api/authors`.

use crate::clock::duration_to_ms;
use crate::config::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Request ceiling over a fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitBudget {
    pub limit: u64,
    pub window_ms: u64,
}

impl RateLimitBudget {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window_ms: duration_to_ms(window).max(0) as u64,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitBudget {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    Auth,
    Generation,
    Default,
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RouteClass::Auth => "auth",
            RouteClass::Generation => "generation",
            RouteClass::Default => "default",
        };
        f.write_str(label)
    }
}

/// Path prefix -> budget lookup table
#[derive(Debug, Clone)]
pub struct RouteBudgets {
    routes: Vec<(String, RouteClass, RateLimitBudget)>,
    default_budget: RateLimitBudget,
}

impl RouteBudgets {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let mut routes = Vec::new();
        for prefix in &config.auth.path_prefixes {
            routes.push((prefix.clone(), RouteClass::Auth, config.auth.budget));
        }
        for prefix in &config.generation.path_prefixes {
            routes.push((
                prefix.clone(),
                RouteClass::Generation,
                config.generation.budget,
            ));
        }
        // Longest prefix wins
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            routes,
            default_budget: config.default_budget,
        }
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        self.resolve(path).0
    }

    pub fn resolve(&self, path: &str) -> (RouteClass, RateLimitBudget) {
        self.routes
            .iter()
            .find(|(prefix, _, _)| matches_prefix(path, prefix))
            .map(|(_, class, budget)| (*class, *budget))
            .unwrap_or((RouteClass::Default, self.default_budget))
    }

    pub fn default_budget(&self) -> RateLimitBudget {
        self.default_budget
    }
}

impl Default for RouteBudgets {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let budgets = RouteBudgets::default();

        let (class, budget) = budgets.resolve("/api/auth/login");
        assert_eq!(class, RouteClass::Auth);
        assert_eq!(budget, RateLimitBudget::new(10, Duration::from_secs(60)));

        let (class, budget) = budgets.resolve("/api/generate/article");
        assert_eq!(class, RouteClass::Generation);
        assert_eq!(budget.limit, 5);

        assert_eq!(budgets.classify("/api/ai"), RouteClass::Generation);
        assert_eq!(budgets.classify("/api/articles"), RouteClass::Default);
        assert_eq!(budgets.resolve("/").1.limit, 100);
    }

    #[test]
    fn test_prefix_matches_whole_segments() {
        let budgets = RouteBudgets::default();
        assert_eq!(budgets.classify("/api/authors"), RouteClass::Default);
        assert_eq!(budgets.classify("/api/auth"), RouteClass::Auth);
        assert_eq!(budgets.classify("/api/auth?next=/"), RouteClass::Auth);
    }
}
