//! Permission filter
//!
//! Decides which requested extensions may run. A missing permission is a
//! normal configuration state, so unauthorized extensions are dropped without
//! raising an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Policy store capability consumed by the host
pub trait PolicyStore: Send + Sync {
    /// Whether the named extension is allowed to run
    fn is_authorized(&self, extension: &str) -> bool;
}

/// Keep only the authorized identifiers, preserving input order
///
/// The policy is queried once per identifier on every call; decisions are
/// never cached.
pub fn filter_authorized(policy: &dyn PolicyStore, requested: &[String]) -> Vec<String> {
    let authorized: Vec<String> = requested
        .iter()
        .filter(|id| {
            let allowed = policy.is_authorized(id);
            if !allowed {
                debug!("Extension not authorized, skipping: {}", id);
            }
            allowed
        })
        .cloned()
        .collect();

    info!(
        "Authorized {} of {} requested extensions",
        authorized.len(),
        requested.len()
    );
    authorized
}

/// Policy backed by a static allow list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AllowList {
    /// Authorize every extension regardless of the list
    #[serde(default)]
    pub allow_all: bool,
    /// Authorized extension identifiers
    #[serde(default)]
    pub authorized: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(authorized: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_all: false,
            authorized: authorized.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            authorized: BTreeSet::new(),
        }
    }
}

impl PolicyStore for AllowList {
    fn is_authorized(&self, extension: &str) -> bool {
        self.allow_all || self.authorized.contains(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingPolicy {
        allowed: Vec<&'static str>,
        queries: Mutex<Vec<String>>,
    }

    impl PolicyStore for CountingPolicy {
        fn is_authorized(&self, extension: &str) -> bool {
            self.queries.lock().unwrap().push(extension.to_string());
            self.allowed.contains(&extension)
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_only_authorized_survive() {
        let policy = AllowList::new(["B"]);
        let result = filter_authorized(&policy, &ids(&["A", "B", "C"]));
        assert_eq!(result, ids(&["B"]));
    }

    #[test]
    fn test_preserves_relative_order() {
        let policy = AllowList::new(["d", "a", "c"]);
        let result = filter_authorized(&policy, &ids(&["a", "b", "c", "d"]));
        assert_eq!(result, ids(&["a", "c", "d"]));
    }

    #[test]
    fn test_queries_policy_every_pass() {
        let policy = CountingPolicy {
            allowed: vec!["x"],
            queries: Mutex::new(Vec::new()),
        };
        let requested = ids(&["x", "y"]);
        filter_authorized(&policy, &requested);
        filter_authorized(&policy, &requested);
        assert_eq!(*policy.queries.lock().unwrap(), ids(&["x", "y", "x", "y"]));
    }

    #[test]
    fn test_allow_all() {
        let policy = AllowList::allow_all();
        assert_eq!(filter_authorized(&policy, &ids(&["p", "q"])).len(), 2);
        assert!(filter_authorized(&policy, &[]).is_empty());
    }
}
