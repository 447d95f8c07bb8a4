use std::collections::HashMap;
use std::sync::Arc;

use crate::fetcher::Fetcher;

/// Fetchers keyed by name, built once at startup from the concrete
/// fetchers the binary wires up (HTTP always; browser/AI fetchers
/// optionally). Mirrors the original's lazy `_get_fetcher` cache, except
/// availability is a property of the fetcher itself rather than a
/// try/except around construction.
pub struct FetcherRegistry {
    fetchers: HashMap<&'static str, Arc<dyn Fetcher>>,
    order: Vec<&'static str>,
}

impl FetcherRegistry {
    pub fn new(fetchers: Vec<Arc<dyn Fetcher>>) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for fetcher in fetchers {
            order.push(fetcher.name());
            map.insert(fetcher.name(), fetcher);
        }
        FetcherRegistry { fetchers: map, order }
    }

    /// Returns `None` if the named fetcher was never registered, or is
    /// registered but reports itself unavailable.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Fetcher>> {
        self.fetchers
            .get(name)
            .filter(|f| f.is_available())
            .cloned()
    }

    pub fn available_methods(&self) -> Vec<&'static str> {
        self.order
            .iter()
            .copied()
            .filter(|name| self.fetchers.get(name).map(|f| f.is_available()).unwrap_or(false))
            .collect()
    }
}
