//! Ordered RPC endpoint pool.

/// A single node address with its position in the failover order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    /// 1-based position, preserved from configuration.
    position: usize,
}

impl Endpoint {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

/// The ordered set of node addresses. Immutable after load.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
}

impl EndpointPool {
    /// Build a pool preserving the configured order. Returns `None` for
    /// an empty list — a scanner without endpoints cannot run.
    pub fn new(urls: Vec<String>) -> Option<Self> {
        if urls.is_empty() {
            return None;
        }
        let endpoints = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| Endpoint {
                url,
                position: i + 1,
            })
            .collect();
        Some(Self { endpoints })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoint at `index`, wrapping past the end of the list.
    pub fn get(&self, index: usize) -> &Endpoint {
        &self.endpoints[index % self.endpoints.len()]
    }

    /// The index after `index`, wrapping to the first endpoint when the
    /// list is exhausted.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.endpoints.len()
    }
}
