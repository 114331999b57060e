//! Health-aware provider candidate ordering.

use crate::api::{Options, ProviderOverride, RouteStrategy, RoutingConfig};
use crate::health::HealthStore;
use std::sync::Arc;

/// Weight assigned to providers missing a score for the active strategy;
/// sorts them last.
const MISSING_WEIGHT: f64 = 999.0;

/// Orders candidate providers by a routing strategy and filters by health.
pub struct ProviderRouter {
    config: RoutingConfig,
    default_provider: String,
    health: Arc<HealthStore>,
}

impl ProviderRouter {
    /// Create a router over the given weight table and health store.
    pub fn new(config: RoutingConfig, default_provider: String, health: Arc<HealthStore>) -> Self {
        Self {
            config,
            default_provider,
            health,
        }
    }

    /// Resolve the ordered candidate list for a call.
    ///
    /// An explicit `provider` list override is returned deduplicated in the
    /// given order, with no ranking and no health filtering. Without a
    /// configured weight table the result is just the primary provider.
    /// Otherwise all configured providers are ranked by the strategy and
    /// filtered to healthy ones; if that filter empties the list, the full
    /// ranked list is returned rather than failing closed.
    pub fn resolve(&self, options: &Options) -> Vec<String> {
        let override_ = options.provider_override();

        if let Some(ProviderOverride::List(names)) = &override_ {
            return dedupe(names.clone());
        }

        if self.config.providers.is_empty() {
            let primary = match override_ {
                Some(ProviderOverride::Single(name)) => name,
                _ => self.default_provider.clone(),
            };
            return vec![primary];
        }

        let strategy = options.routing().unwrap_or(self.config.strategy);
        let candidates = self.ranked(strategy);

        let healthy: Vec<String> = candidates
            .iter()
            .filter(|name| self.health.is_healthy(name))
            .cloned()
            .collect();

        if healthy.is_empty() { candidates } else { healthy }
    }

    /// All configured providers, cheapest/fastest first. Ties and missing
    /// scores break on the provider name so the order is deterministic.
    fn ranked(&self, strategy: RouteStrategy) -> Vec<String> {
        let mut names: Vec<&String> = self.config.providers.keys().collect();
        names.sort_by(|a, b| {
            let wa = self.weight(a, strategy);
            let wb = self.weight(b, strategy);
            wa.partial_cmp(&wb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });
        names.into_iter().cloned().collect()
    }

    fn weight(&self, provider: &str, strategy: RouteStrategy) -> f64 {
        let weights = match self.config.providers.get(provider) {
            Some(w) => w,
            None => return MISSING_WEIGHT,
        };
        let score = match strategy {
            RouteStrategy::Cost => weights.cost,
            RouteStrategy::Latency => weights.latency,
        };
        score.unwrap_or(MISSING_WEIGHT)
    }
}

fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
