//! Explicit strategy registry: sorted once at registration time, not
//! rescanned per request.

use std::sync::Arc;

use crate::strategy::Strategy;

pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Inserts `strategy` and re-sorts by descending priority. Sorting
    /// happens here, at registration, never during `select`.
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.push(strategy);
        self.strategies.sort_by_key(|s| std::cmp::Reverse(s.priority()));
    }

    pub fn ordered(&self) -> &[Arc<dyn Strategy>] {
        &self.strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Selection, StrategyError, Task};
    use serde_json::Value;

    struct Fixed {
        name: &'static str,
        priority: i32,
    }

    impl Strategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn select_model(&self, _task: &Task, _context: &Value) -> Result<Option<Selection>, StrategyError> {
            Ok(Some(Selection {
                model: self.name.to_string(),
            }))
        }
    }

    #[test]
    fn registration_sorts_by_descending_priority() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(Fixed { name: "low", priority: 1 }));
        registry.register(Arc::new(Fixed {
            name: "high",
            priority: 100,
        }));
        registry.register(Arc::new(Fixed { name: "mid", priority: 50 }));

        let names: Vec<_> = registry.ordered().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }
}
