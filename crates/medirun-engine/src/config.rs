//! # Engine Configuration
//!
//! Explicitly constructed configuration for the engine.
//!
//! ## No Singletons
//! The configuration is a plain value built at process startup and passed
//! into [`crate::Engine::new`]. Nothing reads it lazily from a global; if
//! two engines with different configs run in one process, they do not
//! interfere.

use serde::{Deserialize, Serialize};

/// Tunables for the engine.
///
/// Most deployments only override a field or two:
/// ```rust,ignore
/// let config = EngineConfig::default()
///     .max_orders_per_slot(8)
///     .max_driver_load(12);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// How many orders count as 100% for one (window, driver) slot in the
    /// capacity view. The view is advisory; this is not an admission limit.
    pub max_orders_per_slot: u32,

    /// Maximum non-terminal deliveries a driver may carry before further
    /// assignments are rejected.
    pub max_driver_load: i64,

    /// Window used for placeholder orders created by prescription approval
    /// before the customer has picked one.
    pub default_delivery_window: String,

    /// Shipment weight per ordered unit, used for the order weight total.
    pub unit_weight_grams: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_orders_per_slot: 5,
            max_driver_load: 10,
            default_delivery_window: "09:00 - 12:00".to_string(),
            unit_weight_grams: 100,
        }
    }
}

impl EngineConfig {
    /// Sets how many orders fill a capacity slot.
    pub fn max_orders_per_slot(mut self, max: u32) -> Self {
        self.max_orders_per_slot = max;
        self
    }

    /// Sets the driver load ceiling.
    pub fn max_driver_load(mut self, max: i64) -> Self {
        self.max_driver_load = max;
        self
    }

    /// Sets the default delivery window.
    pub fn default_delivery_window(mut self, window: impl Into<String>) -> Self {
        self.default_delivery_window = window.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_orders_per_slot, 5);
        assert_eq!(config.unit_weight_grams, 100);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::default()
            .max_orders_per_slot(8)
            .max_driver_load(3)
            .default_delivery_window("12:00 - 15:00");

        assert_eq!(config.max_orders_per_slot, 8);
        assert_eq!(config.max_driver_load, 3);
        assert_eq!(config.default_delivery_window, "12:00 - 15:00");
    }
}
