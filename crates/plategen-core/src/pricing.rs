//! Pricing configuration for plategen.
//!
//! Costs are whole credits per generation unit. 1 credit = one batch-sized
//! generation; single-image requests are priced separately because they skip
//! the batch rate budget.

use serde::{Deserialize, Serialize};

/// Default cost of a standalone single-image generation, in credits.
pub const DEFAULT_SINGLE_IMAGE_CREDITS: i64 = 2;

/// Default cost of one item within a menu batch, in credits.
pub const DEFAULT_BATCH_ITEM_CREDITS: i64 = 1;

/// Per-unit credit costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Credits debited for one successful single-image job.
    pub single_image_credits: i64,

    /// Credits debited per successful item of a menu batch. Regenerating a
    /// batch item is priced as a single image.
    pub batch_item_credits: i64,
}

impl PricingConfig {
    /// Credits to reserve for a batch of `items` units.
    #[must_use]
    pub fn batch_reservation(&self, items: u32) -> i64 {
        self.batch_item_credits * i64::from(items)
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            single_image_credits: DEFAULT_SINGLE_IMAGE_CREDITS,
            batch_item_credits: DEFAULT_BATCH_ITEM_CREDITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_costs() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.single_image_credits, 2);
        assert_eq!(pricing.batch_item_credits, 1);
    }

    #[test]
    fn batch_reservation_scales_with_items() {
        let pricing = PricingConfig {
            single_image_credits: 2,
            batch_item_credits: 3,
        };
        assert_eq!(pricing.batch_reservation(0), 0);
        assert_eq!(pricing.batch_reservation(10), 30);
    }
}
