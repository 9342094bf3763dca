//! Statistics derived from consumption records.

use common::ItemId;
use serde::{Deserialize, Serialize};

/// The item a user consumed most of, by standardized quantity, within a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MostConsumedFood {
    pub item_id: ItemId,
    pub food_name: String,
    pub quantity_used_std: f64,
    pub quantity_used: f64,
    pub unit: String,
}
