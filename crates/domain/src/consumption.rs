//! Consumption records: how much of which food was eaten in a meal.

use common::{ConsumptionId, ItemId, LotId, MealId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The inventory lot a consumption draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LotLink {
    pub item_id: ItemId,
    pub lot_id: LotId,
}

impl LotLink {
    pub fn new(item_id: ItemId, lot_id: LotId) -> Self {
        Self { item_id, lot_id }
    }

    /// Returns a link only when both IDs are present and neither is nil.
    pub fn from_parts(item_id: Option<ItemId>, lot_id: Option<LotId>) -> Option<Self> {
        match (item_id, lot_id) {
            (Some(item_id), Some(lot_id)) if !item_id.is_nil() && !lot_id.is_nil() => {
                Some(Self { item_id, lot_id })
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for LotLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.item_id, self.lot_id)
    }
}

/// A persisted consumption record, always scoped to one meal.
///
/// A record is *linked* when it references both an inventory item and a lot;
/// only linked records are reconciled against the remote inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionRecord {
    pub id: ConsumptionId,
    pub meal_id: MealId,
    pub item_id: Option<ItemId>,
    pub lot_id: Option<LotId>,
    pub food_name: String,
    /// Quantity in the unit shown to the user.
    pub quantity_used: f64,
    /// Quantity converted to the standardized unit used for comparisons.
    pub quantity_used_std: f64,
    pub unit: String,
    pub kcal: f64,
    pub cost: f64,
}

impl ConsumptionRecord {
    /// Builds a new record from a draft. The draft's cost is used as-is,
    /// defaulting to zero; linked records get their cost replaced by the saga.
    /// Nil IDs are stored as absent.
    pub fn from_draft(id: ConsumptionId, meal_id: MealId, draft: &ConsumptionDraft) -> Self {
        Self {
            id,
            meal_id,
            item_id: draft.item_id.filter(|id| !id.is_nil()),
            lot_id: draft.lot_id.filter(|id| !id.is_nil()),
            food_name: draft.food_name.clone(),
            quantity_used: draft.quantity_used,
            quantity_used_std: draft.quantity_used_std,
            unit: draft.unit.clone(),
            kcal: draft.kcal,
            cost: draft.cost.unwrap_or(0.0),
        }
    }

    pub fn link(&self) -> Option<LotLink> {
        LotLink::from_parts(self.item_id, self.lot_id)
    }

    pub fn is_linked(&self) -> bool {
        self.link().is_some()
    }
}

/// Inbound payload for creating or updating a consumption record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionDraft {
    /// Target record; required for updates, ignored on create.
    #[serde(default)]
    pub id: Option<ConsumptionId>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub lot_id: Option<LotId>,
    #[serde(default)]
    pub food_name: String,
    pub quantity_used: f64,
    #[serde(default)]
    pub quantity_used_std: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub kcal: f64,
    #[serde(default)]
    pub cost: Option<f64>,
}

impl ConsumptionDraft {
    pub fn new(food_name: impl Into<String>, quantity_used: f64, unit: impl Into<String>) -> Self {
        Self {
            food_name: food_name.into(),
            quantity_used,
            quantity_used_std: quantity_used,
            unit: unit.into(),
            ..Self::default()
        }
    }

    pub fn linked_to(mut self, item_id: ItemId, lot_id: LotId) -> Self {
        self.item_id = Some(item_id);
        self.lot_id = Some(lot_id);
        self
    }

    pub fn with_id(mut self, id: ConsumptionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_quantity(mut self, quantity_used: f64, quantity_used_std: f64) -> Self {
        self.quantity_used = quantity_used;
        self.quantity_used_std = quantity_used_std;
        self
    }

    pub fn with_kcal(mut self, kcal: f64) -> Self {
        self.kcal = kcal;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn link(&self) -> Option<LotLink> {
        LotLink::from_parts(self.item_id, self.lot_id)
    }

    /// Rejects quantities that cannot be applied to a lot.
    pub fn validate(&self) -> Result<(), DomainError> {
        check_quantity("quantity_used", self.quantity_used)?;
        check_quantity("quantity_used_std", self.quantity_used_std)?;
        check_quantity("kcal", self.kcal)?;
        if let Some(cost) = self.cost {
            check_quantity("cost", cost)?;
        }
        Ok(())
    }
}

fn check_quantity(field: &'static str, value: f64) -> Result<(), DomainError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DomainError::InvalidQuantity { field, value })
    }
}
