use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ConsumptionId, ItemId, MealId, UserId};
use domain::{ConsumptionRecord, Meal, MostConsumedFood};
use tokio::sync::RwLock;

use crate::{ConsumptionLedger, DateRange, LedgerError, MealStore, Result};

#[derive(Debug, Default)]
struct LedgerState {
    meals: HashMap<MealId, Meal>,
    // Insertion order doubles as the tie-break order for statistics.
    records: Vec<ConsumptionRecord>,
    fail_on_create: bool,
    fail_on_update: bool,
    fail_on_delete: bool,
}

impl LedgerState {
    fn position(&self, id: ConsumptionId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}

/// In-memory ledger implementation for testing and local development.
///
/// Enforces the same constraints as the PostgreSQL implementation (unique
/// IDs, records must belong to an existing meal) and can be told to fail
/// writes so failure paths of callers can be exercised.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create` fail until reset.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Makes every subsequent `update` fail until reset.
    pub async fn set_fail_on_update(&self, fail: bool) {
        self.state.write().await.fail_on_update = fail;
    }

    /// Makes every subsequent `delete` fail until reset.
    pub async fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().await.fail_on_delete = fail;
    }

    /// Returns the total number of consumption records stored.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }
}

#[async_trait]
impl ConsumptionLedger for InMemoryLedger {
    async fn list_for_meal(&self, meal_id: MealId) -> Result<Vec<ConsumptionRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.meal_id == meal_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: ConsumptionId) -> Result<ConsumptionRecord> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(LedgerError::ConsumptionNotFound(id))
    }

    async fn create(&self, record: &ConsumptionRecord) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_on_create {
            return Err(LedgerError::Unavailable("create rejected".to_string()));
        }
        if !state.meals.contains_key(&record.meal_id) {
            return Err(LedgerError::MealNotFound(record.meal_id));
        }
        if state.position(record.id).is_some() {
            return Err(LedgerError::DuplicateId(record.id));
        }

        state.records.push(record.clone());
        Ok(())
    }

    async fn update(&self, record: &ConsumptionRecord) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_on_update {
            return Err(LedgerError::Unavailable("update rejected".to_string()));
        }
        if !state.meals.contains_key(&record.meal_id) {
            return Err(LedgerError::MealNotFound(record.meal_id));
        }

        let index = state
            .position(record.id)
            .ok_or(LedgerError::ConsumptionNotFound(record.id))?;
        state.records[index] = record.clone();
        Ok(())
    }

    async fn delete(&self, meal_id: MealId, id: ConsumptionId) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_on_delete {
            return Err(LedgerError::Unavailable("delete rejected".to_string()));
        }

        let index = state
            .records
            .iter()
            .position(|r| r.id == id && r.meal_id == meal_id)
            .ok_or(LedgerError::ConsumptionNotFound(id))?;
        state.records.remove(index);
        Ok(())
    }

    async fn sum_calories(&self, meal_id: MealId) -> Result<f64> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.meal_id == meal_id)
            .map(|r| r.kcal)
            .sum())
    }

    async fn sum_cost(&self, meal_id: MealId) -> Result<f64> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.meal_id == meal_id)
            .map(|r| r.cost)
            .sum())
    }

    async fn most_consumed_in_range(
        &self,
        range: DateRange,
        user_id: &UserId,
    ) -> Result<MostConsumedFood> {
        let state = self.state.read().await;

        // Groups keyed like the SQL GROUP BY, kept in first-seen order.
        let mut groups: Vec<((ItemId, String, String), MostConsumedFood)> = Vec::new();

        for record in &state.records {
            let Some(item_id) = record.item_id.filter(|id| !id.is_nil()) else {
                continue;
            };
            let in_range = state
                .meals
                .get(&record.meal_id)
                .is_some_and(|m| &m.user_id == user_id && range.contains(m.date));
            if !in_range {
                continue;
            }

            let key = (item_id, record.food_name.clone(), record.unit.clone());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, total)) => {
                    total.quantity_used_std += record.quantity_used_std;
                    total.quantity_used += record.quantity_used;
                }
                None => groups.push((
                    key,
                    MostConsumedFood {
                        item_id,
                        food_name: record.food_name.clone(),
                        quantity_used_std: record.quantity_used_std,
                        quantity_used: record.quantity_used,
                        unit: record.unit.clone(),
                    },
                )),
            }
        }

        let mut best: Option<MostConsumedFood> = None;
        for (_, total) in groups {
            if best
                .as_ref()
                .is_none_or(|b| total.quantity_used_std > b.quantity_used_std)
            {
                best = Some(total);
            }
        }

        best.ok_or_else(|| LedgerError::NoConsumptionInRange {
            user_id: user_id.clone(),
            start: range.start(),
            end: range.end(),
        })
    }
}

#[async_trait]
impl MealStore for InMemoryLedger {
    async fn save_meal(&self, meal: &Meal) -> Result<()> {
        let mut state = self.state.write().await;
        state.meals.insert(meal.id, meal.clone());
        Ok(())
    }

    async fn get_meal(&self, id: MealId) -> Result<Meal> {
        let state = self.state.read().await;
        state
            .meals
            .get(&id)
            .cloned()
            .ok_or(LedgerError::MealNotFound(id))
    }

    async fn list_meals(&self, user_id: &UserId, range: Option<DateRange>) -> Result<Vec<Meal>> {
        let state = self.state.read().await;
        let mut meals: Vec<Meal> = state
            .meals
            .values()
            .filter(|m| &m.user_id == user_id)
            .filter(|m| range.is_none_or(|r| r.contains(m.date)))
            .cloned()
            .collect();
        meals.sort_by_key(|m| m.date);
        Ok(meals)
    }

    async fn delete_meal(&self, id: MealId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.meals.remove(&id).is_none() {
            return Err(LedgerError::MealNotFound(id));
        }
        state.records.retain(|r| r.meal_id != id);
        Ok(())
    }
}
