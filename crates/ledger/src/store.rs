use async_trait::async_trait;
use common::{ConsumptionId, MealId, UserId};
use domain::{ConsumptionRecord, Meal, MostConsumedFood};

use crate::{DateRange, Result};

/// Core trait for consumption record storage.
///
/// Every method is a single, transactionally consistent read or write.
/// Implementations never call the remote inventory.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ConsumptionLedger: Send + Sync {
    /// Returns every record of a meal. Order is not significant.
    async fn list_for_meal(&self, meal_id: MealId) -> Result<Vec<ConsumptionRecord>>;

    /// Retrieves a single record by ID.
    ///
    /// Fails with `ConsumptionNotFound` if it does not exist.
    async fn get(&self, id: ConsumptionId) -> Result<ConsumptionRecord>;

    /// Inserts a new record. The record must carry a freshly generated ID.
    ///
    /// Fails with `DuplicateId` on ID conflict and `MealNotFound` when the
    /// owning meal does not exist.
    async fn create(&self, record: &ConsumptionRecord) -> Result<()>;

    /// Replaces a record keyed by its ID.
    ///
    /// Fails with `ConsumptionNotFound` if it does not exist.
    async fn update(&self, record: &ConsumptionRecord) -> Result<()>;

    /// Deletes a record within a meal.
    ///
    /// Fails with `ConsumptionNotFound` if the record is absent or belongs to
    /// another meal.
    async fn delete(&self, meal_id: MealId, id: ConsumptionId) -> Result<()>;

    /// Sum of calories over a meal's records; zero when there are none.
    async fn sum_calories(&self, meal_id: MealId) -> Result<f64>;

    /// Sum of cost over a meal's records; zero when there are none.
    async fn sum_cost(&self, meal_id: MealId) -> Result<f64>;

    /// Finds the inventory item with the largest summed standardized quantity
    /// across the user's meals dated within `range`.
    ///
    /// Ties go to the item consumed first. Fails with `NoConsumptionInRange`
    /// when nothing linked to inventory was consumed.
    async fn most_consumed_in_range(
        &self,
        range: DateRange,
        user_id: &UserId,
    ) -> Result<MostConsumedFood>;
}

/// Storage for the meals that scope consumption records.
#[async_trait]
pub trait MealStore: Send + Sync {
    /// Inserts or replaces a meal.
    async fn save_meal(&self, meal: &Meal) -> Result<()>;

    /// Retrieves a meal by ID.
    ///
    /// Fails with `MealNotFound` if it does not exist.
    async fn get_meal(&self, id: MealId) -> Result<Meal>;

    /// Lists a user's meals, oldest first, optionally limited to `range`.
    async fn list_meals(&self, user_id: &UserId, range: Option<DateRange>) -> Result<Vec<Meal>>;

    /// Deletes a meal together with its consumption records.
    ///
    /// Fails with `MealNotFound` if it does not exist.
    async fn delete_meal(&self, id: MealId) -> Result<()>;
}
