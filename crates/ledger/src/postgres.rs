use async_trait::async_trait;
use common::{ConsumptionId, ItemId, LotId, MealId, UserId};
use domain::{ConsumptionRecord, Meal, MealType, MostConsumedFood};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{ConsumptionLedger, DateRange, LedgerError, MealStore, Result};

const RECORD_COLUMNS: &str = "id, meal_id, item_id, lot_id, food_name, quantity_used, quantity_used_std, unit, kcal, cost";

/// PostgreSQL-backed ledger implementation.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<ConsumptionRecord> {
        Ok(ConsumptionRecord {
            id: ConsumptionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            meal_id: MealId::from_uuid(row.try_get::<Uuid, _>("meal_id")?),
            item_id: row
                .try_get::<Option<Uuid>, _>("item_id")?
                .map(ItemId::from_uuid),
            lot_id: row
                .try_get::<Option<Uuid>, _>("lot_id")?
                .map(LotId::from_uuid),
            food_name: row.try_get("food_name")?,
            quantity_used: row.try_get("quantity_used")?,
            quantity_used_std: row.try_get("quantity_used_std")?,
            unit: row.try_get("unit")?,
            kcal: row.try_get("kcal")?,
            cost: row.try_get("cost")?,
        })
    }

    fn row_to_meal(row: PgRow) -> Result<Meal> {
        let meal_type: String = row.try_get("meal_type")?;
        Ok(Meal {
            id: MealId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            name: row.try_get("name")?,
            description: row
                .try_get::<Option<String>, _>("description")?
                .unwrap_or_default(),
            // Rows written by older clients may carry free-form types.
            meal_type: meal_type.parse().unwrap_or(MealType::Others),
            date: row.try_get("date")?,
        })
    }

    /// Maps constraint violations on insert/update to typed errors.
    fn map_write_error(e: sqlx::Error, record: &ConsumptionRecord) -> LedgerError {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return LedgerError::DuplicateId(record.id);
            }
            if db_err.is_foreign_key_violation() {
                return LedgerError::MealNotFound(record.meal_id);
            }
        }
        LedgerError::Database(e)
    }

    async fn sum_column(&self, column: &str, meal_id: MealId) -> Result<f64> {
        let sql = format!(
            "SELECT COALESCE(SUM({column}), 0)::DOUBLE PRECISION FROM food_consumption WHERE meal_id = $1"
        );
        let sum: f64 = sqlx::query_scalar(&sql)
            .bind(meal_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(sum)
    }
}

#[async_trait]
impl ConsumptionLedger for PostgresLedger {
    async fn list_for_meal(&self, meal_id: MealId) -> Result<Vec<ConsumptionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM food_consumption WHERE meal_id = $1 ORDER BY seq ASC"
        ))
        .bind(meal_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn get(&self, id: ConsumptionId) -> Result<ConsumptionRecord> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM food_consumption WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::ConsumptionNotFound(id))?;

        Self::row_to_record(row)
    }

    #[tracing::instrument(skip(self, record), fields(consumption_id = %record.id))]
    async fn create(&self, record: &ConsumptionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO food_consumption (id, meal_id, item_id, lot_id, food_name, quantity_used, quantity_used_std, unit, kcal, cost)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.meal_id.as_uuid())
        .bind(record.item_id.map(|id| id.as_uuid()))
        .bind(record.lot_id.map(|id| id.as_uuid()))
        .bind(&record.food_name)
        .bind(record.quantity_used)
        .bind(record.quantity_used_std)
        .bind(&record.unit)
        .bind(record.kcal)
        .bind(record.cost)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, record))?;

        Ok(())
    }

    #[tracing::instrument(skip(self, record), fields(consumption_id = %record.id))]
    async fn update(&self, record: &ConsumptionRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE food_consumption
            SET meal_id = $2, item_id = $3, lot_id = $4, food_name = $5, quantity_used = $6,
                quantity_used_std = $7, unit = $8, kcal = $9, cost = $10
            WHERE id = $1
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.meal_id.as_uuid())
        .bind(record.item_id.map(|id| id.as_uuid()))
        .bind(record.lot_id.map(|id| id.as_uuid()))
        .bind(&record.food_name)
        .bind(record.quantity_used)
        .bind(record.quantity_used_std)
        .bind(&record.unit)
        .bind(record.kcal)
        .bind(record.cost)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, record))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::ConsumptionNotFound(record.id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, meal_id: MealId, id: ConsumptionId) -> Result<()> {
        let result = sqlx::query("DELETE FROM food_consumption WHERE meal_id = $1 AND id = $2")
            .bind(meal_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::ConsumptionNotFound(id));
        }
        Ok(())
    }

    async fn sum_calories(&self, meal_id: MealId) -> Result<f64> {
        self.sum_column("kcal", meal_id).await
    }

    async fn sum_cost(&self, meal_id: MealId) -> Result<f64> {
        self.sum_column("cost", meal_id).await
    }

    async fn most_consumed_in_range(
        &self,
        range: DateRange,
        user_id: &UserId,
    ) -> Result<MostConsumedFood> {
        let row = sqlx::query(
            r#"
            SELECT fc.item_id, fc.food_name, fc.unit,
                   SUM(fc.quantity_used_std) AS quantity_used_std,
                   SUM(fc.quantity_used) AS quantity_used
            FROM food_consumption fc
            JOIN meal m ON m.id = fc.meal_id
            WHERE m.user_id = $1 AND m.date >= $2 AND m.date <= $3
              AND fc.item_id IS NOT NULL
            GROUP BY fc.item_id, fc.food_name, fc.unit
            ORDER BY quantity_used_std DESC, MIN(fc.seq) ASC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .bind(range.start())
        .bind(range.end())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(LedgerError::NoConsumptionInRange {
                user_id: user_id.clone(),
                start: range.start(),
                end: range.end(),
            });
        };

        Ok(MostConsumedFood {
            item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            food_name: row.try_get("food_name")?,
            quantity_used_std: row.try_get("quantity_used_std")?,
            quantity_used: row.try_get("quantity_used")?,
            unit: row.try_get("unit")?,
        })
    }
}

#[async_trait]
impl MealStore for PostgresLedger {
    async fn save_meal(&self, meal: &Meal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meal (id, user_id, name, description, meal_type, date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET user_id = EXCLUDED.user_id, name = EXCLUDED.name, description = EXCLUDED.description,
                meal_type = EXCLUDED.meal_type, date = EXCLUDED.date
            "#,
        )
        .bind(meal.id.as_uuid())
        .bind(meal.user_id.as_str())
        .bind(&meal.name)
        .bind(&meal.description)
        .bind(meal.meal_type.as_str())
        .bind(meal.date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_meal(&self, id: MealId) -> Result<Meal> {
        let row = sqlx::query(
            "SELECT id, user_id, name, description, meal_type, date FROM meal WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::MealNotFound(id))?;

        Self::row_to_meal(row)
    }

    async fn list_meals(&self, user_id: &UserId, range: Option<DateRange>) -> Result<Vec<Meal>> {
        let rows = match range {
            Some(range) => {
                sqlx::query(
                    "SELECT id, user_id, name, description, meal_type, date FROM meal \
                     WHERE user_id = $1 AND date >= $2 AND date <= $3 ORDER BY date ASC",
                )
                .bind(user_id.as_str())
                .bind(range.start())
                .bind(range.end())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, user_id, name, description, meal_type, date FROM meal \
                     WHERE user_id = $1 ORDER BY date ASC",
                )
                .bind(user_id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Self::row_to_meal).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn delete_meal(&self, id: MealId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM food_consumption WHERE meal_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM meal WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::MealNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }
}
