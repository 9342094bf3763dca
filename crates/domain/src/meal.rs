//! Meals owning consumption records.

use chrono::{DateTime, Utc};
use common::{MealId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Kind of meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    #[default]
    Others,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Others => "others",
        }
    }
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MealType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breakfast" => Ok(MealType::Breakfast),
            "lunch" => Ok(MealType::Lunch),
            "dinner" => Ok(MealType::Dinner),
            "others" => Ok(MealType::Others),
            other => Err(DomainError::InvalidMealType(other.to_string())),
        }
    }
}

/// A meal eaten by a user at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: MealId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub meal_type: MealType,
    pub date: DateTime<Utc>,
}

impl Meal {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        meal_type: MealType,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MealId::new(),
            user_id,
            name: name.into(),
            description: String::new(),
            meal_type,
            date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meal_type_round_trips_through_str() {
        for t in [
            MealType::Breakfast,
            MealType::Lunch,
            MealType::Dinner,
            MealType::Others,
        ] {
            assert_eq!(t.as_str().parse::<MealType>().unwrap(), t);
        }
        assert!("brunch".parse::<MealType>().is_err());
    }

    #[test]
    fn meal_type_serializes_lowercase() {
        let json = serde_json::to_string(&MealType::Dinner).unwrap();
        assert_eq!(json, "\"dinner\"");
    }
}
