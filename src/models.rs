use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Current layout of the serialized user table.
pub const USER_TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Recyclable,
    Organic,
    Hazardous,
    General,
}

/// Reward and CO2 factor for one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryValue {
    pub points: u64,
    /// kg of CO2e saved per kg of waste.
    pub co2_factor: f64,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Recyclable,
        Category::Organic,
        Category::Hazardous,
        Category::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Recyclable => "recyclable",
            Category::Organic => "organic",
            Category::Hazardous => "hazardous",
            Category::General => "general",
        }
    }

    pub fn value(self) -> CategoryValue {
        match self {
            Category::Recyclable => CategoryValue { points: 10, co2_factor: 0.5 },
            Category::Organic => CategoryValue { points: 8, co2_factor: 0.3 },
            Category::Hazardous => CategoryValue { points: 15, co2_factor: 0.8 },
            Category::General => CategoryValue { points: 5, co2_factor: 0.2 },
        }
    }

    pub fn disposal_instructions(self) -> &'static str {
        match self {
            Category::Recyclable => {
                "Clean and dry the item before placing it in the recycling bin. Remove any non-recyclable parts."
            }
            Category::Organic => {
                "Place in the compost bin or organic waste container. Make sure it's free from plastic or other contaminants."
            }
            Category::Hazardous => {
                "Do not mix with regular waste. Take to a hazardous waste collection center or follow local disposal guidelines."
            }
            Category::General => {
                "Place in the general waste bin. Make sure the item is properly contained to prevent spills or leaks."
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The classifier labels the last class "General Waste".
        match s.trim().to_ascii_lowercase().as_str() {
            "recyclable" => Ok(Category::Recyclable),
            "organic" => Ok(Category::Organic),
            "hazardous" => Ok(Category::Hazardous),
            "general" | "general waste" => Ok(Category::General),
            _ => Err(AppError::InvalidCategory(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Achievements {
    pub recycling_master: bool,
    pub green_warrior: bool,
    pub consistency_king: bool,
}

impl Achievements {
    /// Flags set in `self` but not in `before`, by their stored names.
    pub fn unlocked_since(&self, before: &Achievements) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.recycling_master && !before.recycling_master {
            names.push("recyclingMaster");
        }
        if self.green_warrior && !before.green_warrior {
            names.push("greenWarrior");
        }
        if self.consistency_king && !before.consistency_king {
            names.push("consistencyKing");
        }
        names
    }
}

/// Cumulative kg per category. Always carries all four keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Category, f64>", into = "BTreeMap<Category, f64>")]
pub struct CategoryCounts(BTreeMap<Category, f64>);

impl CategoryCounts {
    pub fn get(&self, category: Category) -> f64 {
        self.0.get(&category).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, category: Category, kg: f64) {
        self.0.insert(category, kg);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        self.0.iter().map(|(category, kg)| (*category, *kg))
    }
}

impl Default for CategoryCounts {
    fn default() -> Self {
        Self(Category::ALL.iter().map(|category| (*category, 0.0)).collect())
    }
}

impl From<BTreeMap<Category, f64>> for CategoryCounts {
    fn from(map: BTreeMap<Category, f64>) -> Self {
        let mut counts = CategoryCounts::default();
        counts.0.extend(map);
        counts
    }
}

impl From<CategoryCounts> for BTreeMap<Category, f64> {
    fn from(counts: CategoryCounts) -> Self {
        counts.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub email: String,
    /// Output of the credential verifier, never the raw secret.
    pub credential_secret: String,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub total_waste: f64,
    #[serde(default)]
    pub co2_saved: f64,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub daily_waste: BTreeMap<String, f64>,
    #[serde(default)]
    pub daily_categories: BTreeMap<String, BTreeMap<Category, f64>>,
    #[serde(default)]
    pub category_counts: CategoryCounts,
    #[serde(default)]
    pub achievements: Achievements,
}

impl UserRecord {
    pub fn new(email: impl Into<String>, credential_secret: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            credential_secret: credential_secret.into(),
            points: 0,
            total_waste: 0.0,
            co2_saved: 0.0,
            streak: 0,
            last_active: None,
            created_at: now,
            daily_waste: BTreeMap::new(),
            daily_categories: BTreeMap::new(),
            category_counts: CategoryCounts::default(),
            achievements: Achievements::default(),
        }
    }
}

/// Serialized value behind the user-table key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTable {
    pub version: u32,
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
}

impl Default for UserTable {
    fn default() -> Self {
        Self {
            version: USER_TABLE_VERSION,
            users: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRequest {
    pub category: String,
    pub weight_kg: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    pub category: Category,
    pub weight_kg: f64,
    pub points_earned: u64,
    pub co2_saved: f64,
    pub unlocked: Vec<String>,
    pub stats: HomeStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    pub image: String,
    #[serde(default)]
    pub weight_kg: Option<f64>,
}

/// Result of the classifier, or of the local fallback when `simulated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: Category,
    pub confidence: f64,
    pub disposal_instructions: String,
    pub simulated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
    pub classification: Classification,
    /// Present only when the item was recorded against the user.
    pub activity: Option<ActivityResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreetingResponse {
    pub greeting: String,
    pub revision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HomeStats {
    pub date: String,
    pub today_waste: f64,
    pub co2_saved: f64,
    pub points: u64,
    pub streak: u32,
    pub revision: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub date: String,
    pub weight_kg: f64,
    pub categories: BTreeMap<Category, f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPoint {
    pub week: String,
    pub start_date: String,
    pub end_date: String,
    pub weight_kg: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAveragePoint {
    pub week: String,
    pub days_counted: u8,
    pub avg_weight_kg: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub points: u64,
    pub total_waste: f64,
    pub co2_saved: f64,
    pub streak: u32,
    pub achievements: Achievements,
    pub category_totals: BTreeMap<Category, f64>,
    pub last_7_days: Vec<DailyPoint>,
    pub weekly_totals: Vec<WeeklyPoint>,
    pub weekly_averages: Vec<WeeklyAveragePoint>,
    pub revision: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Recyclable".parse::<Category>().unwrap(), Category::Recyclable);
        assert_eq!(" HAZARDOUS ".parse::<Category>().unwrap(), Category::Hazardous);
        assert_eq!("General Waste".parse::<Category>().unwrap(), Category::General);
        assert!(matches!(
            "plastic".parse::<Category>(),
            Err(AppError::InvalidCategory(_))
        ));
    }

    #[test]
    fn category_counts_fill_missing_keys_on_load() {
        let counts: CategoryCounts = serde_json::from_str(r#"{"organic": 1.5}"#).unwrap();
        assert_eq!(counts.iter().count(), 4);
        assert_eq!(counts.get(Category::Organic), 1.5);
        assert_eq!(counts.get(Category::General), 0.0);
    }

    #[test]
    fn new_record_is_zeroed() {
        let record = UserRecord::new("a@example.com", "hash", Utc::now());
        assert_eq!(record.points, 0);
        assert_eq!(record.streak, 0);
        assert!(record.last_active.is_none());
        assert_eq!(record.achievements, Achievements::default());
        assert!(Category::ALL.iter().all(|c| record.category_counts.get(*c) == 0.0));
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let record = UserRecord::new("a@example.com", "hash", Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("totalWaste").is_some());
        assert!(value.get("categoryCounts").unwrap().get("recyclable").is_some());
        assert_eq!(value["achievements"]["consistencyKing"], false);
    }
}
