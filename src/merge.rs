//! Structural merge of a partial update into a stored [`UserRecord`].
//!
//! Strategy per field:
//!
//! | field             | strategy                                           |
//! |-------------------|----------------------------------------------------|
//! | scalars           | replace when present                               |
//! | `dailyWaste`      | deep-merge by date, update value replaces          |
//! | `dailyCategories` | deep-merge by date, then by category               |
//! | `categoryCounts`  | deep-merge by category, update value replaces      |
//! | `achievements`    | sticky: a flag set in either side stays set        |
//!
//! Keys absent from the update are kept as stored.

use crate::models::{Achievements, Category, UserRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsUpdate {
    pub points: Option<u64>,
    pub total_waste: Option<f64>,
    pub co2_saved: Option<f64>,
    pub streak: Option<u32>,
    pub last_active: Option<DateTime<Utc>>,
    pub daily_waste: BTreeMap<String, f64>,
    pub daily_categories: BTreeMap<String, BTreeMap<Category, f64>>,
    pub category_counts: BTreeMap<Category, f64>,
    pub achievements: Option<Achievements>,
}

impl StatsUpdate {
    pub fn achievements(flags: Achievements) -> Self {
        Self {
            achievements: Some(flags),
            ..Self::default()
        }
    }

    /// Whether every float the update would store is finite.
    pub fn is_finite(&self) -> bool {
        let scalars = [self.total_waste, self.co2_saved]
            .into_iter()
            .flatten()
            .all(f64::is_finite);
        scalars
            && self.daily_waste.values().all(|kg| kg.is_finite())
            && self
                .daily_categories
                .values()
                .flat_map(|day| day.values())
                .all(|kg| kg.is_finite())
            && self.category_counts.values().all(|kg| kg.is_finite())
    }
}

pub fn merge_update(record: &mut UserRecord, update: StatsUpdate) {
    if let Some(points) = update.points {
        record.points = points;
    }
    if let Some(total_waste) = update.total_waste {
        record.total_waste = total_waste;
    }
    if let Some(co2_saved) = update.co2_saved {
        record.co2_saved = co2_saved;
    }
    if let Some(streak) = update.streak {
        record.streak = streak;
    }
    if let Some(last_active) = update.last_active {
        record.last_active = Some(last_active);
    }

    record.daily_waste.extend(update.daily_waste);

    for (date, categories) in update.daily_categories {
        record.daily_categories.entry(date).or_default().extend(categories);
    }

    for (category, kg) in update.category_counts {
        record.category_counts.set(category, kg);
    }

    if let Some(flags) = update.achievements {
        let stored = &mut record.achievements;
        stored.recycling_master |= flags.recycling_master;
        stored.green_warrior |= flags.green_warrior;
        stored.consistency_king |= flags.consistency_king;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> UserRecord {
        UserRecord::new("a@example.com", "hash", Utc::now())
    }

    #[test]
    fn scalars_replace_only_when_present() {
        let mut r = record();
        r.points = 40;
        r.streak = 3;
        merge_update(
            &mut r,
            StatsUpdate {
                points: Some(50),
                ..StatsUpdate::default()
            },
        );
        assert_eq!(r.points, 50);
        assert_eq!(r.streak, 3);
    }

    #[test]
    fn daily_maps_keep_other_dates() {
        let mut r = record();
        r.daily_waste.insert("2026-01-04".into(), 1.0);
        r.daily_categories
            .entry("2026-01-05".into())
            .or_default()
            .insert(Category::Organic, 2.0);

        let mut update = StatsUpdate::default();
        update.daily_waste.insert("2026-01-05".into(), 3.0);
        update
            .daily_categories
            .entry("2026-01-05".into())
            .or_default()
            .insert(Category::Hazardous, 1.0);
        merge_update(&mut r, update);

        assert_eq!(r.daily_waste.get("2026-01-04"), Some(&1.0));
        assert_eq!(r.daily_waste.get("2026-01-05"), Some(&3.0));
        let day = &r.daily_categories["2026-01-05"];
        assert_eq!(day.get(&Category::Organic), Some(&2.0));
        assert_eq!(day.get(&Category::Hazardous), Some(&1.0));
    }

    #[test]
    fn category_counts_keep_all_keys() {
        let mut r = record();
        let mut update = StatsUpdate::default();
        update.category_counts.insert(Category::General, 4.0);
        merge_update(&mut r, update);
        assert_eq!(r.category_counts.get(Category::General), 4.0);
        assert_eq!(r.category_counts.iter().count(), 4);
    }

    #[test]
    fn non_finite_values_are_detected() {
        let mut update = StatsUpdate {
            total_waste: Some(2.0),
            ..StatsUpdate::default()
        };
        assert!(update.is_finite());
        update.category_counts.insert(Category::Organic, f64::INFINITY);
        assert!(!update.is_finite());
    }

    #[test]
    fn achievements_never_flip_back() {
        let mut r = record();
        r.achievements.consistency_king = true;
        merge_update(
            &mut r,
            StatsUpdate::achievements(Achievements {
                recycling_master: true,
                green_warrior: false,
                consistency_king: false,
            }),
        );
        assert!(r.achievements.recycling_master);
        assert!(r.achievements.consistency_king);
        assert!(!r.achievements.green_warrior);
    }
}
