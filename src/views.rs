use crate::engine::date_key;
use crate::models::{
    Category, DailyPoint, DashboardResponse, HomeStats, UserRecord, WeeklyAveragePoint, WeeklyPoint,
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

pub fn home_stats(record: &UserRecord, revision: u64) -> HomeStats {
    home_stats_at(Utc::now().date_naive(), record, revision)
}

pub fn home_stats_at(today: NaiveDate, record: &UserRecord, revision: u64) -> HomeStats {
    let date = date_key(today);
    HomeStats {
        today_waste: record.daily_waste.get(&date).copied().unwrap_or(0.0),
        date,
        co2_saved: record.co2_saved,
        points: record.points,
        streak: record.streak,
        revision,
    }
}

pub fn build_dashboard(record: &UserRecord, revision: u64) -> DashboardResponse {
    build_dashboard_at(Utc::now().date_naive(), record, revision)
}

pub fn build_dashboard_at(today: NaiveDate, record: &UserRecord, revision: u64) -> DashboardResponse {
    const WEEK_COUNT: usize = 8;

    let day_weight = |date: NaiveDate| record.daily_waste.get(&date_key(date)).copied().unwrap_or(0.0);

    let mut last_7_days = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let date = today - Duration::days(offset as i64);
        let categories = record
            .daily_categories
            .get(&date_key(date))
            .cloned()
            .unwrap_or_default();
        last_7_days.push(DailyPoint {
            date: date_key(date),
            weight_kg: day_weight(date),
            categories,
        });
    }

    let current_week_start = week_start(today);
    let mut weekly_totals = Vec::with_capacity(WEEK_COUNT);
    let mut weekly_averages = Vec::with_capacity(WEEK_COUNT);

    for offset in (0..WEEK_COUNT).rev() {
        let start = current_week_start - Duration::weeks(offset as i64);
        let end = start + Duration::days(6);

        let weight_kg: f64 = (0..7).map(|day| day_weight(start + Duration::days(day))).sum();

        // The current week only counts the days that have happened.
        let days_counted = if today > end {
            7
        } else {
            (today - start).num_days() as u8 + 1
        };

        weekly_totals.push(WeeklyPoint {
            week: week_label(start),
            start_date: date_key(start),
            end_date: date_key(end),
            weight_kg,
        });
        weekly_averages.push(WeeklyAveragePoint {
            week: week_label(start),
            days_counted,
            avg_weight_kg: weight_kg / f64::from(days_counted),
        });
    }

    let category_totals: BTreeMap<Category, f64> = record.category_counts.iter().collect();

    DashboardResponse {
        points: record.points,
        total_waste: record.total_waste,
        co2_saved: record.co2_saved,
        streak: record.streak,
        achievements: record.achievements,
        category_totals,
        last_7_days,
        weekly_totals,
        weekly_averages,
        revision,
    }
}

/// Chat greeting built from the part of the email before `@`.
pub fn chat_greeting(record: &UserRecord) -> String {
    let name = record.email.split('@').next().unwrap_or_default();
    format!("Hello {name}! I'm your AI Assistant. How can I help you today?")
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}
