//! Folds a single waste item into the owning user's ledger.

use crate::achievements::evaluate;
use crate::bus::ChangeBus;
use crate::errors::{AppError, Result};
use crate::merge::{StatsUpdate, merge_update};
use crate::models::{Category, UserRecord};
use crate::session::SessionContext;
use crate::storage::UserStore;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ActivityOutcome {
    pub category: Category,
    pub weight_kg: f64,
    pub points_earned: u64,
    pub co2_saved: f64,
    pub unlocked: Vec<&'static str>,
    pub record: UserRecord,
}

pub fn validate(category: &str, weight_kg: f64) -> Result<Category> {
    let category = category.parse::<Category>()?;
    validate_weight(weight_kg)?;
    Ok(category)
}

pub fn validate_weight(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        return Err(AppError::InvalidWeight(weight_kg));
    }
    Ok(())
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Consecutive-day rule on calendar dates; time of day is ignored.
pub fn next_streak(last_active: Option<DateTime<Utc>>, today: NaiveDate, streak: u32) -> u32 {
    let Some(last_active) = last_active else {
        return 1;
    };
    let gap_days = (today - last_active.date_naive()).num_days();
    match gap_days {
        1 => streak.saturating_add(1),
        gap if gap > 1 => 1,
        // Same day, or the clock moved backwards.
        _ => streak,
    }
}

/// Computes the update for one item from the pre-update snapshot.
///
/// Fails with `InvalidWeight` when any resulting total would overflow to a
/// non-finite value, which the JSON table cannot store.
pub fn compute_update(
    record: &UserRecord,
    category: Category,
    weight_kg: f64,
    now: DateTime<Utc>,
) -> Result<StatsUpdate> {
    let value = category.value();
    let today = now.date_naive();
    let today_key = date_key(today);

    let mut update = StatsUpdate {
        points: Some(record.points.saturating_add(value.points)),
        total_waste: Some(record.total_waste + weight_kg),
        co2_saved: Some(record.co2_saved + value.co2_factor * weight_kg),
        streak: Some(next_streak(record.last_active, today, record.streak)),
        last_active: Some(now),
        ..StatsUpdate::default()
    };

    let day_total = record.daily_waste.get(&today_key).copied().unwrap_or(0.0);
    update.daily_waste.insert(today_key.clone(), day_total + weight_kg);

    let day_category = record
        .daily_categories
        .get(&today_key)
        .and_then(|day| day.get(&category))
        .copied()
        .unwrap_or(0.0);
    update
        .daily_categories
        .entry(today_key)
        .or_default()
        .insert(category, day_category + weight_kg);

    update
        .category_counts
        .insert(category, record.category_counts.get(category) + weight_kg);

    if !update.is_finite() {
        return Err(AppError::InvalidWeight(weight_kg));
    }
    Ok(update)
}

pub async fn record_activity(
    store: &mut UserStore,
    bus: &ChangeBus,
    ctx: &SessionContext,
    category: &str,
    weight_kg: f64,
) -> Result<Option<ActivityOutcome>> {
    record_activity_at(store, bus, ctx, category, weight_kg, Utc::now()).await
}

/// Records one item for the session's user.
///
/// Returns `Ok(None)` when the user no longer exists. Nothing is written and
/// the bus stays quiet unless the whole update succeeds.
pub async fn record_activity_at(
    store: &mut UserStore,
    bus: &ChangeBus,
    ctx: &SessionContext,
    category: &str,
    weight_kg: f64,
    now: DateTime<Utc>,
) -> Result<Option<ActivityOutcome>> {
    let category = validate(category, weight_kg)?;

    let mut users = store.users()?;
    let Some(current) = users.get(&ctx.user_id) else {
        debug!(user_id = %ctx.user_id, "activity for unknown user ignored");
        return Ok(None);
    };

    let mut record = current.clone();
    let before = record.achievements;
    let update = compute_update(&record, category, weight_kg, now)?;
    merge_update(&mut record, update);

    let flags = evaluate(&record);
    if flags != record.achievements {
        merge_update(&mut record, StatsUpdate::achievements(flags));
    }
    let unlocked = record.achievements.unlocked_since(&before);

    users.insert(ctx.user_id.clone(), record.clone());
    store.put_all(users).await?;
    bus.notify();

    let value = category.value();
    info!(
        user_id = %ctx.user_id,
        %category,
        weight_kg,
        points = record.points,
        streak = record.streak,
        "activity recorded"
    );
    for name in &unlocked {
        info!(user_id = %ctx.user_id, achievement = *name, "achievement unlocked");
    }

    Ok(Some(ActivityOutcome {
        category,
        weight_kg,
        points_earned: value.points,
        co2_saved: value.co2_factor * weight_kg,
        unlocked,
        record,
    }))
}
