use crate::models::{Achievements, UserRecord};

pub const RECYCLING_MASTER_POINTS: u64 = 1000;
pub const GREEN_WARRIOR_CO2_KG: f64 = 50.0;
pub const CONSISTENCY_KING_STREAK: u32 = 7;

/// Flags a record qualifies for right now.
///
/// Stored flags are sticky, see [`crate::merge`]: a streak reset does not
/// take `consistencyKing` away once it was earned.
pub fn evaluate(record: &UserRecord) -> Achievements {
    Achievements {
        recycling_master: record.points >= RECYCLING_MASTER_POINTS,
        green_warrior: record.co2_saved >= GREEN_WARRIOR_CO2_KG,
        consistency_king: record.streak >= CONSISTENCY_KING_STREAK,
    }
}
