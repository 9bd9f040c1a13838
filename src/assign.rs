use rand::seq::SliceRandom;
use rand::Rng;

/// Academic levels a student record may carry.
pub const STUDENT_LEVELS: [&str; 5] = ["1ere TI", "2eme DSI", "2eme MDW", "3eme DSI", "3eme MDW"];

/// Program-defined internship categories.
pub const INTERNSHIP_TYPES: [&str; 3] = ["initiation", "perfectionnement", "pfe"];

/// Rooms an internship defense can be scheduled in.
pub const ROOMS: [&str; 13] = [
    "B01", "B02", "B03", "B04", "B05", "B06", "B101", "B102", "B103", "B104", "B105", "B106",
    "B107",
];

/// Student levels eligible for a given internship type. Unknown types have
/// no eligible levels, so they can never pass the compatibility check.
pub fn accepted_levels(internship_type: &str) -> &'static [&'static str] {
    match internship_type {
        "initiation" => &["1ere TI"],
        "perfectionnement" => &["2eme DSI", "2eme MDW"],
        "pfe" => &["3eme DSI", "3eme MDW"],
        _ => &[],
    }
}

pub fn level_matches_type(level: &str, internship_type: &str) -> bool {
    accepted_levels(internship_type).contains(&level)
}

pub fn is_internship_type(value: &str) -> bool {
    INTERNSHIP_TYPES.contains(&value)
}

pub fn is_student_level(value: &str) -> bool {
    STUDENT_LEVELS.contains(&value)
}

/// Draw two supervising teachers from the pool. The whole pool is shuffled
/// (Fisher-Yates, via `SliceRandom`) and the first two taken, so every
/// unordered pair has the same selection probability regardless of storage
/// order. Returns `None` when fewer than two candidates exist.
pub fn pick_supervisors(pool: &[i64], rng: &mut impl Rng) -> Option<Vec<i64>> {
    if pool.len() < 2 {
        return None;
    }
    let mut ids = pool.to_vec();
    ids.shuffle(rng);
    ids.truncate(2);
    Some(ids)
}

/// Uniform pick from the fixed room list.
pub fn pick_room(rng: &mut impl Rng) -> &'static str {
    ROOMS[rng.random_range(0..ROOMS.len())]
}
