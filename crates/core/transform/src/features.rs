//! Categorical features derived from single transaction fields.

use std::num::ParseIntError;

pub const MORNING: &str = "0_Morning";
pub const NOON: &str = "1_Noon";
pub const AFTERNOON: &str = "2_Afternoon";
/// The trailing space matches labels already stored in the warehouse.
pub const EVENING: &str = "3_Evening ";

const DAY_LABELS: [(&str, &str); 7] = [
    ("Monday", "0_Monday"),
    ("Tuesday", "1_Tuesday"),
    ("Wednesday", "2_Wednesday"),
    ("Thursday", "3_Thursday"),
    ("Friday", "4_Friday"),
    ("Saturday", "5_Saturday"),
    ("Sunday", "6_Sunday"),
];

/// Buckets a `HH:MM...` time into a daypart label.
///
/// Only the first two characters are read as the hour. Surrounding whitespace is
/// tolerated, so `"9 :00"` is hour 9 while `"9:00"` fails.
pub fn time_of_day(time: &str) -> Result<&'static str, TimeOfDayError> {
    let hour_prefix = time.chars().take(2).collect::<String>();
    let hour = hour_prefix
        .trim()
        .parse::<i32>()
        .map_err(|source| TimeOfDayError {
            value: time.to_string(),
            source,
        })?;

    let label = match hour {
        h if h < 11 => MORNING,
        h if h < 14 => NOON,
        h if h < 18 => AFTERNOON,
        _ => EVENING,
    };
    Ok(label)
}

/// Maps a full English weekday name to its label, `0_Monday` through `6_Sunday`.
pub fn day_label(weekday: &str) -> Result<&'static str, DayLabelError> {
    DAY_LABELS
        .iter()
        .find(|(name, _)| *name == weekday)
        .map(|(_, label)| *label)
        .ok_or_else(|| DayLabelError {
            value: weekday.to_string(),
        })
}

/// The leading two characters of a time value are not an integer hour.
#[derive(Debug, thiserror::Error)]
#[error("cannot read an hour from time '{value}'")]
pub struct TimeOfDayError {
    pub value: String,
    #[source]
    pub source: ParseIntError,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown weekday '{value}'")]
pub struct DayLabelError {
    pub value: String,
}
