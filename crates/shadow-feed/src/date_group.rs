//! Day dividers between messages.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use shadow_types::Message;

/// Calendar day of `at` in the given zone.
pub fn local_day(at: DateTime<Utc>, tz: &FixedOffset) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

/// `Today`, `Yesterday`, or e.g. `Monday, Jan 5, 2026`.
pub fn format_date_group(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        return "Today".to_string();
    }
    if today.pred_opt() == Some(day) {
        return "Yesterday".to_string();
    }
    day.format("%A, %b %-d, %Y").to_string()
}

/// Whether `current` opens a new day relative to the row before it.
pub fn starts_new_day(previous: Option<&Message>, current: &Message, tz: &FixedOffset) -> bool {
    match previous {
        None => true,
        Some(previous) => local_day(previous.created_at, tz) != local_day(current.created_at, tz),
    }
}

/// Divider label for row `index`, if that row starts a day.
pub fn divider_label(
    messages: &[Message],
    index: usize,
    today: NaiveDate,
    tz: &FixedOffset,
) -> Option<String> {
    let current = messages.get(index)?;
    let previous = index.checked_sub(1).and_then(|i| messages.get(i));
    starts_new_day(previous, current, tz)
        .then(|| format_date_group(local_day(current.created_at, tz), today))
}
