//! Timestamp formatting for the `__DATE__` and `__TIME__` dynamic macros.

use std::time::{SystemTime, UNIX_EPOCH};

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// The current UTC date as `"Mmm dd yyyy"`, a single-digit day padded with a
/// space as C requires.
pub(crate) fn today() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let mut days_remaining = since_epoch.as_secs() / 86_400;

    let mut year: u64 = 1970;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if days_remaining < days_in_year {
            break;
        }
        days_remaining -= days_in_year;
        year += 1;
    }

    let month_days = [
        31,
        if is_leap_year(year) { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut month = 0;
    let mut day = days_remaining + 1;
    for (i, &days) in month_days.iter().enumerate() {
        if day <= days {
            month = i;
            break;
        }
        day -= days;
    }

    format!("{} {:2} {}", MONTH_NAMES[month], day, year)
}

/// The current UTC time as `"hh:mm:ss"`.
pub(crate) fn now() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seconds_today = since_epoch.as_secs() % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        seconds_today / 3600,
        (seconds_today % 3600) / 60,
        seconds_today % 60
    )
}

const fn is_leap_year(year: u64) -> bool {
    (year.is_multiple_of(4) && !year.is_multiple_of(100)) || year.is_multiple_of(400)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_has_standard_shape() {
        let date = today();
        assert_eq!(date.len(), 11, "got {date:?}");
        assert!(MONTH_NAMES.contains(&&date[0..3]));
        assert_eq!(date.as_bytes()[3], b' ');
        assert_eq!(date.as_bytes()[6], b' ');
        assert!(date[7..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn time_has_standard_shape() {
        let time = now();
        assert_eq!(time.len(), 8);
        assert_eq!(time.as_bytes()[2], b':');
        assert_eq!(time.as_bytes()[5], b':');
    }
}
