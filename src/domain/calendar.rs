//! Business-day arithmetic. Weekends only; exchange holidays are not modelled.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The first Monday-Friday date strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_business_day(next) {
        next += Duration::days(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekday_rolls_to_next_day() {
        // 2024-01-02 is a Tuesday
        assert_eq!(next_business_day(d(2024, 1, 2)), d(2024, 1, 3));
    }

    #[test]
    fn friday_rolls_to_monday() {
        assert_eq!(next_business_day(d(2024, 1, 5)), d(2024, 1, 8));
    }

    #[test]
    fn weekend_rolls_to_monday() {
        assert_eq!(next_business_day(d(2024, 1, 6)), d(2024, 1, 8));
        assert_eq!(next_business_day(d(2024, 1, 7)), d(2024, 1, 8));
    }

    #[test]
    fn holidays_are_not_skipped() {
        // 2024-12-24 (Tue) -> 2024-12-25 even though markets are closed
        assert_eq!(next_business_day(d(2024, 12, 24)), d(2024, 12, 25));
    }

    #[test]
    fn result_is_always_a_business_day() {
        let mut date = d(2024, 1, 1);
        for _ in 0..30 {
            let next = next_business_day(date);
            assert!(is_business_day(next));
            assert!(next > date);
            date += Duration::days(1);
        }
    }
}
