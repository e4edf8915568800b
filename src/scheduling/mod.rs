use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Business days between batch submission and the strike date.
pub const SUBMISSION_LEAD_DAYS: u32 = 3;

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Walk forward from `from`, counting only weekdays, until `days_ahead`
/// business days have elapsed.
pub fn next_collection_date(from: NaiveDate, days_ahead: u32) -> NaiveDate {
    let mut date = from;
    let mut remaining = days_ahead;
    while remaining > 0 {
        date += Duration::days(1);
        if is_business_day(date) {
            remaining -= 1;
        }
    }
    date
}

/// Saturday and Sunday strike dates roll forward to the following Monday.
pub fn adjust_for_weekend(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Duration::days(2),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// The date a batch must reach the processor for a given strike date:
/// weekend-adjust first, then walk back three business days.
pub fn submission_date(strike_date: NaiveDate) -> NaiveDate {
    let adjusted = adjust_for_weekend(strike_date);
    let mut date = adjusted;
    let mut remaining = SUBMISSION_LEAD_DAYS;
    while remaining > 0 {
        date -= Duration::days(1);
        if is_business_day(date) {
            remaining -= 1;
        }
    }
    date
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn next_collection_skips_weekends() {
        // Friday + 1 business day = Monday
        assert_eq!(next_collection_date(d(2024, 3, 1), 1), d(2024, 3, 4));
        // Wednesday + 5 business days = next Wednesday
        assert_eq!(next_collection_date(d(2024, 2, 28), 5), d(2024, 3, 6));
    }

    #[test]
    fn weekend_adjustment_rolls_to_monday() {
        assert_eq!(adjust_for_weekend(d(2024, 3, 2)), d(2024, 3, 4));
        assert_eq!(adjust_for_weekend(d(2024, 3, 3)), d(2024, 3, 4));
        assert_eq!(adjust_for_weekend(d(2024, 3, 4)), d(2024, 3, 4));
    }

    #[test]
    fn submission_date_for_saturday_strike() {
        // Saturday 2024-03-02 -> Monday 2024-03-04 -> back 3 business days
        // (Fri 1st, Thu 29th, Wed 28th)
        assert_eq!(submission_date(d(2024, 3, 2)), d(2024, 2, 28));
    }

    #[test]
    fn submission_date_for_midweek_strike() {
        // Thursday 2024-03-07 -> back 3 business days = Monday 2024-03-04
        assert_eq!(submission_date(d(2024, 3, 7)), d(2024, 3, 4));
    }

    #[test]
    fn submission_date_crosses_weekend_backwards() {
        // Tuesday 2024-03-05 -> Mon 4th, Fri 1st, Thu 29th
        assert_eq!(submission_date(d(2024, 3, 5)), d(2024, 2, 29));
    }
}
