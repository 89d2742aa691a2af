//! BVMT trading calendar
//!
//! Weekends and fixed national holidays are closed. Islamic holidays move
//! every year and are not modelled; historical data presence covers them.
//! Ramadan detection uses the tabular (arithmetic) Hijri calendar, which can
//! be a day off from the observed moon sighting.

use chrono::{Datelike, NaiveDate, Weekday};

/// Fixed holidays as (month, day)
const FIXED_HOLIDAYS: [(u32, u32); 8] = [
    (1, 1),   // New Year
    (1, 14),  // Revolution and Youth Day
    (3, 20),  // Independence Day
    (4, 9),   // Martyrs' Day
    (5, 1),   // Labour Day
    (7, 25),  // Republic Day
    (8, 13),  // Women's Day
    (10, 15), // Evacuation Day
];

/// Days from CE day 1 to Julian Day Number
const JDN_CE_OFFSET: i64 = 1_721_425;

/// Hijri date (year, month, day)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HijriDate {
    pub year: i64,
    pub month: u32,
    pub day: u32,
}

impl HijriDate {
    /// Tabular Islamic calendar conversion via the Julian Day Number
    pub fn from_gregorian(date: NaiveDate) -> Self {
        let jd = date.num_days_from_ce() as i64 + JDN_CE_OFFSET;
        let mut l = jd - 1_948_440 + 10_632;
        let n = (l - 1).div_euclid(10_631);
        l = l - 10_631 * n + 354;
        let j = ((10_985 - l) / 5_316) * ((50 * l) / 17_719) + (l / 5_670) * ((43 * l) / 15_238);
        l = l - ((30 - j) / 15) * ((17_719 * j) / 50) - (j / 16) * ((15_238 * j) / 43) + 29;
        let month = (24 * l) / 709;
        let day = l - (709 * month) / 24;
        let year = 30 * n + j - 30;
        Self {
            year,
            month: month as u32,
            day: day as u32,
        }
    }

    pub fn is_ramadan(&self) -> bool {
        self.month == 9
    }
}

#[derive(Debug, Clone, Default)]
pub struct TradingCalendar;

impl TradingCalendar {
    pub fn new() -> Self {
        Self
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        FIXED_HOLIDAYS.contains(&(date.month(), date.day()))
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// First trading day strictly after `date`
    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut next = date.succ_opt().unwrap_or(date);
        while !self.is_trading_day(next) {
            match next.succ_opt() {
                Some(d) => next = d,
                None => break,
            }
        }
        next
    }

    /// The `n`th trading day after `date`
    pub fn add_trading_days(&self, date: NaiveDate, n: usize) -> NaiveDate {
        (0..n).fold(date, |d, _| self.next_trading_day(d))
    }

    /// Last trading session of its calendar month
    pub fn is_month_end(&self, date: NaiveDate) -> bool {
        self.next_trading_day(date).month() != date.month()
    }

    pub fn is_ramadan(&self, date: NaiveDate) -> bool {
        HijriDate::from_gregorian(date).is_ramadan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekends_and_holidays() {
        let cal = TradingCalendar::new();
        assert!(cal.is_trading_day(d(2023, 6, 14)));
        assert!(!cal.is_trading_day(d(2023, 6, 17))); // Saturday
        assert!(!cal.is_trading_day(d(2023, 6, 18))); // Sunday
        assert!(!cal.is_trading_day(d(2023, 3, 20))); // Independence Day
        assert!(!cal.is_trading_day(d(2023, 7, 25)));
    }

    #[test]
    fn test_add_trading_days_skips_closures() {
        let cal = TradingCalendar::new();
        // Friday 2023-07-21 -> Mon 24, (Tue 25 holiday), Wed 26
        assert_eq!(cal.add_trading_days(d(2023, 7, 21), 1), d(2023, 7, 24));
        assert_eq!(cal.add_trading_days(d(2023, 7, 21), 2), d(2023, 7, 26));
        assert_eq!(cal.add_trading_days(d(2023, 7, 21), 0), d(2023, 7, 21));
    }

    #[test]
    fn test_month_end() {
        let cal = TradingCalendar::new();
        // 2023-06-30 is a Friday
        assert!(cal.is_month_end(d(2023, 6, 30)));
        assert!(!cal.is_month_end(d(2023, 6, 29)));
        // 2023-09-30 is a Saturday, so Friday 29th closes the month
        assert!(cal.is_month_end(d(2023, 9, 29)));
    }

    #[test]
    fn test_hijri_conversion() {
        let h = HijriDate::from_gregorian(d(2023, 3, 23));
        assert_eq!(h, HijriDate { year: 1444, month: 9, day: 1 });
        let h = HijriDate::from_gregorian(d(2024, 4, 10));
        assert_eq!(h, HijriDate { year: 1445, month: 10, day: 1 });
    }

    #[test]
    fn test_ramadan_flag() {
        let cal = TradingCalendar::new();
        assert!(cal.is_ramadan(d(2023, 4, 5)));
        assert!(!cal.is_ramadan(d(2023, 6, 15)));
        assert!(cal.is_ramadan(d(2023, 3, 23)));
        assert!(!cal.is_ramadan(d(2023, 3, 22)));
    }
}
