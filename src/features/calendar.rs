//! Calendar and seasonal flags

use chrono::Datelike;

use super::{FeatureContext, FeatureTransformer};
use crate::types::AdjustedBar;

pub struct CalendarFeatures;

impl FeatureTransformer for CalendarFeatures {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn columns(&self) -> Vec<String> {
        let mut cols = vec!["day_of_week".to_string()];
        cols.extend((0..5).map(|d| format!("is_day_{}", d)));
        cols.extend(
            ["month", "quarter", "is_month_end", "is_summer", "is_ramadan"].map(String::from),
        );
        cols
    }

    fn transform(&self, bars: &[AdjustedBar], ctx: &FeatureContext) -> Vec<Vec<f64>> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let mut out = vec![Vec::with_capacity(bars.len()); 11];
        for bar in bars {
            let dow = bar.date.weekday().num_days_from_monday();
            let month = bar.date.month();
            out[0].push(dow as f64);
            for d in 0..5u32 {
                out[1 + d as usize].push(flag(dow == d));
            }
            out[6].push(month as f64);
            out[7].push(((month - 1) / 3 + 1) as f64);
            out[8].push(flag(ctx.calendar.is_month_end(bar.date)));
            out[9].push(flag(month == 7 || month == 8));
            out[10].push(flag(ctx.calendar.is_ramadan(bar.date)));
        }
        out
    }

    fn warmup(&self) -> usize {
        0
    }
}
