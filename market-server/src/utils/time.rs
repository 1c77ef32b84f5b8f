//! 时间工具函数 — 业务时区转换
//!
//! 订单号日期、每日优惠时间窗都按业务时区计算，存储一律使用 `i64` Unix millis。

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;

/// 解析时区名称，失败时回退到 UTC
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!("Unknown BUSINESS_TIMEZONE '{}', falling back to UTC", name);
        Tz::UTC
    })
}

/// Unix millis → 业务时区的本地时间
pub fn local_datetime(millis: i64, tz: Tz) -> NaiveDateTime {
    DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .with_timezone(&tz)
        .naive_local()
}

/// Unix millis → 业务时区日期戳 (YYYYMMDD)
pub fn date_stamp(millis: i64, tz: Tz) -> String {
    local_datetime(millis, tz).format("%Y%m%d").to_string()
}

/// 判断日期是否在 [start, end] 内，缺省边界视为不限
pub fn date_in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

/// 判断时刻是否在时间窗内
///
/// Handle overnight ranges (e.g., 22:00 - 02:00)
pub fn time_in_window(now: NaiveTime, start: Option<NaiveTime>, end: Option<NaiveTime>) -> bool {
    match (start, end) {
        (Some(start), Some(end)) if start <= end => now >= start && now <= end,
        (Some(start), Some(end)) => now >= start || now <= end,
        (Some(start), None) => now >= start,
        (None, Some(end)) => now <= end,
        (None, None) => true,
    }
}

/// 每日优惠归属日期
///
/// 跨午夜时间窗的凌晨部分属于前一天的档期。
pub fn offer_day(now: NaiveDateTime, start: Option<NaiveTime>, end: Option<NaiveTime>) -> NaiveDate {
    let date = now.date();
    match (start, end) {
        (Some(start), Some(end)) if start > end && now.time() <= end => {
            date.pred_opt().unwrap_or(date)
        }
        _ => date,
    }
}
