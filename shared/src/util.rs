/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Normalize a coupon code for lookup: trimmed, upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
