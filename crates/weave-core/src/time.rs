//! 纪元时间工具：活跃时间戳与延迟测量共用的整数时钟。
//!
//! 壁钟回拨会让差值短暂为负；空闲判定只与阈值比较，容忍这种读数。

use std::time::{SystemTime, UNIX_EPOCH};

/// 当前纪元时间，纳秒。
pub fn epoch_nanos() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as i64,
        Err(_) => 0,
    }
}

/// 当前纪元时间，微秒。
pub fn epoch_micros() -> i64 {
    epoch_nanos() / 1_000
}

/// 当前纪元时间，毫秒。
pub fn epoch_millis() -> i64 {
    epoch_nanos() / 1_000_000
}
