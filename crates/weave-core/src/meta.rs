use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use crate::addr::EndpointAddr;
use crate::cancel::Cancellation;
use crate::time;

/// 连接状态标志。
///
/// - `Active`：建连或被 Accept 产出后的正常状态；
/// - `Closed`：由 `close` 或外部看门狗标记，所有循环以此判断“仍然存活”。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnStatus {
    Active,
    Closed,
}

const STATUS_ACTIVE: u8 = 0;
const STATUS_CLOSED: u8 = 1;

/// 每个连接变体共享的连接头：端点、状态、活跃时间戳与停止令牌。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - **共享头部**：三种传输的公共字段集中于此，变体只保留各自的句柄；
/// - **跨任务可见**：接收任务写活跃时间戳，外部看门狗读；看门狗写状态，
///   各循环读。这些都是标量字段，允许轻微滞后的读数，不加全局锁。
///
/// ## 契约（What）
/// - `mark_recv` 由接收路径在每次成功收包后调用，记录毫秒级纪元时间；
/// - `mark_closed` 只推进状态，不负责资源释放；释放由连接的 `close` 完成；
/// - `stop` 返回的令牌被该连接的所有循环共同观察。
///
/// ## 注意事项（Trade-offs）
/// - 原子字段使用 `Relaxed` 排序：略微过期的空闲判定不构成正确性问题；
/// - 构造时即写入当前时间，避免新建连接在首个包到达前被判定为空闲。
#[derive(Clone, Debug)]
pub struct ConnMeta {
    inner: Arc<MetaState>,
}

#[derive(Debug)]
struct MetaState {
    endpoint: EndpointAddr,
    status: AtomicU8,
    last_recv_at: AtomicI64,
    stop: Cancellation,
}

impl ConnMeta {
    /// 创建指向给定端点的连接头，活跃时间戳初始化为当前时间。
    pub fn new(endpoint: EndpointAddr) -> Self {
        Self {
            inner: Arc::new(MetaState {
                endpoint,
                status: AtomicU8::new(STATUS_ACTIVE),
                last_recv_at: AtomicI64::new(time::epoch_millis()),
                stop: Cancellation::new(),
            }),
        }
    }

    /// 连接指向的端点：客户端为远端，服务器根为绑定目标，按客户端条目为对端。
    pub fn endpoint(&self) -> &EndpointAddr {
        &self.inner.endpoint
    }

    /// 读取状态标志。
    pub fn status(&self) -> ConnStatus {
        match self.inner.status.load(Ordering::Relaxed) {
            STATUS_ACTIVE => ConnStatus::Active,
            _ => ConnStatus::Closed,
        }
    }

    /// 是否仍处于活跃状态。
    pub fn is_active(&self) -> bool {
        self.status() == ConnStatus::Active
    }

    /// 标记为已关闭；只推进状态标志。
    pub fn mark_closed(&self) {
        self.inner.status.store(STATUS_CLOSED, Ordering::Relaxed);
    }

    /// 记录一次成功接收，刷新毫秒级活跃时间戳。
    pub fn mark_recv(&self) {
        self.inner
            .last_recv_at
            .store(time::epoch_millis(), Ordering::Relaxed);
    }

    /// 最近一次成功接收的毫秒级纪元时间。
    pub fn last_recv_at(&self) -> i64 {
        self.inner.last_recv_at.load(Ordering::Relaxed)
    }

    /// 距给定时刻的空闲毫秒数，供外部看门狗比较阈值。
    pub fn idle_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.last_recv_at()
    }

    /// 该连接所有循环共同观察的停止令牌。
    pub fn stop(&self) -> &Cancellation {
        &self.inner.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_once() {
        let meta = ConnMeta::new(EndpointAddr::new("127.0.0.1", 1));
        assert!(meta.is_active());
        meta.mark_closed();
        assert_eq!(meta.status(), ConnStatus::Closed);
        meta.mark_closed();
        assert_eq!(meta.status(), ConnStatus::Closed);
    }

    #[test]
    fn recv_stamp_advances() {
        let meta = ConnMeta::new(EndpointAddr::new("127.0.0.1", 1));
        let before = meta.last_recv_at();
        assert!(before > 0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        meta.mark_recv();
        assert!(meta.last_recv_at() >= before);
        assert!(meta.idle_millis(meta.last_recv_at() + 100) >= 100);
    }

    #[test]
    fn clones_share_state() {
        let meta = ConnMeta::new(EndpointAddr::new("127.0.0.1", 1));
        let other = meta.clone();
        other.mark_closed();
        assert!(!meta.is_active());
        meta.stop().cancel();
        assert!(other.stop().is_cancelled());
    }
}
