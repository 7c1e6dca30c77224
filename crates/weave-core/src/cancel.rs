use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// 取消原语，为接收/发送任务与 Accept 循环提供显式的停止信号。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - **可中断性**：所有长时间运行的循环都必须能被外部主动打断，而不是依赖
///   “关闭套接字让下一次系统调用报错”这类副作用；
/// - **可等待性**：循环在每次 IO 尝试之间 `select!` 等待 [`Cancellation::cancelled`]，
///   既不空转也不会在句柄从未关闭时泄漏任务。
///
/// ## 逻辑（How）
/// - 内部为 [`AtomicBool`] 加 [`Notify`]：`cancel` 先置位再唤醒全部等待者；
/// - `cancelled` 在注册等待者之后复查标志位，避免“先检查后注册”的丢失唤醒窗口；
/// - 克隆共享同一状态，便于在连接值、任务与看门狗之间传播。
///
/// ## 契约（What）
/// - `cancel` 首次触发返回 `true`，重复调用返回 `false`；
/// - 一旦置位，`is_cancelled` 全局可见且不可复位；
/// - `cancelled` 在任意时刻调用都会在置位后尽快返回。
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<CancelState>,
}

#[derive(Debug)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    /// 创建处于“未取消”状态的令牌。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelState {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 标记取消并唤醒所有等待者；首次触发返回 `true`。
    pub fn cancel(&self) -> bool {
        let first = self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.inner.notify.notify_waiters();
        first
    }

    /// 等待取消发生；若已取消则立即返回。
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            // 注册之后复查，封住 cancel 与 notified 之间的竞争窗口。
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
