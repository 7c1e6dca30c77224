use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};
use weave_core::{Connection, time};

/// 看门狗的部署参数：空闲多久算死，隔多久看一眼。
#[derive(Clone, Copy, Debug)]
pub struct WatchdogConfig {
    pub idle_threshold: Duration,
    pub poll_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// 空闲连接看门狗。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输层只维护活跃时间戳，不自行回收；何时算空闲、多久查一次属于
///   部署策略，由调用方通过本类型落地；
/// - 把回收集中到一个任务里，调用方收养连接后无需再跟踪其生死。
///
/// ## 契约（What）
/// - `adopt` 把连接值交给看门狗托管，所有权随之转移；
/// - 每个轮询周期，活跃时间戳早于阈值的连接被标记关闭并调用 `close`，
///   随后移出在册集合；已被他处标记关闭的连接直接移出；
/// - 看门狗句柄全部释放后，后台任务关闭所有在册连接并退出。
///
/// ## 注意事项（Trade-offs）
/// - 空闲判定读取的是宽松原子时间戳，检测可能滞后一个轮询周期，
///   这是设计允许的最终一致行为。
pub struct IdleWatchdog<C: Connection> {
    adopt_tx: mpsc::Sender<C>,
}

impl<C: Connection> IdleWatchdog<C> {
    /// 启动看门狗任务并返回收养句柄。
    pub fn spawn(config: WatchdogConfig) -> Self {
        let (adopt_tx, adopt_rx) = mpsc::channel(16);
        tokio::spawn(run(config, adopt_rx));
        Self { adopt_tx }
    }

    /// 托管一个连接；看门狗已退出时返回 `false`。
    pub async fn adopt(&self, conn: C) -> bool {
        self.adopt_tx.send(conn).await.is_ok()
    }
}

async fn run<C: Connection>(config: WatchdogConfig, mut adopt_rx: mpsc::Receiver<C>) {
    let threshold = config.idle_threshold.as_millis() as i64;
    let mut watched: Vec<C> = Vec::new();
    let mut ticker = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            adopted = adopt_rx.recv() => match adopted {
                Some(conn) => watched.push(conn),
                None => break,
            },
            _ = ticker.tick() => {
                let now = time::epoch_millis();
                let mut index = 0;
                while index < watched.len() {
                    let conn = &watched[index];
                    if !conn.meta().is_active() {
                        watched.swap_remove(index);
                        continue;
                    }
                    if conn.meta().idle_millis(now) > threshold {
                        info!(peer = %conn.meta().endpoint(), "idle connection reclaimed");
                        conn.meta().mark_closed();
                        if let Err(err) = conn.close().await {
                            warn!(error = %err, "close after idle timeout failed");
                        }
                        watched.swap_remove(index);
                        continue;
                    }
                    index += 1;
                }
            }
        }
    }
    // 句柄尽数释放，收尾关闭仍在册的连接。
    for conn in watched {
        if let Err(err) = conn.close().await {
            warn!(error = %err, "close during watchdog shutdown failed");
        }
    }
}
