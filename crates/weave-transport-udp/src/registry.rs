use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use weave_core::{ByteSink, ConnMeta};

/// 按客户端条目的接收通道槽：分发循环读取，`start_recv` 安装，消费方消失时清除。
pub(crate) type SinkSlot = Arc<ArcSwapOption<ByteSink>>;

pub(crate) fn empty_sink_slot() -> SinkSlot {
    Arc::new(ArcSwapOption::empty())
}

struct ClientSlot {
    meta: ConnMeta,
    sink: SinkSlot,
}

/// 客户端注册表：远端地址字符串到按客户端逻辑连接的映射。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 一只根套接字服务所有远端；注册表是把报文流还原成“逐客户端连接”的
///   唯一依据。
///
/// ## 契约（What）
/// - 条目由分发循环在观察到新来源时插入；
/// - 注册表从不自行删除条目，删除只发生在条目对应连接的 `close`；
/// - `touch` 在条目存在时顺带刷新活跃时间戳，外部看门狗据此判定空闲。
///
/// ## 并发（How）
/// - 底层为 `DashMap`；所有方法都在返回前结束对分片的借用，调用方拿到的
///   是克隆出的句柄，跨 await 点不会持有分片锁。
#[derive(Clone)]
pub(crate) struct ClientRegistry {
    inner: Arc<DashMap<String, ClientSlot>>,
}

impl ClientRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// 条目存在时刷新活跃时间戳，返回槽句柄与当前安装的接收通道。
    pub(crate) fn touch(&self, key: &str) -> Option<(SinkSlot, Option<Arc<ByteSink>>)> {
        let slot = self.inner.get(key)?;
        slot.meta.mark_recv();
        Some((slot.sink.clone(), slot.sink.load_full()))
    }

    pub(crate) fn insert(&self, key: String, meta: ConnMeta, sink: SinkSlot) {
        self.inner.insert(key, ClientSlot { meta, sink });
    }

    /// 移除条目；返回是否确有删除发生。
    pub(crate) fn remove(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }
}
