#![doc = r#"
# weave-harness

## 模块使命（Why）
- **调用方侧的协作者**：空闲看门狗、pingpong 回显与探测驱动、部署配置，
  全部只消费 `weave-core` 的公共契约，不包含任何传输设计；
- **策略外置**：空闲阈值与轮询间隔属于部署决策，由本 crate 的配置承载，
  传输层只维护活跃时间戳。

## 核心内容（What）
- [`watchdog::IdleWatchdog`]：收养连接值，按周期比较空闲时长与阈值，
  超限即标记关闭并调用其 `close`；
- [`pingpong`]：16 字节探测包编解码（小端 u64 纳秒时间戳加序号）、
  回显驱动与延迟统计；
- [`config::HarnessConfig`]：TOML 配置加 `key=value` 覆盖；
- `pingpong-server` / `pingpong-client` 两个演示程序，传输种类由配置选择，
  收到中断信号时关闭顶层连接，让各任务经取消路径退出。
"#]

pub mod config;
pub mod pingpong;
pub mod watchdog;

pub use config::{HarnessConfig, TransportKind};
pub use watchdog::{IdleWatchdog, WatchdogConfig};
