#![doc = r#"
# weave-transport-udp

## 模块使命（Why）
- **无连接报文变体**：UDP 套接字本身没有连接概念，本 crate 在一只共享
  的根套接字之上，为每个远端对端合成“逻辑连接”，使上层获得与 TCP/QUIC
  一致的连接语义。
- **按客户端分路**：服务器角色的 Accept 循环独占根套接字的读方向，依据
  来源地址把报文分发到各逻辑连接；写方向由各逻辑连接的发送任务携带
  目标地址共用根套接字。

## 核心契约（What）
- [`UdpConn`] 实现统一连接契约；客户端角色拥有一只已 `connect` 的套接字，
  服务器角色的按客户端条目共享根套接字并记录回复目标；
- 客户端注册表按“来源地址字符串”为键，首个报文触发建条目并发布新连接；
  条目只由其自身的 `close`（调用方或看门狗驱动）移除；
- 条目建立与调用方安装接收通道之间到达的报文被显式丢弃并记录，不做
  内部缓冲，保持逐块交接的背压契约。

## 实现策略（How）
- 注册表为 `DashMap`，分发路径只在克隆出所需句柄后才跨越 await 点；
- 接收通道槽为 `ArcSwapOption`，安装与清除都是无锁替换；
- 所有循环在每次 IO 尝试之间观察停止令牌。
"#]

mod conn;
mod error;
mod registry;

pub use conn::UdpConn;
pub use error::UdpError;
