#![doc = r#"
# weave-transport-quic

## 模块使命（Why）
- **加密多路流变体**：以 `quinn` 落地统一连接契约，对上层隐藏会话握手、
  证书与流管理；每个会话固定使用一条双向流承载全部应用数据。
- **封闭部署假设**：客户端不校验服务器证书链（显式的
  [`AcceptAnyServerCert`]），服务器使用进程级一次性自签名证书。该设计
  只适用于存在带外信任或封闭网络的部署，不适合需要证书校验的环境。

## 核心契约（What）
- [`QuicConn`] 实现统一连接契约；`establish` 完成握手并主动打开唯一
  双向流，Accept 循环在握手后等待对端的这条流；
- 双方握手固定携带 [`ALPN`] 应用协议标识，标识不一致的对端握手必败，
  这是互操作测试的硬性要求；
- 不支持同一会话上的多条并发逻辑流；需要多流时应另行建立会话。

## 实现策略（How）
- 自签名证书经 `rcgen` 生成，进程内首次使用时创建并缓存；
- 关闭顺序固定为 子流、会话、端点，逐项容错；
- 流的读写两端分别交给接收与发送任务独占。
"#]

mod conn;
mod error;
mod ident;

pub use conn::QuicConn;
pub use error::QuicError;
pub use ident::{ALPN, AcceptAnyServerCert};
