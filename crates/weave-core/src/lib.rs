#![deny(unsafe_code)]
#![doc = "weave-core: 传输层连接契约的统一抽象层。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：为 TCP/UDP/QUIC 三种实现提供共同语言，让上层以同一套接口建连、收发与关闭，无需按传输分支。"]
#![doc = "- **What**：定义 `Connection` 契约、`EndpointAddr` 端点描述、`ConnMeta` 连接头（状态/活跃时间戳/停止令牌）、字节通道别名与时间工具。"]
#![doc = "- **How**：所有实现仅依赖本 crate 即可遵循统一契约；通道采用容量为 1 的 mpsc，保留逐块交接的背压语义。"]

pub mod addr;
pub mod cancel;
pub mod connection;
pub mod meta;
pub mod time;

pub use addr::{EndpointAddr, InvalidEndpoint};
pub use cancel::Cancellation;
pub use connection::{
    ByteSink, ByteSource, Connection, NewConnSink, RECV_CHUNK, RETRY_DELAY, byte_channel,
    conn_channel,
};
pub use meta::{ConnMeta, ConnStatus};
