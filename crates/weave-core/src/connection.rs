use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::addr::EndpointAddr;
use crate::meta::ConnMeta;

/// 单次底层读取的最大块长度。
pub const RECV_CHUNK: usize = 1024;

/// 瞬时 IO 错误重试前的短暂停顿。
pub const RETRY_DELAY: Duration = Duration::from_millis(1);

/// 面向调用方的出站数据通道写端：每个元素是一次底层读取得到的原始字节块。
pub type ByteSink = mpsc::Sender<Bytes>;

/// 面向调用方的入站数据通道读端：每个元素触发一次底层写出。
pub type ByteSource = mpsc::Receiver<Bytes>;

/// Accept 循环发布新连接的通道写端。
pub type NewConnSink<C> = mpsc::Sender<C>;

/// 构造一对数据通道。
///
/// 容量固定为 1，逐块交接：消费方不取走上一块，生产方就停在 `send` 上。
/// 这是整个分层唯一的背压机制，不允许在内部引入更深的队列。
pub fn byte_channel() -> (ByteSink, ByteSource) {
    mpsc::channel(1)
}

/// 构造一对新连接通道，交接语义与 [`byte_channel`] 相同。
pub fn conn_channel<C>() -> (mpsc::Sender<C>, mpsc::Receiver<C>) {
    mpsc::channel(1)
}

/// 统一的传输连接契约，由 TCP/UDP/QUIC 三种实现共同遵循。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - **单一接口**：上层按同一套操作建连、接受、收发与关闭，无需按传输分支；
/// - **任务外置**：`start_recv`/`start_transmit` 启动独立任务后立即返回，
///   调用方只通过通道与连接交互，自身的并发结构不受约束。
///
/// ## 契约（What）
/// - `from_endpoint`：构造未建连的连接值；端点对客户端是远端，对服务器是绑定目标；
/// - `establish`：客户端角色建连；任一步骤失败时不保留任何句柄；
/// - `accept`：服务器角色；绑定后循环发布逐对端的连接值，单个对端握手失败
///   记录日志后继续；仅在监听器致命错误时返回 `Err`，令牌取消时返回 `Ok`；
/// - `close`：先取消停止令牌并标记状态，再按 子流、会话/套接字、监听器 的
///   顺序释放，逐项容错；对从未建连或部分建连的连接调用同样安全，可重复调用；
/// - `start_recv`/`start_transmit`：要求底层句柄已就绪；句柄槽已空
///  （未建连或任务已启动）时返回错误，而不是未定义行为。
///
/// ## 注意事项（Trade-offs）
/// - 两个启动方法各自最多生效一次；重复调用的防护粒度是“句柄槽已被取走”，
///   对共享句柄的 UDP 客户端角色仍由调用方保证不重复启动；
/// - 任务内的失败不会同步返回，只能通过日志与通道不再产出数据观察到。
pub trait Connection: Send + Sync + Sized + 'static {
    /// 该传输的错误类型。
    type Error: std::error::Error + Send + Sync + 'static;

    /// 构造未建连的连接值。
    fn from_endpoint(endpoint: EndpointAddr) -> Self;

    /// 连接头：端点、状态、活跃时间戳与停止令牌。
    fn meta(&self) -> &ConnMeta;

    /// 客户端角色建连。
    fn establish(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// 服务器角色：绑定端点并循环发布新连接。
    fn accept(
        &self,
        sink: NewConnSink<Self>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// 释放连接持有的全部资源。
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// 启动接收任务，把每次读到的字节块原样发布到 `tx`。
    fn start_recv(&self, tx: ByteSink) -> Result<(), Self::Error>;

    /// 启动发送任务，把 `rx` 中的每个字节块原样写出。
    fn start_transmit(&self, rx: ByteSource) -> Result<(), Self::Error>;
}
