#![doc = r#"
# weave-transport-tcp

## 模块使命（Why）
- **可靠字节流变体**：以 Tokio `TcpStream`/`TcpListener` 落地统一连接契约，
  上层通过 `weave-core` 的通道收发，不感知 TCP 细节。
- **读写分离**：建连后立刻把流拆成两半，接收与发送任务各自独占一半，
  互不加锁。

## 核心契约（What）
- [`TcpConn`] 实现 [`weave_core::Connection`] 的全部操作；
- 服务器角色的 Accept 循环为每个入站对端发布一个已就绪的 [`TcpConn`]；
- 读到 EOF 或被识别为对端关闭的错误时接收任务干净退出，其余 IO 错误
  记录后短暂停顿重试。

## 实现策略（How）
- 句柄槽为 `Mutex<Option<..>>`，建连填充、任务启动取走、关闭排空，
  全部经 `&self` 完成；
- 所有循环在每次 IO 尝试之间 `select!` 连接头的停止令牌，关闭不依赖
  “套接字被关后系统调用报错”这一条路径。
"#]

mod conn;
mod error;

pub use conn::TcpConn;
pub use error::TcpError;
