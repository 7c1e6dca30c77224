use std::io;

use thiserror::Error;
use weave_core::InvalidEndpoint;

/// UDP 变体的结构化错误。
#[derive(Debug, Error)]
pub enum UdpError {
    /// 套接字绑定失败。
    #[error("udp bind {addr} failed")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 客户端角色的 `connect` 失败。
    #[error("udp connect {addr} failed")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 端点字符串不是合法 IP 字面量。
    #[error(transparent)]
    Endpoint(#[from] InvalidEndpoint),

    /// 底层句柄不可用：尚未建连或绑定。
    #[error("udp socket unavailable for {op}: not established")]
    Unavailable { op: &'static str },

    /// 该操作与连接当前角色不符（例如对按客户端条目调用 establish）。
    #[error("udp operation {op} not supported in this role")]
    Role { op: &'static str },
}

/// 判断 IO 错误是否意味着套接字已被关闭，应终结所属循环。
///
/// UDP 没有对端关闭的原生信号，这一组只覆盖本地句柄失效的情况；
/// 目标不可达等报文级错误按瞬时故障处理。
pub(crate) fn is_closure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
    )
}
