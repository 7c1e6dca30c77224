use std::io;

use thiserror::Error;
use weave_core::InvalidEndpoint;

/// TCP 变体的结构化错误：每个失败的操作对应一个变体，携带根因与排障所需地址。
#[derive(Debug, Error)]
pub enum TcpError {
    /// 监听地址绑定失败。
    #[error("tcp bind {addr} failed")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 监听器接受入站连接失败（致命，Accept 循环就此返回）。
    #[error("tcp accept failed")]
    Accept {
        #[source]
        source: io::Error,
    },

    /// 出站建连失败。
    #[error("tcp connect {addr} failed")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 端点字符串不是合法 IP 字面量。
    #[error(transparent)]
    Endpoint(#[from] InvalidEndpoint),

    /// 底层句柄不可用：尚未建连，或对应任务已经取走句柄。
    #[error("tcp handle unavailable for {op}: not established or task already started")]
    Unavailable { op: &'static str },
}

/// 判断一个 IO 错误是否属于“对端有意结束会话”的关闭信号。
///
/// 关闭信号终结所属任务；其余错误按瞬时故障处理（记录、停顿、重试）。
pub(crate) fn is_closure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_signals_are_enumerated() {
        for kind in [
            io::ErrorKind::UnexpectedEof,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::NotConnected,
        ] {
            assert!(is_closure(&io::Error::from(kind)));
        }
        assert!(!is_closure(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_closure(&io::Error::from(io::ErrorKind::TimedOut)));
    }
}
