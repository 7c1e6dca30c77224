use std::io;

use quinn::crypto::rustls::NoInitialCipherSuite;
use quinn::{ConnectError, ConnectionError, ReadError, WriteError};
use thiserror::Error;
use weave_core::InvalidEndpoint;

/// QUIC 变体的结构化错误。
#[derive(Debug, Error)]
pub enum QuicError {
    /// 端点套接字绑定失败。
    #[error("quic bind {addr} failed")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 建连参数被本地拒绝（地址、服务器名或配置非法）。
    #[error("quic connect {addr} failed")]
    Connect {
        addr: String,
        #[source]
        source: ConnectError,
    },

    /// 与对端的会话握手失败（含应用协议标识不一致）。
    #[error("quic handshake with {addr} failed")]
    Handshake {
        addr: String,
        #[source]
        source: ConnectionError,
    },

    /// 唯一双向流打开失败。
    #[error("quic stream open failed")]
    OpenStream {
        #[source]
        source: ConnectionError,
    },

    /// 进程级自签名证书生成失败。
    #[error("ephemeral identity generation failed")]
    Identity {
        #[source]
        source: rcgen::Error,
    },

    /// TLS 配置被 rustls 拒绝。
    #[error("tls configuration rejected")]
    Crypto {
        #[source]
        source: rustls::Error,
    },

    /// rustls 配置与 QUIC 初始密码套件不兼容。
    #[error(transparent)]
    CipherSuite(#[from] NoInitialCipherSuite),

    /// 端点字符串不是合法 IP 字面量。
    #[error(transparent)]
    Endpoint(#[from] InvalidEndpoint),

    /// 底层句柄不可用：尚未建连，或对应任务已经取走流。
    #[error("quic handle unavailable for {op}: not established or task already started")]
    Unavailable { op: &'static str },
}

/// 会话级错误中属于“对端有意结束”的那一组。
fn connection_is_closure(err: &ConnectionError) -> bool {
    matches!(
        err,
        ConnectionError::ApplicationClosed(_)
            | ConnectionError::ConnectionClosed(_)
            | ConnectionError::LocallyClosed
    )
}

/// 读路径的关闭信号：对端取消流、流已结束、或会话被有意关闭。
pub(crate) fn read_is_closure(err: &ReadError) -> bool {
    match err {
        ReadError::Reset(_) | ReadError::ClosedStream => true,
        ReadError::ConnectionLost(cause) => connection_is_closure(cause),
        _ => false,
    }
}

/// 写路径的关闭信号：对端停止接收、流已结束、或会话被有意关闭。
pub(crate) fn write_is_closure(err: &WriteError) -> bool {
    match err {
        WriteError::Stopped(_) | WriteError::ClosedStream => true,
        WriteError::ConnectionLost(cause) => connection_is_closure(cause),
        _ => false,
    }
}
