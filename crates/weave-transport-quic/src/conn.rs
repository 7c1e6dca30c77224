use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use quinn::{Connection as QuinnConnection, Endpoint, RecvStream, SendStream};
use tracing::{debug, info, warn};
use weave_core::{
    ByteSink, ByteSource, ConnMeta, Connection, EndpointAddr, NewConnSink, RECV_CHUNK, RETRY_DELAY,
};

use crate::error::{self, QuicError};
use crate::ident;

/// 加密多路流连接：一个会话，一条双向流。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 对上层呈现与 TCP 相同的形态：建连后只有“一条字节通路”，多路复用
///   能力被刻意收敛为单流，复杂度留在本 crate 内部；
/// - 端点、会话与流分槽持有，使部分建立的连接也能被 `close` 安全清理。
///
/// ## 契约（What）
/// - `establish`：绑定本地端点、完成握手、打开唯一双向流；任一步失败即
///   关闭已打开的部分并返回错误，不保留句柄；
/// - Accept 循环发布的连接值不持有服务器端点（端点归根连接所有），
///   其 `close` 只关闭流与会话；
/// - 关闭顺序固定：子流 finish、会话 close、端点 close，逐项容错。
pub struct QuicConn {
    meta: ConnMeta,
    endpoint: Mutex<Option<Endpoint>>,
    connection: Mutex<Option<QuinnConnection>>,
    send: Mutex<Option<SendStream>>,
    recv: Mutex<Option<RecvStream>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl QuicConn {
    /// Accept 循环为一个完成握手并送达其双向流的对端构造连接值。
    fn from_parts(
        connection: QuinnConnection,
        send: SendStream,
        recv: RecvStream,
        peer: SocketAddr,
    ) -> Self {
        Self {
            meta: ConnMeta::new(EndpointAddr::from(peer)),
            endpoint: Mutex::new(None),
            connection: Mutex::new(Some(connection)),
            send: Mutex::new(Some(send)),
            recv: Mutex::new(Some(recv)),
        }
    }
}

impl Connection for QuicConn {
    type Error = QuicError;

    fn from_endpoint(endpoint: EndpointAddr) -> Self {
        Self {
            meta: ConnMeta::new(endpoint),
            endpoint: Mutex::new(None),
            connection: Mutex::new(None),
            send: Mutex::new(None),
            recv: Mutex::new(None),
        }
    }

    fn meta(&self) -> &ConnMeta {
        &self.meta
    }

    async fn establish(&self) -> Result<(), QuicError> {
        let remote = self.meta.endpoint().to_socket_addr()?;
        let bind: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let mut endpoint = Endpoint::client(bind).map_err(|source| QuicError::Bind {
            addr: bind.to_string(),
            source,
        })?;
        endpoint.set_default_client_config(ident::client_config()?);

        let connecting =
            endpoint
                .connect(remote, ident::SERVER_NAME)
                .map_err(|source| QuicError::Connect {
                    addr: remote.to_string(),
                    source,
                })?;
        let connection = match connecting.await {
            Ok(connection) => connection,
            Err(source) => {
                endpoint.close(0u32.into(), b"");
                return Err(QuicError::Handshake {
                    addr: remote.to_string(),
                    source,
                });
            }
        };
        let (send, recv) = match connection.open_bi().await {
            Ok(pair) => pair,
            Err(source) => {
                connection.close(0u32.into(), b"");
                endpoint.close(0u32.into(), b"");
                return Err(QuicError::OpenStream { source });
            }
        };

        *lock(&self.endpoint) = Some(endpoint);
        *lock(&self.connection) = Some(connection);
        *lock(&self.send) = Some(send);
        *lock(&self.recv) = Some(recv);
        debug!(remote = %self.meta.endpoint(), "quic connection established");
        Ok(())
    }

    async fn accept(&self, sink: NewConnSink<Self>) -> Result<(), QuicError> {
        let bind = self.meta.endpoint().to_socket_addr()?;
        let server_config = ident::server_config()?;
        let endpoint =
            Endpoint::server(server_config, bind).map_err(|source| QuicError::Bind {
                addr: bind.to_string(),
                source,
            })?;
        *lock(&self.endpoint) = Some(endpoint.clone());
        info!(addr = %bind, "quic endpoint bound");

        loop {
            let incoming = tokio::select! {
                _ = self.meta.stop().cancelled() => {
                    info!(addr = %bind, "quic accept loop cancelled");
                    return Ok(());
                }
                incoming = endpoint.accept() => incoming,
            };
            let Some(incoming) = incoming else {
                debug!(addr = %bind, "quic endpoint closed, stopping accept");
                return Ok(());
            };
            let connecting = match incoming.accept() {
                Ok(connecting) => connecting,
                Err(err) => {
                    warn!(error = %err, "quic incoming rejected");
                    continue;
                }
            };
            let connection = match connecting.await {
                Ok(connection) => connection,
                Err(err) => {
                    // 含应用协议标识不一致的对端：记录后继续服务其他对端。
                    warn!(error = %err, "quic handshake failed");
                    continue;
                }
            };
            let (send, recv) = match connection.accept_bi().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "quic stream accept failed");
                    connection.close(2u32.into(), b"open stream failed");
                    continue;
                }
            };
            let peer = connection.remote_address();
            info!(%peer, "new quic connection");
            let conn = QuicConn::from_parts(connection, send, recv, peer);
            if sink.send(conn).await.is_err() {
                warn!("new-connection consumer gone, stopping quic accept");
                return Ok(());
            }
        }
    }

    async fn close(&self) -> Result<(), QuicError> {
        self.meta.stop().cancel();
        self.meta.mark_closed();

        let send = lock(&self.send).take();
        if let Some(mut send) = send
            && let Err(err) = send.finish()
        {
            debug!(error = %err, "quic stream finish failed");
        }
        let _ = lock(&self.recv).take();
        if let Some(connection) = lock(&self.connection).take() {
            connection.close(0u32.into(), b"");
        }
        if let Some(endpoint) = lock(&self.endpoint).take() {
            endpoint.close(0u32.into(), b"");
        }
        Ok(())
    }

    fn start_recv(&self, tx: ByteSink) -> Result<(), QuicError> {
        let Some(recv) = lock(&self.recv).take() else {
            return Err(QuicError::Unavailable { op: "recv" });
        };
        let meta = self.meta.clone();
        tokio::spawn(recv_loop(meta, recv, tx));
        Ok(())
    }

    fn start_transmit(&self, rx: ByteSource) -> Result<(), QuicError> {
        let Some(send) = lock(&self.send).take() else {
            return Err(QuicError::Unavailable { op: "transmit" });
        };
        let meta = self.meta.clone();
        tokio::spawn(write_loop(meta, send, rx));
        Ok(())
    }
}

/// 接收任务：读唯一双向流，对端 finish 即干净退出。
async fn recv_loop(meta: ConnMeta, mut recv: RecvStream, tx: ByteSink) {
    let mut buf = [0u8; RECV_CHUNK];
    loop {
        let read = tokio::select! {
            _ = meta.stop().cancelled() => break,
            read = recv.read(&mut buf) => read,
        };
        match read {
            Ok(Some(0)) => {}
            Ok(Some(n)) => {
                meta.mark_recv();
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    debug!(peer = %meta.endpoint(), "receive consumer gone, stopping");
                    break;
                }
            }
            Ok(None) => {
                debug!(peer = %meta.endpoint(), "quic stream finished by peer");
                break;
            }
            Err(err) if error::read_is_closure(&err) => {
                debug!(peer = %meta.endpoint(), error = %err, "quic read closed");
                break;
            }
            Err(err) => {
                warn!(peer = %meta.endpoint(), error = %err, "quic read error, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// 发送任务：逐块写唯一双向流，写失败的块不重发。
async fn write_loop(meta: ConnMeta, mut send: SendStream, mut rx: ByteSource) {
    loop {
        let chunk = tokio::select! {
            _ = meta.stop().cancelled() => break,
            chunk = rx.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            debug!(peer = %meta.endpoint(), "transmit channel closed");
            break;
        };
        match send.write_all(&chunk).await {
            Ok(()) => {}
            Err(err) if error::write_is_closure(&err) => {
                debug!(peer = %meta.endpoint(), error = %err, "quic write closed");
                break;
            }
            Err(err) => {
                warn!(peer = %meta.endpoint(), error = %err, "quic write error, chunk dropped");
            }
        }
    }
    if let Err(err) = send.finish() {
        debug!(error = %err, "quic stream finish failed");
    }
}
