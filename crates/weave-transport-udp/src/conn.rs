use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use weave_core::{
    ByteSink, ByteSource, ConnMeta, Connection, EndpointAddr, NewConnSink, RECV_CHUNK, RETRY_DELAY,
};

use crate::error::{self, UdpError};
use crate::registry::{ClientRegistry, SinkSlot, empty_sink_slot};

/// 无连接报文的逻辑连接。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 同一个类型承担三种形态：客户端（已 `connect` 的独占套接字）、服务器根
///  （绑定的共享套接字加分发循环）、按客户端条目（共享根套接字加回复目标）。
///   形态由构造路径决定，与源实现的单结构多态一致。
///
/// ## 契约（What）
/// - 服务器根从不作为“连接”交给调用方，Accept 循环只发布按客户端条目；
/// - 按客户端条目的 `start_recv` 不读套接字，只把通道安装进注册表槽，
///   由分发循环向其转发；`start_transmit` 携带回复目标写共享根套接字；
/// - 条目的 `close` 把自己从注册表移除；之后同一远端的报文会再次触发
///   “新客户端”发布。
///
/// ## 注意事项（Trade-offs）
/// - 客户端角色的两个任务共享同一只套接字句柄（克隆 `Arc`），因此重复
///   调用启动方法不会被句柄槽拦截，由调用方保证只启动一次；
/// - 条目建立与通道安装之间的报文被显式丢弃（记录 debug 日志），不缓冲。
pub struct UdpConn {
    meta: ConnMeta,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    reply_to: Option<SocketAddr>,
    sink: SinkSlot,
    registry: Option<(ClientRegistry, String)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl UdpConn {
    /// 分发循环观察到新来源时构造的按客户端条目。
    fn client_entry(root: Arc<UdpSocket>, peer: SocketAddr, registry: ClientRegistry) -> Self {
        Self {
            meta: ConnMeta::new(EndpointAddr::from(peer)),
            socket: Mutex::new(Some(root)),
            reply_to: Some(peer),
            sink: empty_sink_slot(),
            registry: Some((registry, peer.to_string())),
        }
    }

    fn shared_socket(&self, op: &'static str) -> Result<Arc<UdpSocket>, UdpError> {
        lock(&self.socket)
            .as_ref()
            .cloned()
            .ok_or(UdpError::Unavailable { op })
    }
}

impl Connection for UdpConn {
    type Error = UdpError;

    fn from_endpoint(endpoint: EndpointAddr) -> Self {
        Self {
            meta: ConnMeta::new(endpoint),
            socket: Mutex::new(None),
            reply_to: None,
            sink: empty_sink_slot(),
            registry: None,
        }
    }

    fn meta(&self) -> &ConnMeta {
        &self.meta
    }

    async fn establish(&self) -> Result<(), UdpError> {
        if self.reply_to.is_some() {
            return Err(UdpError::Role { op: "establish" });
        }
        let remote = self.meta.endpoint().to_socket_addr()?;
        let bind: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|source| UdpError::Bind {
                addr: bind.to_string(),
                source,
            })?;
        socket
            .connect(remote)
            .await
            .map_err(|source| UdpError::Connect {
                addr: remote.to_string(),
                source,
            })?;
        *lock(&self.socket) = Some(Arc::new(socket));
        debug!(remote = %self.meta.endpoint(), "udp socket connected");
        Ok(())
    }

    async fn accept(&self, sink: NewConnSink<Self>) -> Result<(), UdpError> {
        if self.reply_to.is_some() {
            return Err(UdpError::Role { op: "accept" });
        }
        let bind = self.meta.endpoint().to_socket_addr()?;
        let socket = Arc::new(UdpSocket::bind(bind).await.map_err(|source| UdpError::Bind {
            addr: bind.to_string(),
            source,
        })?);
        *lock(&self.socket) = Some(socket.clone());
        info!(addr = %bind, "udp socket bound, demultiplexing clients");

        let registry = ClientRegistry::new();
        let mut buf = [0u8; RECV_CHUNK];
        loop {
            let received = tokio::select! {
                _ = self.meta.stop().cancelled() => {
                    info!(addr = %bind, "udp accept loop cancelled");
                    return Ok(());
                }
                received = socket.recv_from(&mut buf) => received,
            };
            match received {
                Ok((len, peer)) => {
                    let key = peer.to_string();
                    match registry.touch(&key) {
                        Some((slot, Some(tx))) => {
                            if tx.send(Bytes::copy_from_slice(&buf[..len])).await.is_err() {
                                debug!(%peer, "per-client consumer gone, clearing sink");
                                slot.store(None);
                            }
                        }
                        Some((_slot, None)) => {
                            debug!(%peer, len, "datagram dropped: no receive sink installed");
                        }
                        None => {
                            info!(%peer, "new udp client");
                            let conn =
                                UdpConn::client_entry(socket.clone(), peer, registry.clone());
                            registry.insert(key, conn.meta.clone(), conn.sink.clone());
                            // 建条目的这一包不投递：通道要等调用方安装。
                            debug!(%peer, len, "datagram that created the entry is dropped");
                            if sink.send(conn).await.is_err() {
                                warn!("new-connection consumer gone, stopping udp accept");
                                return Ok(());
                            }
                        }
                    }
                }
                Err(err) if error::is_closure(&err) => {
                    debug!(error = %err, "udp socket closed, stopping accept");
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, "udp read error, continuing");
                }
            }
        }
    }

    async fn close(&self) -> Result<(), UdpError> {
        self.meta.stop().cancel();
        self.meta.mark_closed();
        if let Some((registry, key)) = &self.registry
            && registry.remove(key)
        {
            debug!(peer = %self.meta.endpoint(), "udp client entry removed from registry");
        }
        self.sink.store(None);
        // 丢弃自己的句柄；按客户端条目只释放对根套接字的共享引用。
        let _ = lock(&self.socket).take();
        Ok(())
    }

    fn start_recv(&self, tx: ByteSink) -> Result<(), UdpError> {
        if self.reply_to.is_some() {
            // 按客户端条目不读套接字：安装通道，分发循环随后向其转发。
            self.sink.store(Some(Arc::new(tx)));
            return Ok(());
        }
        let socket = self.shared_socket("recv")?;
        let meta = self.meta.clone();
        tokio::spawn(recv_loop(meta, socket, tx));
        Ok(())
    }

    fn start_transmit(&self, rx: ByteSource) -> Result<(), UdpError> {
        let socket = self.shared_socket("transmit")?;
        let meta = self.meta.clone();
        let reply_to = self.reply_to;
        tokio::spawn(write_loop(meta, socket, reply_to, rx));
        Ok(())
    }
}

/// 客户端角色的接收任务：读已 connect 的套接字。
async fn recv_loop(meta: ConnMeta, socket: Arc<UdpSocket>, tx: ByteSink) {
    let mut buf = [0u8; RECV_CHUNK];
    loop {
        let received = tokio::select! {
            _ = meta.stop().cancelled() => break,
            received = socket.recv(&mut buf) => received,
        };
        match received {
            Ok(0) => {
                debug!(peer = %meta.endpoint(), "empty datagram ignored");
            }
            Ok(n) => {
                meta.mark_recv();
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    debug!(peer = %meta.endpoint(), "receive consumer gone, stopping");
                    break;
                }
            }
            Err(err) if error::is_closure(&err) => {
                debug!(peer = %meta.endpoint(), error = %err, "udp recv closed");
                break;
            }
            Err(err) => {
                warn!(peer = %meta.endpoint(), error = %err, "udp recv error, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// 发送任务：客户端写已 connect 的套接字，按客户端条目携带目标写共享根套接字。
async fn write_loop(
    meta: ConnMeta,
    socket: Arc<UdpSocket>,
    reply_to: Option<SocketAddr>,
    mut rx: ByteSource,
) {
    loop {
        let chunk = tokio::select! {
            _ = meta.stop().cancelled() => break,
            chunk = rx.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            debug!(peer = %meta.endpoint(), "transmit channel closed");
            break;
        };
        let written = match reply_to {
            Some(target) => socket.send_to(&chunk, target).await,
            None => socket.send(&chunk).await,
        };
        match written {
            Ok(_) => {}
            Err(err) if error::is_closure(&err) => {
                debug!(peer = %meta.endpoint(), error = %err, "udp write closed");
                break;
            }
            Err(err) => {
                warn!(peer = %meta.endpoint(), error = %err, "udp write error, chunk dropped");
            }
        }
    }
}
