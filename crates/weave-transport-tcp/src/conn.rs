use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use weave_core::{
    ByteSink, ByteSource, ConnMeta, Connection, EndpointAddr, NewConnSink, RECV_CHUNK, RETRY_DELAY,
};

use crate::error::{self, TcpError};

/// 可靠字节流连接。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以最小状态承载统一契约：连接头加两只句柄槽，其余都在任务里；
/// - 读写两半分别交给接收与发送任务独占，数据路径上没有锁。
///
/// ## 契约（What）
/// - `from_endpoint` 构造的值既可 `establish`（端点为远端）也可 `accept`
///  （端点为绑定目标），由调用的操作决定角色；
/// - Accept 循环发布的连接值已完成拆分，可立即启动两个任务；
/// - `close` 取消令牌并标记关闭，随后排空仍留在槽里的句柄；已被任务取走的
///   句柄由任务在观察到取消后释放。
pub struct TcpConn {
    meta: ConnMeta,
    read_half: Mutex<Option<OwnedReadHalf>>,
    write_half: Mutex<Option<OwnedWriteHalf>>,
}

/// 锁中毒只可能由持锁线程 panic 引起，这里的临界区不含可 panic 逻辑，
/// 恢复内层数据继续使用。
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl TcpConn {
    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            meta: ConnMeta::new(EndpointAddr::from(peer)),
            read_half: Mutex::new(Some(read_half)),
            write_half: Mutex::new(Some(write_half)),
        }
    }
}

impl Connection for TcpConn {
    type Error = TcpError;

    fn from_endpoint(endpoint: EndpointAddr) -> Self {
        Self {
            meta: ConnMeta::new(endpoint),
            read_half: Mutex::new(None),
            write_half: Mutex::new(None),
        }
    }

    fn meta(&self) -> &ConnMeta {
        &self.meta
    }

    async fn establish(&self) -> Result<(), TcpError> {
        let remote = self.meta.endpoint().to_socket_addr()?;
        let stream = TcpStream::connect(remote)
            .await
            .map_err(|source| TcpError::Connect {
                addr: remote.to_string(),
                source,
            })?;
        let (read_half, write_half) = stream.into_split();
        *lock(&self.read_half) = Some(read_half);
        *lock(&self.write_half) = Some(write_half);
        debug!(remote = %self.meta.endpoint(), "tcp connection established");
        Ok(())
    }

    async fn accept(&self, sink: NewConnSink<Self>) -> Result<(), TcpError> {
        let bind = self.meta.endpoint().to_socket_addr()?;
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|source| TcpError::Bind {
                addr: bind.to_string(),
                source,
            })?;
        info!(addr = %bind, "tcp listener bound");

        loop {
            let accepted = tokio::select! {
                _ = self.meta.stop().cancelled() => {
                    info!(addr = %bind, "tcp accept loop cancelled");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "new tcp connection");
                    let conn = TcpConn::from_stream(stream, peer);
                    if sink.send(conn).await.is_err() {
                        warn!("new-connection consumer gone, stopping tcp accept");
                        return Ok(());
                    }
                }
                Err(source) => {
                    warn!(error = %source, "tcp accept failed, stopping listener");
                    return Err(TcpError::Accept { source });
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TcpError> {
        self.meta.stop().cancel();
        self.meta.mark_closed();

        // 仍留在槽里的句柄当场释放；写半部先尝试有序关闭。
        let read_half = lock(&self.read_half).take();
        drop(read_half);
        let write_half = lock(&self.write_half).take();
        if let Some(mut write_half) = write_half
            && let Err(err) = write_half.shutdown().await
        {
            debug!(error = %err, "tcp write-half shutdown failed");
        }
        Ok(())
    }

    fn start_recv(&self, tx: ByteSink) -> Result<(), TcpError> {
        let Some(read_half) = lock(&self.read_half).take() else {
            return Err(TcpError::Unavailable { op: "recv" });
        };
        let meta = self.meta.clone();
        tokio::spawn(recv_loop(meta, read_half, tx));
        Ok(())
    }

    fn start_transmit(&self, rx: ByteSource) -> Result<(), TcpError> {
        let Some(write_half) = lock(&self.write_half).take() else {
            return Err(TcpError::Unavailable { op: "transmit" });
        };
        let meta = self.meta.clone();
        tokio::spawn(write_loop(meta, write_half, rx));
        Ok(())
    }
}

/// 接收任务：读一块、发布一块，直到关闭信号或取消。
async fn recv_loop(meta: ConnMeta, mut read_half: OwnedReadHalf, tx: ByteSink) {
    let mut buf = [0u8; RECV_CHUNK];
    loop {
        let read = tokio::select! {
            _ = meta.stop().cancelled() => break,
            read = read_half.read(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                debug!(peer = %meta.endpoint(), "tcp peer closed the stream");
                break;
            }
            Ok(n) => {
                meta.mark_recv();
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    debug!(peer = %meta.endpoint(), "receive consumer gone, stopping");
                    break;
                }
            }
            Err(err) if error::is_closure(&err) => {
                debug!(peer = %meta.endpoint(), error = %err, "tcp read closed");
                break;
            }
            Err(err) => {
                warn!(peer = %meta.endpoint(), error = %err, "tcp read error, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// 发送任务：逐块写出，写失败的块不重发。
async fn write_loop(meta: ConnMeta, mut write_half: OwnedWriteHalf, mut rx: ByteSource) {
    loop {
        let chunk = tokio::select! {
            _ = meta.stop().cancelled() => break,
            chunk = rx.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            debug!(peer = %meta.endpoint(), "transmit channel closed");
            break;
        };
        match write_half.write_all(&chunk).await {
            Ok(()) => {}
            Err(err) if error::is_closure(&err) => {
                debug!(peer = %meta.endpoint(), error = %err, "tcp write closed");
                break;
            }
            Err(err) => {
                warn!(peer = %meta.endpoint(), error = %err, "tcp write error, chunk dropped");
            }
        }
    }
    if let Err(err) = write_half.shutdown().await {
        debug!(error = %err, "tcp write-half shutdown failed");
    }
}
