//! TCP 变体的回环行为测试：走真实 loopback 套接字，验证统一契约的
//! 建连、发布、逐字节保序与关闭语义。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::time::timeout;
use weave_core::{Connection, EndpointAddr, byte_channel, conn_channel};
use weave_transport_tcp::TcpConn;

const WAIT: Duration = Duration::from_secs(5);

/// 启动一个服务器 Accept 循环，返回服务器根连接与新连接通道读端。
fn spawn_server(port: u16) -> (Arc<TcpConn>, tokio::sync::mpsc::Receiver<TcpConn>) {
    let server = Arc::new(TcpConn::from_endpoint(EndpointAddr::new("127.0.0.1", port)));
    let (conn_tx, conn_rx) = conn_channel();
    let acceptor = server.clone();
    tokio::spawn(async move { acceptor.accept(conn_tx).await });
    (server, conn_rx)
}

/// 规格场景：客户端向 127.0.0.1:9000 发送 16 字节，服务器在限定时间内
/// 原样收到同一块数据。
#[tokio::test(flavor = "multi_thread")]
async fn single_chunk_reaches_server_intact() -> Result<()> {
    let (server, mut conn_rx) = spawn_server(9000);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = TcpConn::from_endpoint(EndpointAddr::new("127.0.0.1", 9000));
    client.establish().await.context("client establish")?;
    let (tx, tx_rx) = byte_channel();
    client.start_transmit(tx_rx)?;

    let accepted = timeout(WAIT, conn_rx.recv())
        .await
        .context("accept timed out")?
        .context("accept channel closed")?;
    let (rx_tx, mut rx) = byte_channel();
    accepted.start_recv(rx_tx)?;

    let payload: Vec<u8> = (0x01..=0x10).collect();
    tx.send(Bytes::from(payload.clone())).await?;

    let received = timeout(WAIT, rx.recv())
        .await
        .context("receive timed out")?
        .context("receive channel closed")?;
    assert_eq!(received.as_ref(), payload.as_slice());

    client.close().await?;
    server.close().await?;
    Ok(())
}

/// 多块数据按发送顺序到达；块边界允许不同，拼接结果必须逐字节一致。
#[tokio::test(flavor = "multi_thread")]
async fn chunks_arrive_in_order() -> Result<()> {
    let (server, mut conn_rx) = spawn_server(19101);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = TcpConn::from_endpoint(EndpointAddr::new("127.0.0.1", 19101));
    client.establish().await?;
    let (tx, tx_rx) = byte_channel();
    client.start_transmit(tx_rx)?;

    let accepted = timeout(WAIT, conn_rx.recv()).await?.context("no connection")?;
    let (rx_tx, mut rx) = byte_channel();
    accepted.start_recv(rx_tx)?;

    let mut sent = Vec::new();
    for round in 0u8..8 {
        let chunk: Vec<u8> = (0..64).map(|i| round.wrapping_mul(31).wrapping_add(i)).collect();
        sent.extend_from_slice(&chunk);
        tx.send(Bytes::from(chunk)).await?;
    }

    let mut got = Vec::new();
    while got.len() < sent.len() {
        let chunk = timeout(WAIT, rx.recv())
            .await
            .context("receive timed out")?
            .context("receive channel closed early")?;
        got.extend_from_slice(&chunk);
    }
    assert_eq!(got, sent);

    client.close().await?;
    server.close().await?;
    Ok(())
}

/// 对无人监听的端点建连必须返回失败，且不残留任何句柄。
#[tokio::test(flavor = "multi_thread")]
async fn establish_against_dead_listener_fails_cleanly() -> Result<()> {
    let client = TcpConn::from_endpoint(EndpointAddr::new("127.0.0.1", 19102));
    let err = client.establish().await.expect_err("nothing listens here");
    assert!(err.to_string().contains("connect"), "unexpected error: {err}");

    // 失败的建连不得留下句柄：两个启动操作都应报句柄不可用。
    let (tx, _rx) = byte_channel();
    assert!(client.start_recv(tx).is_err());
    let (_tx2, rx2) = byte_channel();
    assert!(client.start_transmit(rx2).is_err());
    Ok(())
}

/// close 对部分建立与从未建立的连接都安全，且可重复调用。
#[tokio::test(flavor = "multi_thread")]
async fn close_is_idempotent() -> Result<()> {
    let never = TcpConn::from_endpoint(EndpointAddr::new("127.0.0.1", 19103));
    never.close().await?;
    never.close().await?;
    assert!(!never.meta().is_active());

    let (server, mut conn_rx) = spawn_server(19104);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let client = TcpConn::from_endpoint(EndpointAddr::new("127.0.0.1", 19104));
    client.establish().await?;
    let _accepted = timeout(WAIT, conn_rx.recv()).await?.context("no connection")?;
    client.close().await?;
    client.close().await?;
    server.close().await?;
    Ok(())
}

/// 客户端关闭后，服务器侧接收任务经由关闭信号终止，通道随之枯竭。
#[tokio::test(flavor = "multi_thread")]
async fn peer_close_drains_receive_channel() -> Result<()> {
    let (server, mut conn_rx) = spawn_server(19105);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = TcpConn::from_endpoint(EndpointAddr::new("127.0.0.1", 19105));
    client.establish().await?;
    let (tx, tx_rx) = byte_channel();
    client.start_transmit(tx_rx)?;

    let accepted = timeout(WAIT, conn_rx.recv()).await?.context("no connection")?;
    let (rx_tx, mut rx) = byte_channel();
    accepted.start_recv(rx_tx)?;

    tx.send(Bytes::from_static(b"bye")).await?;
    let first = timeout(WAIT, rx.recv()).await?.context("first chunk lost")?;
    assert_eq!(first.as_ref(), b"bye");

    client.close().await?;
    // 对端关闭后不再有数据：通道最终返回 None。
    let drained = timeout(WAIT, rx.recv()).await.context("drain timed out")?;
    assert!(drained.is_none(), "channel must close after peer close");

    server.close().await?;
    Ok(())
}
