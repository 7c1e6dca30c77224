//! UDP 分路行为测试：一只根套接字上的多客户端合成连接、回环收发与
//! 条目关闭后的再发布。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use weave_core::{Connection, EndpointAddr, byte_channel, conn_channel};
use weave_transport_udp::UdpConn;

const WAIT: Duration = Duration::from_secs(5);

fn spawn_server(port: u16) -> (Arc<UdpConn>, tokio::sync::mpsc::Receiver<UdpConn>) {
    let server = Arc::new(UdpConn::from_endpoint(EndpointAddr::bind_all(port)));
    let (conn_tx, conn_rx) = conn_channel();
    let acceptor = server.clone();
    tokio::spawn(async move { acceptor.accept(conn_tx).await });
    (server, conn_rx)
}

/// 规格场景：三个不同远端各发一包到 9100 端口，服务器恰好发布三个
/// 连接值，记录的远端地址两两不同。
#[tokio::test(flavor = "multi_thread")]
async fn three_clients_yield_three_connections() -> Result<()> {
    let (server, mut conn_rx) = spawn_server(9100);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut senders = Vec::new();
    for _ in 0..3 {
        let sock = UdpSocket::bind("127.0.0.1:0").await?;
        sock.send_to(b"hello", "127.0.0.1:9100").await?;
        senders.push(sock);
    }

    let mut endpoints = Vec::new();
    for _ in 0..3 {
        let conn = timeout(WAIT, conn_rx.recv())
            .await
            .context("new-connection channel stalled")?
            .context("new-connection channel closed")?;
        endpoints.push(conn.meta().endpoint().clone());
    }
    endpoints.sort_by_key(|ep| ep.port());
    endpoints.dedup();
    assert_eq!(endpoints.len(), 3, "each sender maps to exactly one entry");

    // 同一批远端继续发包不得再发布新连接。
    for sock in &senders {
        sock.send_to(b"again", "127.0.0.1:9100").await?;
    }
    let extra = timeout(Duration::from_millis(300), conn_rx.recv()).await;
    assert!(extra.is_err(), "known senders must not be republished");

    server.close().await?;
    Ok(())
}

/// 完整回环：条目建立的首包按设计丢弃，安装通道后的往返逐字节一致。
#[tokio::test(flavor = "multi_thread")]
async fn round_trip_through_client_entry() -> Result<()> {
    let (server, mut conn_rx) = spawn_server(19201);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = UdpConn::from_endpoint(EndpointAddr::new("127.0.0.1", 19201));
    client.establish().await.context("client establish")?;
    let (client_rx_tx, mut client_rx) = byte_channel();
    client.start_recv(client_rx_tx)?;
    let (client_tx, client_tx_rx) = byte_channel();
    client.start_transmit(client_tx_rx)?;

    // 首包只负责让服务器建立条目。
    client_tx.send(Bytes::from_static(b"knock")).await?;
    let entry = timeout(WAIT, conn_rx.recv())
        .await
        .context("entry not published")?
        .context("new-connection channel closed")?;

    let (entry_rx_tx, mut entry_rx) = byte_channel();
    entry.start_recv(entry_rx_tx)?;
    let (entry_tx, entry_tx_rx) = byte_channel();
    entry.start_transmit(entry_tx_rx)?;

    client_tx.send(Bytes::from_static(b"ping")).await?;
    let ping = timeout(WAIT, entry_rx.recv())
        .await
        .context("entry receive stalled")?
        .context("entry receive channel closed")?;
    assert_eq!(ping.as_ref(), b"ping");

    entry_tx.send(Bytes::from_static(b"pong")).await?;
    let pong = timeout(WAIT, client_rx.recv())
        .await
        .context("client receive stalled")?
        .context("client receive channel closed")?;
    assert_eq!(pong.as_ref(), b"pong");

    client.close().await?;
    entry.close().await?;
    server.close().await?;
    Ok(())
}

/// 条目 close 将其移出注册表；同一远端的下一包触发再次发布。
#[tokio::test(flavor = "multi_thread")]
async fn closed_entry_is_republished_on_next_datagram() -> Result<()> {
    let (server, mut conn_rx) = spawn_server(19202);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.send_to(b"first", "127.0.0.1:19202").await?;
    let entry = timeout(WAIT, conn_rx.recv()).await?.context("no entry")?;
    let first_endpoint = entry.meta().endpoint().clone();

    entry.close().await?;
    assert!(!entry.meta().is_active());

    sock.send_to(b"second", "127.0.0.1:19202").await?;
    let republished = timeout(WAIT, conn_rx.recv())
        .await
        .context("entry was not republished")?
        .context("new-connection channel closed")?;
    assert_eq!(republished.meta().endpoint(), &first_endpoint);

    server.close().await?;
    Ok(())
}

/// 角色约束：按客户端条目不承担客户端操作，未建连的套接字不可启动任务。
#[tokio::test(flavor = "multi_thread")]
async fn role_and_handle_guards() -> Result<()> {
    let (server, mut conn_rx) = spawn_server(19203);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    sock.send_to(b"knock", "127.0.0.1:19203").await?;
    let entry = timeout(WAIT, conn_rx.recv()).await?.context("no entry")?;
    let err = entry.establish().await.expect_err("entries are server-side");
    assert!(err.to_string().contains("role"), "unexpected error: {err}");

    let idle = UdpConn::from_endpoint(EndpointAddr::new("127.0.0.1", 19204));
    let (tx, _rx) = byte_channel();
    assert!(idle.start_recv(tx).is_err(), "no socket before establish");

    server.close().await?;
    Ok(())
}
