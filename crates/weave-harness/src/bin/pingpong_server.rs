//! pingpong 回显服务器：按配置选择传输，回显每个客户端的探测包，
//! 空闲连接由看门狗回收，收到中断信号时关闭顶层连接退出。

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use weave_core::{Connection, byte_channel, conn_channel};
use weave_harness::config::{HarnessConfig, TransportKind};
use weave_harness::pingpong;
use weave_harness::watchdog::{IdleWatchdog, WatchdogConfig};
use weave_transport_quic::QuicConn;
use weave_transport_tcp::TcpConn;
use weave_transport_udp::UdpConn;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = HarnessConfig::from_args(std::env::args().skip(1)).context("load configuration")?;
    match cfg.transport {
        TransportKind::Tcp => serve::<TcpConn>(cfg).await,
        TransportKind::Udp => serve::<UdpConn>(cfg).await,
        TransportKind::Quic => serve::<QuicConn>(cfg).await,
    }
}

async fn serve<C: Connection>(cfg: HarnessConfig) -> Result<()> {
    let server = Arc::new(C::from_endpoint(cfg.endpoint()));
    let (conn_tx, mut conn_rx) = conn_channel();
    let acceptor = server.clone();
    let accept_task = tokio::spawn(async move { acceptor.accept(conn_tx).await });

    let watchdog = IdleWatchdog::spawn(WatchdogConfig {
        idle_threshold: cfg.idle_threshold(),
        poll_interval: cfg.poll_interval(),
    });
    info!(endpoint = %server.meta().endpoint(), "pingpong server running");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, closing");
                if let Err(err) = server.close().await {
                    warn!(error = %err, "server close failed");
                }
                break;
            }
            published = conn_rx.recv() => {
                let Some(conn) = published else {
                    warn!("accept loop ended, shutting down");
                    break;
                };
                let (rx_tx, rx) = byte_channel();
                let (tx, tx_rx) = byte_channel();
                conn.start_recv(rx_tx)?;
                conn.start_transmit(tx_rx)?;
                let stop = conn.meta().stop().clone();
                tokio::spawn(pingpong::echo_chunks(rx, tx, stop));
                watchdog.adopt(conn).await;
            }
        }
    }

    accept_task.abort();
    Ok(())
}
