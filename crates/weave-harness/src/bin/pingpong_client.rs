//! pingpong 探测客户端：按配置的速率发出探测包，统计回显延迟，
//! 收到中断信号时关闭连接退出。

use anyhow::{Context, Result};
use tracing::info;
use weave_core::{Connection, byte_channel};
use weave_harness::config::{HarnessConfig, TransportKind};
use weave_harness::pingpong;
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
        TransportKind::Tcp => probe::<TcpConn>(cfg).await,
        TransportKind::Udp => probe::<UdpConn>(cfg).await,
        TransportKind::Quic => probe::<QuicConn>(cfg).await,
    }
}

async fn probe<C: Connection>(cfg: HarnessConfig) -> Result<()> {
    let client = C::from_endpoint(cfg.endpoint());
    info!(endpoint = %client.meta().endpoint(), "connecting");
    client.establish().await.context("establish failed")?;
    info!(rate = cfg.rate, "connected, starting pingpong");

    let (rx_tx, rx) = byte_channel();
    client.start_recv(rx_tx)?;
    let (tx, tx_rx) = byte_channel();
    client.start_transmit(tx_rx)?;

    let stop = client.meta().stop().clone();
    tokio::spawn(pingpong::emit_probes(tx, cfg.rate, stop.clone()));
    let reader = tokio::spawn(pingpong::consume_echoes(rx, stop));

    tokio::signal::ctrl_c().await.context("wait for interrupt")?;
    info!("interrupt received, closing");
    client.close().await?;
    let _ = reader.await;
    Ok(())
}
