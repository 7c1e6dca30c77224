use std::collections::VecDeque;

use bytes::Bytes;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use weave_core::{ByteSink, ByteSource, Cancellation, time};

/// 探测包定长 16 字节：小端 u64 发出时刻（纳秒）加小端 u64 序号。
pub const PROBE_LEN: usize = 16;

/// 编码一个探测包。
pub fn encode_probe(index: u64, sent_at_nanos: i64) -> Bytes {
    let mut buf = [0u8; PROBE_LEN];
    buf[..8].copy_from_slice(&(sent_at_nanos as u64).to_le_bytes());
    buf[8..].copy_from_slice(&index.to_le_bytes());
    Bytes::copy_from_slice(&buf)
}

/// 解码探测包，返回（发出时刻纳秒，序号）；长度不足时拒绝。
pub fn decode_probe(chunk: &[u8]) -> Option<(i64, u64)> {
    if chunk.len() < PROBE_LEN {
        return None;
    }
    let sent = u64::from_le_bytes(chunk[..8].try_into().ok()?) as i64;
    let index = u64::from_le_bytes(chunk[8..PROBE_LEN].try_into().ok()?);
    Some((sent, index))
}

/// 最近若干次延迟样本的滑动窗口。
pub struct LatencyWindow {
    samples: VecDeque<i64>,
    cap: usize,
}

impl LatencyWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    /// 纳入一个样本并返回当前窗口均值。
    pub fn push(&mut self, sample: i64) -> i64 {
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.average()
    }

    pub fn average(&self) -> i64 {
        if self.samples.is_empty() {
            return 0;
        }
        let sum: i64 = self.samples.iter().sum();
        sum / self.samples.len() as i64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// 服务器侧回显驱动：把收到的每一块原样送回发送通道。
pub async fn echo_chunks(mut rx: ByteSource, tx: ByteSink, stop: Cancellation) {
    loop {
        let chunk = tokio::select! {
            _ = stop.cancelled() => break,
            chunk = rx.recv() => chunk,
        };
        let Some(chunk) = chunk else { break };
        if tx.send(chunk).await.is_err() {
            break;
        }
    }
}

/// 客户端侧探测驱动：按给定速率发出带时间戳与序号的探测包。
pub async fn emit_probes(tx: ByteSink, rate: u32, stop: Cancellation) {
    let period = std::time::Duration::from_secs(1) / rate.max(1);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut index = 0u64;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        index += 1;
        if tx
            .send(encode_probe(index, time::epoch_nanos()))
            .await
            .is_err()
        {
            break;
        }
    }
}

/// 客户端侧回读驱动：解码回显、统计延迟滑动均值并记录。
pub async fn consume_echoes(mut rx: ByteSource, stop: Cancellation) {
    let mut window = LatencyWindow::new(100);
    loop {
        let chunk = tokio::select! {
            _ = stop.cancelled() => break,
            chunk = rx.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            info!("echo channel closed");
            break;
        };
        match decode_probe(&chunk) {
            Some((sent, index)) => {
                let latency = time::epoch_nanos() - sent;
                let average = window.push(latency);
                info!(index, latency, average, "pingpong echo");
            }
            None => warn!(len = chunk.len(), "short echo chunk ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_codec_round_trip() {
        let chunk = encode_probe(42, 1_234_567_890);
        assert_eq!(chunk.len(), PROBE_LEN);
        let (sent, index) = decode_probe(&chunk).expect("well-formed probe");
        assert_eq!(sent, 1_234_567_890);
        assert_eq!(index, 42);
    }

    #[test]
    fn short_chunks_are_rejected() {
        assert!(decode_probe(b"too short").is_none());
        assert!(decode_probe(&[]).is_none());
    }

    #[test]
    fn window_keeps_at_most_cap_samples() {
        let mut window = LatencyWindow::new(100);
        for _ in 0..150 {
            window.push(10);
        }
        assert_eq!(window.len(), 100);
        assert_eq!(window.average(), 10);

        // 新样本把旧样本挤出窗口，均值随之移动。
        for _ in 0..100 {
            window.push(30);
        }
        assert_eq!(window.average(), 30);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn echo_forwards_until_cancelled() {
        let (in_tx, in_rx) = weave_core::byte_channel();
        let (out_tx, mut out_rx) = weave_core::byte_channel();
        let stop = Cancellation::new();
        let task = tokio::spawn(echo_chunks(in_rx, out_tx, stop.clone()));

        in_tx.send(Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), Bytes::from_static(b"abc"));

        stop.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("echo must stop after cancel")
            .expect("echo task must not panic");
    }
}
