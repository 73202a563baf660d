//! 网络延迟探测
//!
//! 定期发送 ping，收到 pong 时计算往返时间。pong 没有回来时旧值保持不变。

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// 延迟等级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

impl LatencyQuality {
    pub fn from_latency(latency: Duration) -> Self {
        match latency.as_millis() {
            0..=99 => LatencyQuality::Excellent,
            100..=199 => LatencyQuality::Good,
            200..=299 => LatencyQuality::Fair,
            300..=399 => LatencyQuality::Poor,
            _ => LatencyQuality::Bad,
        }
    }
}

impl fmt::Display for LatencyQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LatencyQuality::Excellent => "excellent",
            LatencyQuality::Good => "good",
            LatencyQuality::Fair => "fair",
            LatencyQuality::Poor => "poor",
            LatencyQuality::Bad => "bad",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LatencyProber {
    /// 尚未收到回应的 ping 发送时间
    sent_at: Option<Instant>,
    latency: Option<Duration>,
}

impl LatencyProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录 ping 发送时间（覆盖未回应的上一次）
    pub fn on_ping_sent(&mut self, now: Instant) {
        self.sent_at = Some(now);
    }

    /// 收到 pong，返回新的往返时间；没有待回应的 ping 时忽略
    pub fn on_pong(&mut self, now: Instant) -> Option<Duration> {
        let sent_at = self.sent_at.take()?;
        let rtt = now.saturating_duration_since(sent_at);
        self.latency = Some(rtt);
        Some(rtt)
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn quality(&self) -> Option<LatencyQuality> {
        self.latency.map(LatencyQuality::from_latency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let t0 = Instant::now();
        let mut prober = LatencyProber::new();
        assert!(prober.latency().is_none());

        prober.on_ping_sent(t0);
        let rtt = prober.on_pong(t0 + Duration::from_millis(120)).unwrap();
        assert_eq!(rtt, Duration::from_millis(120));
        assert_eq!(prober.quality(), Some(LatencyQuality::Good));
    }

    #[test]
    fn test_unsolicited_pong_ignored() {
        let t0 = Instant::now();
        let mut prober = LatencyProber::new();
        assert!(prober.on_pong(t0).is_none());

        prober.on_ping_sent(t0);
        prober.on_pong(t0 + Duration::from_millis(40));
        // 重复的 pong 不会改写已有结果
        assert!(prober.on_pong(t0 + Duration::from_secs(3)).is_none());
        assert_eq!(prober.latency(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_quality_buckets() {
        let q = |ms| LatencyQuality::from_latency(Duration::from_millis(ms));
        assert_eq!(q(99), LatencyQuality::Excellent);
        assert_eq!(q(100), LatencyQuality::Good);
        assert_eq!(q(250), LatencyQuality::Fair);
        assert_eq!(q(399), LatencyQuality::Poor);
        assert_eq!(q(400), LatencyQuality::Bad);
    }
}
