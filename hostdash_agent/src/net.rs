//! Host network throughput from /proc/net/dev counter deltas.

use std::path::Path;
use std::sync::Mutex;

use tracing::debug;

use crate::types::{NetCounterSnapshot, NetInfo, NetTotals};

fn skip_iface(name: &str) -> bool {
    // loopback and container-side virtual links would double count host traffic
    name == "lo" || name.starts_with("docker") || name.starts_with("veth")
}

/// Sum rx/tx bytes over the physical-ish interfaces in a /proc/net/dev dump.
pub fn parse_net_dev(text: &str) -> NetTotals {
    let mut totals = NetTotals::default();
    for line in text.lines().skip(2) {
        let Some((iface, rest)) = line.split_once(':') else {
            continue;
        };
        let iface = iface.trim();
        if iface.is_empty() || skip_iface(iface) {
            continue;
        }
        // rest: rx_bytes rx_packets ... (8 rx fields) tx_bytes ...
        let mut fields = rest.split_whitespace();
        let rx = fields.next().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        let tx = fields.nth(7).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        totals.rx_bytes = totals.rx_bytes.saturating_add(rx);
        totals.tx_bytes = totals.tx_bytes.saturating_add(tx);
    }
    totals
}

/// Read and sum the counter file; unreadable means zero totals, not an error.
pub async fn read_net_totals(path: &Path) -> NetTotals {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => parse_net_dev(&s),
        Err(e) => {
            debug!("net counters unavailable at {}: {e}", path.display());
            NetTotals::default()
        }
    }
}

/// Holds the previous counter snapshot so consecutive samples yield a rate.
#[derive(Default)]
pub struct NetRateTracker {
    prev: Mutex<Option<NetCounterSnapshot>>,
}

impl NetRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute bytes/sec against the stored snapshot, then replace it.
    pub fn sample(&self, totals: NetTotals, now_ms: i64) -> NetInfo {
        let mut prev = self.prev.lock().unwrap_or_else(|p| p.into_inner());
        let (rx_bps, tx_bps) = match *prev {
            Some(p) => {
                let dt = (now_ms - p.ts_unix_ms) as f64 / 1000.0;
                if dt > 0.0 {
                    (
                        rate(totals.rx_bytes, p.rx_bytes, dt),
                        rate(totals.tx_bytes, p.tx_bytes, dt),
                    )
                } else {
                    (0, 0)
                }
            }
            None => (0, 0),
        };
        *prev = Some(NetCounterSnapshot {
            rx_bytes: totals.rx_bytes,
            tx_bytes: totals.tx_bytes,
            ts_unix_ms: now_ms,
        });
        NetInfo {
            rx_bytes: totals.rx_bytes,
            tx_bytes: totals.tx_bytes,
            rx_bps,
            tx_bps,
        }
    }
}

// counter resets (iface down/up) saturate to zero
fn rate(cur: u64, prev: u64, dt: f64) -> u64 {
    (cur.saturating_sub(prev) as f64 / dt).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 9000000    1000    0    0    0     0          0         0  9000000    1000    0    0    0     0       0          0
  eth0: 1000       10      0    0    0     0          0         0  400      4       0    0    0     0       0          0
docker0: 777       7       0    0    0     0          0         0  777      7       0    0    0     0       0          0
vethab12: 555      5       0    0    0     0          0         0  555      5       0    0    0     0       0          0
 wlan0:2000        20      0    0    0     0          0         0  100      1       0    0    0     0       0          0
";

    #[test]
    fn sums_non_virtual_interfaces() {
        let t = parse_net_dev(NET_DEV);
        assert_eq!(t.rx_bytes, 3000);
        assert_eq!(t.tx_bytes, 500);
    }

    #[test]
    fn garbage_counts_as_zero() {
        let text = "h1\nh2\n eth0: abc 1 2 3 4 5 6 7 xyz\nnot a line\n";
        assert_eq!(parse_net_dev(text), NetTotals::default());
    }

    #[test]
    fn rate_over_two_seconds() {
        let tracker = NetRateTracker::new();
        tracker.sample(
            NetTotals {
                rx_bytes: 1000,
                tx_bytes: 500,
            },
            10_000,
        );
        let info = tracker.sample(
            NetTotals {
                rx_bytes: 3000,
                tx_bytes: 1500,
            },
            12_000,
        );
        assert_eq!(info.rx_bps, 1000);
        assert_eq!(info.tx_bps, 500);
        assert_eq!(info.rx_bytes, 3000);
    }

    #[test]
    fn first_sample_reports_zero_rates() {
        let tracker = NetRateTracker::new();
        let info = tracker.sample(
            NetTotals {
                rx_bytes: 123_456,
                tx_bytes: 654_321,
            },
            5_000,
        );
        assert_eq!((info.rx_bps, info.tx_bps), (0, 0));
    }

    #[test]
    fn clock_going_backwards_reports_zero_and_still_overwrites() {
        let tracker = NetRateTracker::new();
        let t = |rx| NetTotals {
            rx_bytes: rx,
            tx_bytes: 0,
        };
        tracker.sample(t(100), 5_000);
        let back = tracker.sample(t(900), 4_000);
        assert_eq!(back.rx_bps, 0);
        // stored snapshot is now (900, 4000)
        let next = tracker.sample(t(1900), 5_000);
        assert_eq!(next.rx_bps, 1000);
    }

    #[test]
    fn counter_reset_saturates() {
        let tracker = NetRateTracker::new();
        let t = |rx| NetTotals {
            rx_bytes: rx,
            tx_bytes: 0,
        };
        tracker.sample(t(5000), 0);
        assert_eq!(tracker.sample(t(10), 1000).rx_bps, 0);
    }

    #[tokio::test]
    async fn missing_counter_file_yields_zero_totals() {
        let t = read_net_totals(Path::new("/nonexistent/hostdash/net/dev")).await;
        assert_eq!(t, NetTotals::default());
    }

    #[tokio::test]
    async fn reads_counter_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("dev");
        std::fs::write(&p, NET_DEV).unwrap();
        assert_eq!(read_net_totals(&p).await.rx_bytes, 3000);
    }
}
