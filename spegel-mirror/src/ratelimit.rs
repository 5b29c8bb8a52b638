use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A byte rate, stored as bytes/second so the token bucket never has to re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRate(u64);

impl ByteRate {
    pub fn bytes_per_sec(self) -> u64 {
        self.0
    }
}

/// Parses `"<N> <unit>"` where unit is one of `Bps`, `KBps`, `MBps`, `GBps`, `TBps` (binary
/// multiples, matching how `hosts.toml` authors usually mean "KB"). Whitespace between the
/// number and unit is optional. Fractional values and unknown units are rejected.
pub fn parse_byte_rate(input: &str) -> Option<ByteRate> {
    let input = input.trim();
    let split_at = input.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = input.split_at(split_at);
    if digits.is_empty() {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    let unit = unit.trim();
    let multiplier: u64 = match unit {
        "Bps" => 1,
        "KBps" => 1024,
        "MBps" => 1024 * 1024,
        "GBps" => 1024 * 1024 * 1024,
        "TBps" => 1024 * 1024 * 1024 * 1024,
        _ => return None,
    };
    Some(ByteRate(value.checked_mul(multiplier)?))
}

/// Formats a rate using the largest unit that divides it evenly, falling back to `Bps`. This is
/// the inverse of [`parse_byte_rate`] only for values it actually produced; arbitrary byte counts
/// that don't divide evenly always render in `Bps`.
pub fn format_byte_rate(rate: ByteRate) -> String {
    const UNITS: &[(u64, &str)] = &[
        (1024 * 1024 * 1024 * 1024, "TBps"),
        (1024 * 1024 * 1024, "GBps"),
        (1024 * 1024, "MBps"),
        (1024, "KBps"),
    ];
    for (scale, suffix) in UNITS {
        if rate.0 % scale == 0 {
            return format!("{}{}", rate.0 / scale, suffix);
        }
    }
    format!("{}Bps", rate.0)
}

/// Writes `data` to `sink` in chunks sized so the wall-clock time to drain `data` at `rate` is
/// respected, allowing an initial burst of up to `burst` bytes to go through immediately. Used to
/// throttle peer-to-peer proxy traffic without adding a dependency purely for token-bucket math.
pub struct TokenBucketWriter<W> {
    sink: W,
    rate: ByteRate,
    burst: u64,
    available: u64,
}

impl<W: AsyncWrite + Unpin> TokenBucketWriter<W> {
    pub fn new(sink: W, rate: ByteRate, burst: u64) -> Self {
        TokenBucketWriter {
            sink,
            rate,
            burst,
            available: burst,
        }
    }

    pub async fn write_all(&mut self, mut data: &[u8]) -> std::io::Result<()> {
        if self.rate.bytes_per_sec() == 0 {
            return self.sink.write_all(data).await;
        }

        while !data.is_empty() {
            if self.available == 0 {
                let refill_ms = (1000 / self.rate.bytes_per_sec().max(1)).max(1);
                tokio::time::sleep(Duration::from_millis(refill_ms)).await;
                self.available = (self.rate.bytes_per_sec() / 1000).max(1);
            }
            let take = self.available.min(data.len() as u64) as usize;
            let take = take.max(1).min(data.len());
            self.sink.write_all(&data[..take]).await?;
            self.available = self.available.saturating_sub(take as u64);
            data = &data[take..];
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_strings() {
        for s in ["1Bps", "2KBps", "3MBps", "4GBps", "5TBps"] {
            let rate = parse_byte_rate(s).unwrap();
            assert_eq!(format_byte_rate(rate), s);
        }
    }

    #[test]
    fn accepts_whitespace_between_number_and_unit() {
        let rate = parse_byte_rate("10 MBps").unwrap();
        assert_eq!(rate.bytes_per_sec(), 10 * 1024 * 1024);
    }

    #[test]
    fn rejects_unknown_units_and_fractional_values() {
        assert!(parse_byte_rate("10Mbps").is_none());
        assert!(parse_byte_rate("1.5MBps").is_none());
        assert!(parse_byte_rate("MBps").is_none());
        assert!(parse_byte_rate("").is_none());
    }

    #[tokio::test]
    async fn token_bucket_delivers_all_bytes_and_stays_fast_above_burst() {
        let mut buf = Vec::new();
        let rate = parse_byte_rate("100KBps").unwrap();
        let mut writer = TokenBucketWriter::new(&mut buf, rate, 1000);
        let start = std::time::Instant::now();
        writer.write_all(&[0u8; 1000]).await.unwrap();
        writer.flush().await.unwrap();
        // entire payload fits inside the burst allowance, so this should not block at all.
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(buf.len(), 1000);
    }
}
