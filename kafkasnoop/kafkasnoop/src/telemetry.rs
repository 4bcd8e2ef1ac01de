use std::time::Duration;

use aya::maps::{MapData, PerCpuArray};
use log::{info, warn};
use papaya_pktbuf::{LoadTelemetry, Source, SOURCE_COUNT};

/// Folds the per-CPU counters of one source into a single value.
pub fn sum(per_cpu: &[LoadTelemetry]) -> LoadTelemetry {
    per_cpu.iter().fold(LoadTelemetry::default(), |mut acc, v| {
        acc.merge(v);
        acc
    })
}

/// Keeps the last totals seen so each report only shows new activity.
#[derive(Default)]
pub struct TelemetryDelta {
    last: [LoadTelemetry; SOURCE_COUNT],
}

impl TelemetryDelta {
    pub fn update(&mut self, source: Source, total: LoadTelemetry) -> LoadTelemetry {
        let slot = &mut self.last[source.index() as usize];
        let delta = total.since(slot);
        *slot = total;
        delta
    }
}

pub fn format_delta(source: Source, delta: &LoadTelemetry) -> String {
    format!(
        "{}: {} loads, {} short, {} failed, {} bytes missing",
        source.name(),
        delta.calls,
        delta.short_reads,
        delta.failures,
        delta.missing_bytes
    )
}

/// Logs load counter increases every `period` until the task is dropped.
pub async fn report_telemetry(map: PerCpuArray<MapData, LoadTelemetry>, period: Duration) {
    let mut deltas = TelemetryDelta::default();
    let mut interval = tokio::time::interval(period);
    // first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        for source in Source::ALL {
            let values = match map.get(&source.index(), 0) {
                Ok(values) => values,
                Err(e) => {
                    warn!("failed to read load telemetry for {}: {e}", source.name());
                    continue;
                }
            };
            let delta = deltas.update(source, sum(&values));
            if delta.calls > 0 {
                info!("{}", format_delta(source, &delta));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(calls: u64, short_reads: u64, failures: u64, missing_bytes: u64) -> LoadTelemetry {
        LoadTelemetry {
            calls,
            short_reads,
            failures,
            missing_bytes,
        }
    }

    #[test]
    fn sums_per_cpu_values() {
        let total = sum(&[counters(3, 1, 0, 4), counters(5, 0, 2, 16), counters(0, 0, 0, 0)]);
        assert_eq!(total, counters(8, 1, 2, 20));
        assert_eq!(sum(&[]), LoadTelemetry::default());
    }

    #[test]
    fn deltas_are_tracked_per_source() {
        let mut deltas = TelemetryDelta::default();

        assert_eq!(deltas.update(Source::SkMsg, counters(4, 1, 0, 3)), counters(4, 1, 0, 3));
        assert_eq!(deltas.update(Source::SkMsg, counters(10, 1, 1, 11)), counters(6, 0, 1, 8));
        // other sources start from zero
        assert_eq!(deltas.update(Source::Skb, counters(2, 0, 0, 0)), counters(2, 0, 0, 0));
        assert_eq!(deltas.update(Source::SkMsg, counters(10, 1, 1, 11)), LoadTelemetry::default());
    }

    #[test]
    fn formats_delta() {
        assert_eq!(
            format_delta(Source::Tls, &counters(7, 2, 1, 9)),
            "tls: 7 loads, 2 short, 1 failed, 9 bytes missing"
        );
    }
}
