//! Process-wide time utilities: monotonic ticks, wall clock, ISO-8601
//! formatting for the statistics log, NTP timestamps for RTCP and the
//! timescale converter used by tracks and the segment packetizer.

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_EPOCH_DIFF: u64 = 2_208_988_800;

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic milliseconds since process start. Never goes backwards.
pub fn tick_ms() -> u64 {
    process_epoch().elapsed().as_millis() as u64
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Wall-clock seconds since the Unix epoch.
pub fn wall_clock_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

/// Current time as a 64-bit NTP timestamp (seconds since 1900) split into
/// the most- and least-significant 32-bit words.
pub fn ntp_now() -> (u32, u32) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0));
    ntp_from_unix(now)
}

/// Convert a duration since the Unix epoch into NTP (msw, lsw).
pub fn ntp_from_unix(since_unix: Duration) -> (u32, u32) {
    let secs = since_unix.as_secs() + NTP_UNIX_EPOCH_DIFF;
    let frac = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000u64;
    (secs as u32, frac as u32)
}

/// `YYYY-MM-DDTHH:MM:SSZ`, second precision.
pub fn now_iso8601() -> String {
    let ms = wall_clock_ms();
    let tm = civil_from_unix(ms / 1000);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        tm.year, tm.mon, tm.day, tm.hour, tm.min, tm.sec
    )
}

/// `YYYY-MM-DDTHH:MM:SS.sssZ`, millisecond precision.
pub fn now_iso8601_ms() -> String {
    let ms = wall_clock_ms();
    let tm = civil_from_unix(ms / 1000);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        tm.year,
        tm.mon,
        tm.day,
        tm.hour,
        tm.min,
        tm.sec,
        ms % 1000
    )
}

/// Rescale `value` counted at `from_rate` units/s to `to_rate` units/s.
///
/// Returns 0 when `from_rate` is 0 so callers never divide by a dead
/// timebase. Monotonic in `value` for fixed rates.
pub fn convert_timescale(value: u64, from_rate: u32, to_rate: u32) -> u64 {
    if from_rate == 0 {
        return 0;
    }
    ((value as u128 * to_rate as u128) / from_rate as u128) as u64
}

#[derive(Clone, Copy, Debug)]
struct CivilTime {
    year: i64,
    mon: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
}

/// Civil-from-days conversion (Gregorian, no leap seconds).
fn civil_from_unix(mut s: u64) -> CivilTime {
    let sec = (s % 60) as u32;
    s /= 60;
    let min = (s % 60) as u32;
    s /= 60;
    let hour = (s % 24) as u32;
    s /= 24;

    let z: i64 = s as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let mon = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = y + i64::from(mon <= 2);

    CivilTime {
        year,
        mon,
        day,
        hour,
        min,
        sec,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn tick_ms_is_monotonic() {
        let a = tick_ms();
        let b = tick_ms();
        assert!(b >= a);
    }

    #[test]
    fn ntp_epoch_offset_applied() {
        let (msw, _lsw) = ntp_from_unix(Duration::from_secs(0));
        assert_eq!(msw, 2_208_988_800u32);
    }

    #[test]
    fn ntp_fraction_is_half_for_500ms() {
        let (_msw, lsw) = ntp_from_unix(Duration::from_millis(500));
        // 0.5 s == 2^31 in Q32 fixed point, allow rounding slack
        let half = 1u64 << 31;
        assert!((lsw as i64 - half as i64).abs() < 16);
    }

    #[test]
    fn convert_timescale_zero_source_rate() {
        assert_eq!(convert_timescale(1234, 0, 90_000), 0);
    }

    #[test]
    fn convert_timescale_rescales() {
        // 90 kHz -> 1 kHz: 90_000 ticks == 1000 ms
        assert_eq!(convert_timescale(90_000, 90_000, 1_000), 1_000);
        // audio 48 kHz -> 90 kHz video clock
        assert_eq!(convert_timescale(48_000, 48_000, 90_000), 90_000);
    }

    #[test]
    fn convert_timescale_is_monotonic() {
        let mut last = 0;
        for value in [0u64, 1, 90, 4_500, 90_000, 1_000_000] {
            let out = convert_timescale(value, 90_000, 1_000);
            assert!(out >= last);
            last = out;
        }
    }

    #[test]
    fn civil_conversion_known_dates() {
        // 2021-01-01T00:00:00Z
        let tm = civil_from_unix(1_609_459_200);
        assert_eq!(
            (tm.year, tm.mon, tm.day, tm.hour, tm.min, tm.sec),
            (2021, 1, 1, 0, 0, 0)
        );
        // 2020-02-29T12:30:45Z (leap day)
        let tm = civil_from_unix(1_582_979_445);
        assert_eq!(
            (tm.year, tm.mon, tm.day, tm.hour, tm.min, tm.sec),
            (2020, 2, 29, 12, 30, 45)
        );
    }

    #[test]
    fn iso8601_shapes() {
        let s = now_iso8601();
        assert_eq!(s.len(), 20);
        assert!(s.ends_with('Z'));
        let ms = now_iso8601_ms();
        assert_eq!(ms.len(), 24);
        assert_eq!(&ms[19..20], ".");
    }
}
