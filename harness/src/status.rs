//! Single overwritten console status line

use crate::bench::BenchSnapshot;
use crate::churn::ChurnSnapshot;
use crate::scheduler::Ticker;
use std::io::{self, Write};
use std::time::Duration;

/// Carriage return + "erase to end of line"
const CLEAR_LINE: &str = "\r\x1b[K";

pub fn churn_status_line(snapshot: &ChurnSnapshot) -> String {
    let accepting = match snapshot.accepting_connections {
        Some(true) => "true",
        Some(false) => "false",
        None => "unknown",
    };
    format!(
        "Connections dropped: {}, accepting connections: {}, failed: {}, in flight: {}",
        snapshot.dropped, accepting, snapshot.failed, snapshot.in_flight
    )
}

pub fn bench_status_line(snapshot: &BenchSnapshot) -> String {
    let ms = |value: Option<u64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
    format!(
        "Connected: {}, connection time: {} ms, total broadcast time: {} ms",
        snapshot.connected,
        ms(snapshot.connection_time_ms),
        ms(snapshot.broadcast_time_ms)
    )
}

/// Writer that keeps redrawing one terminal line
pub struct StatusLine<W: Write> {
    out: W,
}

impl StatusLine<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StatusLine<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Replace the current line with `line`
    pub fn redraw(&mut self, line: &str) -> io::Result<()> {
        write!(self.out, "{CLEAR_LINE}{line}")?;
        self.out.flush()
    }

    /// Leave the last status on screen and move to a fresh line
    pub fn finish(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Redraw the status line from `render` every `interval`, forever.
///
/// Write errors (closed stdout) are ignored; reporting is a side effect only.
pub async fn report_forever<W, F>(status: &mut StatusLine<W>, interval: Duration, render: F)
where
    W: Write,
    F: Fn() -> String,
{
    let mut ticker = Ticker::new(interval);
    loop {
        ticker.tick().await;
        let _ = status.redraw(&render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::BenchmarkPhase;

    fn churn(accepting: Option<bool>) -> ChurnSnapshot {
        ChurnSnapshot {
            dropped: 42,
            drop_goal: 100,
            failed: 3,
            in_flight: 1,
            attempts: 46,
            accepting_connections: accepting,
        }
    }

    #[test]
    fn test_churn_status_line() {
        assert_eq!(
            churn_status_line(&churn(Some(true))),
            "Connections dropped: 42, accepting connections: true, failed: 3, in flight: 1"
        );
        assert!(churn_status_line(&churn(Some(false))).contains("accepting connections: false"));
        assert!(churn_status_line(&churn(None)).contains("accepting connections: unknown"));
    }

    #[test]
    fn test_bench_status_line_unset_timers() {
        let snapshot = BenchSnapshot {
            phase: BenchmarkPhase::Connecting,
            pool_size: 5,
            connected: 2,
            failed: 0,
            messages: 0,
            cycle: 0,
            cycles_completed: 0,
            connection_time_ms: None,
            broadcast_time_ms: None,
        };
        assert_eq!(
            bench_status_line(&snapshot),
            "Connected: 2, connection time: - ms, total broadcast time: - ms"
        );
    }

    #[test]
    fn test_bench_status_line_with_timers() {
        let snapshot = BenchSnapshot {
            phase: BenchmarkPhase::Waiting,
            pool_size: 3,
            connected: 3,
            failed: 0,
            messages: 1,
            cycle: 4,
            cycles_completed: 3,
            connection_time_ms: Some(120),
            broadcast_time_ms: Some(9),
        };
        assert_eq!(
            bench_status_line(&snapshot),
            "Connected: 3, connection time: 120 ms, total broadcast time: 9 ms"
        );
    }

    #[test]
    fn test_redraw_overwrites_line() {
        let mut status = StatusLine::new(Vec::new());
        status.redraw("first").unwrap();
        status.redraw("second").unwrap();
        status.finish().unwrap();
        let written = String::from_utf8(status.into_inner()).unwrap();
        assert_eq!(written, "\r\x1b[Kfirst\r\x1b[Ksecond\n");
    }
}
