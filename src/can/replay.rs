//! candump log replay
//!
//! Feeds a captured bus log through the bridge as if it came from the
//! transceiver. Two line shapes are accepted:
//!
//! ```text
//! (1700000000.123456) can0 267#00000001C001   # candump -L
//! 264#0000005E800000                          # bare frame
//! ```
//!
//! When timestamps are present the recorded inter-frame gaps are reproduced,
//! so the handshake timers see realistic timing.

use super::{BusEvent, RawFrame, MAX_EXTENDED_ID, MAX_STANDARD_ID};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Longest gap reproduced between two replayed frames
const MAX_REPLAY_GAP: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unsupported frame: {0}")]
    Unsupported(String),

    #[error("Bus channel closed")]
    ChannelClosed,
}

/// One parsed log line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: Option<Duration>,
    pub frame: RawFrame,
}

/// Parse a single log line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<LogEntry>, ReplayError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut timestamp = None;
    let mut frame_token = None;
    for token in line.split_whitespace() {
        if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            timestamp = Some(parse_timestamp(inner)?);
        } else if token.contains('#') {
            frame_token = Some(token);
            break;
        }
        // anything else is the interface name
    }

    let token =
        frame_token.ok_or_else(|| ReplayError::Malformed(format!("no frame in '{}'", line)))?;
    let frame = parse_frame(token)?;
    Ok(Some(LogEntry { timestamp, frame }))
}

/// Parse `ID#DATA` in candump notation.
pub fn parse_frame(token: &str) -> Result<RawFrame, ReplayError> {
    let (id_text, data_text) = token
        .split_once('#')
        .ok_or_else(|| ReplayError::Malformed(format!("missing '#' in '{}'", token)))?;

    if data_text.starts_with('#') {
        return Err(ReplayError::Unsupported(format!("CAN FD frame '{}'", token)));
    }
    if data_text.starts_with('R') || data_text.starts_with('r') {
        return Err(ReplayError::Unsupported(format!("remote frame '{}'", token)));
    }

    let extended = match id_text.len() {
        3 => false,
        8 => true,
        _ => {
            return Err(ReplayError::Malformed(format!(
                "identifier '{}' must have 3 or 8 hex digits",
                id_text
            )))
        }
    };
    let id = u32::from_str_radix(id_text, 16)
        .map_err(|e| ReplayError::Malformed(format!("identifier '{}': {}", id_text, e)))?;
    let limit = if extended {
        MAX_EXTENDED_ID
    } else {
        MAX_STANDARD_ID
    };
    if id > limit {
        return Err(ReplayError::Malformed(format!(
            "identifier {:#X} out of range",
            id
        )));
    }

    let hex: String = data_text.chars().filter(|c| *c != '.').collect();
    if !hex.is_ascii() || hex.len() % 2 != 0 || hex.len() > 16 {
        return Err(ReplayError::Malformed(format!(
            "payload '{}' is not 0-8 whole bytes",
            data_text
        )));
    }
    let mut payload = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        let byte = u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|e| ReplayError::Malformed(format!("payload '{}': {}", data_text, e)))?;
        payload.push(byte);
    }

    Ok(if extended {
        RawFrame::extended(id, &payload)
    } else {
        RawFrame::new(id, &payload)
    })
}

fn parse_timestamp(text: &str) -> Result<Duration, ReplayError> {
    let (secs, frac) = text.split_once('.').unwrap_or((text, ""));
    let secs: u64 = secs
        .parse()
        .map_err(|e| ReplayError::Malformed(format!("timestamp '{}': {}", text, e)))?;
    if frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReplayError::Malformed(format!("timestamp '{}'", text)));
    }
    let nanos = if frac.is_empty() {
        0
    } else {
        // right-pad to nanosecond precision
        format!("{:0<9}", frac)
            .parse::<u32>()
            .map_err(|e| ReplayError::Malformed(format!("timestamp '{}': {}", text, e)))?
    };
    Ok(Duration::new(secs, nanos))
}

/// Replay a log file (`-` reads stdin) into the bus channel.
///
/// Returns the number of frames forwarded. Lines that fail to parse are
/// logged and skipped.
pub async fn replay_file(path: &Path, bus: mpsc::Sender<BusEvent>) -> Result<usize, ReplayError> {
    info!("Replaying candump log from {}", path.display());
    if path.as_os_str() == "-" {
        replay_reader(tokio::io::stdin(), bus).await
    } else {
        let file = tokio::fs::File::open(path).await?;
        replay_reader(file, bus).await
    }
}

pub async fn replay_reader<R>(reader: R, bus: mpsc::Sender<BusEvent>) -> Result<usize, ReplayError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut previous: Option<Duration> = None;
    let mut forwarded = 0usize;
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let entry = match parse_line(&line) {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping log line {}: {}", line_number, e);
                continue;
            }
        };

        if let (Some(prev), Some(current)) = (previous, entry.timestamp) {
            let gap = current.saturating_sub(prev).min(MAX_REPLAY_GAP);
            if !gap.is_zero() {
                tokio::time::sleep(gap).await;
            }
        }
        if entry.timestamp.is_some() {
            previous = entry.timestamp;
        }

        debug!("Replay RX {}", entry.frame);
        bus.send(BusEvent::Frame(entry.frame))
            .await
            .map_err(|_| ReplayError::ChannelClosed)?;
        forwarded += 1;
    }

    info!("Replay finished after {} frames", forwarded);
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candump_log_line() {
        let entry = parse_line("(1700000000.123456) can0 267#00000001C001")
            .unwrap()
            .unwrap();
        assert_eq!(
            entry.timestamp,
            Some(Duration::new(1_700_000_000, 123_456_000))
        );
        assert_eq!(entry.frame.id, 0x267);
        assert!(!entry.frame.extended);
        assert_eq!(entry.frame.payload(), &[0, 0, 0, 0x01, 0xC0, 0x01]);
    }

    #[test]
    fn parses_bare_and_extended_frames() {
        let bare = parse_line("277#").unwrap().unwrap();
        assert_eq!(bare.timestamp, None);
        assert_eq!(bare.frame.id, 0x277);
        assert_eq!(bare.frame.length, 0);

        let ext = parse_frame("18DAF110#01.02.03").unwrap();
        assert!(ext.extended);
        assert_eq!(ext.id, 0x18DA_F110);
        assert_eq!(ext.payload(), &[1, 2, 3]);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("# captured in a G30").unwrap().is_none());
    }

    #[test]
    fn rejects_fd_remote_and_garbage() {
        assert!(matches!(
            parse_frame("267##1001122"),
            Err(ReplayError::Unsupported(_))
        ));
        assert!(matches!(parse_frame("267#R"), Err(ReplayError::Unsupported(_))));
        assert!(matches!(parse_frame("2677#00"), Err(ReplayError::Malformed(_))));
        assert!(matches!(parse_frame("800#00"), Err(ReplayError::Malformed(_))));
        assert!(matches!(parse_frame("267#0"), Err(ReplayError::Malformed(_))));
        assert!(matches!(
            parse_frame("267#000000000000000000"),
            Err(ReplayError::Malformed(_))
        ));
        assert!(matches!(parse_frame("267#ZZ"), Err(ReplayError::Malformed(_))));
        assert!(matches!(
            parse_line("can0 nothing here"),
            Err(ReplayError::Malformed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn replay_forwards_frames_and_skips_bad_lines() {
        let log = "\
(0.000000) can0 277#
# comment
(0.100000) can0 267#00000001C001
garbage
(0.150000) can0 264#0000005E80
";
        let (tx, mut rx) = mpsc::channel(8);
        let started = tokio::time::Instant::now();
        let forwarded = replay_reader(log.as_bytes(), tx).await.unwrap();
        assert_eq!(forwarded, 3);
        assert!(started.elapsed() >= Duration::from_millis(150));

        let ids: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| match event {
                BusEvent::Frame(frame) => frame.id,
                BusEvent::Alert(_) => 0,
            })
            .collect();
        assert_eq!(ids, vec![0x277, 0x267, 0x264]);
    }

    #[tokio::test]
    async fn replay_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = replay_reader("277#".as_bytes(), tx).await;
        assert!(matches!(result, Err(ReplayError::ChannelClosed)));
    }
}
