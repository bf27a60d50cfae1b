//! CAN transport seam
//!
//! The bridge never talks to a controller driver directly. Received traffic is
//! pushed into the runtime as [`BusEvent`]s over a tokio channel, outbound
//! frames leave through a [`FrameSender`] implementation.
//!
//! ```text
//! driver / replay ─[BusEvent]→ FrameWorker ─[RawFrame]→ FrameSender
//!   (mpsc::channel)                          (sync, non-blocking)
//! ```

pub mod replay;

use std::fmt::{self, Display};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Highest identifier representable in a standard (11-bit) frame
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Highest identifier representable in an extended (29-bit) frame
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// A classic CAN frame with up to eight payload bytes.
///
/// Used for both directions. Bytes past `length` are always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawFrame {
    pub id: u32,
    pub data: [u8; 8],
    pub length: u8,
    pub extended: bool,
}

impl RawFrame {
    /// Standard frame; payloads longer than eight bytes are truncated.
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let mut data = [0u8; 8];
        let length = payload.len().min(8);
        data[..length].copy_from_slice(&payload[..length]);
        Self {
            id,
            data,
            length: length as u8,
            extended: false,
        }
    }

    pub fn extended(id: u32, payload: &[u8]) -> Self {
        Self {
            extended: true,
            ..Self::new(id, payload)
        }
    }

    /// Data bytes; a DLC above 8 means 8 in classic CAN
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.length.min(8))]
    }
}

impl Display for RawFrame {
    /// candump notation, e.g. `267#00000001C001`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "{:08X}#", self.id)?;
        } else {
            write!(f, "{:03X}#", self.id)?;
        }
        for byte in self.payload() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Bus health notifications forwarded by the transport driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusAlert {
    ErrorPassive,
    BusOff,
    TxFailed,
    RxQueueFull,
}

impl Display for BusAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusAlert::ErrorPassive => write!(f, "error passive"),
            BusAlert::BusOff => write!(f, "bus off"),
            BusAlert::TxFailed => write!(f, "transmit failed"),
            BusAlert::RxQueueFull => write!(f, "receive queue full"),
        }
    }
}

/// Everything the transport can push into the runtime
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Frame(RawFrame),
    Alert(BusAlert),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Frame rejected by driver: {0}")]
    Rejected(String),

    #[error("Transmit queue full")]
    QueueFull,

    #[error("Transport channel closed")]
    ChannelClosed,
}

/// Outbound half of the CAN transport.
///
/// `send` must not block for longer than a driver enqueue; failures are
/// reported to the caller, which logs them and retries on the next schedule.
pub trait FrameSender: Send + Sync + 'static {
    fn send(&self, frame: &RawFrame) -> Result<(), TransportError>;
}

/// Forwards outbound frames into a bounded tokio channel.
///
/// The receiving end is typically a driver task owning the real socket, or a
/// test inspecting what the bridge transmitted.
#[derive(Clone, Debug)]
pub struct ChannelFrameSender {
    sender: mpsc::Sender<RawFrame>,
}

impl ChannelFrameSender {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RawFrame>) {
        let (sender, receiver) = mpsc::channel(capacity);
        debug!("Created outbound frame channel with capacity {}", capacity);
        (Self { sender }, receiver)
    }
}

impl FrameSender for ChannelFrameSender {
    fn send(&self, frame: &RawFrame) -> Result<(), TransportError> {
        self.sender.try_send(*frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::ChannelClosed,
        })
    }
}

/// Dry-run sender that only logs what would go on the wire
#[derive(Clone, Debug, Default)]
pub struct TracingFrameSender;

impl FrameSender for TracingFrameSender {
    fn send(&self, frame: &RawFrame) -> Result<(), TransportError> {
        let limit = if frame.extended {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if frame.id > limit {
            return Err(TransportError::Rejected(format!(
                "identifier {:#X} out of range",
                frame.id
            )));
        }
        trace!("TX raw: {:?}", frame);
        info!("TX {}", frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_truncates_and_zero_fills() {
        let frame = RawFrame::new(0x202, &[0xFD, 0x00]);
        assert_eq!(frame.length, 2);
        assert_eq!(frame.data, [0xFD, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frame.payload(), &[0xFD, 0x00]);

        let long = RawFrame::new(0x100, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(long.length, 8);
        assert_eq!(long.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn payload_clamps_oversized_dlc() {
        let frame = RawFrame {
            id: 0x267,
            data: [0, 0, 0, 0x01, 0xC0, 0x01, 0, 0],
            length: 12,
            extended: false,
        };
        assert_eq!(frame.payload().len(), 8);
        assert_eq!(frame.to_string(), "267#00000001C0010000");
    }

    #[test]
    fn display_uses_candump_notation() {
        let frame = RawFrame::new(0x267, &[0, 0, 0, 0x01, 0xC0, 0x01]);
        assert_eq!(frame.to_string(), "267#00000001C001");

        let ext = RawFrame::extended(0x18DAF110, &[0xAB]);
        assert_eq!(ext.to_string(), "18DAF110#AB");
    }

    #[tokio::test]
    async fn channel_sender_reports_full_and_closed() {
        let (sender, mut receiver) = ChannelFrameSender::new(1);
        let frame = RawFrame::new(0x501, &[1, 0, 0, 0, 0, 0, 0, 0]);

        assert!(sender.send(&frame).is_ok());
        assert!(matches!(sender.send(&frame), Err(TransportError::QueueFull)));
        assert_eq!(receiver.recv().await, Some(frame));

        drop(receiver);
        assert!(matches!(
            sender.send(&frame),
            Err(TransportError::ChannelClosed)
        ));
    }

    #[test]
    fn tracing_sender_rejects_out_of_range_ids() {
        let sender = TracingFrameSender;
        assert!(sender.send(&RawFrame::new(0x7FF, &[])).is_ok());
        assert!(matches!(
            sender.send(&RawFrame::new(0x800, &[])),
            Err(TransportError::Rejected(_))
        ));
        assert!(sender.send(&RawFrame::extended(0x800, &[])).is_ok());
    }
}
