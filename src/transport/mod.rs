//! The `transport` module handles all network communication with the broker.
//!
//! It defines the `#`-delimited wire format, the session that owns the UDP
//! sockets, and the background receiver that turns inbound datagrams into
//! handler invocations.
//!
//! Both directions use UDP port [`PROTOCOL_PORT`]: clients send frames to the
//! broker on that port and the broker delivers messages to that port on the
//! subscribing host. Only one session per host can therefore receive at a
//! time.

pub mod frame;
pub mod receiver;
pub mod session;

pub use frame::{Frame, FrameKind, MAX_FRAME_SIZE};
pub use receiver::{ReceiverState, StatsSnapshot, StopReason};
pub use session::{Session, SessionConfig};

/// UDP port the broker listens on and delivers to.
pub const PROTOCOL_PORT: u16 = 11011;

#[cfg(test)]
mod tests;
