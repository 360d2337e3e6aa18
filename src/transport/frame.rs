//! Wire format for the datagram protocol.
//!
//! Every frame is plain UTF-8 text with fields joined by `#`:
//!
//! ```text
//! #msg#<client id>#<topic>#<payload>#
//! #sub#<client id>#<topic>#
//! #unsub#<client id>#<topic>#
//! ```
//!
//! The protocol has no escaping. Client ids and topics may never contain the
//! delimiter, but payloads may: the decoder takes everything between the topic
//! field and the final `#` as the payload, so a payload such as `a#b` survives
//! a round trip untouched.

use crate::utils::error::FrameError;

/// Field separator used by the wire format.
pub const DELIMITER: char = '#';

/// Largest frame, in bytes, that fits into one datagram.
pub const MAX_FRAME_SIZE: usize = 1024;

/// The kind tag carried in the first field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Msg,
    Sub,
    Unsub,
}

impl FrameKind {
    /// The lowercase tag written on the wire.
    pub fn tag(self) -> &'static str {
        match self {
            FrameKind::Msg => "msg",
            FrameKind::Sub => "sub",
            FrameKind::Unsub => "unsub",
        }
    }

    /// Parses a kind tag, ignoring ASCII case.
    pub fn from_tag(tag: &str) -> Option<Self> {
        [FrameKind::Msg, FrameKind::Sub, FrameKind::Unsub]
            .into_iter()
            .find(|kind| kind.tag().eq_ignore_ascii_case(tag))
    }
}

/// One self-contained protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A published payload, sent by clients and fanned out by the broker.
    Publish {
        client_id: String,
        topic: String,
        payload: String,
    },
    /// Asks the broker to start routing a topic to this client.
    Subscribe { client_id: String, topic: String },
    /// Asks the broker to stop routing a topic to this client.
    Unsubscribe { client_id: String, topic: String },
}

impl Frame {
    pub fn publish(client_id: &str, topic: &str, payload: &str) -> Self {
        Frame::Publish {
            client_id: client_id.to_string(),
            topic: topic.to_string(),
            payload: payload.to_string(),
        }
    }

    pub fn subscribe(client_id: &str, topic: &str) -> Self {
        Frame::Subscribe {
            client_id: client_id.to_string(),
            topic: topic.to_string(),
        }
    }

    pub fn unsubscribe(client_id: &str, topic: &str) -> Self {
        Frame::Unsubscribe {
            client_id: client_id.to_string(),
            topic: topic.to_string(),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Publish { .. } => FrameKind::Msg,
            Frame::Subscribe { .. } => FrameKind::Sub,
            Frame::Unsubscribe { .. } => FrameKind::Unsub,
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            Frame::Publish { client_id, .. }
            | Frame::Subscribe { client_id, .. }
            | Frame::Unsubscribe { client_id, .. } => client_id,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Frame::Publish { topic, .. }
            | Frame::Subscribe { topic, .. }
            | Frame::Unsubscribe { topic, .. } => topic,
        }
    }

    /// The payload of a `msg` frame; `None` for subscription frames.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Frame::Publish { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Size of the encoded frame in bytes.
    pub fn encoded_len(&self) -> usize {
        let fields = self.kind().tag().len() + self.client_id().len() + self.topic().len();
        match self.payload() {
            // five delimiters
            Some(payload) => fields + payload.len() + 5,
            // four delimiters
            None => fields + 4,
        }
    }
}

/// Checks that a header field is usable on the wire.
pub fn validate_field(field: &'static str, value: &str) -> Result<(), FrameError> {
    if value.is_empty() {
        return Err(FrameError::InvalidField {
            field,
            reason: "must not be empty",
        });
    }
    if value.contains(DELIMITER) {
        return Err(FrameError::InvalidField {
            field,
            reason: "must not contain '#'",
        });
    }
    Ok(())
}

/// Encodes a frame into the bytes of a single datagram.
///
/// Fails without producing any output when a header field is invalid or the
/// frame would exceed [`MAX_FRAME_SIZE`].
pub fn encode(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    validate_field("client id", frame.client_id())?;
    validate_field("topic", frame.topic())?;

    let size = frame.encoded_len();
    if size > MAX_FRAME_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut out = String::with_capacity(size);
    for field in [frame.kind().tag(), frame.client_id(), frame.topic()] {
        out.push(DELIMITER);
        out.push_str(field);
    }
    out.push(DELIMITER);
    if let Some(payload) = frame.payload() {
        out.push_str(payload);
        out.push(DELIMITER);
    }

    Ok(out.into_bytes())
}

/// Decodes one inbound datagram.
///
/// Never panics: any input that is not a well-formed frame yields
/// [`FrameError::Malformed`]. Surrounding whitespace is ignored and the kind
/// tag is matched case-insensitively.
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(malformed(format!(
            "datagram of {} bytes exceeds {MAX_FRAME_SIZE}",
            bytes.len()
        )));
    }

    let text = std::str::from_utf8(bytes).map_err(|_| malformed("not valid UTF-8"))?;
    let body = text
        .trim()
        .strip_prefix(DELIMITER)
        .ok_or_else(|| malformed("missing leading delimiter"))?
        .strip_suffix(DELIMITER)
        .ok_or_else(|| malformed("missing trailing delimiter"))?;

    // kind, client id, topic, and whatever remains is the payload
    let mut fields = body.splitn(4, DELIMITER);
    let tag = fields.next().unwrap_or_default();
    let kind =
        FrameKind::from_tag(tag).ok_or_else(|| malformed(format!("unknown frame kind {tag:?}")))?;
    let client_id = required(fields.next(), "client id")?;
    let topic = required(fields.next(), "topic")?;
    let rest = fields.next();

    match (kind, rest) {
        (FrameKind::Msg, Some(payload)) => Ok(Frame::publish(client_id, topic, payload)),
        (FrameKind::Msg, None) => Err(malformed("msg frame without payload")),
        (FrameKind::Sub, None) => Ok(Frame::subscribe(client_id, topic)),
        (FrameKind::Unsub, None) => Ok(Frame::unsubscribe(client_id, topic)),
        (_, Some(_)) => Err(malformed(format!("{} frame carries extra fields", kind.tag()))),
    }
}

fn required<'a>(field: Option<&'a str>, name: &str) -> Result<&'a str, FrameError> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        Some(_) => Err(malformed(format!("empty {name}"))),
        None => Err(malformed(format!("missing {name}"))),
    }
}

fn malformed(reason: impl Into<String>) -> FrameError {
    FrameError::Malformed(reason.into())
}
