//! Wire format for the relay.
//!
//! Every message is one leading type-tag byte followed by an opaque payload.
//! The relay never looks past the tag except to tidy up chat text. Several
//! queued messages may be merged into one transport frame, separated by a
//! line break, so payloads other than chat must not depend on embedded
//! line breaks surviving.

use bytes::{BufMut, Bytes, BytesMut};

/// Delimiter between coalesced messages inside one transport frame.
pub const DELIMITER: u8 = b'\n';

/// Leading tag of every relayed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Chat = 1,
    GameState = 2,
    PlayerList = 3,
    LostPlayer = 4,
}

impl MessageType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageType::Chat),
            2 => Some(MessageType::GameState),
            3 => Some(MessageType::PlayerList),
            4 => Some(MessageType::LostPlayer),
            _ => None,
        }
    }

    /// Whether clients are allowed to send this type to the relay.
    /// Player lists and lost-player notices only ever originate here.
    pub fn is_inbound(self) -> bool {
        matches!(self, MessageType::Chat | MessageType::GameState)
    }
}

/// Build a frame from a tag and payload.
pub fn frame(kind: MessageType, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(kind.tag());
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Chat cleanup: line breaks collapse to spaces, surrounding whitespace goes.
/// The tag byte is never whitespace, so it survives the trim.
pub fn sanitize_chat(raw: &[u8]) -> Vec<u8> {
    let replaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == DELIMITER { b' ' } else { b })
        .collect();
    replaced.trim_ascii().to_vec()
}

/// Outcome of looking at an inbound data message.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Ready to relay as-is.
    Relay(MessageType, Bytes),
    /// Empty or carrying a tag clients may not send.
    Violation(Option<u8>),
}

/// Classify an inbound message by its leading tag.
pub fn classify(raw: Vec<u8>) -> Inbound {
    let Some(&tag) = raw.first() else {
        return Inbound::Violation(None);
    };
    match MessageType::from_tag(tag) {
        Some(kind) if kind.is_inbound() => {
            let frame = match kind {
                MessageType::Chat => Bytes::from(sanitize_chat(&raw)),
                _ => Bytes::from(raw),
            };
            Inbound::Relay(kind, frame)
        }
        _ => Inbound::Violation(Some(tag)),
    }
}

/// Merge a first frame with further queued ones, delimiter-separated.
pub fn coalesce<I>(first: Bytes, rest: I) -> Bytes
where
    I: IntoIterator<Item = Bytes>,
{
    let mut rest = rest.into_iter().peekable();
    if rest.peek().is_none() {
        return first;
    }
    let mut buf = BytesMut::from(&first[..]);
    for next in rest {
        buf.put_u8(DELIMITER);
        buf.extend_from_slice(&next);
    }
    buf.freeze()
}

/// Player list payload: expected count, then tokens in the given order.
pub fn player_list<'a, I>(expected: usize, tokens: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let list = tokens.into_iter().collect::<Vec<_>>().join(" ");
    format!("{} {}", expected, list)
}
