//! Relayed data frames.

use std::fmt;

use axum::extract::ws::{Message, Utf8Bytes};
use bytes::Bytes;

/// Frame kind as exposed by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// One data frame, forwarded unchanged. Cloning shares the payload buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Text payload.
    Text(Utf8Bytes),
    /// Binary payload.
    Binary(Bytes),
}

impl Frame {
    /// Which kind of frame this is.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Text(_) => FrameKind::Text,
            Self::Binary(_) => FrameKind::Binary,
        }
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_str().as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload().len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    /// Extract a data frame from a transport message.
    ///
    /// Control messages (ping, pong, close) are handed back unchanged.
    pub fn from_message(message: Message) -> Result<Self, Message> {
        match message {
            Message::Text(text) => Ok(Self::Text(text)),
            Message::Binary(bytes) => Ok(Self::Binary(bytes)),
            other => Err(other),
        }
    }

    /// Convert back into a transport message of the same kind.
    pub fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text),
            Self::Binary(bytes) => Message::Binary(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_kind_and_payload() {
        let frame = Frame::Text("offer".into());
        assert_eq!(frame.kind(), FrameKind::Text);
        assert_eq!(frame.payload(), b"offer");
        assert_eq!(frame.len(), 5);
    }

    #[test]
    fn binary_kind_and_payload() {
        let frame = Frame::Binary(Bytes::from_static(&[0x01, 0x02]));
        assert_eq!(frame.kind(), FrameKind::Binary);
        assert_eq!(frame.payload(), &[0x01, 0x02]);
    }

    #[test]
    fn empty_payload() {
        assert!(Frame::Binary(Bytes::new()).is_empty());
        assert!(Frame::Text("".into()).is_empty());
    }

    #[test]
    fn message_kind_preserved() {
        let text = Frame::from_message(Message::Text("hi".into())).unwrap();
        assert!(matches!(text.clone().into_message(), Message::Text(t) if t.as_str() == "hi"));

        let binary = Frame::from_message(Message::Binary(Bytes::from_static(b"hi"))).unwrap();
        assert_eq!(binary.kind(), FrameKind::Binary);
        assert!(matches!(binary.into_message(), Message::Binary(b) if &b[..] == b"hi"));
    }

    #[test]
    fn control_messages_rejected() {
        assert!(Frame::from_message(Message::Ping(Bytes::new())).is_err());
        assert!(Frame::from_message(Message::Pong(Bytes::new())).is_err());
        assert!(Frame::from_message(Message::Close(None)).is_err());
    }

    #[test]
    fn clone_shares_buffer() {
        let bytes = Bytes::from(vec![7u8; 1024]);
        let frame = Frame::Binary(bytes.clone());
        let copy = frame.clone();
        assert_eq!(copy.payload().as_ptr(), bytes.as_ptr());
    }

    #[test]
    fn kind_display() {
        assert_eq!(FrameKind::Text.to_string(), "text");
        assert_eq!(FrameKind::Binary.to_string(), "binary");
    }
}
