use actix_web::web::Bytes;

/// Comment line sent on idle connections so proxies and clients keep them open
pub const KEEP_ALIVE: &[u8] = b": keep-alive\n\n";

pub const CONNECTED_EVENT: &str = "connected";
const CONNECTED_MESSAGE: &str = "Connected to notification service";

/// One named server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// First frame on every connection
    pub fn connected() -> Self {
        Self::new(CONNECTED_EVENT, CONNECTED_MESSAGE)
    }

    /// `text/event-stream` encoding; multi-line data becomes several `data:` lines
    pub fn encode(&self) -> Bytes {
        let mut out = String::with_capacity(self.event.len() + self.data.len() + 16);
        out.push_str("event: ");
        out.extend(self.event.chars().filter(|c| *c != '\n' && *c != '\r'));
        out.push('\n');

        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line.strip_suffix('\r').unwrap_or(line));
            out.push('\n');
        }
        out.push('\n');

        Bytes::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_frame() {
        let frame = Frame::new("order-created", r#"{"orderId":1}"#);
        assert_eq!(
            frame.encode(),
            Bytes::from_static(b"event: order-created\ndata: {\"orderId\":1}\n\n")
        );
    }

    #[test]
    fn test_multi_line_data() {
        let frame = Frame::new("note", "first\r\nsecond");
        assert_eq!(
            frame.encode(),
            Bytes::from_static(b"event: note\ndata: first\ndata: second\n\n")
        );
    }

    #[test]
    fn test_event_name_cannot_break_framing() {
        let frame = Frame::new("bad\nname", "x");
        assert!(frame.encode().starts_with(b"event: badname\n"));
    }

    #[test]
    fn test_connected_frame() {
        let encoded = Frame::connected().encode();
        assert_eq!(
            encoded,
            Bytes::from_static(b"event: connected\ndata: Connected to notification service\n\n")
        );
    }
}
