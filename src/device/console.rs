//! Console device: stdin/stdout stand-in for the phone's SMS radio.
//!
//! Each stdin line `<from> <body>` arrives as an inbound SMS; outgoing SMS
//! are printed to stdout.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::device::SmsGateway;
use crate::message::Message;

/// A device that reads inbound SMS from stdin and writes outgoing SMS to stdout.
pub struct ConsoleDevice;

impl ConsoleDevice {
    pub fn new() -> Self {
        Self
    }

    /// Start reading stdin. The receiver closes on EOF.
    pub fn start(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(msg) = parse_line(&line) else {
                            if !line.trim().is_empty() {
                                eprintln!("expected: <from> <message>");
                            }
                            continue;
                        };
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        rx
    }
}

impl Default for ConsoleDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `<from> <body>` into an inbound message.
pub fn parse_line(line: &str) -> Option<Message> {
    let (from, body) = line.trim().split_once(char::is_whitespace)?;
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    Some(Message::inbound(from, body))
}

#[async_trait]
impl SmsGateway for ConsoleDevice {
    async fn send(&self, message: &Message, _suppress_delivery_report: bool) -> bool {
        println!("→ {}: {}", message.recipient(), message.body);
        true
    }

    async fn delete_from_inbox(&self, message: &Message) {
        debug!(uuid = %message.uuid, "Console inbox has nothing to delete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    #[test]
    fn parses_sender_and_body() {
        let msg = parse_line("+15550001  server is down ").unwrap();
        assert_eq!(msg.from, "+15550001");
        assert_eq!(msg.body, "server is down");
        assert_eq!(msg.message_type, MessageType::Pending);
    }

    #[test]
    fn rejects_lines_without_body() {
        assert!(parse_line("+15550001").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("+15550001    ").is_none());
    }

    #[tokio::test]
    async fn console_send_always_succeeds() {
        let device = ConsoleDevice::new();
        assert!(device.send(&Message::outgoing("u1", "+1", "hi"), false).await);
    }
}
