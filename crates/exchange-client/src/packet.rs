//! PUBLISH packet shaping on top of exchange messages.
//!
//! Only the subset the exchange needs: dup and retain are always 0, and the
//! application key travels out-of-band on the message, never on the wire.

use crate::error::ClientError;
use bytes::{BufMut, Bytes, BytesMut};
use exchange_rs::Message;

/// MQTT control packet type for PUBLISH, in the high nibble.
pub const CMD_PUBLISH: u8 = 0x30;

const PACKET_TYPE_MASK: u8 = 0xF0;
const QOS_SHIFT: u8 = 1;
const QOS_MASK: u8 = 0b0000_0110;
/// Largest value the 4-byte remaining-length varint can hold.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Delivery guarantee requested by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ClientError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ClientError::InvalidPacket(format!("invalid QoS {other}"))),
        }
    }
}

/// A PUBLISH packet tagged with an application key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic: String,
    pub qos: QoS,
    /// Packet identifier, only written for QoS > 0
    pub packet_id: u16,
    pub payload: Bytes,
    pub key: u64,
}

impl PublishPacket {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            qos: QoS::AtMostOnce,
            packet_id: 0,
            payload: payload.into(),
            key: 0,
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = packet_id;
        self
    }

    pub fn with_key(mut self, key: u64) -> Self {
        self.key = key;
        self
    }

    /// Shapes the packet into a message: fixed header in the header bytes,
    /// topic, optional packet id and payload in the body.
    pub fn encode(&self) -> Result<Message, ClientError> {
        let topic_len = u16::try_from(self.topic.len())
            .map_err(|_| ClientError::InvalidPacket("topic longer than 65535 bytes".into()))?;

        let id_len = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        let remaining = 2 + self.topic.len() + id_len + self.payload.len();
        if remaining > MAX_REMAINING_LENGTH {
            return Err(ClientError::InvalidPacket(format!(
                "packet of {remaining} bytes exceeds the maximum remaining length"
            )));
        }

        let mut header = BytesMut::with_capacity(5);
        header.put_u8(CMD_PUBLISH | ((self.qos as u8) << QOS_SHIFT));
        put_remaining_length(&mut header, remaining);

        let mut body = BytesMut::with_capacity(remaining);
        body.put_u16(topic_len);
        body.put_slice(self.topic.as_bytes());
        if id_len > 0 {
            body.put_u16(self.packet_id);
        }
        body.put_slice(&self.payload);

        Ok(Message::new(header.freeze(), body.freeze()).with_key(self.key))
    }

    /// Parses a message produced by [`encode`](Self::encode).
    pub fn decode(message: &Message) -> Result<Self, ClientError> {
        let header = message.header();
        let first = *header
            .first()
            .ok_or_else(|| ClientError::InvalidPacket("empty header".into()))?;
        if first & PACKET_TYPE_MASK != CMD_PUBLISH {
            return Err(ClientError::InvalidPacket(format!(
                "not a PUBLISH packet (type byte {first:#04x})"
            )));
        }
        let qos = QoS::try_from((first & QOS_MASK) >> QOS_SHIFT)?;

        let body = message.body();
        if body.len() < 2 {
            return Err(ClientError::InvalidPacket("missing topic length".into()));
        }
        let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        let mut offset = 2 + topic_len;
        if body.len() < offset {
            return Err(ClientError::InvalidPacket("truncated topic".into()));
        }
        let topic = std::str::from_utf8(&body[2..offset])
            .map_err(|e| ClientError::InvalidPacket(format!("topic is not UTF-8: {e}")))?
            .to_owned();

        let mut packet_id = 0;
        if qos != QoS::AtMostOnce {
            if body.len() < offset + 2 {
                return Err(ClientError::InvalidPacket("missing packet identifier".into()));
            }
            packet_id = u16::from_be_bytes([body[offset], body[offset + 1]]);
            offset += 2;
        }

        Ok(Self {
            topic,
            qos,
            packet_id,
            payload: body.slice(offset..),
            key: message.key(),
        })
    }
}

fn put_remaining_length(buf: &mut BytesMut, mut len: usize) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if len == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bits() {
        let msg = PublishPacket::new("topic1", Bytes::new())
            .with_qos(QoS::AtLeastOnce)
            .with_packet_id(7)
            .with_key(42)
            .encode()
            .unwrap();

        // PUBLISH, dup 0, QoS 1, retain 0
        assert_eq!(msg.header()[0], 0x32);
        // 2 (topic len) + 6 (topic) + 2 (packet id)
        assert_eq!(msg.header()[1], 10);
        assert_eq!(msg.key(), 42);
    }

    #[test]
    fn test_empty_payload_qos0() {
        let msg = PublishPacket::new("topic1", Bytes::new()).encode().unwrap();
        assert_eq!(msg.header().as_ref(), &[0x30u8, 8][..]);

        let packet = PublishPacket::decode(&msg).unwrap();
        assert_eq!(packet.topic, "topic1");
        assert!(packet.payload.is_empty());
        assert_eq!(packet.packet_id, 0);
    }

    #[test]
    fn test_multi_byte_remaining_length() {
        let payload = vec![0xABu8; 300];
        let msg = PublishPacket::new("t", payload.clone()).encode().unwrap();
        // 2 + 1 + 300 = 303 = 47 + 2 * 128
        assert_eq!(msg.header().as_ref(), &[0x30u8, 0xAF, 0x02][..]);
        assert_eq!(PublishPacket::decode(&msg).unwrap().payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_decode_rejects_other_packet_types() {
        let msg = Message::new(vec![0x20u8, 0], Vec::new());
        assert!(matches!(
            PublishPacket::decode(&msg),
            Err(ClientError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let msg = Message::new(vec![0x30u8, 4], vec![0u8, 9, b'a']);
        assert!(PublishPacket::decode(&msg).is_err());
    }

    #[test]
    fn test_invalid_qos() {
        assert!(QoS::try_from(3).is_err());
        assert_eq!(QoS::try_from(2).unwrap(), QoS::ExactlyOnce);
    }
}
