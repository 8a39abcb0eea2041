use crate::{DeviceMessage, Event, Message, MessageError, MessageKind, NodeMessage};

use bytes::Bytes;
use sedge_types::constants::{SPBV01, STATE};

enum MessageProducer {
  Device,
  Node,
}

fn process_topic_message(message_part: &[u8]) -> Result<(MessageProducer, MessageKind), MessageError> {
  if message_part.len() < 2 {
    return Err(MessageError::InvalidSparkplugTopic);
  }
  let producer = match message_part[0] {
    b'N' => MessageProducer::Node,
    b'D' => MessageProducer::Device,
    _ => return Err(MessageError::InvalidSparkplugTopic),
  };

  let kind = match &message_part[1..] {
    b"BIRTH" => MessageKind::Birth,
    b"DEATH" => MessageKind::Death,
    b"DATA" => MessageKind::Data,
    b"CMD" => MessageKind::Cmd,
    msg => MessageKind::Other(String::from_utf8(msg.into())?),
  };
  Ok((producer, kind))
}

fn parse(topic: &[u8], payload: Bytes) -> Result<Event, MessageError> {
  let mut iter = topic.split(|c| *c == b'/');

  match iter.next() {
    Some(namespace) if namespace == SPBV01.as_bytes() => (),
    _ => return Err(MessageError::InvalidSparkplugTopic),
  }

  let state_or_group_id = iter.next().ok_or(MessageError::InvalidSparkplugTopic)?;

  if STATE.as_bytes().eq(state_or_group_id) {
    let host_id = iter.next().ok_or(MessageError::InvalidSparkplugTopic)?;
    if iter.next().is_some() {
      return Err(MessageError::InvalidSparkplugTopic);
    }
    return Ok(Event::State {
      host_id: String::from_utf8(host_id.to_vec())?,
      payload,
    });
  }

  let group_id = String::from_utf8(state_or_group_id.to_vec())?;

  let (producer, kind) = process_topic_message(iter.next().ok_or(MessageError::InvalidSparkplugTopic)?)?;

  let node_id = match iter.next() {
    Some(val) => String::from_utf8(val.to_vec())?,
    None => return Err(MessageError::InvalidSparkplugTopic),
  };

  let message = Message { kind, payload };
  let event = match producer {
    MessageProducer::Node => {
      if iter.next().is_some() {
        return Err(MessageError::InvalidSparkplugTopic);
      }
      Event::Node(NodeMessage { group_id, node_id, message })
    }
    MessageProducer::Device => {
      let device_id = match iter.next() {
        Some(val) => String::from_utf8(val.to_vec())?,
        None => return Err(MessageError::InvalidSparkplugTopic),
      };
      if iter.next().is_some() {
        return Err(MessageError::InvalidSparkplugTopic);
      }
      Event::Device(DeviceMessage { group_id, node_id, device_id, message })
    }
  };
  Ok(event)
}

/// Turn a raw inbound publish into an [Event].
///
/// Publishes on topics outside the Sparkplug namespace layout become [Event::InvalidPublish].
pub fn topic_and_payload_to_event(topic: &[u8], payload: Bytes) -> Event {
  match parse(topic, payload.clone()) {
    Ok(event) => event,
    Err(reason) => Event::InvalidPublish {
      reason,
      topic: topic.to_vec(),
      payload: payload.to_vec(),
    },
  }
}
