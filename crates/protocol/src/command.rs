//! Command envelope carried as an application payload.
//!
//! Outgoing commands are `[kind, callback_id?, ...args]`.  Incoming frames
//! are either responses `[callback_id, ...args]` (positive integer head) or
//! server pushes `[kind, ...args]` (string head).

use serde_json::Value;

/// A decoded inbound command frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Reply to a request we sent with a callback id.
    Response { id: u64, args: Vec<Value> },
    /// Unsolicited server message addressed to a named handler.
    Push { kind: String, args: Vec<Value> },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON array")]
    NotArray,

    #[error("frame is an empty array")]
    Empty,

    #[error("unsupported frame head: {0}")]
    BadHead(Value),
}

/// Encode an outgoing command.  The callback id, when present, is placed
/// right after the kind.
pub fn encode(kind: &str, callback_id: Option<u64>, args: &[Value]) -> String {
    let mut frame = Vec::with_capacity(args.len() + 2);
    frame.push(Value::from(kind));
    if let Some(id) = callback_id {
        frame.push(Value::from(id));
    }
    frame.extend(args.iter().cloned());
    Value::Array(frame).to_string()
}

/// Decode an inbound frame into a response or a push.
pub fn decode(text: &str) -> Result<Envelope, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(mut items) = value else {
        return Err(FrameError::NotArray);
    };
    if items.is_empty() {
        return Err(FrameError::Empty);
    }

    let head = items.remove(0);
    match head {
        Value::Number(ref n) => match n.as_u64() {
            Some(id) if id > 0 => Ok(Envelope::Response { id, args: items }),
            _ => Err(FrameError::BadHead(head)),
        },
        Value::String(kind) => Ok(Envelope::Push { kind, args: items }),
        other => Err(FrameError::BadHead(other)),
    }
}
