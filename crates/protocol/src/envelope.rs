use serde::{Deserialize, Serialize};

use crate::constants::MessageType;

/// Rejection carried by an error reply.
///
/// `code` is one of the `WS_ERR_CODE_*` constants; retryable codes mean
/// the same request may succeed once the slot changes state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsError {
    pub code: i32,
    pub message: String,
}

/// One request or reply frame.
///
/// Replies reuse the request `id`, which is all a client needs to match
/// them. `payload` stays raw JSON until the receiver has looked at
/// `msg_type`; an error reply has `error` set and no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<serde_json::value::RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WsError>,
}

impl Message {
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = match payload {
            Some(p) => {
                let json = serde_json::to_string(p)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self {
            id: id.into(),
            msg_type,
            payload: raw,
            error: None,
        })
    }

    /// Deserializes the payload into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.payload {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }

    /// Builds the reply to this request.
    pub fn reply<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Message::new(&self.id, msg_type, payload)
    }

    /// Builds an error reply to this request.
    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            msg_type: MessageType::Error,
            payload: None,
            error: Some(WsError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Splits a received reply into success or the server's rejection.
    pub fn into_result(self) -> Result<Self, WsError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
