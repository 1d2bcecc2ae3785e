//! Wire format for requests and replies.
//!
//! Both envelopes are JSON objects with `PascalCase` field names:
//!
//! ```text
//! request: { "RequestId": "5b0c…" }
//! reply:   { "RequestId": "5b0c…", "Text": "Faketext" }
//! ```
//!
//! Replies come from a remote responder and are untrusted. Parsing is split
//! into two steps: [`ReplyEnvelope`] accepts any JSON object (fields may be
//! missing), and [`ReplyEnvelope::validate`] produces a [`ValidatedReply`]
//! only when both fields are present and non-blank.

use crate::correlation::CorrelationId;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Request published on the request queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id the responder must echo back.
    #[serde(rename = "RequestId")]
    pub request_id: CorrelationId,
}

impl RequestEnvelope {
    /// Create a request for the given correlation id.
    #[must_use]
    pub const fn new(request_id: CorrelationId) -> Self {
        Self { request_id }
    }

    /// Serialize to the JSON bytes placed on the queue.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a request from queue bytes.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the body is not a request envelope.
    pub fn from_bytes(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Reply as it arrives on the reply queue, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Correlation id echoed from the request.
    #[serde(rename = "RequestId", default)]
    pub request_id: Option<String>,

    /// Reply payload.
    #[serde(rename = "Text", default)]
    pub text: Option<String>,
}

impl ReplyEnvelope {
    /// Build a reply envelope (used by responders and tests).
    #[must_use]
    pub fn new(request_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            text: Some(text.into()),
        }
    }

    /// Serialize to the JSON bytes placed on the queue.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize and validate a raw queue body in one step.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::Malformed`] if the body is not a JSON reply object
    /// - [`ValidationError::MissingCorrelationId`] if the id is absent or blank
    /// - [`ValidationError::MissingText`] if the text is absent or blank
    pub fn parse(body: &[u8]) -> Result<ValidatedReply, ValidationError> {
        let envelope: Self = serde_json::from_slice(body)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        envelope.validate()
    }

    /// Check that both fields are present and non-blank.
    ///
    /// # Errors
    ///
    /// See [`ReplyEnvelope::parse`].
    pub fn validate(self) -> Result<ValidatedReply, ValidationError> {
        let request_id = match self.request_id {
            Some(id) if !id.trim().is_empty() => CorrelationId::new(id),
            _ => return Err(ValidationError::MissingCorrelationId),
        };

        match self.text {
            Some(text) if !text.trim().is_empty() => Ok(ValidatedReply { request_id, text }),
            _ => Err(ValidationError::MissingText { request_id }),
        }
    }
}

/// A reply that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedReply {
    /// Non-blank correlation id.
    pub request_id: CorrelationId,
    /// Non-blank reply text.
    pub text: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn request_uses_pascal_case_field() {
        let request = RequestEnvelope::new(CorrelationId::new("abc"));
        let json = String::from_utf8(request.to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"RequestId":"abc"}"#);
    }

    #[test]
    fn valid_reply_parses() {
        let reply = ReplyEnvelope::parse(br#"{"RequestId":"abc","Text":"Faketext"}"#)
            .expect("reply should validate");
        assert_eq!(reply.request_id.as_str(), "abc");
        assert_eq!(reply.text, "Faketext");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let reply = ReplyEnvelope::parse(br#"{"RequestId":"abc","Text":"t","Extra":1}"#);
        assert!(reply.is_ok());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            ReplyEnvelope::parse(b"not json"),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            ReplyEnvelope::parse(b"null"),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn missing_fields_fail_validation() {
        assert_eq!(
            ReplyEnvelope::parse(br#"{"Text":"t"}"#),
            Err(ValidationError::MissingCorrelationId)
        );
        assert_eq!(
            ReplyEnvelope::parse(br#"{"RequestId":"abc"}"#),
            Err(ValidationError::MissingText {
                request_id: CorrelationId::new("abc")
            })
        );
    }

    #[test]
    fn empty_id_with_text_fails() {
        assert_eq!(
            ReplyEnvelope::parse(br#"{"RequestId":"","Text":"Faketext"}"#),
            Err(ValidationError::MissingCorrelationId)
        );
    }

    proptest! {
        #[test]
        fn blank_ids_are_always_rejected(id in "[ \t\r\n]*", text in "[a-z]{1,16}") {
            let body = ReplyEnvelope::new(id, text).to_bytes().unwrap();
            prop_assert_eq!(ReplyEnvelope::parse(&body), Err(ValidationError::MissingCorrelationId));
        }

        #[test]
        fn blank_texts_are_always_rejected(id in "[a-z0-9-]{1,36}", text in "[ \t\r\n]*") {
            let body = ReplyEnvelope::new(id, text).to_bytes().unwrap();
            let is_missing_text = matches!(
                ReplyEnvelope::parse(&body),
                Err(ValidationError::MissingText { .. })
            );
            prop_assert!(is_missing_text);
        }

        #[test]
        fn non_blank_replies_keep_text_verbatim(id in "[a-z0-9-]{1,36}", text in " ?[a-zA-Z]{1,16} ?") {
            let body = ReplyEnvelope::new(id.clone(), text.clone()).to_bytes().unwrap();
            let reply = ReplyEnvelope::parse(&body).unwrap();
            prop_assert_eq!(reply.request_id.as_str(), id.as_str());
            prop_assert_eq!(reply.text, text);
        }
    }
}
