//! Decoding of S3-notification envelopes into tasks.
//!
//! The queue body is a JSON document whose `Message` field holds the task as
//! a string. Upstream writes that string with Python-style quoting
//! (`{'bucket': u'b', ...}`), so it is normalized to double quotes before the
//! second decode.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;

use crate::error::{DecodeError, EmptyFieldSnafu, EnvelopeSnafu, TaskPayloadSnafu};

/// One unit of work: the object to ingest and the label to publish it under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub bucket: String,
    pub path: String,
    pub label: String,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{bucket: {}, path: {}, label: {}}}",
            self.bucket, self.path, self.label
        )
    }
}

impl Task {
    fn validate(self) -> Result<Self, DecodeError> {
        ensure!(!self.bucket.is_empty(), EmptyFieldSnafu { field: "bucket" });
        ensure!(!self.path.is_empty(), EmptyFieldSnafu { field: "path" });
        ensure!(!self.label.is_empty(), EmptyFieldSnafu { field: "label" });
        Ok(self)
    }
}

#[derive(Deserialize)]
struct Notification {
    #[serde(rename = "Message")]
    message: String,
}

/// Decode a raw queue body into a [`Task`].
pub fn decode_envelope(body: &str) -> Result<Task, DecodeError> {
    let notification: Notification = serde_json::from_str(body).context(EnvelopeSnafu)?;
    let normalized = normalize_quotes(&notification.message);
    let task: Task = serde_json::from_str(&normalized).context(TaskPayloadSnafu)?;
    task.validate()
}

/// `u'` → `"`, then `'` → `"`, in that order.
fn normalize_quotes(message: &str) -> String {
    message.replace("u'", "\"").replace('\'', "\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_quoted_task() {
        let body = r#"{"Message": "{'bucket': 'b', 'path': 'p/x.log', 'label': 'l'}"}"#;
        let task = decode_envelope(body).unwrap();
        assert_eq!(
            task,
            Task {
                bucket: "b".to_string(),
                path: "p/x.log".to_string(),
                label: "l".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_unicode_prefixed_strings() {
        let body = r#"{"Message": "{u'bucket': u'tiles', u'path': u'2023/01/01.log', u'label': u'impressions'}"}"#;
        let task = decode_envelope(body).unwrap();
        assert_eq!(task.bucket, "tiles");
        assert_eq!(task.path, "2023/01/01.log");
        assert_eq!(task.label, "impressions");
    }

    #[test]
    fn test_decode_double_quoted_task() {
        let body = r#"{"Type": "Notification", "Message": "{\"bucket\": \"b\", \"path\": \"k\", \"label\": \"l\", \"size\": 10}"}"#;
        let task = decode_envelope(body).unwrap();
        assert_eq!(task.path, "k");
    }

    #[test]
    fn test_outer_not_json() {
        let err = decode_envelope("not json").unwrap_err();
        assert!(matches!(err, DecodeError::Envelope { .. }));
    }

    #[test]
    fn test_missing_message_field() {
        let err = decode_envelope(r#"{"Subject": "x"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Envelope { .. }));
    }

    #[test]
    fn test_missing_task_field() {
        let body = r#"{"Message": "{'bucket': 'b', 'path': 'p'}"}"#;
        let err = decode_envelope(body).unwrap_err();
        assert!(matches!(err, DecodeError::TaskPayload { .. }));
    }

    #[test]
    fn test_empty_task_field() {
        let body = r#"{"Message": "{'bucket': 'b', 'path': '', 'label': 'l'}"}"#;
        let err = decode_envelope(body).unwrap_err();
        assert!(matches!(err, DecodeError::EmptyField { field: "path" }));
    }

    #[test]
    fn test_inner_not_json() {
        let body = r#"{"Message": "hello"}"#;
        let err = decode_envelope(body).unwrap_err();
        assert!(matches!(err, DecodeError::TaskPayload { .. }));
    }
}
