//! Entry points that turn an invocation into a [`DecompressRequest`].

use serde::Deserialize;

use crate::pipeline::{DecompressRequest, Pipeline, PipelineError};

/// A direct invocation: bucket and file either named or given positionally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectCommand {
    /// Positional `[bucket, file]`, used when at least two are given
    pub args: Vec<String>,
    pub bucket: Option<String>,
    pub file: Option<String>,
    pub delete_on_success: bool,
    pub verbose: bool,
}

impl DirectCommand {
    /// Named values take precedence over positional ones
    pub fn into_request(self) -> DecompressRequest {
        let mut positional = self.args.into_iter();
        let (arg_bucket, arg_file) = match (positional.next(), positional.next()) {
            (Some(bucket), Some(file)) => (Some(bucket), Some(file)),
            _ => (None, None),
        };

        DecompressRequest {
            bucket: self.bucket.or(arg_bucket).unwrap_or_default(),
            key: self.file.or(arg_file).unwrap_or_default(),
            delete_source_on_success: self.delete_on_success,
            verbose: self.verbose,
        }
    }
}

/// S3 "object created" notification payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    /// URL-encoded as delivered by S3
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl S3Object {
    /// The object key with notification encoding undone
    pub fn decoded_key(&self) -> String {
        decode_event_key(&self.key)
    }
}

/// Undo the form encoding S3 applies to keys in notifications: `+` is a
/// space and `%XX` is an escaped byte.
///
/// Malformed escapes are kept literally. A key that does not decode to UTF-8
/// is returned unchanged.
pub fn decode_event_key(raw: &str) -> String {
    fn hex(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}

impl S3Event {
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Request for the first record, with its key decoded. Notifications
    /// always delete the source and log verbosely. With no records the request
    /// fails validation.
    pub fn into_request(self) -> DecompressRequest {
        let (bucket, key) = self
            .records
            .into_iter()
            .next()
            .map(|record| {
                let key = record.s3.object.decoded_key();
                if key != record.s3.object.key {
                    tracing::debug!(raw = %record.s3.object.key, %key, "decoded notification key");
                }
                (record.s3.bucket.name, key)
            })
            .unwrap_or_default();

        DecompressRequest {
            bucket,
            key,
            delete_source_on_success: true,
            verbose: true,
        }
    }
}

/// Handle a direct invocation
pub async fn unzip(
    pipeline: &Pipeline,
    command: DirectCommand,
) -> Result<&'static str, PipelineError> {
    pipeline.run(&command.into_request()).await
}

/// Handle an S3 notification
#[tracing::instrument(skip_all, fields(records = event.records.len()))]
pub async fn handle_event(
    pipeline: &Pipeline,
    event: S3Event,
) -> Result<&'static str, PipelineError> {
    if let Some(name) = event.records.first().and_then(|r| r.event_name.as_deref()) {
        tracing::debug!(event = name, "received notification");
    }
    pipeline.run(&event.into_request()).await
}

/// Fire-and-forget: run the request and only log a failure
pub async fn dispatch(pipeline: &Pipeline, request: DecompressRequest) {
    if let Err(e) = pipeline.run(&request).await {
        tracing::error!(
            bucket = %request.bucket,
            key = %request.key,
            stage = %e.stage(),
            "{}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = r#"{
        "Records": [
            {
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": { "name": "uploads", "arn": "arn:aws:s3:::uploads" },
                    "object": { "key": "incoming/batch.zip", "size": 1024, "eTag": "abc" }
                }
            }
        ]
    }"#;

    #[test]
    fn test_event_request() {
        let request = S3Event::from_json(EVENT).unwrap().into_request();

        assert_eq!(request.bucket, "uploads");
        assert_eq!(request.key, "incoming/batch.zip");
        assert!(request.delete_source_on_success);
        assert!(request.verbose);
    }

    #[test]
    fn test_event_key_is_decoded() {
        let payload = EVENT.replace("incoming/batch.zip", "incoming/q1+report%282024%29.zip");
        let request = S3Event::from_json(&payload).unwrap().into_request();
        assert_eq!(request.key, "incoming/q1 report(2024).zip");
    }

    #[test]
    fn test_decode_event_key() {
        assert_eq!(decode_event_key("plain/key.gz"), "plain/key.gz");
        assert_eq!(decode_event_key("my+file.zip"), "my file.zip");
        assert_eq!(decode_event_key("a%2Bb.zip"), "a+b.zip");
        assert_eq!(decode_event_key("caf%C3%A9.gz"), "café.gz");
        // malformed escapes stay as written
        assert_eq!(decode_event_key("100%.zip"), "100%.zip");
        assert_eq!(decode_event_key("end%4"), "end%4");
        assert_eq!(decode_event_key("bad%zz"), "bad%zz");
        // invalid UTF-8 falls back to the raw key
        assert_eq!(decode_event_key("x%FF.gz"), "x%FF.gz");
    }

    #[test]
    fn test_event_without_records_fails_validation() {
        let request = S3Event::from_json("{}").unwrap().into_request();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_malformed_event_is_rejected() {
        assert!(S3Event::from_json(r#"{"Records": [{"s3": {}}]}"#).is_err());
    }

    #[test]
    fn test_direct_positional_args() {
        let request = DirectCommand {
            args: vec!["bucket".to_string(), "file.zip".to_string()],
            verbose: true,
            ..Default::default()
        }
        .into_request();

        assert_eq!(request.bucket, "bucket");
        assert_eq!(request.key, "file.zip");
        assert!(!request.delete_source_on_success);
        assert!(request.verbose);
    }

    #[test]
    fn test_direct_named_values_override_positional() {
        let request = DirectCommand {
            args: vec!["bucket".to_string(), "file.zip".to_string()],
            file: Some("other.gz".to_string()),
            delete_on_success: true,
            ..Default::default()
        }
        .into_request();

        assert_eq!(request.bucket, "bucket");
        assert_eq!(request.key, "other.gz");
        assert!(request.delete_source_on_success);
    }

    #[test]
    fn test_single_positional_arg_is_ignored() {
        let request = DirectCommand {
            args: vec!["bucket".to_string()],
            ..Default::default()
        }
        .into_request();

        assert!(request.bucket.is_empty());
        assert!(request.validate().is_err());
    }
}
