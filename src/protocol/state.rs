//! Per-connection protocol state: request/response correlation counters and
//! the metadata a summary message folds into the connection.

use crate::error::{ErrorCode, Result};
use crate::protocol::tags;
use crate::value::Value;

/// What a summary message reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Success,
    Ignored,
    Failure,
}

/// What the fetch loop found for one decoded message. A summary carries its
/// metadata dictionary along so the caller can merge it in receive order,
/// after deciding (from the surrounding fetch state) what it means for the
/// connection's status.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Record(Vec<Value>),
    Summary(SummaryKind, Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureData {
    pub code: String,
    pub message: String,
}

/// Tracks request/response correlation and the metadata summaries merge in.
/// Request ids are zero-based; `response_counter` names the index of the
/// request currently streaming (the one whose summary has not yet arrived).
#[derive(Debug, Default)]
pub struct Protocol {
    next_request_id: u64,
    response_counter: u64,
    pub fields: Vec<String>,
    pub bookmark: Option<String>,
    pub server: Option<String>,
    pub connection_id: Option<String>,
    pub failure_data: Option<FailureData>,
    pub result_metadata: Vec<(String, Value)>,
}

impl Protocol {
    pub fn new() -> Self {
        Protocol::default()
    }

    /// Assigns the next strictly increasing request id.
    pub fn load_request(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// The most recently assigned request id, if any request has been loaded.
    pub fn last_request(&self) -> Option<u64> {
        self.next_request_id.checked_sub(1)
    }

    pub fn response_counter(&self) -> u64 {
        self.response_counter
    }

    /// Classifies a decoded response structure by tag. Summaries carry their
    /// metadata dictionary (the empty dictionary for `IGNORED`, which has no
    /// fields on the wire).
    pub fn classify(&self, tag: i8, mut fields: Vec<Value>) -> Result<Classified> {
        match tag {
            tags::RECORD => {
                let record = fields
                    .pop()
                    .ok_or_else(|| err_protocol!("RECORD message missing its fields list"))?;
                let record = record
                    .as_list()
                    .ok_or_else(|| err_protocol!("RECORD field 0 is not a list"))?
                    .to_vec();
                Ok(Classified::Record(record))
            }
            tags::SUCCESS => {
                let metadata = fields.pop().unwrap_or_else(|| Value::dict(Vec::new()));
                Ok(Classified::Summary(SummaryKind::Success, metadata))
            }
            tags::FAILURE => {
                let metadata = fields.pop().unwrap_or_else(|| Value::dict(Vec::new()));
                Ok(Classified::Summary(SummaryKind::Failure, metadata))
            }
            tags::IGNORED => Ok(Classified::Summary(SummaryKind::Ignored, Value::dict(Vec::new()))),
            other => Err(bolt_err!(
                ErrorCode::ProtocolUnsupportedType,
                "unexpected response marker tag {:#04x}",
                other
            )),
        }
    }

    /// Merges a summary's metadata dictionary into connection state and
    /// advances the response counter. Called once per summary, in receive
    /// order.
    pub fn merge_summary(&mut self, kind: SummaryKind, metadata: &Value) -> Result<()> {
        let pairs = match metadata {
            Value::Dictionary(pairs) => pairs.as_slice(),
            _ => &[],
        };

        for (key, value) in pairs {
            match key.as_str() {
                "bookmark" => {
                    self.bookmark = value.as_str().map(str::to_owned);
                }
                "fields" => {
                    self.fields = value
                        .as_list()
                        .unwrap_or(&[])
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect();
                }
                "server" => {
                    self.server = value.as_str().map(str::to_owned);
                }
                "connection_id" => {
                    if self.connection_id.is_none() {
                        self.connection_id = value.as_str().map(str::to_owned);
                    }
                }
                "code" | "message" => {
                    // handled together below once both are known
                }
                _ => {
                    self.result_metadata.push((key.clone(), value.clone()));
                }
            }
        }

        if kind == SummaryKind::Failure {
            let code = metadata
                .dictionary_lookup("code")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let message = metadata
                .dictionary_lookup("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            self.failure_data = Some(FailureData { code, message });
        }

        self.response_counter += 1;
        Ok(())
    }

    /// Clears failure state; only a successful RESET does this.
    pub fn clear_failure(&mut self) {
        self.failure_data = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_zero_based_and_increasing() {
        let mut p = Protocol::new();
        assert_eq!(p.load_request(), 0);
        assert_eq!(p.load_request(), 1);
        assert_eq!(p.last_request(), Some(1));
    }

    #[test]
    fn merge_success_sets_fields_and_advances_counter() {
        let mut p = Protocol::new();
        let meta = Value::dict(vec![(
            "fields".to_string(),
            Value::list(vec![Value::string("n")]),
        )]);
        p.merge_summary(SummaryKind::Success, &meta).unwrap();
        assert_eq!(p.fields, vec!["n".to_string()]);
        assert_eq!(p.response_counter(), 1);
    }

    #[test]
    fn merge_failure_populates_failure_data_and_clears_on_reset() {
        let mut p = Protocol::new();
        let meta = Value::dict(vec![
            ("code".to_string(), Value::string("Neo.ClientError.Foo")),
            ("message".to_string(), Value::string("bad")),
        ]);
        p.merge_summary(SummaryKind::Failure, &meta).unwrap();
        assert!(p.failure_data.is_some());
        p.clear_failure();
        assert!(p.failure_data.is_none());
    }

    #[test]
    fn unknown_keys_go_to_result_metadata() {
        let mut p = Protocol::new();
        let meta = Value::dict(vec![("type".to_string(), Value::string("r"))]);
        p.merge_summary(SummaryKind::Success, &meta).unwrap();
        assert_eq!(p.result_metadata, vec![("type".to_string(), Value::string("r"))]);
    }
}
