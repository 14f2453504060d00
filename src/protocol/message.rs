//! Builders that turn connection-level calls into the structures the wire
//! protocol expects. Each returns a `Value::Structure` ready for the
//! PackStream encoder; callers never build these by hand.

use crate::auth::Auth;
use crate::protocol::{tags, Version};
use crate::value::Value;

fn dict(pairs: Vec<(&str, Value)>) -> Value {
    Value::dict(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// `INIT`/`HELLO` — same wire shape across all three versions: one
/// dictionary merging `user_agent` with the auth token's fields.
pub fn init(version: Version, user_agent: &str, auth: &Auth) -> Value {
    let tag = if version == Version::V3 { tags::HELLO } else { tags::INIT };
    let mut fields = vec![("user_agent".to_string(), Value::string(user_agent))];
    fields.extend(auth.to_dict());
    Value::structure(tag, vec![Value::dict(fields)])
}

/// Optional transaction metadata carried by `RUN` (all versions) and
/// `BEGIN` (v3). Absent fields are omitted rather than sent as null.
#[derive(Debug, Clone, Default)]
pub struct TxMetadata {
    pub tx_timeout_ms: Option<i64>,
    pub tx_metadata: Option<Vec<(String, Value)>>,
    pub bookmarks: Vec<String>,
    pub read_mode: bool,
}

impl TxMetadata {
    fn into_dict(self) -> Value {
        let mut pairs = Vec::new();
        if !self.bookmarks.is_empty() {
            pairs.push((
                "bookmarks".to_string(),
                Value::list(self.bookmarks.into_iter().map(Value::string).collect()),
            ));
        }
        if let Some(timeout) = self.tx_timeout_ms {
            pairs.push(("tx_timeout".to_string(), Value::from(timeout)));
        }
        if let Some(metadata) = self.tx_metadata {
            pairs.push(("tx_metadata".to_string(), Value::dict(metadata)));
        }
        if self.read_mode {
            pairs.push(("mode".to_string(), Value::string("r")));
        }
        Value::dict(pairs)
    }
}

/// `RUN(cypher, parameters[, metadata])`. The trailing metadata field is a
/// v3 addition (seabolt builds v1/v2 RUN with exactly 2 fields via
/// `BoltMessage_create(BOLT_V1_RUN, 2)`, v3 with 3 via
/// `BoltMessage_create(BOLT_V3_RUN, 3)`); v1/v2 connections drop `metadata`
/// entirely rather than sending it as an empty dictionary.
pub fn run(version: Version, cypher: &str, parameters: Vec<(String, Value)>, metadata: TxMetadata) -> Value {
    let mut fields = vec![Value::string(cypher), Value::dict(parameters)];
    if version == Version::V3 {
        fields.push(metadata.into_dict());
    }
    Value::structure(tags::RUN, fields)
}

pub fn pull_all() -> Value {
    Value::structure(tags::PULL_ALL, Vec::new())
}

pub fn discard_all() -> Value {
    Value::structure(tags::DISCARD_ALL, Vec::new())
}

/// `BEGIN` (v3 only); v1/v2 express transaction control as
/// `RUN("BEGIN", {})` followed by `DISCARD_ALL`, built by the caller from
/// the primitives above.
pub fn begin(metadata: TxMetadata) -> Value {
    Value::structure(tags::BEGIN, vec![metadata.into_dict()])
}

pub fn commit() -> Value {
    Value::structure(tags::COMMIT, Vec::new())
}

pub fn rollback() -> Value {
    Value::structure(tags::ROLLBACK, Vec::new())
}

pub fn reset() -> Value {
    Value::structure(tags::RESET, Vec::new())
}

pub fn ack_failure() -> Value {
    Value::structure(tags::ACK_FAILURE, Vec::new())
}

/// `GOODBYE` (v3 only); fire-and-forget, no reply expected.
pub fn goodbye() -> Value {
    Value::structure(tags::GOODBYE, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_merges_user_agent_and_auth() {
        let msg = init(Version::V3, "bolt-core/0.1", &Auth::basic("neo4j", "pw"));
        let (tag, fields) = msg.as_structure().unwrap();
        assert_eq!(tag, tags::HELLO);
        let dict = &fields[0];
        assert_eq!(dict.dictionary_lookup("user_agent").unwrap().as_str(), Some("bolt-core/0.1"));
        assert_eq!(dict.dictionary_lookup("scheme").unwrap().as_str(), Some("basic"));
    }

    #[test]
    fn run_without_metadata_encodes_empty_dict_on_v3() {
        let msg = run(Version::V3, "RETURN 1", Vec::new(), TxMetadata::default());
        let (tag, fields) = msg.as_structure().unwrap();
        assert_eq!(tag, tags::RUN);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2], Value::dict(Vec::new()));
    }

    #[test]
    fn run_read_mode_sets_mode_r() {
        let metadata = TxMetadata { read_mode: true, ..Default::default() };
        let msg = run(Version::V3, "RETURN 1", Vec::new(), metadata);
        let (_, fields) = msg.as_structure().unwrap();
        assert_eq!(fields[2].dictionary_lookup("mode").unwrap().as_str(), Some("r"));
    }

    #[test]
    fn run_on_v1_omits_the_metadata_field() {
        let msg = run(Version::V1, "RETURN 1", Vec::new(), TxMetadata::default());
        let (tag, fields) = msg.as_structure().unwrap();
        assert_eq!(tag, tags::RUN);
        assert_eq!(fields.len(), 2);
    }
}
