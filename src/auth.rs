//! Builds the authentication dictionary sent as the sole argument to
//! INIT/HELLO.

use crate::value::Value;

/// Recognized authentication shapes. `Other` passes an arbitrary dictionary
/// through verbatim, for servers with custom auth schemes this core does not
/// need to understand.
#[derive(Debug, Clone)]
pub enum Auth {
    Basic {
        principal: String,
        credentials: String,
        realm: Option<String>,
    },
    None,
    Other(Vec<(String, Value)>),
}

impl Auth {
    pub fn basic(principal: impl Into<String>, credentials: impl Into<String>) -> Self {
        Auth::Basic {
            principal: principal.into(),
            credentials: credentials.into(),
            realm: None,
        }
    }

    pub fn to_dict(&self) -> Vec<(String, Value)> {
        match self {
            Auth::Basic {
                principal,
                credentials,
                realm,
            } => {
                let mut pairs = vec![
                    ("scheme".to_string(), Value::string("basic")),
                    ("principal".to_string(), Value::string(principal)),
                    ("credentials".to_string(), Value::string(credentials)),
                ];
                if let Some(realm) = realm {
                    pairs.push(("realm".to_string(), Value::string(realm)));
                }
                pairs
            }
            Auth::None => vec![("scheme".to_string(), Value::string("none"))],
            Auth::Other(pairs) => pairs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_carries_required_keys() {
        let dict = Auth::basic("neo4j", "secret").to_dict();
        let value = Value::Dictionary(dict);
        assert_eq!(value.dictionary_lookup("scheme").unwrap().as_str(), Some("basic"));
        assert_eq!(value.dictionary_lookup("principal").unwrap().as_str(), Some("neo4j"));
        assert_eq!(value.dictionary_lookup("credentials").unwrap().as_str(), Some("secret"));
    }

    #[test]
    fn none_auth_omits_principal_and_credentials() {
        let value = Value::Dictionary(Auth::None.to_dict());
        assert_eq!(value.dictionary_lookup("scheme").unwrap().as_str(), Some("none"));
        assert!(value.dictionary_lookup("principal").is_none());
    }
}
