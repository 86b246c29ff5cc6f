use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::qname::QName;

/// Property holding the transport headers (`name -> value` JSON object).
pub const PROTOCOL_HEADERS: &str = "protocol.headers";
/// Property overriding the remote location of a provider endpoint.
pub const HTTP_LOCATION: &str = "http.location";
/// Property holding the SOAP headers of a message (`{ns}local -> raw XML`).
pub const SOAP_HEADERS: &str = "soap.headers";

/// Bus-internal payload: XML content plus properties and attachments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedMessage {
    pub content: Option<String>,
    pub properties: HashMap<String, Value>,
    pub attachments: HashMap<String, Vec<u8>>,
}

impl NormalizedMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }

    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    /// Transport headers carried by this message, sorted by name.
    pub fn protocol_headers(&self) -> BTreeMap<String, String> {
        string_map(self.properties.get(PROTOCOL_HEADERS))
    }

    pub fn set_protocol_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: Map<String, Value> = headers
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        self.properties
            .insert(PROTOCOL_HEADERS.to_string(), Value::Object(map));
    }

    /// SOAP headers carried by this message, keyed by qualified name.
    pub fn soap_headers(&self) -> Vec<(QName, String)> {
        string_map(self.properties.get(SOAP_HEADERS))
            .into_iter()
            .filter_map(|(k, v)| k.parse::<QName>().ok().map(|q| (q, v)))
            .collect()
    }

    pub fn set_soap_headers(&mut self, headers: &[(QName, String)]) {
        if headers.is_empty() {
            self.properties.remove(SOAP_HEADERS);
            return;
        }
        let map: Map<String, Value> = headers
            .iter()
            .map(|(q, xml)| (q.to_string(), Value::String(xml.clone())))
            .collect();
        self.properties
            .insert(SOAP_HEADERS.to_string(), Value::Object(map));
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k.clone(), s.clone())),
                Value::Null => None,
                other => Some((k.clone(), other.to_string())),
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Fault carried by an exchange.
///
/// `message` holds the fault detail as content, the other fields mirror the SOAP
/// fault they were read from (or will be written to).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fault {
    pub message: NormalizedMessage,
    pub code: Option<QName>,
    pub subcode: Option<QName>,
    pub reason: Option<String>,
    pub node: Option<String>,
    pub role: Option<String>,
}

impl Fault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.message.content = Some(detail.into());
        self
    }

    pub fn with_code(mut self, code: QName) -> Self {
        self.code = Some(code);
        self
    }
}
