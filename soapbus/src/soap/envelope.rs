//! Enveloppe SOAP en mémoire.

use crate::errors::XmlError;
use crate::qname::QName;
use crate::soap::{SoapFault, SoapVersion};
use crate::xml::{QuickXmlCursor, XmlCursor, XmlEvent};

/// A SOAP envelope as read from, or written to, the wire.
///
/// Header blocks and the body element are kept as self-contained XML strings:
/// every prefix they use is declared inside the fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapMessage {
    pub version: SoapVersion,
    /// Prefix of the `Envelope` element, reused on replies.
    pub envelope_prefix: String,
    /// Namespace bindings in scope of the body (envelope and `Body` declarations).
    pub namespaces: Vec<(String, String)>,
    pub headers: Vec<(QName, String)>,
    pub body_name: Option<QName>,
    pub body: Option<String>,
    pub fault: Option<SoapFault>,
}

impl SoapMessage {
    pub fn new(version: SoapVersion) -> Self {
        let prefix = version.default_prefix();
        Self {
            version,
            envelope_prefix: prefix.to_string(),
            namespaces: vec![(prefix.to_string(), version.envelope_namespace().to_string())],
            headers: Vec::new(),
            body_name: None,
            body: None,
            fault: None,
        }
    }

    /// Empty envelope using the same version and prefix as `other`.
    pub fn reply_to(other: &SoapMessage) -> Self {
        Self {
            envelope_prefix: other.prefix().to_string(),
            ..Self::new(other.version)
        }
    }

    pub fn fault_message(version: SoapVersion, fault: SoapFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::new(version)
        }
    }

    /// Prefix written on the envelope elements.
    pub fn prefix(&self) -> &str {
        if self.envelope_prefix.is_empty() {
            self.version.default_prefix()
        } else {
            &self.envelope_prefix
        }
    }

    /// Sets the body from an XML fragment whose first element names the payload.
    pub fn set_body(&mut self, xml: impl Into<String>) -> Result<(), XmlError> {
        let xml = xml.into();
        let mut cursor = QuickXmlCursor::new(&xml);
        let name = match cursor.next()? {
            XmlEvent::StartElement => Some(cursor.name()?),
            _ => None,
        };
        self.body_name = name;
        self.body = if xml.trim().is_empty() { None } else { Some(xml) };
        Ok(())
    }

    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }

    pub fn header(&self, name: &QName) -> Option<&str> {
        self.headers
            .iter()
            .find(|(q, _)| q == name)
            .map(|(_, xml)| xml.as_str())
    }

    /// Adds a header block, replacing any block with the same name.
    pub fn set_header(&mut self, name: QName, xml: impl Into<String>) {
        let xml = xml.into();
        match self.headers.iter_mut().find(|(q, _)| *q == name) {
            Some(slot) => slot.1 = xml,
            None => self.headers.push((name, xml)),
        }
    }
}
