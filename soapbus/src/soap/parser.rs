//! Parsing SOAP en flux

use quick_xml::Writer;
use tracing::warn;

use crate::errors::{SoapError, XmlError};
use crate::qname::QName;
use crate::soap::builder::into_string;
use crate::soap::{SoapFault, SoapMessage, SoapVersion};
use crate::xml::{EventCopier, QuickXmlCursor, XmlCursor, XmlEvent};

/// Parse une enveloppe SOAP 1.1 ou 1.2
///
/// The version is taken from the envelope namespace. When `content_type` names
/// a SOAP version too, both must agree.
pub fn read_soap(bytes: &[u8], content_type: Option<&str>) -> Result<SoapMessage, SoapError> {
    let xml = std::str::from_utf8(bytes).map_err(|e| SoapError::Malformed(e.to_string()))?;
    let mut cursor = QuickXmlCursor::new(xml);

    if cursor.next()? != XmlEvent::StartElement {
        return Err(SoapError::Malformed("no root element".into()));
    }
    let root = cursor.name()?;
    if root.local != "Envelope" {
        return Err(SoapError::Malformed(format!("root element is {}", root)));
    }
    let version = SoapVersion::from_namespace(&root.namespace).ok_or_else(|| {
        SoapError::VersionMismatch {
            expected: "a SOAP envelope namespace".to_string(),
            found: root.namespace.clone(),
        }
    })?;
    if let Some(announced) = content_type.and_then(SoapVersion::from_content_type) {
        if announced != version {
            return Err(SoapError::VersionMismatch {
                expected: announced.to_string(),
                found: version.to_string(),
            });
        }
    }

    let mut message = SoapMessage::new(version);
    message.envelope_prefix = cursor.prefix()?.unwrap_or_default();
    message.namespaces = cursor.namespaces_in_scope();

    let env_ns = version.envelope_namespace();
    let mut seen_body = false;
    loop {
        match cursor.next()? {
            XmlEvent::Characters => skip_blank(&cursor)?,
            XmlEvent::StartElement => {
                let name = cursor.name()?;
                match name.local.as_str() {
                    "Header" if name.namespace == env_ns && !seen_body => {
                        message.headers = read_blocks(&mut cursor)?;
                    }
                    "Body" if name.namespace == env_ns && !seen_body => {
                        message.namespaces = cursor.namespaces_in_scope();
                        read_body(&mut cursor, &mut message)?;
                        seen_body = true;
                    }
                    _ => {
                        return Err(SoapError::Malformed(format!(
                            "unexpected element {} in Envelope",
                            name
                        )));
                    }
                }
            }
            XmlEvent::EndElement => break,
            other => {
                return Err(SoapError::Malformed(format!("unexpected {:?} in Envelope", other)));
            }
        }
    }

    if !seen_body {
        return Err(SoapError::Malformed("Envelope has no Body".into()));
    }
    Ok(message)
}

fn skip_blank(cursor: &QuickXmlCursor<'_>) -> Result<(), SoapError> {
    if cursor.text()?.trim().is_empty() {
        Ok(())
    } else {
        Err(SoapError::Malformed("unexpected text in envelope".into()))
    }
}

fn copy_element(cursor: &mut QuickXmlCursor<'_>) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    EventCopier::new(&mut writer).copy_subtree(cursor)?;
    into_string(writer)
}

/// Child elements of `Header`, each one self-contained.
fn read_blocks(cursor: &mut QuickXmlCursor<'_>) -> Result<Vec<(QName, String)>, SoapError> {
    let mut blocks = Vec::new();
    loop {
        match cursor.next()? {
            XmlEvent::Characters => skip_blank(cursor)?,
            XmlEvent::StartElement => {
                let name = cursor.name()?;
                blocks.push((name, copy_element(cursor)?));
            }
            XmlEvent::EndElement => return Ok(blocks),
            other => {
                return Err(SoapError::Malformed(format!("unexpected {:?} in Header", other)));
            }
        }
    }
}

fn read_body(cursor: &mut QuickXmlCursor<'_>, message: &mut SoapMessage) -> Result<(), SoapError> {
    let env_ns = message.version.envelope_namespace();
    loop {
        match cursor.next()? {
            XmlEvent::Characters => skip_blank(cursor)?,
            XmlEvent::StartElement => {
                let name = cursor.name()?;
                if message.body_name.is_some() || message.fault.is_some() {
                    warn!(element = %name, "⚠️ Extra SOAP body element ignored");
                    copy_element(cursor)?;
                } else if name.namespace == env_ns && name.local == "Fault" {
                    message.fault = Some(SoapFault::read(cursor)?);
                } else {
                    message.body = Some(copy_element(cursor)?);
                    message.body_name = Some(name);
                }
            }
            XmlEvent::EndElement => return Ok(()),
            other => {
                return Err(SoapError::Malformed(format!("unexpected {:?} in Body", other)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::{SOAP11_ENV_NS, SOAP12_ENV_NS};

    const GREET_ME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:t="http://apache.org/hello_world_soap_http/types">
  <soap:Header>
    <wsa:MessageID xmlns:wsa="http://www.w3.org/2005/08/addressing">urn:uuid:1</wsa:MessageID>
  </soap:Header>
  <soap:Body>
    <t:greetMe><t:requestType>Eugene</t:requestType></t:greetMe>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_parse_soap11_envelope() {
        let msg = read_soap(GREET_ME.as_bytes(), Some("text/xml; charset=UTF-8")).unwrap();

        assert_eq!(msg.version, SoapVersion::Soap11);
        assert_eq!(msg.envelope_prefix, "soap");
        assert_eq!(
            msg.body_name,
            Some(QName::new("http://apache.org/hello_world_soap_http/types", "greetMe"))
        );
        // le body redéclare le préfixe hérité de l'enveloppe
        assert_eq!(
            msg.body.as_deref(),
            Some(r#"<t:greetMe xmlns:t="http://apache.org/hello_world_soap_http/types"><t:requestType>Eugene</t:requestType></t:greetMe>"#)
        );
        assert_eq!(msg.headers.len(), 1);
        assert_eq!(msg.headers[0].0.local, "MessageID");
        assert!(msg.namespaces.iter().any(|(p, _)| p == "t"));
    }

    #[test]
    fn test_content_type_must_match_envelope() {
        let err = read_soap(GREET_ME.as_bytes(), Some("application/soap+xml")).unwrap_err();
        assert!(matches!(err, SoapError::VersionMismatch { .. }));
    }

    #[test]
    fn test_unknown_envelope_namespace() {
        let xml = r#"<e:Envelope xmlns:e="urn:not-soap"><e:Body/></e:Envelope>"#;
        assert!(matches!(
            read_soap(xml.as_bytes(), None),
            Err(SoapError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_envelopes() {
        assert!(read_soap(b"<notSoap/>", None).is_err());
        assert!(read_soap(b"garbage", None).is_err());
        let no_body = format!(r#"<s:Envelope xmlns:s="{}"></s:Envelope>"#, SOAP11_ENV_NS);
        assert!(matches!(
            read_soap(no_body.as_bytes(), None),
            Err(SoapError::Malformed(_))
        ));
        let truncated = format!(r#"<s:Envelope xmlns:s="{}"><s:Body><a>"#, SOAP11_ENV_NS);
        assert!(read_soap(truncated.as_bytes(), None).is_err());
    }

    #[test]
    fn test_parse_soap12_fault_envelope() {
        let xml = format!(
            r#"<env:Envelope xmlns:env="{}"><env:Body><env:Fault>
                <env:Code><env:Value>env:Sender</env:Value></env:Code>
                <env:Reason><env:Text xml:lang="en">Bad name</env:Text></env:Reason>
            </env:Fault></env:Body></env:Envelope>"#,
            SOAP12_ENV_NS
        );
        let msg = read_soap(xml.as_bytes(), Some("application/soap+xml; charset=utf-8")).unwrap();

        let fault = msg.fault.unwrap();
        assert!(fault.is_sender());
        assert_eq!(fault.reason, "Bad name");
        assert!(msg.body.is_none());
    }
}
