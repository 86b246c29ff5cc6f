//! # Module Wrapper
//!
//! Enveloppe canonique du bus autour des parts d'un message WSDL 1.1 :
//!
//! ```xml
//! <jbi:message xmlns:jbi="..." xmlns:msgns="..." type="msgns:Local" name="Local" version="1.0" ...>
//!   <jbi:part>...</jbi:part>
//! </jbi:message>
//! ```
//!
//! [`WrapperStreamCursor`] presents several part cursors as one virtual
//! document without buffering anything. Its progress is a plain
//! [`WrapperState`] value advanced by a pure transition function.
//! [`unwrap_parts`] is the reverse operation.

use quick_xml::Writer;
use tracing::trace;

use crate::errors::{SoapError, XmlError};
use crate::qname::QName;
use crate::soap::{SOAP11_ENV_NS, SOAP12_ENV_NS};
use crate::xml::{
    EventCopier, QuickXmlCursor, XmlAttribute, XmlCursor, XmlEvent, to_xml_string,
};

pub const JBI_NS: &str = "http://java.sun.com/xml/ns/jbi/wsdl-11-wrapper";
pub const JBI_PREFIX: &str = "jbi";
pub const JBI_MESSAGE: &str = "message";
pub const JBI_PART: &str = "part";
pub const JBI_VERSION: &str = "1.0";
pub const MSG_PREFIX: &str = "msgns";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Number of attributes every wrapper start tag carries.
pub const FIXED_ATTRIBUTES: usize = 7;

/// Position of a [`WrapperStreamCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    StartDoc,
    StartWrapper,
    StartPart { part: usize },
    /// Forwarding the events of sub-reader `reader` of `part`.
    RunPart { part: usize, reader: usize },
    EndPart { part: usize },
    EndWrapper,
    EndDoc,
}

impl WrapperState {
    /// Next state once the current one is exhausted.
    ///
    /// `shape[i]` is the number of sub-readers of part `i`. For `RunPart` this is
    /// the transition taken when the active sub-reader reaches its end.
    pub fn advance(self, shape: &[usize]) -> Result<WrapperState, XmlError> {
        let next = match self {
            WrapperState::StartDoc => WrapperState::StartWrapper,
            WrapperState::StartWrapper if shape.is_empty() => WrapperState::EndWrapper,
            WrapperState::StartWrapper => WrapperState::StartPart { part: 0 },
            WrapperState::StartPart { part } => match shape.get(part) {
                Some(0) | None => WrapperState::EndPart { part },
                Some(_) => WrapperState::RunPart { part, reader: 0 },
            },
            WrapperState::RunPart { part, reader } => {
                if reader + 1 < shape.get(part).copied().unwrap_or(0) {
                    WrapperState::RunPart {
                        part,
                        reader: reader + 1,
                    }
                } else {
                    WrapperState::EndPart { part }
                }
            }
            WrapperState::EndPart { part } if part + 1 < shape.len() => {
                WrapperState::StartPart { part: part + 1 }
            }
            WrapperState::EndPart { .. } => WrapperState::EndWrapper,
            WrapperState::EndWrapper => WrapperState::EndDoc,
            WrapperState::EndDoc => {
                return Err(XmlError::IllegalState(
                    "wrapper cursor is past the end of the document".into(),
                ));
            }
        };
        Ok(next)
    }

    /// Event reported while in a wrapper-owned state, `None` in `RunPart`.
    pub fn event(self) -> Option<XmlEvent> {
        match self {
            WrapperState::StartDoc => Some(XmlEvent::StartDocument),
            WrapperState::StartWrapper | WrapperState::StartPart { .. } => {
                Some(XmlEvent::StartElement)
            }
            WrapperState::EndPart { .. } | WrapperState::EndWrapper => Some(XmlEvent::EndElement),
            WrapperState::EndDoc => Some(XmlEvent::EndDocument),
            WrapperState::RunPart { .. } => None,
        }
    }

    fn element(self) -> Option<&'static str> {
        match self {
            WrapperState::StartWrapper | WrapperState::EndWrapper => Some(JBI_MESSAGE),
            WrapperState::StartPart { .. } | WrapperState::EndPart { .. } => Some(JBI_PART),
            _ => None,
        }
    }
}

/// Virtual `jbi:message` document over the cursors of every part.
pub struct WrapperStreamCursor<C: XmlCursor> {
    state: WrapperState,
    current: XmlEvent,
    message_type: QName,
    parts: Vec<Vec<C>>,
    shape: Vec<usize>,
    extra_namespaces: Vec<(String, String)>,
}

impl<C: XmlCursor> WrapperStreamCursor<C> {
    /// `envelope_namespaces` are the declarations found on the original
    /// envelope root. The ones that are not SOAP, schema or wrapper bindings are
    /// added to the wrapper start tag.
    pub fn new(
        message_type: QName,
        parts: Vec<Vec<C>>,
        envelope_namespaces: &[(String, String)],
    ) -> Self {
        let extra_namespaces = envelope_namespaces
            .iter()
            .filter(|(prefix, ns)| {
                !prefix.is_empty()
                    && ![JBI_PREFIX, MSG_PREFIX, "xsi", "xsd", "xml", "xmlns"]
                        .contains(&prefix.as_str())
                    && ![SOAP11_ENV_NS, SOAP12_ENV_NS, XSI_NS, XSD_NS, JBI_NS]
                        .contains(&ns.as_str())
            })
            .cloned()
            .collect();
        let shape = parts.iter().map(Vec::len).collect();
        Self {
            state: WrapperState::StartDoc,
            current: XmlEvent::StartDocument,
            message_type,
            parts,
            shape,
            extra_namespaces,
        }
    }

    pub fn state(&self) -> WrapperState {
        self.state
    }

    fn active(&self) -> Result<&C, XmlError> {
        match self.state {
            WrapperState::RunPart { part, reader } => Ok(&self.parts[part][reader]),
            other => Err(XmlError::IllegalState(format!("no active part reader in {:?}", other))),
        }
    }

    /// Pulls from the sub-readers until one yields an event of its own.
    fn pull(&mut self) -> Result<XmlEvent, XmlError> {
        loop {
            let WrapperState::RunPart { part, reader } = self.state else {
                return self.state.event().ok_or_else(|| {
                    XmlError::IllegalState(format!("no event in {:?}", self.state))
                });
            };
            let sub = &mut self.parts[part][reader];
            if sub.event() == XmlEvent::EndDocument {
                self.state = self.state.advance(&self.shape)?;
                continue;
            }
            match sub.next()? {
                XmlEvent::StartDocument => continue,
                XmlEvent::EndDocument => {
                    self.state = self.state.advance(&self.shape)?;
                }
                other => return Ok(other),
            }
        }
    }

    fn wrapper_attributes_count(&self) -> usize {
        FIXED_ATTRIBUTES + self.extra_namespaces.len()
    }

    fn wrapper_attribute(&self, index: usize) -> Result<XmlAttribute, XmlError> {
        let local = &self.message_type.local;
        let attr = match index {
            0 => XmlAttribute::namespace_decl(JBI_PREFIX, JBI_NS),
            1 => {
                if self.message_type.namespace.is_empty() {
                    return Err(XmlError::MissingMessageType("namespace"));
                }
                XmlAttribute::namespace_decl(MSG_PREFIX, &self.message_type.namespace)
            }
            2 | 3 if local.is_empty() => return Err(XmlError::MissingMessageType("name")),
            2 => XmlAttribute::plain("type", &format!("{}:{}", MSG_PREFIX, local)),
            3 => XmlAttribute::plain("name", local),
            4 => XmlAttribute::plain("version", JBI_VERSION),
            5 => XmlAttribute::namespace_decl("xsi", XSI_NS),
            6 => XmlAttribute::namespace_decl("xsd", XSD_NS),
            i => match self.extra_namespaces.get(i - FIXED_ATTRIBUTES) {
                Some((prefix, ns)) => XmlAttribute::namespace_decl(prefix, ns),
                None => {
                    return Err(XmlError::AttributeOutOfRange {
                        index,
                        count: self.wrapper_attributes_count(),
                    });
                }
            },
        };
        Ok(attr)
    }
}

impl<C: XmlCursor> XmlCursor for WrapperStreamCursor<C> {
    fn event(&self) -> XmlEvent {
        self.current
    }

    fn next(&mut self) -> Result<XmlEvent, XmlError> {
        // en RUN_PART, c'est la fin du sous-lecteur qui fait avancer l'état
        if !matches!(self.state, WrapperState::RunPart { .. }) {
            self.state = self.state.advance(&self.shape)?;
        }
        self.current = self.pull()?;
        trace!(state = ?self.state, event = ?self.current, "wrapper cursor");
        Ok(self.current)
    }

    fn name(&self) -> Result<QName, XmlError> {
        match self.state.element() {
            Some(local) => Ok(QName::new(JBI_NS, local)),
            None => self.active()?.name(),
        }
    }

    fn prefix(&self) -> Result<Option<String>, XmlError> {
        match self.state.element() {
            Some(_) => Ok(Some(JBI_PREFIX.to_string())),
            None => self.active()?.prefix(),
        }
    }

    fn text(&self) -> Result<String, XmlError> {
        self.active()?.text()
    }

    fn attribute_count(&self) -> Result<usize, XmlError> {
        match self.state {
            WrapperState::StartWrapper => Ok(self.wrapper_attributes_count()),
            WrapperState::StartPart { .. } => Ok(0),
            WrapperState::RunPart { .. } => self.active()?.attribute_count(),
            other => Err(XmlError::IllegalState(format!("no attributes in {:?}", other))),
        }
    }

    fn attribute(&self, index: usize) -> Result<XmlAttribute, XmlError> {
        match self.state {
            WrapperState::StartWrapper => self.wrapper_attribute(index),
            WrapperState::StartPart { .. } => {
                Err(XmlError::AttributeOutOfRange { index, count: 0 })
            }
            WrapperState::RunPart { .. } => self.active()?.attribute(index),
            other => Err(XmlError::IllegalState(format!("no attributes in {:?}", other))),
        }
    }
}

/// Wraps one XML fragment per part. Prefixes the fragments borrow from the
/// envelope are resolved through `envelope_namespaces`.
pub fn wrap_parts(
    message_type: &QName,
    parts: &[&str],
    envelope_namespaces: &[(String, String)],
) -> Result<String, XmlError> {
    let readers = parts
        .iter()
        .map(|xml| vec![QuickXmlCursor::with_namespaces(xml, envelope_namespaces.to_vec())])
        .collect();
    let mut cursor = WrapperStreamCursor::new(message_type.clone(), readers, envelope_namespaces);
    to_xml_string(&mut cursor)
}

/// True when `xml` starts with a `jbi:message` element.
pub fn is_wrapped(xml: &str) -> bool {
    let mut cursor = QuickXmlCursor::new(xml);
    matches!(cursor.next(), Ok(XmlEvent::StartElement))
        && cursor.name().is_ok_and(|n| n == QName::new(JBI_NS, JBI_MESSAGE))
}

/// Inner XML of every `jbi:part` of a wrapped payload.
///
/// `expected` is the number of parts of the WSDL message, when known.
pub fn unwrap_parts(xml: &str, expected: Option<usize>) -> Result<Vec<String>, SoapError> {
    let mut cursor = QuickXmlCursor::new(xml);
    if cursor.next()? != XmlEvent::StartElement || cursor.name()? != QName::new(JBI_NS, JBI_MESSAGE)
    {
        return Err(SoapError::UnexpectedWrapper(format!(
            "expected {{{}}}{}",
            JBI_NS, JBI_MESSAGE
        )));
    }

    let mut parts = Vec::new();
    loop {
        match cursor.next()? {
            XmlEvent::Characters if cursor.text()?.trim().is_empty() => continue,
            XmlEvent::StartElement if cursor.name()? == QName::new(JBI_NS, JBI_PART) => {
                parts.push(read_part(&mut cursor)?);
            }
            XmlEvent::EndElement => break,
            XmlEvent::StartElement => {
                return Err(SoapError::UnexpectedWrapper(format!(
                    "unexpected element {} in wrapper",
                    cursor.name()?
                )));
            }
            other => {
                return Err(SoapError::UnexpectedWrapper(format!(
                    "unexpected {:?} in wrapper",
                    other
                )));
            }
        }
    }

    if let Some(n) = expected {
        if n != parts.len() {
            return Err(SoapError::UnexpectedWrapper(format!(
                "expected {} part(s), found {}",
                n,
                parts.len()
            )));
        }
    }
    Ok(parts)
}

/// Copies the content of the `jbi:part` the cursor is positioned on.
fn read_part(cursor: &mut QuickXmlCursor<'_>) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    let mut copier = EventCopier::new(&mut writer);
    loop {
        match cursor.next()? {
            XmlEvent::EndElement if copier.depth() == 0 => break,
            XmlEvent::EndDocument => {
                return Err(XmlError::Malformed("unterminated jbi:part".into()));
            }
            _ => copier.copy_current(cursor)?,
        }
    }
    let xml = String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))?;
    Ok(xml.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::tests::events;

    const TYPES: &str = "http://apache.org/hello_world_soap_http/types";

    fn greet_me_type() -> QName {
        QName::new("http://apache.org/hello_world_soap_http", "greetMeRequest")
    }

    #[test]
    fn test_state_machine_without_parts() {
        let shape: [usize; 0] = [];
        let mut state = WrapperState::StartDoc;
        let mut visited = vec![state];
        while state != WrapperState::EndDoc {
            state = state.advance(&shape).unwrap();
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![
                WrapperState::StartDoc,
                WrapperState::StartWrapper,
                WrapperState::EndWrapper,
                WrapperState::EndDoc
            ]
        );
        assert!(state.advance(&shape).is_err());
    }

    #[test]
    fn test_state_machine_walks_parts_and_readers() {
        let shape = [2, 0];
        let s = WrapperState::StartWrapper.advance(&shape).unwrap();
        assert_eq!(s, WrapperState::StartPart { part: 0 });
        let s = s.advance(&shape).unwrap();
        assert_eq!(s, WrapperState::RunPart { part: 0, reader: 0 });
        let s = s.advance(&shape).unwrap();
        assert_eq!(s, WrapperState::RunPart { part: 0, reader: 1 });
        let s = s.advance(&shape).unwrap();
        assert_eq!(s, WrapperState::EndPart { part: 0 });
        let s = s.advance(&shape).unwrap();
        assert_eq!(s, WrapperState::StartPart { part: 1 });
        // une part sans lecteur se ferme tout de suite
        let s = s.advance(&shape).unwrap();
        assert_eq!(s, WrapperState::EndPart { part: 1 });
        assert_eq!(s.advance(&shape).unwrap(), WrapperState::EndWrapper);
    }

    #[test]
    fn test_wrapped_document_attributes_in_order() {
        let body = format!(r#"<greetMe xmlns="{}"><requestType>Eugene</requestType></greetMe>"#, TYPES);
        let xml = wrap_parts(&greet_me_type(), &[body.as_str()], &[]).unwrap();

        assert_eq!(
            xml,
            format!(
                concat!(
                    r#"<jbi:message xmlns:jbi="http://java.sun.com/xml/ns/jbi/wsdl-11-wrapper" "#,
                    r#"xmlns:msgns="http://apache.org/hello_world_soap_http" type="msgns:greetMeRequest" "#,
                    r#"name="greetMeRequest" version="1.0" "#,
                    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
                    r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#,
                    r#"<jbi:part>{}</jbi:part></jbi:message>"#
                ),
                body
            )
        );
    }

    #[test]
    fn test_extra_envelope_prefixes_follow_fixed_attributes() {
        let envelope_ns = vec![
            ("soap".to_string(), SOAP11_ENV_NS.to_string()),
            ("xsd".to_string(), XSD_NS.to_string()),
            ("t".to_string(), TYPES.to_string()),
        ];
        let readers = vec![vec![QuickXmlCursor::with_namespaces("<t:greetMe/>", envelope_ns.clone())]];
        let mut cursor = WrapperStreamCursor::new(greet_me_type(), readers, &envelope_ns);

        assert_eq!(cursor.next().unwrap(), XmlEvent::StartElement);
        assert_eq!(cursor.attribute_count().unwrap(), FIXED_ATTRIBUTES + 1);
        let extra = cursor.attribute(FIXED_ATTRIBUTES).unwrap();
        assert_eq!(extra.declared_prefix(), Some("t"));
        assert!(matches!(
            cursor.attribute(FIXED_ATTRIBUTES + 1),
            Err(XmlError::AttributeOutOfRange { index: 8, count: 8 })
        ));

        assert_eq!(cursor.next().unwrap(), XmlEvent::StartElement);
        assert_eq!(cursor.state(), WrapperState::StartPart { part: 0 });
        assert_eq!(cursor.attribute_count().unwrap(), 0);
        assert!(cursor.attribute(0).is_err());

        assert_eq!(cursor.next().unwrap(), XmlEvent::StartElement);
        assert_eq!(cursor.name().unwrap(), QName::new(TYPES, "greetMe"));
    }

    #[test]
    fn test_empty_message_type_is_rejected() {
        let mut cursor: WrapperStreamCursor<QuickXmlCursor<'_>> =
            WrapperStreamCursor::new(QName::local("greetMeRequest"), Vec::new(), &[]);
        cursor.next().unwrap();
        assert!(cursor.attribute(0).is_ok());
        assert!(matches!(
            cursor.attribute(1),
            Err(XmlError::MissingMessageType("namespace"))
        ));

        let mut cursor: WrapperStreamCursor<QuickXmlCursor<'_>> =
            WrapperStreamCursor::new(QName::new("urn:x", ""), Vec::new(), &[]);
        cursor.next().unwrap();
        assert!(matches!(
            cursor.attribute(3),
            Err(XmlError::MissingMessageType("name"))
        ));
    }

    #[test]
    fn test_zero_parts_wrap_to_an_empty_wrapper() {
        let mut cursor: WrapperStreamCursor<QuickXmlCursor<'_>> =
            WrapperStreamCursor::new(greet_me_type(), Vec::new(), &[]);
        let mut states = Vec::new();
        while cursor.next().unwrap() != XmlEvent::EndDocument {
            states.push(cursor.state());
        }
        assert_eq!(states, vec![WrapperState::StartWrapper, WrapperState::EndWrapper]);

        let xml = wrap_parts(&greet_me_type(), &[], &[]).unwrap();
        assert!(unwrap_parts(&xml, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn test_wrapping_preserves_part_events() {
        let parts = [
            r#"<a:first xmlns:a="urn:a"><v>1</v></a:first>"#,
            "<second>two</second>",
        ];
        let xml = wrap_parts(&greet_me_type(), &parts, &[]).unwrap();

        let direct: Vec<_> = parts
            .iter()
            .flat_map(|p| {
                let mut evs = events(&mut QuickXmlCursor::new(p));
                evs.pop();
                evs
            })
            .collect();
        let wrapped = events(&mut QuickXmlCursor::new(&xml));
        let jbi = |name: &str| name.starts_with(&format!("{{{}}}", JBI_NS));
        let inner: Vec<_> = wrapped
            .iter()
            .filter(|(ev, name)| *ev != XmlEvent::EndDocument && !jbi(name))
            .cloned()
            .collect();
        assert_eq!(inner, direct);
        assert_eq!(wrapped.iter().filter(|(_, n)| n.ends_with("}message")).count(), 2);

        let unwrapped = unwrap_parts(&xml, Some(2)).unwrap();
        assert_eq!(unwrapped[1], "<second>two</second>");
    }

    #[test]
    fn test_unwrap_rejects_foreign_payloads() {
        assert!(matches!(
            unwrap_parts("<greetMe/>", None),
            Err(SoapError::UnexpectedWrapper(_))
        ));

        let xml = wrap_parts(&greet_me_type(), &["<a/>"], &[]).unwrap();
        assert!(matches!(
            unwrap_parts(&xml, Some(2)),
            Err(SoapError::UnexpectedWrapper(_))
        ));
        assert!(is_wrapped(&xml));
        assert!(!is_wrapped("<a/>"));
    }
}
