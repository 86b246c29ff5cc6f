//! SOAP Faults
//!
//! Codes are kept in their SOAP 1.2 form (`{soap12}Sender`, ...) and translated
//! when a fault is written as SOAP 1.1.

use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::errors::{SoapError, XmlError};
use crate::qname::QName;
use crate::soap::builder::{into_string, write_event, write_raw};
use crate::soap::{SOAP11_ENV_NS, SOAP12_ENV_NS, SoapVersion};
use crate::xml::{EventCopier, QuickXmlCursor, XmlCursor, XmlEvent};

/// Codes de fault standards (noms locaux SOAP 1.2)
pub mod fault_codes {
    pub const SENDER: &str = "Sender";
    pub const RECEIVER: &str = "Receiver";
    pub const VERSION_MISMATCH: &str = "VersionMismatch";
    pub const MUST_UNDERSTAND: &str = "MustUnderstand";
    pub const DATA_ENCODING_UNKNOWN: &str = "DataEncodingUnknown";
}

/// Erreur SOAP (Fault)
#[derive(Debug, Clone, PartialEq)]
pub struct SoapFault {
    pub code: QName,
    pub subcode: Option<QName>,
    pub reason: String,
    pub node: Option<String>,
    pub role: Option<String>,
    /// Contenu XML du détail, tel quel.
    pub detail: Option<String>,
}

impl SoapFault {
    pub fn new(code: QName, reason: impl Into<String>) -> Self {
        Self {
            code,
            subcode: None,
            reason: reason.into(),
            node: None,
            role: None,
            detail: None,
        }
    }

    /// Fault caused by the request (`Sender` / `Client`).
    pub fn sender(reason: impl Into<String>) -> Self {
        Self::new(QName::new(SOAP12_ENV_NS, fault_codes::SENDER), reason)
    }

    /// Fault caused by the service (`Receiver` / `Server`).
    pub fn receiver(reason: impl Into<String>) -> Self {
        Self::new(QName::new(SOAP12_ENV_NS, fault_codes::RECEIVER), reason)
    }

    pub fn with_subcode(mut self, subcode: QName) -> Self {
        self.subcode = Some(subcode);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_sender(&self) -> bool {
        matches!(
            (self.code.namespace.as_str(), self.code.local.as_str()),
            (SOAP12_ENV_NS, fault_codes::SENDER) | (SOAP11_ENV_NS, "Client")
        )
    }

    /// Parses a standalone `Fault` element.
    pub fn parse(xml: &str) -> Result<SoapFault, SoapError> {
        let mut cursor = QuickXmlCursor::new(xml);
        match cursor.next()? {
            XmlEvent::StartElement if cursor.name()?.local == "Fault" => Self::read(&mut cursor),
            _ => Err(SoapError::Malformed("expected a Fault element".into())),
        }
    }

    /// Reads the `Fault` element the cursor is positioned on.
    pub(crate) fn read(cursor: &mut QuickXmlCursor<'_>) -> Result<SoapFault, SoapError> {
        let mut fault = SoapFault::receiver(String::new());
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut detail: Option<String> = None;

        loop {
            match cursor.next()? {
                XmlEvent::StartElement => {
                    if matches!(path.as_slice(), [d] if d == "detail" || d == "Detail") {
                        let mut writer = Writer::new(Vec::new());
                        EventCopier::new(&mut writer).copy_subtree(cursor)?;
                        detail
                            .get_or_insert_with(String::new)
                            .push_str(&into_string(writer)?);
                        continue;
                    }
                    path.push(cursor.name()?.local);
                    text.clear();
                }
                XmlEvent::Characters => text.push_str(&cursor.text()?),
                XmlEvent::EndElement => {
                    if path.is_empty() {
                        break;
                    }
                    let value = text.trim();
                    match path.join("/").as_str() {
                        "faultcode" => {
                            // `Client` sans préfixe : code nu, rattaché à l'enveloppe plus bas
                            let code = if value.contains(':') {
                                cursor.resolve_text_qname(value)?
                            } else {
                                QName::local(value)
                            };
                            let (code, subcode) = from_soap11_code(code);
                            fault.code = code;
                            fault.subcode = subcode;
                        }
                        "faultstring" => fault.reason = value.to_string(),
                        "faultactor" => fault.role = Some(value.to_string()),
                        "Code/Value" => fault.code = cursor.resolve_text_qname(value)?,
                        "Code/Subcode/Value" => fault.subcode = Some(cursor.resolve_text_qname(value)?),
                        "Reason/Text" if fault.reason.is_empty() => fault.reason = value.to_string(),
                        "Node" => fault.node = Some(value.to_string()),
                        "Role" => fault.role = Some(value.to_string()),
                        "detail" | "Detail" if detail.is_none() && !value.is_empty() => {
                            detail = Some(escape(value).into_owned());
                        }
                        _ => {}
                    }
                    path.pop();
                    text.clear();
                }
                XmlEvent::StartDocument | XmlEvent::EndDocument => {
                    return Err(SoapError::Malformed("unterminated Fault element".into()));
                }
            }
        }

        fault.detail = detail;
        Ok(fault)
    }

    /// `Fault` element for `version`, declaring `prefix` itself.
    pub fn to_xml(&self, version: SoapVersion, prefix: &str) -> Result<String, XmlError> {
        let q = |local: &str| format!("{}:{}", prefix, local);
        let mut writer = Writer::new(Vec::new());

        let mut start = BytesStart::new(q("Fault"));
        start.push_attribute((
            format!("xmlns:{}", prefix).as_str(),
            version.envelope_namespace(),
        ));
        write_event(&mut writer, Event::Start(start))?;

        match version {
            SoapVersion::Soap11 => {
                let code = to_soap11_code(&self.code, self.subcode.as_ref());
                code_element(&mut writer, "faultcode", &code, prefix, SOAP11_ENV_NS)?;
                text_element(&mut writer, "faultstring", &self.reason, None)?;
                if let Some(actor) = self.role.as_ref().or(self.node.as_ref()) {
                    text_element(&mut writer, "faultactor", actor, None)?;
                }
                if let Some(detail) = &self.detail {
                    raw_element(&mut writer, "detail", detail)?;
                }
            }
            SoapVersion::Soap12 => {
                let code = to_soap12_code(&self.code);
                open(&mut writer, &q("Code"))?;
                code_element(&mut writer, &q("Value"), &code, prefix, SOAP12_ENV_NS)?;
                if let Some(subcode) = &self.subcode {
                    open(&mut writer, &q("Subcode"))?;
                    code_element(&mut writer, &q("Value"), subcode, prefix, SOAP12_ENV_NS)?;
                    close(&mut writer, &q("Subcode"))?;
                }
                close(&mut writer, &q("Code"))?;
                open(&mut writer, &q("Reason"))?;
                text_element(&mut writer, &q("Text"), &self.reason, Some(("xml:lang", "en")))?;
                close(&mut writer, &q("Reason"))?;
                if let Some(node) = &self.node {
                    text_element(&mut writer, &q("Node"), node, None)?;
                }
                if let Some(role) = &self.role {
                    text_element(&mut writer, &q("Role"), role, None)?;
                }
                if let Some(detail) = &self.detail {
                    raw_element(&mut writer, &q("Detail"), detail)?;
                }
            }
        }

        write_event(&mut writer, Event::End(BytesEnd::new(q("Fault"))))?;
        into_string(writer)
    }
}

impl From<&SoapError> for SoapFault {
    /// Fault returned to a caller whose request could not be handled.
    fn from(error: &SoapError) -> Self {
        match error {
            SoapError::Fault(fault) => (**fault).clone(),
            SoapError::VersionMismatch { .. } => SoapFault::new(
                QName::new(SOAP12_ENV_NS, fault_codes::VERSION_MISMATCH),
                error.to_string(),
            ),
            SoapError::Xml(_)
            | SoapError::Malformed(_)
            | SoapError::UnexpectedWrapper(_)
            | SoapError::UnknownOperation(_) => SoapFault::sender(error.to_string()),
            SoapError::Bus(_) => SoapFault::receiver(error.to_string()),
        }
    }
}

/// `{soap11}Client.Auth` → (`{soap12}Sender`, `Auth`).
///
/// An unqualified `Client`/`Server`/`VersionMismatch`/`MustUnderstand` is read
/// as the envelope code.
fn from_soap11_code(code: QName) -> (QName, Option<QName>) {
    let (main, sub) = match code.local.split_once('.') {
        Some((main, sub)) => (main.to_string(), Some(QName::local(sub))),
        None => (code.local.clone(), None),
    };
    let standard = matches!(
        main.as_str(),
        "Client" | "Server" | fault_codes::VERSION_MISMATCH | fault_codes::MUST_UNDERSTAND
    );
    if code.namespace != SOAP11_ENV_NS && !(code.namespace.is_empty() && standard) {
        return (code, None);
    }
    let local = match main.as_str() {
        "Client" => fault_codes::SENDER,
        "Server" => fault_codes::RECEIVER,
        other => other,
    };
    (QName::new(SOAP12_ENV_NS, local), sub)
}

/// `{soap12}Sender` + `Auth` → `{soap11}Client.Auth`.
fn to_soap11_code(code: &QName, subcode: Option<&QName>) -> QName {
    if code.namespace != SOAP12_ENV_NS {
        return code.clone();
    }
    let local = match code.local.as_str() {
        fault_codes::SENDER => "Client",
        fault_codes::RECEIVER | fault_codes::DATA_ENCODING_UNKNOWN => "Server",
        other => other,
    };
    match subcode {
        Some(sub) => QName::new(SOAP11_ENV_NS, format!("{}.{}", local, sub.local)),
        None => QName::new(SOAP11_ENV_NS, local),
    }
}

fn to_soap12_code(code: &QName) -> QName {
    if code.namespace == SOAP11_ENV_NS {
        from_soap11_code(code.clone()).0
    } else {
        code.clone()
    }
}

fn open(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), XmlError> {
    write_event(writer, Event::Start(BytesStart::new(name)))
}

fn close(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), XmlError> {
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
    attribute: Option<(&str, &str)>,
) -> Result<(), XmlError> {
    let mut start = BytesStart::new(name);
    if let Some(attr) = attribute {
        start.push_attribute(attr);
    }
    write_event(writer, Event::Start(start))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    close(writer, name)
}

fn raw_element(writer: &mut Writer<Vec<u8>>, name: &str, xml: &str) -> Result<(), XmlError> {
    open(writer, name)?;
    write_raw(writer, xml)?;
    close(writer, name)
}

/// Writes a QName-valued element. Envelope codes reuse `prefix`, other
/// namespaces get a local `fc` declaration.
fn code_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    code: &QName,
    prefix: &str,
    envelope_ns: &str,
) -> Result<(), XmlError> {
    if code.namespace == envelope_ns {
        text_element(writer, name, &format!("{}:{}", prefix, code.local), None)
    } else if code.namespace.is_empty() {
        text_element(writer, name, &code.local, None)
    } else {
        text_element(
            writer,
            name,
            &format!("fc:{}", code.local),
            Some(("xmlns:fc", code.namespace.as_str())),
        )
    }
}
