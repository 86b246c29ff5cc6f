//! Écriture des enveloppes SOAP.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::errors::{SoapError, XmlError};
use crate::soap::SoapMessage;

pub(crate) fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

/// Writes an already serialized fragment as is.
pub(crate) fn write_raw(writer: &mut Writer<Vec<u8>>, xml: &str) -> Result<(), XmlError> {
    write_event(writer, Event::Text(BytesText::from_escaped(xml)))
}

pub(crate) fn into_string(writer: Writer<Vec<u8>>) -> Result<String, XmlError> {
    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
}

impl SoapMessage {
    /// Serializes the envelope. The output only depends on the message content.
    pub fn to_xml(&self) -> Result<String, SoapError> {
        let prefix = self.prefix();
        let envelope = format!("{}:Envelope", prefix);
        let header = format!("{}:Header", prefix);
        let body = format!("{}:Body", prefix);
        let mut writer = Writer::new(Vec::new());

        write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut start = BytesStart::new(envelope.as_str());
        start.push_attribute((
            format!("xmlns:{}", prefix).as_str(),
            self.version.envelope_namespace(),
        ));
        write_event(&mut writer, Event::Start(start))?;

        if !self.headers.is_empty() {
            write_event(&mut writer, Event::Start(BytesStart::new(header.as_str())))?;
            for (_, xml) in &self.headers {
                write_raw(&mut writer, xml)?;
            }
            write_event(&mut writer, Event::End(BytesEnd::new(header.as_str())))?;
        }

        write_event(&mut writer, Event::Start(BytesStart::new(body.as_str())))?;
        if let Some(fault) = &self.fault {
            write_raw(&mut writer, &fault.to_xml(self.version, prefix)?)?;
        } else if let Some(xml) = &self.body {
            write_raw(&mut writer, xml)?;
        }
        write_event(&mut writer, Event::End(BytesEnd::new(body.as_str())))?;
        write_event(&mut writer, Event::End(BytesEnd::new(envelope.as_str())))?;

        Ok(into_string(writer)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SoapError> {
        self.to_xml().map(String::into_bytes)
    }
}
