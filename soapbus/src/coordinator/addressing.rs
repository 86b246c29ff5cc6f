//! WS-Addressing

use quick_xml::escape::escape;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::coordinator::{Context, Policy};
use crate::errors::XmlError;
use crate::qname::QName;
use crate::soap::{SoapFault, SoapMessage};
use crate::xml::{QuickXmlCursor, XmlCursor, XmlEvent};

/// Versions reconnues : 2003/03, 2004/03, 2004/08 et la recommandation 2005/08.
pub const WSA_NAMESPACES: [&str; 4] = [
    "http://schemas.xmlsoap.org/ws/2003/03/addressing",
    "http://schemas.xmlsoap.org/ws/2004/03/addressing",
    "http://schemas.xmlsoap.org/ws/2004/08/addressing",
    "http://www.w3.org/2005/08/addressing",
];

/// Context property holding the `MessageID` of the request.
pub const MESSAGE_ID_PROPERTY: &str = "wsa.message_id";

/// Routes on the `Action` and `To` headers and correlates replies.
///
/// - `Action` = `{ns}/{interface}/{operation}` sets interface and operation.
/// - `To` = `{ns}/{service}/{endpoint}` sets service and endpoint.
/// - A request `MessageID` gives the reply a fresh `MessageID` and a `RelatesTo`.
#[derive(Debug, Default, Clone)]
pub struct AddressingPolicy;

impl AddressingPolicy {
    pub fn new() -> Self {
        Self
    }
}

/// Splits `a/b/c` (or `a:b:c` when there is no slash) on its last two separators.
fn split3(uri: &str) -> Option<(String, String, String)> {
    let sep = if uri.contains('/') { '/' } else { ':' };
    let mut it = uri.trim().rsplitn(3, sep);
    let last = it.next()?;
    let middle = it.next()?;
    let first = it.next()?;
    if first.is_empty() || middle.is_empty() || last.is_empty() {
        return None;
    }
    Some((first.to_string(), middle.to_string(), last.to_string()))
}

fn header_text(xml: &str) -> Result<String, XmlError> {
    let mut cursor = QuickXmlCursor::new(xml);
    let mut text = String::new();
    while cursor.next()? != XmlEvent::EndDocument {
        if cursor.event() == XmlEvent::Characters {
            text.push_str(&cursor.text()?);
        }
    }
    Ok(text.trim().to_string())
}

fn header(ns: &str, local: &str, text: &str) -> (QName, String) {
    (
        QName::new(ns, local),
        format!(
            r#"<wsa:{local} xmlns:wsa="{ns}">{}</wsa:{local}>"#,
            escape(text),
            local = local,
            ns = ns
        ),
    )
}

/// Namespace and value of the request `MessageID`.
fn request_message_id(ctx: &Context) -> Option<(String, String)> {
    let request = ctx.request.as_ref()?;
    let (name, xml) = request
        .headers
        .iter()
        .find(|(q, _)| q.local == "MessageID" && WSA_NAMESPACES.contains(&q.namespace.as_str()))?;
    let id = header_text(xml).ok().filter(|id| !id.is_empty())?;
    Some((name.namespace.clone(), id))
}

impl Policy for AddressingPolicy {
    fn on_receive(&self, ctx: &mut Context) -> Result<(), SoapFault> {
        let Some(request) = &ctx.request else {
            return Ok(());
        };

        let mut wsa_ns: Option<&str> = None;
        for (name, xml) in &request.headers {
            if !WSA_NAMESPACES.contains(&name.namespace.as_str()) {
                continue;
            }
            match wsa_ns {
                Some(ns) if ns != name.namespace => {
                    return Err(SoapFault::sender(format!(
                        "Inconsistent WS-Addressing versions: {} and {}",
                        ns, name.namespace
                    )));
                }
                _ => wsa_ns = Some(&name.namespace),
            }

            let text = header_text(xml).map_err(|e| SoapFault::sender(e.to_string()))?;
            match name.local.as_str() {
                "Action" => match split3(&text) {
                    Some((ns, interface, operation)) => {
                        ctx.interface_name = Some(QName::new(ns.clone(), interface));
                        ctx.operation = Some(QName::new(ns, operation));
                    }
                    None => debug!(action = %text, "🔀 wsa:Action not usable for routing"),
                },
                "To" => match split3(&text) {
                    Some((ns, service, endpoint)) => {
                        ctx.service = Some(QName::new(ns, service));
                        ctx.endpoint = Some(endpoint);
                    }
                    None => debug!(to = %text, "🔀 wsa:To not usable for routing"),
                },
                "MessageID" => {
                    ctx.properties
                        .insert(MESSAGE_ID_PROPERTY.to_string(), Value::String(text));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn on_reply(&self, ctx: &mut Context, reply: &mut SoapMessage) -> Result<(), SoapFault> {
        if let Some((ns, id)) = request_message_id(ctx) {
            let (name, xml) = header(&ns, "MessageID", &format!("urn:uuid:{}", Uuid::new_v4()));
            reply.set_header(name, xml);
            let (name, xml) = header(&ns, "RelatesTo", &id);
            reply.set_header(name, xml);
        }
        Ok(())
    }

    fn on_fault(&self, ctx: &mut Context, fault: &mut SoapMessage) {
        if let Some((ns, id)) = request_message_id(ctx) {
            let (name, xml) = header(&ns, "RelatesTo", &id);
            fault.set_header(name, xml);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::read_soap;

    fn request(headers: &str) -> Context {
        let xml = format!(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Header>{}</s:Header><s:Body><a/></s:Body></s:Envelope>"#,
            headers
        );
        Context::new(read_soap(xml.as_bytes(), None).unwrap())
    }

    #[test]
    fn test_split3() {
        assert_eq!(
            split3("http://example.org/hello/Greeter/greetMe"),
            Some(("http://example.org/hello".into(), "Greeter".into(), "greetMe".into()))
        );
        assert_eq!(
            split3("urn:hello:Greeter:greetMe"),
            Some(("urn:hello".into(), "Greeter".into(), "greetMe".into()))
        );
        assert_eq!(split3("urn:greetMe"), None);
    }

    #[test]
    fn test_action_and_to_route_the_exchange() {
        let mut ctx = request(concat!(
            r#"<wsa:Action xmlns:wsa="http://www.w3.org/2005/08/addressing">http://example.org/hello/Greeter/greetMe</wsa:Action>"#,
            r#"<wsa:To xmlns:wsa="http://www.w3.org/2005/08/addressing">http://example.org/hello/SOAPService/SoapPort</wsa:To>"#
        ));
        AddressingPolicy.on_receive(&mut ctx).unwrap();

        assert_eq!(ctx.operation, Some(QName::new("http://example.org/hello", "greetMe")));
        assert_eq!(ctx.interface_name, Some(QName::new("http://example.org/hello", "Greeter")));
        assert_eq!(ctx.service, Some(QName::new("http://example.org/hello", "SOAPService")));
        assert_eq!(ctx.endpoint.as_deref(), Some("SoapPort"));
    }

    #[test]
    fn test_mixed_versions_are_a_sender_fault() {
        let mut ctx = request(concat!(
            r#"<a:Action xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing">urn:x:y:z</a:Action>"#,
            r#"<b:To xmlns:b="http://www.w3.org/2005/08/addressing">urn:x:y:z</b:To>"#
        ));
        let fault = AddressingPolicy.on_receive(&mut ctx).unwrap_err();
        assert!(fault.is_sender());
    }

    #[test]
    fn test_reply_relates_to_request() {
        let ns = "http://www.w3.org/2005/08/addressing";
        let mut ctx = request(&format!(r#"<wsa:MessageID xmlns:wsa="{}">urn:uuid:42</wsa:MessageID>"#, ns));
        AddressingPolicy.on_receive(&mut ctx).unwrap();

        let mut reply = SoapMessage::new(crate::soap::SoapVersion::Soap11);
        AddressingPolicy.on_reply(&mut ctx, &mut reply).unwrap();
        let relates = reply.header(&QName::new(ns, "RelatesTo")).unwrap();
        assert_eq!(header_text(relates).unwrap(), "urn:uuid:42");
        let id = reply.header(&QName::new(ns, "MessageID")).unwrap();
        assert_ne!(header_text(id).unwrap(), "urn:uuid:42");
    }
}
