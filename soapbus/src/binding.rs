//! # Binding model
//!
//! Normalized view of a WSDL port: operations with their message exchange
//! pattern, input/output/fault messages, parts classified as body or header,
//! style and SOAP action.
//!
//! Two factories build it:
//! - [`build_binding`] for WSDL 1.1 ports bound with SOAP 1.1 or SOAP 1.2,
//! - [`build_http_binding`] for WSDL 2.0 endpoints bound with the HTTP binding.
//!
//! A binding is built once when an endpoint is activated and is then shared
//! read-only (behind an `Arc`) by every exchange of that endpoint.

use tracing::debug;

use crate::bus::Mep;
use crate::errors::ConfigError;
use crate::qname::QName;
use crate::soap::SoapVersion;
use crate::wsdl::{
    BindingMessage, ContentModel, Definition, Description, Direction, Endpoint20,
    HttpHeaderDecl, OperationMessage, Port, WSDL20_HTTP_NS, WSDL20_HTTP_NS_2006, XSD_NS,
};

/// SOAP body convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Document,
    Rpc,
}

impl Style {
    pub fn parse(s: &str) -> Option<Style> {
        if s.eq_ignore_ascii_case("document") {
            Some(Style::Document)
        } else if s.eq_ignore_ascii_case("rpc") {
            Some(Style::Rpc)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Body,
    Header,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub type_name: Option<QName>,
    pub element_name: Option<QName>,
    pub kind: PartKind,
}

/// HTTP serialization details of a WSDL 2.0 message reference.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpMessage {
    pub content_model: ContentModel,
    pub transfer_coding: Option<String>,
    pub headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpHeader {
    pub name: String,
    pub type_name: Option<QName>,
    pub required: bool,
}

impl From<&HttpHeaderDecl> for HttpHeader {
    fn from(h: &HttpHeaderDecl) -> Self {
        HttpHeader {
            name: h.name.clone(),
            type_name: h.type_name.clone(),
            required: h.required,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Name of the WSDL message (also the wrapper message type).
    pub name: QName,
    /// `namespace` of the `soap:body` binding, used for RPC wrappers.
    pub namespace: Option<String>,
    /// Wire name: the WSDL input/output name or the derived default.
    pub message_name: String,
    /// Qualified name of the body element.
    pub element_name: Option<QName>,
    pub parts: Vec<Part>,
    pub http: Option<HttpMessage>,
}

impl Message {
    pub fn body_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.kind == PartKind::Body)
    }

    pub fn header_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.kind == PartKind::Header)
    }
}

/// HTTP attributes of a WSDL 2.0 binding operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpOperation {
    pub method: Option<String>,
    pub location: Option<String>,
    pub input_serialization: Option<String>,
    pub output_serialization: Option<String>,
    pub fault_serialization: Option<String>,
    pub transfer_coding_default: Option<String>,
    pub ignore_uncited: bool,
}

/// Interface fault reference recorded on a WSDL 2.0 operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRef {
    pub name: String,
    pub element: Option<QName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: QName,
    pub soap_action: String,
    pub style: Style,
    pub mep: Mep,
    pub input: Message,
    pub output: Option<Message>,
    pub faults: Vec<Message>,
    /// WSDL 2.0 operation style URIs.
    pub styles: Vec<String>,
    pub http: Option<HttpOperation>,
    pub fault_refs: Vec<FaultRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Soap(SoapVersion),
    Http,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub kind: BindingKind,
    pub transport_uri: Option<String>,
    pub location_uri: Option<String>,
    pub style: Style,
    /// Port type (WSDL 1.1) or interface (WSDL 2.0) name.
    pub interface_name: QName,
    pub operations: Vec<Operation>,
}

impl Binding {
    pub fn soap_version(&self) -> Option<SoapVersion> {
        match self.kind {
            BindingKind::Soap(v) => Some(v),
            BindingKind::Http => None,
        }
    }

    /// Operation by qualified name. A name without namespace matches on the
    /// local part only.
    pub fn operation(&self, name: &QName) -> Option<&Operation> {
        self.operations.iter().find(|op| {
            if name.namespace.is_empty() {
                op.name.local == name.local
            } else {
                &op.name == name
            }
        })
    }

    /// First operation, in declaration order, whose input element is `element`.
    pub fn operation_for_element(&self, element: &QName) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.input.element_name.as_ref() == Some(element))
    }
}

fn mep_for(has_output: bool, has_faults: bool) -> Mep {
    match (has_output, has_faults) {
        (true, _) => Mep::InOut,
        (false, true) => Mep::RobustInOnly,
        (false, false) => Mep::InOnly,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Way {
    Input,
    Output,
}

/// Builds the binding model of a WSDL 1.1 SOAP port.
pub fn build_binding(definition: &Definition, port: &Port) -> Result<Binding, ConfigError> {
    let wsdl_binding = definition
        .binding(&port.binding)
        .ok_or_else(|| ConfigError::wsdl(format!("unknown binding {}", port.binding)))?;
    let soap = wsdl_binding.soap.as_ref().ok_or_else(|| {
        ConfigError::NotImplemented(format!(
            "binding {} has no SOAP extension",
            wsdl_binding.name
        ))
    })?;
    let port_type = definition.port_type(&wsdl_binding.port_type).ok_or_else(|| {
        ConfigError::wsdl(format!("unknown port type {}", wsdl_binding.port_type))
    })?;

    let mut operations = Vec::with_capacity(port_type.operations.len());
    for wsdl_op in &port_type.operations {
        let binding_op = wsdl_binding.operation(&wsdl_op.name);
        let name = QName::new(&port_type.name.namespace, &wsdl_op.name);
        let style = binding_op
            .and_then(|o| o.style)
            .or(soap.style)
            .unwrap_or(Style::Document);
        let soap_action = binding_op
            .and_then(|o| o.soap_action.clone())
            .unwrap_or_default();

        let input_decl = wsdl_op
            .input
            .as_ref()
            .ok_or_else(|| ConfigError::MissingInput(name.to_string()))?;
        let input = build_message(
            definition,
            &name,
            style,
            Way::Input,
            input_decl,
            binding_op.and_then(|o| o.input.as_ref()),
        )?;

        let output = match &wsdl_op.output {
            Some(decl) => {
                let message = build_message(
                    definition,
                    &name,
                    style,
                    Way::Output,
                    decl,
                    binding_op.and_then(|o| o.output.as_ref()),
                )?;
                (!message.parts.is_empty()).then_some(message)
            }
            None => None,
        };

        let faults = wsdl_op
            .faults
            .iter()
            .map(|f| build_fault_message(definition, f))
            .collect::<Result<Vec<_>, _>>()?;

        let mep = mep_for(output.is_some(), !faults.is_empty());
        debug!(operation=%name, mep=%mep, "🔗 Operation bound");

        operations.push(Operation {
            name,
            soap_action,
            style,
            mep,
            input,
            output,
            faults,
            styles: Vec::new(),
            http: None,
            fault_refs: Vec::new(),
        });
    }

    Ok(Binding {
        kind: BindingKind::Soap(soap.version),
        transport_uri: soap.transport.clone(),
        location_uri: port.address.clone(),
        style: soap.style.unwrap_or(Style::Document),
        interface_name: port_type.name.clone(),
        operations,
    })
}

fn build_message(
    definition: &Definition,
    operation: &QName,
    style: Style,
    way: Way,
    decl: &OperationMessage,
    binding: Option<&BindingMessage>,
) -> Result<Message, ConfigError> {
    let wsdl_message = definition
        .message(&decl.message)
        .ok_or_else(|| ConfigError::wsdl(format!("unknown message {}", decl.message)))?;
    let body = binding.and_then(|b| b.body.as_ref());
    let headers = binding.map(|b| b.headers.as_slice()).unwrap_or_default();

    let message_name = match decl.name.as_deref() {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => match way {
            Way::Input => operation.local.clone(),
            Way::Output => format!("{}Response", operation.local),
        },
    };
    let namespace = body.and_then(|b| b.namespace.clone());
    let sole_part = wsdl_message.parts.len() == 1;

    let mut element_name = None;
    let mut parts = Vec::with_capacity(wsdl_message.parts.len());
    for wsdl_part in &wsdl_message.parts {
        let in_body = match body.and_then(|b| b.parts.as_ref()) {
            Some(listed) => listed.iter().any(|p| p == &wsdl_part.name),
            None => sole_part,
        };
        let kind = if in_body {
            if style == Style::Document {
                element_name = wsdl_part.element.clone();
            }
            PartKind::Body
        } else if headers.iter().any(|h| h.part == wsdl_part.name) {
            PartKind::Header
        } else {
            return Err(ConfigError::UnboundPart(wsdl_part.name.clone()));
        };
        parts.push(Part {
            name: wsdl_part.name.clone(),
            type_name: wsdl_part.type_name.clone(),
            element_name: wsdl_part.element.clone(),
            kind,
        });
    }

    if style == Style::Rpc {
        let local = match way {
            Way::Input => operation.local.clone(),
            Way::Output => format!("{}Response", operation.local),
        };
        element_name = Some(QName::new(namespace.clone().unwrap_or_default(), local));
    }

    Ok(Message {
        name: wsdl_message.name.clone(),
        namespace,
        message_name,
        element_name,
        parts,
        http: None,
    })
}

fn build_fault_message(
    definition: &Definition,
    decl: &OperationMessage,
) -> Result<Message, ConfigError> {
    let wsdl_message = definition
        .message(&decl.message)
        .ok_or_else(|| ConfigError::wsdl(format!("unknown message {}", decl.message)))?;
    let parts: Vec<Part> = wsdl_message
        .parts
        .iter()
        .map(|p| Part {
            name: p.name.clone(),
            type_name: p.type_name.clone(),
            element_name: p.element.clone(),
            kind: PartKind::Body,
        })
        .collect();
    Ok(Message {
        name: wsdl_message.name.clone(),
        namespace: None,
        message_name: decl
            .name
            .clone()
            .unwrap_or_else(|| wsdl_message.name.local.clone()),
        element_name: parts.first().and_then(|p| p.element_name.clone()),
        parts,
        http: None,
    })
}

/// Builds the binding model of a WSDL 2.0 endpoint bound with the HTTP binding.
///
/// Interface faults are only recorded as [`FaultRef`]s on each operation.
pub fn build_http_binding(
    description: &Description,
    endpoint: &Endpoint20,
) -> Result<Binding, ConfigError> {
    let wsdl_binding = description
        .binding(&endpoint.binding)
        .ok_or_else(|| ConfigError::wsdl(format!("unknown binding {}", endpoint.binding)))?;
    let binding_type = wsdl_binding.binding_type.as_str();
    if binding_type != WSDL20_HTTP_NS && binding_type != WSDL20_HTTP_NS_2006 {
        return Err(ConfigError::NotImplemented(format!(
            "WSDL 2.0 binding type {}",
            binding_type
        )));
    }
    let interface_name = wsdl_binding.interface.clone().ok_or_else(|| {
        ConfigError::wsdl(format!("binding {} has no interface", wsdl_binding.name))
    })?;
    let interface = description
        .interface(&interface_name)
        .ok_or_else(|| ConfigError::wsdl(format!("unknown interface {}", interface_name)))?;

    let mut operations = Vec::with_capacity(interface.operations.len());
    for wsdl_op in &interface.operations {
        let binding_op = wsdl_binding.operation(&wsdl_op.name);
        let mep = Mep::from_uri(&wsdl_op.pattern).ok_or_else(|| {
            ConfigError::NotImplemented(format!("message exchange pattern {}", wsdl_op.pattern))
        })?;

        let http = binding_op.map(|o| HttpOperation {
            method: o.method.clone().or_else(|| wsdl_binding.method_default.clone()),
            location: o.location.clone(),
            input_serialization: o.input_serialization.clone(),
            output_serialization: o.output_serialization.clone(),
            fault_serialization: o.fault_serialization.clone(),
            transfer_coding_default: o.transfer_coding_default.clone(),
            ignore_uncited: o.ignore_uncited,
        });

        let mut input = None;
        let mut output = None;
        for msg_ref in &wsdl_op.messages {
            if msg_ref.content.element().is_some() {
                if let Some(other) = description.type_systems.iter().find(|t| *t != XSD_NS) {
                    return Err(ConfigError::UnsupportedTypeSystem(other.clone()));
                }
            }
            let binding_msg = binding_op.and_then(|o| {
                o.messages.iter().find(|m| {
                    m.direction == msg_ref.direction
                        && (m.label.is_none() || m.label == msg_ref.label)
                })
            });
            let label = msg_ref.label.clone().unwrap_or_else(|| match msg_ref.direction {
                Direction::In => "In".to_string(),
                Direction::Out => "Out".to_string(),
            });
            let message = Message {
                name: msg_ref.content.element().cloned().unwrap_or_else(|| {
                    QName::new(
                        &wsdl_op.name.namespace,
                        format!("{}{}", wsdl_op.name.local, label),
                    )
                }),
                namespace: None,
                message_name: label,
                element_name: msg_ref.content.element().cloned(),
                parts: Vec::new(),
                http: Some(HttpMessage {
                    content_model: msg_ref.content.clone(),
                    transfer_coding: binding_msg
                        .and_then(|m| m.transfer_coding.clone())
                        .or_else(|| binding_op.and_then(|o| o.transfer_coding_default.clone())),
                    headers: binding_msg
                        .map(|m| m.headers.iter().map(HttpHeader::from).collect())
                        .unwrap_or_default(),
                }),
            };
            match msg_ref.direction {
                Direction::In => input = Some(message),
                Direction::Out => output = Some(message),
            }
        }

        let fault_refs = wsdl_op
            .fault_refs
            .iter()
            .map(|r| FaultRef {
                name: r.reference.local.clone(),
                element: interface
                    .faults
                    .iter()
                    .find(|f| f.name == r.reference.local)
                    .and_then(|f| f.element.clone()),
            })
            .collect();

        operations.push(Operation {
            name: wsdl_op.name.clone(),
            soap_action: String::new(),
            style: Style::Document,
            mep,
            input: input.ok_or_else(|| ConfigError::MissingInput(wsdl_op.name.to_string()))?,
            output,
            faults: Vec::new(),
            styles: wsdl_op.style.clone(),
            http,
            fault_refs,
        });
    }

    Ok(Binding {
        kind: BindingKind::Http,
        transport_uri: Some(wsdl_binding.binding_type.clone()),
        location_uri: endpoint.address.clone(),
        style: Style::Document,
        interface_name,
        operations,
    })
}
