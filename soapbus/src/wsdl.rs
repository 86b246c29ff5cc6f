//! # Module WSDL
//!
//! Parsing of WSDL 1.1 and WSDL 2.0 documents into plain object graphs.
//!
//! Only the parts needed to build a [`Binding`](crate::binding::Binding) are kept:
//! messages, port types / interfaces, bindings with their SOAP or HTTP extensions,
//! and services. Everything is kept in declaration order, which is the tie-break
//! rule used whenever a "first" service, port or operation has to be chosen.
//!
//! QName valued attributes (`message="tns:Foo"`) are resolved against the
//! namespace bindings in scope on the element carrying them.

use xmltree::{Element, XMLNode};

use crate::binding::Style;
use crate::errors::ConfigError;
use crate::qname::QName;
use crate::soap::SoapVersion;

pub const WSDL11_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const WSDL11_SOAP11_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const WSDL11_SOAP12_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";
pub const WSDL20_NS: &str = "http://www.w3.org/ns/wsdl";
pub const WSDL20_NS_2006: &str = "http://www.w3.org/2006/01/wsdl";
pub const WSDL20_HTTP_NS: &str = "http://www.w3.org/ns/wsdl/http";
pub const WSDL20_HTTP_NS_2006: &str = "http://www.w3.org/2006/01/wsdl/http";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// A parsed WSDL document, either version.
#[derive(Debug, Clone)]
pub enum WsdlDocument {
    V11(Definition),
    V20(Description),
}

impl WsdlDocument {
    pub fn parse(xml: &str) -> Result<Self, ConfigError> {
        let root = Element::parse(xml.as_bytes())?;
        match root.namespace.as_deref() {
            Some(WSDL11_NS) if root.name == "definitions" => {
                Ok(WsdlDocument::V11(Definition::from_element(&root)?))
            }
            Some(WSDL20_NS) | Some(WSDL20_NS_2006) if root.name == "description" => {
                Ok(WsdlDocument::V20(Description::from_element(&root)?))
            }
            other => Err(ConfigError::wsdl(format!(
                "unexpected root element {}",
                QName::new(other.unwrap_or(""), root.name.as_str())
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// WSDL 1.1
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Definition {
    pub target_namespace: String,
    pub messages: Vec<WsdlMessage>,
    pub port_types: Vec<PortType>,
    pub bindings: Vec<WsdlBinding>,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone)]
pub struct WsdlMessage {
    pub name: QName,
    pub parts: Vec<WsdlPart>,
}

#[derive(Debug, Clone)]
pub struct WsdlPart {
    pub name: String,
    pub element: Option<QName>,
    pub type_name: Option<QName>,
}

#[derive(Debug, Clone)]
pub struct PortType {
    pub name: QName,
    pub operations: Vec<PortTypeOperation>,
}

#[derive(Debug, Clone)]
pub struct PortTypeOperation {
    pub name: String,
    pub input: Option<OperationMessage>,
    pub output: Option<OperationMessage>,
    pub faults: Vec<OperationMessage>,
}

/// `<input>`, `<output>` or `<fault>` of a port type operation.
#[derive(Debug, Clone)]
pub struct OperationMessage {
    pub name: Option<String>,
    pub message: QName,
}

#[derive(Debug, Clone)]
pub struct WsdlBinding {
    pub name: QName,
    pub port_type: QName,
    pub soap: Option<SoapBindingExt>,
    pub operations: Vec<BindingOperation>,
}

/// `soap:binding` / `soap12:binding`.
#[derive(Debug, Clone)]
pub struct SoapBindingExt {
    pub version: SoapVersion,
    pub transport: Option<String>,
    pub style: Option<Style>,
}

#[derive(Debug, Clone, Default)]
pub struct BindingOperation {
    pub name: String,
    pub soap_action: Option<String>,
    pub style: Option<Style>,
    pub input: Option<BindingMessage>,
    pub output: Option<BindingMessage>,
    pub faults: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BindingMessage {
    pub name: Option<String>,
    pub body: Option<SoapBodyExt>,
    pub headers: Vec<SoapHeaderExt>,
}

/// `soap:body`. `parts` is `None` when the attribute is absent.
#[derive(Debug, Clone, Default)]
pub struct SoapBodyExt {
    pub parts: Option<Vec<String>>,
    pub namespace: Option<String>,
    pub use_: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SoapHeaderExt {
    pub message: QName,
    pub part: String,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub name: QName,
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub binding: QName,
    pub address: Option<String>,
}

impl Definition {
    pub fn parse(xml: &str) -> Result<Self, ConfigError> {
        match WsdlDocument::parse(xml)? {
            WsdlDocument::V11(def) => Ok(def),
            WsdlDocument::V20(_) => Err(ConfigError::wsdl("expected a WSDL 1.1 document")),
        }
    }

    fn from_element(root: &Element) -> Result<Self, ConfigError> {
        let tns = attr(root, "targetNamespace").unwrap_or("").to_string();

        let messages = children(root, WSDL11_NS, "message")
            .map(|m| {
                let parts = children(m, WSDL11_NS, "part")
                    .map(|p| {
                        Ok(WsdlPart {
                            name: required_attr(p, "name")?.to_string(),
                            element: optional_qname(p, "element")?,
                            type_name: optional_qname(p, "type")?,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(WsdlMessage {
                    name: QName::new(&tns, required_attr(m, "name")?),
                    parts,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let port_types = children(root, WSDL11_NS, "portType")
            .map(|pt| {
                let operations = children(pt, WSDL11_NS, "operation")
                    .map(|op| {
                        Ok(PortTypeOperation {
                            name: required_attr(op, "name")?.to_string(),
                            input: child(op, WSDL11_NS, "input")
                                .map(operation_message)
                                .transpose()?,
                            output: child(op, WSDL11_NS, "output")
                                .map(operation_message)
                                .transpose()?,
                            faults: children(op, WSDL11_NS, "fault")
                                .map(operation_message)
                                .collect::<Result<Vec<_>, _>>()?,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(PortType {
                    name: QName::new(&tns, required_attr(pt, "name")?),
                    operations,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let bindings = children(root, WSDL11_NS, "binding")
            .map(|b| {
                let soap = soap_ext(b, "binding").next().map(|ext| SoapBindingExt {
                    version: soap_ext_version(ext),
                    transport: attr(ext, "transport").map(str::to_string),
                    style: attr(ext, "style").and_then(Style::parse),
                });
                let operations = children(b, WSDL11_NS, "operation")
                    .map(binding_operation)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(WsdlBinding {
                    name: QName::new(&tns, required_attr(b, "name")?),
                    port_type: resolve_qname(b, required_attr(b, "type")?)?,
                    soap,
                    operations,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let services = children(root, WSDL11_NS, "service")
            .map(|s| {
                let ports = children(s, WSDL11_NS, "port")
                    .map(|p| {
                        Ok(Port {
                            name: required_attr(p, "name")?.to_string(),
                            binding: resolve_qname(p, required_attr(p, "binding")?)?,
                            address: soap_ext(p, "address")
                                .next()
                                .and_then(|a| attr(a, "location"))
                                .map(str::to_string),
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(Service {
                    name: QName::new(&tns, required_attr(s, "name")?),
                    ports,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Definition {
            target_namespace: tns,
            messages,
            port_types,
            bindings,
            services,
        })
    }

    pub fn message(&self, name: &QName) -> Option<&WsdlMessage> {
        self.messages.iter().find(|m| &m.name == name)
    }

    pub fn port_type(&self, name: &QName) -> Option<&PortType> {
        self.port_types.iter().find(|p| &p.name == name)
    }

    pub fn binding(&self, name: &QName) -> Option<&WsdlBinding> {
        self.bindings.iter().find(|b| &b.name == name)
    }

    /// Service by name, or the first declared one.
    pub fn service(&self, name: Option<&QName>) -> Option<&Service> {
        match name {
            Some(name) => self.services.iter().find(|s| &s.name == name),
            None => self.services.first(),
        }
    }
}

impl Service {
    /// Port by name, or the first declared one.
    pub fn port(&self, name: Option<&str>) -> Option<&Port> {
        match name {
            Some(name) => self.ports.iter().find(|p| p.name == name),
            None => self.ports.first(),
        }
    }
}

impl WsdlBinding {
    pub fn operation(&self, name: &str) -> Option<&BindingOperation> {
        self.operations.iter().find(|o| o.name == name)
    }
}

fn operation_message(e: &Element) -> Result<OperationMessage, ConfigError> {
    Ok(OperationMessage {
        name: attr(e, "name").map(str::to_string),
        message: resolve_qname(e, required_attr(e, "message")?)?,
    })
}

fn binding_operation(op: &Element) -> Result<BindingOperation, ConfigError> {
    let soap_op = soap_ext(op, "operation").next();
    Ok(BindingOperation {
        name: required_attr(op, "name")?.to_string(),
        soap_action: soap_op
            .and_then(|s| attr(s, "soapAction"))
            .map(str::to_string),
        style: soap_op.and_then(|s| attr(s, "style")).and_then(Style::parse),
        input: child(op, WSDL11_NS, "input")
            .map(binding_message)
            .transpose()?,
        output: child(op, WSDL11_NS, "output")
            .map(binding_message)
            .transpose()?,
        faults: children(op, WSDL11_NS, "fault")
            .filter_map(|f| attr(f, "name").map(str::to_string))
            .collect(),
    })
}

fn binding_message(e: &Element) -> Result<BindingMessage, ConfigError> {
    let body = soap_ext(e, "body").next().map(|b| SoapBodyExt {
        parts: attr(b, "parts").map(|p| p.split_whitespace().map(str::to_string).collect()),
        namespace: attr(b, "namespace").map(str::to_string),
        use_: attr(b, "use").map(str::to_string),
    });
    let headers = soap_ext(e, "header")
        .map(|h| {
            Ok(SoapHeaderExt {
                message: resolve_qname(h, required_attr(h, "message")?)?,
                part: required_attr(h, "part")?.to_string(),
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;
    Ok(BindingMessage {
        name: attr(e, "name").map(str::to_string),
        body,
        headers,
    })
}

fn soap_ext<'a>(parent: &'a Element, local: &'a str) -> impl Iterator<Item = &'a Element> {
    elements(parent).filter(move |e| {
        e.name == local
            && matches!(
                e.namespace.as_deref(),
                Some(WSDL11_SOAP11_NS) | Some(WSDL11_SOAP12_NS)
            )
    })
}

fn soap_ext_version(e: &Element) -> SoapVersion {
    match e.namespace.as_deref() {
        Some(WSDL11_SOAP12_NS) => SoapVersion::Soap12,
        _ => SoapVersion::Soap11,
    }
}

// ---------------------------------------------------------------------------
// WSDL 2.0
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Description {
    pub target_namespace: String,
    /// Namespaces of the schema languages found under `<types>`.
    pub type_systems: Vec<String>,
    pub interfaces: Vec<Interface>,
    pub bindings: Vec<Binding20>,
    pub services: Vec<Service20>,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: QName,
    pub faults: Vec<InterfaceFault>,
    pub operations: Vec<InterfaceOperation>,
}

#[derive(Debug, Clone)]
pub struct InterfaceFault {
    pub name: String,
    pub element: Option<QName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Content model of a WSDL 2.0 message reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentModel {
    Element(QName),
    Any,
    None,
    Other,
}

impl ContentModel {
    fn parse(e: &Element) -> Result<Self, ConfigError> {
        match attr(e, "element") {
            None | Some("#other") => Ok(ContentModel::Other),
            Some("#any") => Ok(ContentModel::Any),
            Some("#none") => Ok(ContentModel::None),
            Some(value) => Ok(ContentModel::Element(resolve_qname(e, value)?)),
        }
    }

    pub fn element(&self) -> Option<&QName> {
        match self {
            ContentModel::Element(q) => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageReference {
    pub direction: Direction,
    pub label: Option<String>,
    pub content: ContentModel,
}

#[derive(Debug, Clone)]
pub struct FaultReference {
    pub direction: Direction,
    pub reference: QName,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InterfaceOperation {
    pub name: QName,
    pub pattern: String,
    pub style: Vec<String>,
    pub messages: Vec<MessageReference>,
    pub fault_refs: Vec<FaultReference>,
}

#[derive(Debug, Clone)]
pub struct Binding20 {
    pub name: QName,
    pub interface: Option<QName>,
    pub binding_type: String,
    pub method_default: Option<String>,
    pub operations: Vec<Binding20Operation>,
}

#[derive(Debug, Clone, Default)]
pub struct Binding20Operation {
    pub reference: QName,
    pub method: Option<String>,
    pub location: Option<String>,
    pub input_serialization: Option<String>,
    pub output_serialization: Option<String>,
    pub fault_serialization: Option<String>,
    pub transfer_coding_default: Option<String>,
    pub ignore_uncited: bool,
    pub messages: Vec<Binding20Message>,
}

#[derive(Debug, Clone)]
pub struct Binding20Message {
    pub direction: Direction,
    pub label: Option<String>,
    pub transfer_coding: Option<String>,
    pub headers: Vec<HttpHeaderDecl>,
}

/// `whttp:header` declaration.
#[derive(Debug, Clone)]
pub struct HttpHeaderDecl {
    pub name: String,
    pub type_name: Option<QName>,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct Service20 {
    pub name: QName,
    pub interface: Option<QName>,
    pub endpoints: Vec<Endpoint20>,
}

#[derive(Debug, Clone)]
pub struct Endpoint20 {
    pub name: String,
    pub binding: QName,
    pub address: Option<String>,
}

const WSDL20_NAMESPACES: [&str; 2] = [WSDL20_NS, WSDL20_NS_2006];
const WSDL20_HTTP_NAMESPACES: [&str; 2] = [WSDL20_HTTP_NS, WSDL20_HTTP_NS_2006];
const DEFAULT_PATTERN: &str = "http://www.w3.org/ns/wsdl/in-out";

impl Description {
    pub fn parse(xml: &str) -> Result<Self, ConfigError> {
        match WsdlDocument::parse(xml)? {
            WsdlDocument::V20(desc) => Ok(desc),
            WsdlDocument::V11(_) => Err(ConfigError::wsdl("expected a WSDL 2.0 document")),
        }
    }

    fn from_element(root: &Element) -> Result<Self, ConfigError> {
        let tns = attr(root, "targetNamespace").unwrap_or("").to_string();
        let type_systems = wsdl20(root, "types")
            .into_iter()
            .flat_map(elements)
            .filter_map(|e| e.namespace.clone())
            .collect();

        let interfaces = wsdl20(root, "interface")
            .into_iter()
            .map(|i| {
                let style_default = attr(i, "styleDefault");
                let faults = wsdl20(i, "fault")
                    .into_iter()
                    .map(|f| {
                        Ok(InterfaceFault {
                            name: required_attr(f, "name")?.to_string(),
                            element: match attr(f, "element") {
                                Some(v) if !v.starts_with('#') => Some(resolve_qname(f, v)?),
                                _ => None,
                            },
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                let operations = wsdl20(i, "operation")
                    .into_iter()
                    .map(|op| {
                        let mut messages = Vec::new();
                        let mut fault_refs = Vec::new();
                        for e in elements(op).filter(|e| in_any(e, &WSDL20_NAMESPACES)) {
                            let label = attr(e, "messageLabel").map(str::to_string);
                            match e.name.as_str() {
                                "input" | "output" => messages.push(MessageReference {
                                    direction: direction_of(&e.name),
                                    label,
                                    content: ContentModel::parse(e)?,
                                }),
                                "infault" | "outfault" => fault_refs.push(FaultReference {
                                    direction: direction_of(&e.name),
                                    reference: resolve_qname(e, required_attr(e, "ref")?)?,
                                    label,
                                }),
                                _ => {}
                            }
                        }
                        Ok(InterfaceOperation {
                            name: QName::new(&tns, required_attr(op, "name")?),
                            pattern: attr(op, "pattern").unwrap_or(DEFAULT_PATTERN).to_string(),
                            style: attr(op, "style")
                                .or(style_default)
                                .map(|s| s.split_whitespace().map(str::to_string).collect())
                                .unwrap_or_default(),
                            messages,
                            fault_refs,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(Interface {
                    name: QName::new(&tns, required_attr(i, "name")?),
                    faults,
                    operations,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let bindings = wsdl20(root, "binding")
            .into_iter()
            .map(|b| {
                let operations = wsdl20(b, "operation")
                    .into_iter()
                    .map(|op| {
                        let messages = elements(op)
                            .filter(|e| {
                                in_any(e, &WSDL20_NAMESPACES)
                                    && (e.name == "input" || e.name == "output")
                            })
                            .map(|m| {
                                let headers = elements(m)
                                    .filter(|h| {
                                        h.name == "header" && in_any(h, &WSDL20_HTTP_NAMESPACES)
                                    })
                                    .map(|h| {
                                        Ok(HttpHeaderDecl {
                                            name: required_attr(h, "name")?.to_string(),
                                            type_name: optional_qname(h, "type")?,
                                            required: attr(h, "required") == Some("true"),
                                        })
                                    })
                                    .collect::<Result<Vec<_>, ConfigError>>()?;
                                Ok(Binding20Message {
                                    direction: direction_of(&m.name),
                                    label: attr(m, "messageLabel").map(str::to_string),
                                    transfer_coding: attr(m, "transferCoding").map(str::to_string),
                                    headers,
                                })
                            })
                            .collect::<Result<Vec<_>, ConfigError>>()?;
                        Ok(Binding20Operation {
                            reference: resolve_qname(op, required_attr(op, "ref")?)?,
                            method: attr(op, "method").map(str::to_string),
                            location: attr(op, "location").map(str::to_string),
                            input_serialization: attr(op, "inputSerialization")
                                .map(str::to_string),
                            output_serialization: attr(op, "outputSerialization")
                                .map(str::to_string),
                            fault_serialization: attr(op, "faultSerialization")
                                .map(str::to_string),
                            transfer_coding_default: attr(op, "transferCodingDefault")
                                .map(str::to_string),
                            ignore_uncited: attr(op, "ignoreUncited") == Some("true"),
                            messages,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(Binding20 {
                    name: QName::new(&tns, required_attr(b, "name")?),
                    interface: optional_qname(b, "interface")?,
                    binding_type: required_attr(b, "type")?.to_string(),
                    method_default: attr(b, "methodDefault").map(str::to_string),
                    operations,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let services = wsdl20(root, "service")
            .into_iter()
            .map(|s| {
                let endpoints = wsdl20(s, "endpoint")
                    .into_iter()
                    .map(|ep| {
                        Ok(Endpoint20 {
                            name: required_attr(ep, "name")?.to_string(),
                            binding: resolve_qname(ep, required_attr(ep, "binding")?)?,
                            address: attr(ep, "address").map(str::to_string),
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(Service20 {
                    name: QName::new(&tns, required_attr(s, "name")?),
                    interface: optional_qname(s, "interface")?,
                    endpoints,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Description {
            target_namespace: tns,
            type_systems,
            interfaces,
            bindings,
            services,
        })
    }

    pub fn interface(&self, name: &QName) -> Option<&Interface> {
        self.interfaces.iter().find(|i| &i.name == name)
    }

    pub fn binding(&self, name: &QName) -> Option<&Binding20> {
        self.bindings.iter().find(|b| &b.name == name)
    }

    /// Service by name, or the first declared one.
    pub fn service(&self, name: Option<&QName>) -> Option<&Service20> {
        match name {
            Some(name) => self.services.iter().find(|s| &s.name == name),
            None => self.services.first(),
        }
    }
}

impl Service20 {
    /// Endpoint by name, or the first declared one.
    pub fn endpoint(&self, name: Option<&str>) -> Option<&Endpoint20> {
        match name {
            Some(name) => self.endpoints.iter().find(|e| e.name == name),
            None => self.endpoints.first(),
        }
    }
}

impl Binding20 {
    pub fn operation(&self, reference: &QName) -> Option<&Binding20Operation> {
        self.operations.iter().find(|o| &o.reference == reference)
    }
}

fn wsdl20<'a>(parent: &'a Element, local: &'a str) -> impl Iterator<Item = &'a Element> {
    elements(parent).filter(move |e| e.name == local && in_any(e, &WSDL20_NAMESPACES))
}

fn direction_of(local: &str) -> Direction {
    match local {
        "output" | "outfault" => Direction::Out,
        _ => Direction::In,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(XMLNode::as_element)
}

fn children<'a>(
    parent: &'a Element,
    namespace: &'a str,
    local: &'a str,
) -> impl Iterator<Item = &'a Element> {
    elements(parent).filter(move |e| e.name == local && e.namespace.as_deref() == Some(namespace))
}

fn child<'a>(parent: &'a Element, namespace: &'a str, local: &'a str) -> Option<&'a Element> {
    children(parent, namespace, local).next()
}

fn in_any(e: &Element, namespaces: &[&str]) -> bool {
    e.namespace
        .as_deref()
        .is_some_and(|ns| namespaces.contains(&ns))
}

fn attr<'a>(e: &'a Element, name: &str) -> Option<&'a str> {
    e.attributes.get(name).map(String::as_str)
}

fn required_attr<'a>(e: &'a Element, name: &str) -> Result<&'a str, ConfigError> {
    attr(e, name).ok_or_else(|| {
        ConfigError::wsdl(format!("<{}> is missing attribute '{}'", e.name, name))
    })
}

fn optional_qname(e: &Element, name: &str) -> Result<Option<QName>, ConfigError> {
    attr(e, name).map(|v| resolve_qname(e, v)).transpose()
}

/// Resolves a `prefix:local` attribute value against the namespaces in scope.
pub(crate) fn resolve_qname(e: &Element, value: &str) -> Result<QName, ConfigError> {
    let (prefix, local) = value.trim().split_once(':').unwrap_or(("", value.trim()));
    let namespace = e.namespaces.as_ref().and_then(|ns| ns.get(prefix));
    match namespace {
        Some(ns) => Ok(QName::new(ns, local)),
        None if prefix.is_empty() => Ok(QName::local(local)),
        None => Err(ConfigError::wsdl(format!(
            "undeclared prefix '{}' in '{}'",
            prefix, value
        ))),
    }
}
