use std::time::Duration;

use thiserror::Error;

use crate::bus::ExchangeStatus;
use crate::soap::SoapFault;

/// Erreurs fatales à l'activation d'un endpoint.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Part '{0}' is neither bound to the SOAP body nor to a SOAP header")]
    UnboundPart(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Invalid endpoint configuration: {0}")]
    Invalid(String),
    #[error("Operation '{0}' has no input message")]
    MissingInput(String),
    #[error("Unknown service {0}")]
    UnknownService(String),
    #[error("Unknown port {0}")]
    UnknownPort(String),
    #[error("Invalid WSDL: {0}")]
    Wsdl(String),
    #[error("Unsupported type system {0}")]
    UnsupportedTypeSystem(String),
    #[error("Cannot read {0}: {1}")]
    Io(String, std::io::Error),
}

impl ConfigError {
    pub fn wsdl(msg: impl Into<String>) -> Self {
        ConfigError::Wsdl(msg.into())
    }
}

impl From<xmltree::ParseError> for ConfigError {
    fn from(error: xmltree::ParseError) -> Self {
        ConfigError::Wsdl(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Malformed XML: {0}")]
    Malformed(String),
    #[error("Illegal cursor state: {0}")]
    IllegalState(String),
    #[error("Attribute index {index} out of range (count {count})")]
    AttributeOutOfRange { index: usize, count: usize },
    #[error("Message type {0} is empty")]
    MissingMessageType(&'static str),
    #[error("XML write error: {0}")]
    Write(String),
}

impl From<quick_xml::Error> for XmlError {
    fn from(error: quick_xml::Error) -> Self {
        XmlError::Malformed(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SoapError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("Malformed SOAP envelope: {0}")]
    Malformed(String),
    #[error("SOAP version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
    #[error("Unexpected wrapper: {0}")]
    UnexpectedWrapper(String),
    #[error("Operation {0} is not declared by the binding")]
    UnknownOperation(String),
    #[error("SOAP fault: {}", .0.reason)]
    Fault(Box<SoapFault>),
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<SoapFault> for SoapError {
    fn from(fault: SoapFault) -> Self {
        SoapError::Fault(Box::new(fault))
    }
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Exchange {id} is already {status}")]
    Terminal { id: String, status: ExchangeStatus },
    #[error("Delivery channel closed")]
    ChannelClosed,
    #[error("Exchange {0} not found")]
    ExchangeNotFound(String),
    #[error("No endpoint registered for {0}")]
    NoRoute(String),
    #[error("Exchange {0}: {1}")]
    InvalidState(String, String),
}

#[derive(Error, Debug)]
pub enum InboundError {
    #[error("Timeout after {0:?} waiting for the bus")]
    Timeout(Duration),
    #[error("Endpoint not started")]
    NotStarted,
    #[error(transparent)]
    Soap(#[from] SoapError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[derive(Error, Debug)]
pub enum OutboundError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Soap(#[from] SoapError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("No location URI for {0}")]
    MissingLocation(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}
