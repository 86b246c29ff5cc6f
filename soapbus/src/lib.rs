//! # SoapBus
//!
//! Binding SOAP/HTTP d'un bus d'intégration.
//!
//! Endpoints described by a WSDL document are exposed over SOAP/HTTP and
//! translated to and from bus exchanges carrying normalized messages:
//!
//! - [`inbound::InboundProcessor`] serves SOAP requests and hands them to the bus,
//! - [`outbound::OutboundProcessor`] takes exchanges from the bus and calls a
//!   remote SOAP service,
//! - [`coordinator::ExchangeCoordinator`] does the SOAP ⇄ bus conversion for both,
//! - [`endpoint::ActiveEndpoint`] wires everything from an endpoint declaration.

pub mod binding;
pub mod bus;
pub mod coordinator;
pub mod endpoint;
pub mod errors;
pub mod inbound;
pub mod outbound;
pub mod qname;
pub mod soap;
pub mod wrapper;
pub mod wsdl;
pub mod xml;

pub use crate::binding::{Binding, Operation, build_binding, build_http_binding};
pub use crate::bus::{
    DeliveryChannel, Exchange, ExchangeProcessor, ExchangeStatus, Fault, LoopbackBus, Mep,
    NormalizedMessage, Role,
};
pub use crate::coordinator::{
    AddressingPolicy, Context, CoordinatorSettings, ExchangeCoordinator, Policy,
};
pub use crate::endpoint::{ActiveEndpoint, EndpointProcessor};
pub use crate::errors::{BusError, ConfigError, InboundError, OutboundError, SoapError, XmlError};
pub use crate::inbound::{InboundProcessor, PendingState};
pub use crate::outbound::OutboundProcessor;
pub use crate::qname::QName;
pub use crate::soap::{SoapFault, SoapMessage, SoapVersion};
pub use crate::wsdl::WsdlDocument;
