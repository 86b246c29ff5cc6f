//! # Module Bus
//!
//! Bus side of the binding: exchanges, normalized messages and the channel
//! used to hand exchanges over.
//!
//! The bus itself is an external collaborator. [`DeliveryChannel`] is the only
//! thing the processors need from it, [`ExchangeProcessor`] is what the bus
//! calls back. [`LoopbackBus`] is a minimal in-process router used by the
//! `SoapBus` binary and by the tests.

mod exchange;
mod loopback;
mod message;

use async_trait::async_trait;

use crate::errors::BusError;

pub use exchange::{Exchange, ExchangeStatus, Mep, Role};
pub use loopback::LoopbackBus;
pub use message::{Fault, HTTP_LOCATION, NormalizedMessage, PROTOCOL_HEADERS, SOAP_HEADERS};

/// Handle used by an endpoint to give an exchange back to the bus.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Hands the exchange over and returns immediately.
    async fn send(&self, exchange: Exchange) -> Result<(), BusError>;

    /// Hands the exchange over and waits until the other side sends it back.
    async fn send_sync(&self, exchange: Exchange) -> Result<Exchange, BusError>;
}

/// Entry point of an endpoint for exchanges delivered by the bus.
#[async_trait]
pub trait ExchangeProcessor: Send + Sync {
    async fn process(&self, exchange: Exchange) -> Result<(), BusError>;
}
