use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use uuid::Uuid;

use crate::bus::message::{Fault, NormalizedMessage};
use crate::errors::BusError;
use crate::qname::QName;

/// Message exchange pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mep {
    /// One way.
    InOnly,
    /// Request / response.
    InOut,
    /// One way, but a fault may come back.
    RobustInOnly,
    InOptionalOut,
}

impl Mep {
    pub const IN_ONLY: &'static str = "http://www.w3.org/2004/08/wsdl/in-only";
    pub const IN_OUT: &'static str = "http://www.w3.org/2004/08/wsdl/in-out";
    pub const ROBUST_IN_ONLY: &'static str = "http://www.w3.org/2004/08/wsdl/robust-in-only";
    pub const IN_OPTIONAL_OUT: &'static str = "http://www.w3.org/2004/08/wsdl/in-opt-out";

    pub fn uri(&self) -> &'static str {
        match self {
            Mep::InOnly => Self::IN_ONLY,
            Mep::InOut => Self::IN_OUT,
            Mep::RobustInOnly => Self::ROBUST_IN_ONLY,
            Mep::InOptionalOut => Self::IN_OPTIONAL_OUT,
        }
    }

    /// Accepts the 2004/08 URIs used on the bus as well as the WSDL 2.0
    /// pattern URIs (`http://www.w3.org/ns/wsdl/in-out`, ...).
    pub fn from_uri(uri: &str) -> Option<Mep> {
        let (base, pattern) = uri.trim().rsplit_once('/')?;
        if !matches!(
            base,
            "http://www.w3.org/2004/08/wsdl"
                | "http://www.w3.org/2006/01/wsdl"
                | "http://www.w3.org/ns/wsdl"
        ) {
            return None;
        }
        match pattern {
            "in-only" => Some(Mep::InOnly),
            "in-out" => Some(Mep::InOut),
            "robust-in-only" => Some(Mep::RobustInOnly),
            "in-opt-out" => Some(Mep::InOptionalOut),
            _ => None,
        }
    }

    /// True when the provider answers with an out message.
    pub fn has_output(&self) -> bool {
        matches!(self, Mep::InOut | Mep::InOptionalOut)
    }
}

impl fmt::Display for Mep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStatus {
    Active,
    Done,
    Error,
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExchangeStatus::Active => "ACTIVE",
            ExchangeStatus::Done => "DONE",
            ExchangeStatus::Error => "ERROR",
        })
    }
}

/// Side of the exchange currently holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Consumer,
    Provider,
}

/// One bus level request/response/fault unit.
///
/// Every mutator fails with [`BusError::Terminal`] once the status is `DONE` or
/// `ERROR`, so a terminal exchange can only be read and handed back.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    id: String,
    mep: Mep,
    role: Role,
    status: ExchangeStatus,
    service: Option<QName>,
    interface_name: Option<QName>,
    operation: Option<QName>,
    endpoint: Option<String>,
    in_message: Option<NormalizedMessage>,
    out_message: Option<NormalizedMessage>,
    fault: Option<Fault>,
    error: Option<String>,
    transacted: bool,
    properties: HashMap<String, Value>,
}

impl Exchange {
    pub fn new(mep: Mep, role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mep,
            role,
            status: ExchangeStatus::Active,
            service: None,
            interface_name: None,
            operation: None,
            endpoint: None,
            in_message: None,
            out_message: None,
            fault: None,
            error: None,
            transacted: false,
            properties: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mep(&self) -> Mep {
        self.mep
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> ExchangeStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status != ExchangeStatus::Active
    }

    pub fn service(&self) -> Option<&QName> {
        self.service.as_ref()
    }

    pub fn interface_name(&self) -> Option<&QName> {
        self.interface_name.as_ref()
    }

    pub fn operation(&self) -> Option<&QName> {
        self.operation.as_ref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn in_message(&self) -> Option<&NormalizedMessage> {
        self.in_message.as_ref()
    }

    pub fn out_message(&self) -> Option<&NormalizedMessage> {
        self.out_message.as_ref()
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_transacted(&self) -> bool {
        self.transacted
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    fn ensure_active(&self) -> Result<(), BusError> {
        if self.is_terminal() {
            Err(BusError::Terminal {
                id: self.id.clone(),
                status: self.status,
            })
        } else {
            Ok(())
        }
    }

    /// Role stamped by the bus on delivery, allowed on terminal exchanges too.
    pub(crate) fn assign_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn set_role(&mut self, role: Role) -> Result<(), BusError> {
        self.ensure_active()?;
        self.role = role;
        Ok(())
    }

    pub fn set_mep(&mut self, mep: Mep) -> Result<(), BusError> {
        self.ensure_active()?;
        self.mep = mep;
        Ok(())
    }

    pub fn set_service(&mut self, service: Option<QName>) -> Result<(), BusError> {
        self.ensure_active()?;
        self.service = service;
        Ok(())
    }

    pub fn set_interface_name(&mut self, interface: Option<QName>) -> Result<(), BusError> {
        self.ensure_active()?;
        self.interface_name = interface;
        Ok(())
    }

    pub fn set_operation(&mut self, operation: Option<QName>) -> Result<(), BusError> {
        self.ensure_active()?;
        self.operation = operation;
        Ok(())
    }

    pub fn set_endpoint(&mut self, endpoint: Option<String>) -> Result<(), BusError> {
        self.ensure_active()?;
        self.endpoint = endpoint;
        Ok(())
    }

    pub fn set_transacted(&mut self, transacted: bool) -> Result<(), BusError> {
        self.ensure_active()?;
        self.transacted = transacted;
        Ok(())
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) -> Result<(), BusError> {
        self.ensure_active()?;
        self.properties.insert(name.into(), value);
        Ok(())
    }

    pub fn set_in_message(&mut self, message: NormalizedMessage) -> Result<(), BusError> {
        self.ensure_active()?;
        self.in_message = Some(message);
        Ok(())
    }

    pub fn set_out_message(&mut self, message: NormalizedMessage) -> Result<(), BusError> {
        self.ensure_active()?;
        if !self.mep.has_output() {
            return Err(BusError::InvalidState(
                self.id.clone(),
                format!("no out message allowed for {}", self.mep),
            ));
        }
        self.out_message = Some(message);
        Ok(())
    }

    pub fn set_fault(&mut self, fault: Fault) -> Result<(), BusError> {
        self.ensure_active()?;
        self.fault = Some(fault);
        Ok(())
    }

    /// ACTIVE → ERROR.
    pub fn set_error(&mut self, error: impl Into<String>) -> Result<(), BusError> {
        self.ensure_active()?;
        self.error = Some(error.into());
        self.status = ExchangeStatus::Error;
        Ok(())
    }

    /// ACTIVE → DONE.
    pub fn done(&mut self) -> Result<(), BusError> {
        self.ensure_active()?;
        self.status = ExchangeStatus::Done;
        Ok(())
    }
}
