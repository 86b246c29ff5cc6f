//! # Module Coordinator
//!
//! Passage SOAP ⇄ bus pour un endpoint.
//!
//! [`ExchangeCoordinator`] resolves the WSDL operation targeted by an inbound
//! body, builds the bus exchange, and converts messages in both directions. A
//! chain of [`Policy`] values is called at each step, in insertion order.
//!
//! Only document style with a single body part and no SOAP header part is
//! handled. Any other binding is refused when the coordinator is built.

mod addressing;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::binding::{Binding, BindingKind, Message, Operation, Style};
use crate::bus::{Exchange, Fault, Mep, NormalizedMessage, Role};
use crate::errors::{ConfigError, SoapError};
use crate::qname::QName;
use crate::soap::{SoapFault, SoapMessage, SoapVersion};
use crate::wrapper::{is_wrapped, unwrap_parts, wrap_parts};
use crate::wsdl::Direction;

pub use addressing::{AddressingPolicy, WSA_NAMESPACES};

/// Per-exchange state shared by the coordinator and the policies.
///
/// On the consumer side `request` is the envelope received over HTTP and
/// `response` the one written back. On the provider side `request` is the
/// envelope sent to the remote service and `response` its answer.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub request: Option<SoapMessage>,
    pub response: Option<SoapMessage>,
    /// Overrides set by policies, used in place of the configured targets.
    pub service: Option<QName>,
    pub interface_name: Option<QName>,
    pub endpoint: Option<String>,
    pub operation: Option<QName>,
    pub protocol_headers: BTreeMap<String, String>,
    pub properties: HashMap<String, Value>,
}

impl Context {
    pub fn new(request: SoapMessage) -> Self {
        Self {
            request: Some(request),
            ..Default::default()
        }
    }
}

/// Traitement transverse appliqué à chaque étape d'un échange.
///
/// Every hook defaults to a no-op. Returning a fault aborts the step and the
/// fault is sent back to the caller.
pub trait Policy: Send + Sync {
    fn on_receive(&self, _ctx: &mut Context) -> Result<(), SoapFault> {
        Ok(())
    }

    fn on_reply(&self, _ctx: &mut Context, _reply: &mut SoapMessage) -> Result<(), SoapFault> {
        Ok(())
    }

    fn on_fault(&self, _ctx: &mut Context, _fault: &mut SoapMessage) {}

    fn on_send(&self, _ctx: &mut Context, _request: &mut SoapMessage) -> Result<(), SoapFault> {
        Ok(())
    }

    fn on_answer(&self, _ctx: &mut Context, _answer: &SoapMessage) -> Result<(), SoapFault> {
        Ok(())
    }
}

/// Identity and defaults of the endpoint owning a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub service: Option<QName>,
    pub interface_name: Option<QName>,
    pub endpoint: Option<String>,
    pub target_service: Option<QName>,
    pub target_interface: Option<QName>,
    pub target_endpoint: Option<String>,
    pub default_mep: Mep,
    pub default_operation: Option<QName>,
    pub soap_version: SoapVersion,
    pub use_jbi_wrapper: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            service: None,
            interface_name: None,
            endpoint: None,
            target_service: None,
            target_interface: None,
            target_endpoint: None,
            default_mep: Mep::InOut,
            default_operation: None,
            soap_version: SoapVersion::Soap11,
            use_jbi_wrapper: true,
        }
    }
}

pub struct ExchangeCoordinator {
    binding: Arc<Binding>,
    settings: CoordinatorSettings,
    policies: Vec<Arc<dyn Policy>>,
}

impl std::fmt::Debug for ExchangeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCoordinator")
            .field("interface", &self.binding.interface_name)
            .field("settings", &self.settings)
            .field("policies", &self.policies.len())
            .finish()
    }
}

impl ExchangeCoordinator {
    pub fn new(
        binding: Arc<Binding>,
        settings: CoordinatorSettings,
        policies: Vec<Arc<dyn Policy>>,
    ) -> Result<Self, ConfigError> {
        validate(&binding, &settings)?;
        Ok(Self {
            binding,
            settings,
            policies,
        })
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Declared operation named `name`, if any.
    pub fn operation(&self, name: Option<&QName>) -> Option<&Operation> {
        name.and_then(|n| self.binding.operation(n))
    }

    /// Builds the bus exchange for the envelope held by `ctx.request`.
    pub fn on_receive(&self, ctx: &mut Context) -> Result<Exchange, SoapError> {
        for policy in &self.policies {
            policy.on_receive(ctx)?;
        }
        let request = ctx
            .request
            .as_ref()
            .ok_or_else(|| SoapError::Malformed("no request envelope".into()))?;
        if request.version != self.settings.soap_version {
            return Err(SoapError::VersionMismatch {
                expected: self.settings.soap_version.to_string(),
                found: request.version.to_string(),
            });
        }
        if request.is_fault() {
            return Err(SoapFault::sender("A SOAP fault is not a valid request").into());
        }

        let resolved = self.resolve_operation(ctx.operation.as_ref(), request.body_name.as_ref());
        let operation_name = match resolved {
            Some(op) => Some(op.name.clone()),
            None => ctx
                .operation
                .clone()
                .or_else(|| self.settings.default_operation.clone())
                .or_else(|| request.body_name.clone()),
        };
        let mep = resolved.map(|op| op.mep).unwrap_or(self.settings.default_mep);

        let mut in_message = self.to_normalized(request, resolved, Direction::In)?;
        if !ctx.protocol_headers.is_empty() {
            in_message.set_protocol_headers(ctx.protocol_headers.clone());
        }

        let mut exchange = Exchange::new(mep, Role::Consumer);
        exchange.set_service(
            ctx.service
                .clone()
                .or_else(|| self.settings.target_service.clone())
                .or_else(|| self.settings.service.clone()),
        )?;
        exchange.set_interface_name(
            ctx.interface_name
                .clone()
                .or_else(|| self.settings.target_interface.clone())
                .or_else(|| self.settings.interface_name.clone()),
        )?;
        exchange.set_endpoint(
            ctx.endpoint
                .clone()
                .or_else(|| self.settings.target_endpoint.clone())
                .or_else(|| self.settings.endpoint.clone()),
        )?;
        exchange.set_operation(operation_name.clone())?;
        exchange.set_in_message(in_message)?;
        ctx.operation = operation_name;

        debug!(
            exchange_id = %exchange.id(),
            operation = ?ctx.operation.as_ref().map(ToString::to_string),
            mep = %mep,
            "📥 SOAP request mapped to exchange"
        );
        Ok(exchange)
    }

    /// Explicit override first, then the first operation whose input element
    /// is the body element (declaration order).
    fn resolve_operation(&self, requested: Option<&QName>, body: Option<&QName>) -> Option<&Operation> {
        self.operation(requested)
            .or_else(|| body.and_then(|b| self.binding.operation_for_element(b)))
            .or_else(|| self.operation(self.settings.default_operation.as_ref()))
    }

    /// SOAP reply for the out message of the exchange handled in `ctx`.
    pub fn on_reply(&self, ctx: &mut Context, out: &NormalizedMessage) -> Result<SoapMessage, SoapError> {
        let operation = self.operation(ctx.operation.as_ref());
        let mut reply = self.to_soap(out, operation, Direction::Out)?;
        if let Some(request) = &ctx.request {
            reply.version = request.version;
            reply.envelope_prefix = request.prefix().to_string();
        }
        for policy in &self.policies {
            policy.on_reply(ctx, &mut reply)?;
        }
        ctx.response = Some(reply.clone());
        Ok(reply)
    }

    /// SOAP fault message for `fault`, in the convention of the request.
    pub fn on_fault(&self, ctx: &mut Context, fault: &Fault) -> SoapMessage {
        let soap_fault = soap_fault(fault);
        let mut message = match &ctx.request {
            Some(request) => SoapMessage {
                fault: Some(soap_fault),
                ..SoapMessage::reply_to(request)
            },
            None => SoapMessage::fault_message(self.settings.soap_version, soap_fault),
        };
        for policy in &self.policies {
            policy.on_fault(ctx, &mut message);
        }
        ctx.response = Some(message.clone());
        message
    }

    /// Envelope sent to the remote service for the in message of `exchange`.
    pub fn on_send(&self, ctx: &mut Context, exchange: &Exchange) -> Result<SoapMessage, SoapError> {
        ctx.operation = exchange.operation().cloned();
        ctx.service = exchange.service().cloned();
        ctx.interface_name = exchange.interface_name().cloned();
        ctx.endpoint = exchange.endpoint().map(str::to_string);

        let in_message = exchange
            .in_message()
            .ok_or_else(|| SoapError::Malformed(format!("exchange {} has no in message", exchange.id())))?;
        ctx.protocol_headers = in_message.protocol_headers();

        let operation = self.operation(ctx.operation.as_ref());
        let mut request = self.to_soap(in_message, operation, Direction::In)?;
        for policy in &self.policies {
            policy.on_send(ctx, &mut request)?;
        }
        ctx.request = Some(request.clone());
        Ok(request)
    }

    /// Out message built from the remote answer. A fault answer is returned as
    /// [`SoapError::Fault`].
    pub fn on_answer(&self, ctx: &mut Context, answer: SoapMessage) -> Result<NormalizedMessage, SoapError> {
        for policy in &self.policies {
            policy.on_answer(ctx, &answer)?;
        }
        if let Some(fault) = &answer.fault {
            let fault = fault.clone();
            ctx.response = Some(answer);
            return Err(fault.into());
        }
        let operation = self.operation(ctx.operation.as_ref());
        let message = self.to_normalized(&answer, operation, Direction::Out)?;
        ctx.response = Some(answer);
        Ok(message)
    }

    /// Converts a bus message into an envelope of the configured version.
    ///
    /// Wrapped content is unwrapped against the operation message of
    /// `direction`. SOAP headers come from the `soap.headers` property.
    pub fn to_soap(
        &self,
        message: &NormalizedMessage,
        operation: Option<&Operation>,
        direction: Direction,
    ) -> Result<SoapMessage, SoapError> {
        let mut soap = SoapMessage::new(self.settings.soap_version);
        if let Some(content) = message.content.as_deref().filter(|c| !c.trim().is_empty()) {
            let body = if is_wrapped(content) {
                let expected = message_for(operation, direction).map(|m| m.body_parts().count());
                unwrap_parts(content, expected)?.concat()
            } else {
                content.to_string()
            };
            soap.set_body(body)?;
        }
        soap.headers = message.soap_headers();
        Ok(soap)
    }

    /// Converts an envelope into a bus message, wrapping the body part when the
    /// endpoint uses the wrapper and the operation message is known.
    pub fn to_normalized(
        &self,
        soap: &SoapMessage,
        operation: Option<&Operation>,
        direction: Direction,
    ) -> Result<NormalizedMessage, SoapError> {
        let mut message = NormalizedMessage::default();
        let wsdl_message = message_for(operation, direction);
        message.content = match (self.settings.use_jbi_wrapper, wsdl_message) {
            (true, Some(wsdl_message)) => {
                let parts: Vec<&str> = soap.body.as_deref().into_iter().collect();
                Some(wrap_parts(&wsdl_message.name, &parts, &soap.namespaces)?)
            }
            _ => soap.body.clone(),
        };
        message.set_soap_headers(&soap.headers);
        Ok(message)
    }
}

fn message_for(operation: Option<&Operation>, direction: Direction) -> Option<&Message> {
    let op = operation?;
    match direction {
        Direction::In => Some(&op.input),
        Direction::Out => op.output.as_ref(),
    }
}

fn validate(binding: &Binding, settings: &CoordinatorSettings) -> Result<(), ConfigError> {
    if binding.kind == BindingKind::Http {
        return Err(ConfigError::NotImplemented(format!(
            "HTTP binding of {} cannot be served as SOAP",
            binding.interface_name
        )));
    }
    if binding.style == Style::Rpc && binding.operations.is_empty() {
        return Err(ConfigError::NotImplemented("RPC style binding".into()));
    }
    for op in &binding.operations {
        if op.style == Style::Rpc {
            return Err(ConfigError::NotImplemented(format!(
                "RPC style operation {}",
                op.name
            )));
        }
        for message in std::iter::once(&op.input).chain(op.output.as_ref()) {
            if message.body_parts().count() > 1 {
                return Err(ConfigError::NotImplemented(format!(
                    "message {} of {} has more than one body part",
                    message.name, op.name
                )));
            }
            if let Some(part) = message.header_parts().next() {
                return Err(ConfigError::NotImplemented(format!(
                    "SOAP header part '{}' in operation {}",
                    part.name, op.name
                )));
            }
            if settings.use_jbi_wrapper && message.name.local.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "empty message type in operation {}",
                    op.name
                )));
            }
        }
    }
    Ok(())
}

/// Bus fault → SOAP fault. Missing codes default to `Receiver`.
pub fn soap_fault(fault: &Fault) -> SoapFault {
    let mut soap = match &fault.code {
        Some(code) => SoapFault::new(code.clone(), String::new()),
        None => SoapFault::receiver(String::new()),
    };
    soap.reason = fault
        .reason
        .clone()
        .unwrap_or_else(|| "Fault occured".to_string());
    soap.subcode = fault.subcode.clone();
    soap.node = fault.node.clone();
    soap.role = fault.role.clone();
    soap.detail = fault.message.content.as_deref().map(|content| {
        if is_wrapped(content) {
            match unwrap_parts(content, None) {
                Ok(parts) => parts.concat(),
                Err(e) => {
                    warn!("⚠️ Cannot unwrap fault detail: {}", e);
                    content.to_string()
                }
            }
        } else {
            content.to_string()
        }
    });
    soap
}

/// SOAP fault → bus fault.
pub fn bus_fault(fault: &SoapFault) -> Fault {
    let mut bus = Fault::new(fault.reason.clone()).with_code(fault.code.clone());
    bus.subcode = fault.subcode.clone();
    bus.node = fault.node.clone();
    bus.role = fault.role.clone();
    bus.message.content = fault.detail.clone();
    bus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::build_binding;
    use crate::soap::read_soap;
    use crate::wsdl::Definition;

    const HELLO_WSDL: &str = include_str!("../../tests/wsdl/hello_world.wsdl");
    const TNS: &str = "http://apache.org/hello_world_soap_http";
    const TYPES: &str = "http://apache.org/hello_world_soap_http/types";

    fn coordinator(settings: CoordinatorSettings) -> ExchangeCoordinator {
        let def = Definition::parse(HELLO_WSDL).unwrap();
        let port = def.service(None).unwrap().port(None).unwrap();
        let binding = build_binding(&def, port).unwrap();
        ExchangeCoordinator::new(Arc::new(binding), settings, Vec::new()).unwrap()
    }

    fn request(body: &str) -> SoapMessage {
        let xml = format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>{}</soap:Body></soap:Envelope>"#,
            body
        );
        read_soap(xml.as_bytes(), None).unwrap()
    }

    #[test]
    fn test_receive_wraps_the_body_part() {
        let coord = coordinator(CoordinatorSettings::default());
        let mut ctx = Context::new(request(&format!(
            r#"<greetMe xmlns="{}"><requestType>Eugene</requestType></greetMe>"#,
            TYPES
        )));

        let ex = coord.on_receive(&mut ctx).unwrap();
        assert_eq!(ex.operation(), Some(&QName::new(TNS, "greetMe")));
        assert_eq!(ex.mep(), Mep::InOut);
        let content = ex.in_message().unwrap().content.as_deref().unwrap();
        assert!(content.starts_with("<jbi:message "));
        assert!(content.contains(r#"type="msgns:greetMeRequest""#));
    }

    #[test]
    fn test_one_way_and_robust_operations() {
        let coord = coordinator(CoordinatorSettings::default());

        let mut ctx = Context::new(request(&format!(r#"<greetMeOneWay xmlns="{}"/>"#, TYPES)));
        assert_eq!(coord.on_receive(&mut ctx).unwrap().mep(), Mep::InOnly);

        let mut ctx = Context::new(request(&format!(r#"<pingMe xmlns="{}"/>"#, TYPES)));
        assert_eq!(coord.on_receive(&mut ctx).unwrap().mep(), Mep::RobustInOnly);
    }

    #[test]
    fn test_default_operation_is_used_when_nothing_matches() {
        let coord = coordinator(CoordinatorSettings {
            default_operation: Some(QName::new(TNS, "sayHi")),
            ..Default::default()
        });
        let mut ctx = Context::new(request("<unknown/>"));

        let ex = coord.on_receive(&mut ctx).unwrap();
        assert_eq!(ex.operation(), Some(&QName::new(TNS, "sayHi")));
        assert_eq!(ex.mep(), Mep::InOut);
    }

    #[test]
    fn test_version_mismatch_is_refused() {
        let coord = coordinator(CoordinatorSettings {
            soap_version: SoapVersion::Soap12,
            ..Default::default()
        });
        let mut ctx = Context::new(request("<a/>"));
        assert!(matches!(
            coord.on_receive(&mut ctx),
            Err(SoapError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_reply_unwraps_out_message() {
        let coord = coordinator(CoordinatorSettings::default());
        let mut ctx = Context::new(request(&format!(r#"<greetMe xmlns="{}"/>"#, TYPES)));
        coord.on_receive(&mut ctx).unwrap();

        let body = format!(r#"<greetMeResponse xmlns="{}"><responseType>Hello</responseType></greetMeResponse>"#, TYPES);
        let wrapped = wrap_parts(&QName::new(TNS, "greetMeResponse"), &[body.as_str()], &[]).unwrap();
        let reply = coord.on_reply(&mut ctx, &NormalizedMessage::new(wrapped)).unwrap();

        assert_eq!(reply.body.as_deref(), Some(body.as_str()));
        assert_eq!(reply.envelope_prefix, "soap");
    }

    #[test]
    fn test_rpc_binding_is_not_implemented() {
        let def = Definition::parse(HELLO_WSDL).unwrap();
        let port = def.service(None).unwrap().port(None).unwrap();
        let mut binding = build_binding(&def, port).unwrap();
        binding.operations[0].style = Style::Rpc;

        let err = ExchangeCoordinator::new(Arc::new(binding), CoordinatorSettings::default(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotImplemented(_)));
    }

    #[test]
    fn test_fault_conversions() {
        let fault = Fault::new("Unknown city")
            .with_code(QName::new(crate::soap::SOAP12_ENV_NS, "Sender"))
            .with_detail("<unknownCity/>");
        let soap = soap_fault(&fault);
        assert!(soap.is_sender());
        assert_eq!(soap.detail.as_deref(), Some("<unknownCity/>"));
        assert_eq!(bus_fault(&soap), fault);

        let soap = soap_fault(&Fault::default());
        assert!(!soap.is_sender());
    }
}
