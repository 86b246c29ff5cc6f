//! # Module Endpoint
//!
//! Activation d'un endpoint déclaré dans la configuration.
//!
//! An [`EndpointConfig`] plus its WSDL document give a binding model, an
//! [`ExchangeCoordinator`] and either an [`InboundProcessor`] (consumer) or an
//! [`OutboundProcessor`] (provider). [`ActiveEndpoint::register`] plugs the
//! processor into a [`LoopbackBus`] and returns the axum router of consumers.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use soapbusconfig::{Config, EndpointConfig, EndpointRole, HttpSettings};
use tracing::{debug, info};

use crate::binding::{Binding, Style, build_binding, build_http_binding};
use crate::bus::{LoopbackBus, Mep, Role};
use crate::coordinator::{AddressingPolicy, CoordinatorSettings, ExchangeCoordinator, Policy};
use crate::errors::ConfigError;
use crate::inbound::InboundProcessor;
use crate::outbound::OutboundProcessor;
use crate::qname::QName;
use crate::soap::SoapVersion;
use crate::wsdl::WsdlDocument;

/// Processor owned by an active endpoint.
#[derive(Clone)]
pub enum EndpointProcessor {
    Consumer(Arc<InboundProcessor>),
    Provider(OutboundProcessor),
}

pub struct ActiveEndpoint {
    pub config: EndpointConfig,
    /// Service and port chosen in the WSDL.
    pub service: QName,
    pub port: String,
    pub coordinator: Arc<ExchangeCoordinator>,
    pub processor: EndpointProcessor,
}

impl ActiveEndpoint {
    /// Reads the WSDL named by `endpoint` (relative to the configuration
    /// directory) and activates the endpoint.
    pub fn load(config: &Config, endpoint: &EndpointConfig, http: &HttpSettings) -> Result<Self, ConfigError> {
        let path = config.resolve_path(&endpoint.wsdl);
        debug!(endpoint = %endpoint.name, path = %path.display(), "📄 Loading WSDL");
        let wsdl = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        Self::from_wsdl(endpoint, &wsdl, http)
    }

    pub fn from_wsdl(endpoint: &EndpointConfig, wsdl: &str, http: &HttpSettings) -> Result<Self, ConfigError> {
        let (binding, service, port) = select_binding(endpoint, wsdl)?;
        let binding = Arc::new(binding);
        let settings = coordinator_settings(endpoint, &binding, &service, &port)?;
        let policies = policies(&endpoint.policies)?;
        let coordinator = Arc::new(ExchangeCoordinator::new(binding, settings, policies)?);

        let processor = match endpoint.role {
            EndpointRole::Consumer => {
                let mut inbound = InboundProcessor::new(&endpoint.name, coordinator.clone(), http.clone())
                    .with_wsdl(wsdl);
                if let Some(ms) = endpoint.timeout_ms {
                    inbound = inbound.with_suspend_time(Duration::from_millis(ms));
                }
                EndpointProcessor::Consumer(Arc::new(inbound))
            }
            EndpointRole::Provider => {
                let mut outbound = OutboundProcessor::new(&endpoint.name, coordinator.clone(), http.clone())
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                if let Some(location) = &endpoint.location_uri {
                    outbound = outbound.with_location(location);
                }
                EndpointProcessor::Provider(outbound)
            }
        };

        info!(
            endpoint = %endpoint.name,
            role = ?endpoint.role,
            service = %service,
            port = %port,
            operations = coordinator.binding().operations.len(),
            "✅ Endpoint activated"
        );
        Ok(Self {
            config: endpoint.clone(),
            service,
            port,
            coordinator,
            processor,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Registers the endpoint on `bus` and starts it. Consumers return the
    /// router serving their HTTP path.
    pub fn register(&self, bus: &Arc<LoopbackBus>) -> Option<Router> {
        let name = self.config.name.as_str();
        match &self.processor {
            EndpointProcessor::Consumer(inbound) => {
                bus.register_consumer(name, inbound.clone());
                inbound.start(bus.channel(name, Role::Consumer));
                Some(inbound.router(&self.config.http_path()))
            }
            EndpointProcessor::Provider(outbound) => {
                bus.register_provider(
                    name,
                    Some(self.service.clone()),
                    Some(self.coordinator.binding().interface_name.clone()),
                    Arc::new(outbound.clone()),
                );
                outbound.start(bus.channel(name, Role::Provider));
                None
            }
        }
    }

    pub fn stop(&self) {
        match &self.processor {
            EndpointProcessor::Consumer(inbound) => inbound.stop(),
            EndpointProcessor::Provider(outbound) => outbound.stop(),
        }
    }
}

/// Binding of the configured service/port, first declared ones by default.
fn select_binding(endpoint: &EndpointConfig, wsdl: &str) -> Result<(Binding, QName, String), ConfigError> {
    let service_name = endpoint.service.as_deref().map(parse_qname).transpose()?;

    let (mut binding, service, port) = match WsdlDocument::parse(wsdl)? {
        WsdlDocument::V11(definition) => {
            let service = definition
                .service(service_name.as_ref())
                .ok_or_else(|| unknown_service(service_name.as_ref()))?;
            let port = service
                .port(endpoint.endpoint.as_deref())
                .ok_or_else(|| unknown_port(endpoint, &service.name))?;
            (
                build_binding(&definition, port)?,
                service.name.clone(),
                port.name.clone(),
            )
        }
        WsdlDocument::V20(description) => {
            let service = description
                .service(service_name.as_ref())
                .ok_or_else(|| unknown_service(service_name.as_ref()))?;
            let port = service
                .endpoint(endpoint.endpoint.as_deref())
                .ok_or_else(|| unknown_port(endpoint, &service.name))?;
            (
                build_http_binding(&description, port)?,
                service.name.clone(),
                port.name.clone(),
            )
        }
    };

    if let Some(style) = endpoint.style.as_deref() {
        let style = Style::parse(style)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown style '{}'", style)))?;
        binding.style = style;
        for op in &mut binding.operations {
            op.style = style;
        }
    }
    Ok((binding, service, port))
}

fn coordinator_settings(
    endpoint: &EndpointConfig,
    binding: &Binding,
    service: &QName,
    port: &str,
) -> Result<CoordinatorSettings, ConfigError> {
    let default_mep = Mep::from_uri(&endpoint.default_mep)
        .ok_or_else(|| ConfigError::Invalid(format!("unknown MEP '{}'", endpoint.default_mep)))?;
    let soap_version = match endpoint.soap_version.as_deref() {
        Some(v) => SoapVersion::parse(v)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown SOAP version '{}'", v)))?,
        None => binding.soap_version().unwrap_or_default(),
    };
    let qname = |value: &Option<String>| value.as_deref().map(parse_qname).transpose();

    Ok(CoordinatorSettings {
        service: Some(service.clone()),
        interface_name: Some(binding.interface_name.clone()),
        endpoint: Some(port.to_string()),
        target_service: qname(&endpoint.target_service)?,
        target_interface: qname(&endpoint.target_interface)?,
        target_endpoint: endpoint.target_endpoint.clone(),
        default_mep,
        default_operation: qname(&endpoint.default_operation)?,
        soap_version,
        use_jbi_wrapper: endpoint.use_jbi_wrapper,
    })
}

/// Policies by configuration name, in order.
pub fn policies(names: &[String]) -> Result<Vec<Arc<dyn Policy>>, ConfigError> {
    names
        .iter()
        .map(|name| match name.trim().to_ascii_lowercase().as_str() {
            "addressing" | "ws-addressing" => Ok(Arc::new(AddressingPolicy::new()) as Arc<dyn Policy>),
            other => Err(ConfigError::Invalid(format!("unknown policy '{}'", other))),
        })
        .collect()
}

fn parse_qname(value: &str) -> Result<QName, ConfigError> {
    value.parse().map_err(ConfigError::Invalid)
}

fn unknown_service(name: Option<&QName>) -> ConfigError {
    match name {
        Some(name) => ConfigError::UnknownService(name.to_string()),
        None => ConfigError::wsdl("no service declared"),
    }
}

fn unknown_port(endpoint: &EndpointConfig, service: &QName) -> ConfigError {
    match &endpoint.endpoint {
        Some(port) => ConfigError::UnknownPort(format!("{} in {}", port, service)),
        None => ConfigError::wsdl(format!("service {} has no port", service)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WSDL: &str = include_str!("../tests/wsdl/hello_world.wsdl");
    const WEATHER_WSDL: &str = include_str!("../tests/wsdl/weather_http.wsdl");
    const TNS: &str = "http://apache.org/hello_world_soap_http";

    fn declaration(role: EndpointRole) -> EndpointConfig {
        EndpointConfig {
            name: "greeter".into(),
            role,
            wsdl: "hello_world.wsdl".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_consumer_uses_first_service_and_port() {
        let ep = ActiveEndpoint::from_wsdl(&declaration(EndpointRole::Consumer), HELLO_WSDL, &HttpSettings::default())
            .unwrap();
        assert_eq!(ep.service, QName::new(TNS, "SOAPService"));
        assert_eq!(ep.port, "SoapPort");
        assert!(matches!(ep.processor, EndpointProcessor::Consumer(_)));

        let settings = ep.coordinator.settings();
        assert_eq!(settings.interface_name, Some(QName::new(TNS, "Greeter")));
        assert_eq!(settings.default_mep, Mep::InOut);
        assert_eq!(settings.soap_version, SoapVersion::Soap11);
    }

    #[test]
    fn test_unknown_port_is_reported() {
        let mut decl = declaration(EndpointRole::Consumer);
        decl.endpoint = Some("Nope".into());
        let err = ActiveEndpoint::from_wsdl(&decl, HELLO_WSDL, &HttpSettings::default()).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownPort(_)));

        let mut decl = declaration(EndpointRole::Consumer);
        decl.service = Some(format!("{{{}}}Other", TNS));
        let err = ActiveEndpoint::from_wsdl(&decl, HELLO_WSDL, &HttpSettings::default()).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownService(_)));
    }

    #[test]
    fn test_rpc_style_override_is_refused() {
        let mut decl = declaration(EndpointRole::Provider);
        decl.style = Some("rpc".into());
        let err = ActiveEndpoint::from_wsdl(&decl, HELLO_WSDL, &HttpSettings::default()).err().unwrap();
        assert!(matches!(err, ConfigError::NotImplemented(_)));
    }

    #[test]
    fn test_http_binding_cannot_be_served() {
        let err = ActiveEndpoint::from_wsdl(&declaration(EndpointRole::Consumer), WEATHER_WSDL, &HttpSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::NotImplemented(_)));
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(policies(&["addressing".into()]).unwrap().len(), 1);
        assert!(matches!(
            policies(&["security".into()]),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_bad_targets_and_mep() {
        let mut decl = declaration(EndpointRole::Consumer);
        decl.default_mep = "urn:whatever".into();
        assert!(ActiveEndpoint::from_wsdl(&decl, HELLO_WSDL, &HttpSettings::default()).is_err());

        let mut decl = declaration(EndpointRole::Consumer);
        decl.target_service = Some("{broken".into());
        assert!(ActiveEndpoint::from_wsdl(&decl, HELLO_WSDL, &HttpSettings::default()).is_err());
    }

    #[tokio::test]
    async fn test_register_starts_the_processor() {
        let bus = LoopbackBus::new();
        let consumer = ActiveEndpoint::from_wsdl(&declaration(EndpointRole::Consumer), HELLO_WSDL, &HttpSettings::default())
            .unwrap();
        assert!(consumer.register(&bus).is_some());
        match &consumer.processor {
            EndpointProcessor::Consumer(inbound) => assert!(inbound.is_started()),
            EndpointProcessor::Provider(_) => unreachable!(),
        }

        let mut decl = declaration(EndpointRole::Provider);
        decl.name = "remote".into();
        let provider = ActiveEndpoint::from_wsdl(&decl, HELLO_WSDL, &HttpSettings::default()).unwrap();
        assert!(provider.register(&bus).is_none());
        provider.stop();
    }
}
