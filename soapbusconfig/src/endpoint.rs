//! Déclarations d'endpoints lues dans la section `endpoints:` de la configuration.

use serde::{Deserialize, Serialize};

/// Default message exchange pattern used when an operation cannot be resolved.
pub const DEFAULT_MEP: &str = "http://www.w3.org/2004/08/wsdl/in-out";

/// Side of the bus an endpoint sits on.
///
/// A `consumer` endpoint accepts SOAP requests over HTTP and hands them to the bus.
/// A `provider` endpoint receives exchanges from the bus and calls a remote SOAP
/// service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    #[default]
    Consumer,
    Provider,
}

/// One endpoint declaration.
///
/// QName valued fields use the `{namespace}local` notation.
///
/// ```yaml
/// endpoints:
///   - name: greeter
///     role: consumer
///     wsdl: wsdl/hello_world.wsdl
///     path: /greeter
///     target_service: "{http://example.org/bus}Greeter"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub name: String,
    pub role: EndpointRole,
    /// WSDL document, absolute or relative to the configuration directory.
    pub wsdl: String,
    /// Service to expose. The first service of the WSDL when absent.
    pub service: Option<String>,
    /// Port name inside `service`. The first port when absent.
    pub endpoint: Option<String>,
    /// `1.1` or `1.2`. Taken from the WSDL binding when absent.
    pub soap_version: Option<String>,
    /// `document` or `rpc`, overrides the binding style.
    pub style: Option<String>,
    pub default_mep: String,
    pub default_operation: Option<String>,
    pub target_service: Option<String>,
    pub target_interface: Option<String>,
    pub target_endpoint: Option<String>,
    /// Remote address for providers. Taken from `soap:address` when absent.
    pub location_uri: Option<String>,
    /// HTTP path a consumer is mounted on. Defaults to `/<name>`.
    pub path: Option<String>,
    /// Per endpoint override of `http.consumer_suspend_time_ms`.
    pub timeout_ms: Option<u64>,
    pub use_jbi_wrapper: bool,
    /// Policy names, applied in order (`addressing`).
    pub policies: Vec<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            role: EndpointRole::Consumer,
            wsdl: String::new(),
            service: None,
            endpoint: None,
            soap_version: None,
            style: None,
            default_mep: DEFAULT_MEP.to_string(),
            default_operation: None,
            target_service: None,
            target_interface: None,
            target_endpoint: None,
            location_uri: None,
            path: None,
            timeout_ms: None,
            use_jbi_wrapper: true,
            policies: Vec::new(),
        }
    }
}

impl EndpointConfig {
    /// HTTP path of a consumer endpoint, always starting with `/`.
    pub fn http_path(&self) -> String {
        let raw = self.path.clone().unwrap_or_else(|| self.name.clone());
        if raw.starts_with('/') {
            raw
        } else {
            format!("/{}", raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_declaration_gets_defaults() {
        let cfg: EndpointConfig =
            serde_yaml::from_str("name: greeter\nwsdl: hello.wsdl\n").unwrap();
        assert_eq!(cfg.role, EndpointRole::Consumer);
        assert_eq!(cfg.default_mep, DEFAULT_MEP);
        assert!(cfg.use_jbi_wrapper);
        assert!(cfg.policies.is_empty());
        assert_eq!(cfg.http_path(), "/greeter");
    }

    #[test]
    fn test_provider_declaration() {
        let yaml = r#"
name: remote
role: provider
wsdl: /srv/remote.wsdl
location_uri: http://localhost:9000/remote
policies: [addressing]
"#;
        let cfg: EndpointConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.role, EndpointRole::Provider);
        assert_eq!(
            cfg.location_uri.as_deref(),
            Some("http://localhost:9000/remote")
        );
        assert_eq!(cfg.policies, vec!["addressing".to_string()]);
    }

    #[test]
    fn test_http_path_keeps_leading_slash() {
        let cfg = EndpointConfig {
            name: "x".into(),
            path: Some("/soap/x".into()),
            ..Default::default()
        };
        assert_eq!(cfg.http_path(), "/soap/x");
    }
}
