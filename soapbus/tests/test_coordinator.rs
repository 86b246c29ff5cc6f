use std::sync::Arc;

use soapbus::coordinator::soap_fault;
use soapbus::soap::read_soap;
use soapbus::wrapper::{JBI_NS, unwrap_parts};
use soapbus::wsdl::Definition;
use soapbus::{
    AddressingPolicy, Context, CoordinatorSettings, ExchangeCoordinator, Fault, Mep, Policy, QName,
    SoapMessage, build_binding,
};

const GREETER_WSDL: &str = include_str!("wsdl/greeter.wsdl");
const TNS: &str = "urn:greet";
const TYPES: &str = "urn:greet:types";

fn coordinator(settings: CoordinatorSettings, policies: Vec<Arc<dyn Policy>>) -> ExchangeCoordinator {
    let def = Definition::parse(GREETER_WSDL).unwrap();
    let port = def.service(None).unwrap().port(None).unwrap();
    let binding = build_binding(&def, port).unwrap();
    ExchangeCoordinator::new(Arc::new(binding), settings, policies).unwrap()
}

fn envelope(headers: &str, body: &str) -> SoapMessage {
    let xml = format!(
        r#"<?xml version="1.0"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Header>{}</soapenv:Header>
  <soapenv:Body>{}</soapenv:Body>
</soapenv:Envelope>"#,
        headers, body
    );
    read_soap(xml.as_bytes(), Some("text/xml; charset=utf-8")).unwrap()
}

#[test]
fn test_greet_me_resolves_to_request_response() {
    let coord = coordinator(
        CoordinatorSettings {
            service: Some(QName::new(TNS, "GreeterService")),
            interface_name: Some(QName::new(TNS, "Greeter")),
            endpoint: Some("GreeterPort".into()),
            ..Default::default()
        },
        Vec::new(),
    );
    let mut ctx = Context::new(envelope(
        "",
        &format!(r#"<GreetMe xmlns="{}"><name>Eugene</name></GreetMe>"#, TYPES),
    ));

    let exchange = coord.on_receive(&mut ctx).unwrap();

    assert_eq!(exchange.operation(), Some(&QName::new(TNS, "GreetMe")));
    assert_eq!(exchange.mep(), Mep::InOut);
    assert_eq!(exchange.service(), Some(&QName::new(TNS, "GreeterService")));
    assert_eq!(exchange.endpoint(), Some("GreeterPort"));

    let content = exchange.in_message().unwrap().content.clone().unwrap();
    assert!(content.contains(JBI_NS));
    let parts = unwrap_parts(&content, Some(1)).unwrap();
    assert_eq!(parts.len(), 1);
    assert!(parts[0].contains("<name>Eugene</name>"));
}

#[test]
fn test_unknown_body_falls_back_to_element_name() {
    let coord = coordinator(
        CoordinatorSettings {
            default_mep: Mep::RobustInOnly,
            ..Default::default()
        },
        Vec::new(),
    );
    let mut ctx = Context::new(envelope("", r#"<Unheard xmlns="urn:other"><x/></Unheard>"#));

    let exchange = coord.on_receive(&mut ctx).unwrap();

    assert_eq!(exchange.operation(), Some(&QName::new("urn:other", "Unheard")));
    assert_eq!(exchange.mep(), Mep::RobustInOnly);
    // pas d'opération connue : le corps passe tel quel
    let content = exchange.in_message().unwrap().content.clone().unwrap();
    assert!(content.starts_with("<Unheard"));
}

#[test]
fn test_one_way_operation() {
    let coord = coordinator(CoordinatorSettings::default(), Vec::new());
    let mut ctx = Context::new(envelope("", &format!(r#"<Notify xmlns="{}"/>"#, TYPES)));

    let exchange = coord.on_receive(&mut ctx).unwrap();
    assert_eq!(exchange.mep(), Mep::InOnly);
    assert_eq!(exchange.operation(), Some(&QName::new(TNS, "Notify")));
}

#[test]
fn test_targets_override_own_identity() {
    let coord = coordinator(
        CoordinatorSettings {
            service: Some(QName::new(TNS, "GreeterService")),
            target_service: Some(QName::new("urn:backend", "Backend")),
            target_endpoint: Some("backend".into()),
            ..Default::default()
        },
        Vec::new(),
    );
    let mut ctx = Context::new(envelope("", &format!(r#"<GreetMe xmlns="{}"/>"#, TYPES)));

    let exchange = coord.on_receive(&mut ctx).unwrap();
    assert_eq!(exchange.service(), Some(&QName::new("urn:backend", "Backend")));
    assert_eq!(exchange.endpoint(), Some("backend"));
}

#[test]
fn test_addressing_action_selects_the_operation() {
    let policies: Vec<Arc<dyn Policy>> = vec![Arc::new(AddressingPolicy::new())];
    let coord = coordinator(CoordinatorSettings::default(), policies);
    let mut ctx = Context::new(envelope(
        r#"<wsa:Action xmlns:wsa="http://www.w3.org/2005/08/addressing">urn:greet/Greeter/Notify</wsa:Action>"#,
        &format!(r#"<GreetMe xmlns="{}"/>"#, TYPES),
    ));

    let exchange = coord.on_receive(&mut ctx).unwrap();
    assert_eq!(exchange.operation(), Some(&QName::new(TNS, "Notify")));
    assert_eq!(exchange.mep(), Mep::InOnly);
    assert_eq!(exchange.interface_name(), Some(&QName::new(TNS, "Greeter")));
}

#[test]
fn test_on_fault_is_idempotent() {
    let policies: Vec<Arc<dyn Policy>> = vec![Arc::new(AddressingPolicy::new())];
    let coord = coordinator(CoordinatorSettings::default(), policies);
    let mut ctx = Context::new(envelope(
        r#"<wsa:MessageID xmlns:wsa="http://www.w3.org/2005/08/addressing">urn:uuid:1234</wsa:MessageID>"#,
        &format!(r#"<GreetMe xmlns="{}"/>"#, TYPES),
    ));
    coord.on_receive(&mut ctx).unwrap();

    let fault = Fault::new("Backend unavailable").with_detail("<reason>down</reason>");
    let first = coord.on_fault(&mut ctx, &fault).to_xml().unwrap();
    let second = coord.on_fault(&mut ctx, &fault).to_xml().unwrap();

    assert_eq!(first, second);
    assert!(first.contains("urn:uuid:1234"));
    assert!(first.contains("Backend unavailable"));
    assert!(first.contains("<reason>down</reason>"));
}

#[test]
fn test_reply_keeps_request_envelope_prefix() {
    let coord = coordinator(CoordinatorSettings::default(), Vec::new());
    let mut ctx = Context::new(envelope("", &format!(r#"<GreetMe xmlns="{}"/>"#, TYPES)));
    coord.on_receive(&mut ctx).unwrap();

    let out = soapbus::NormalizedMessage::new(format!(
        r#"<GreetMeResponse xmlns="{}">Hello Eugene</GreetMeResponse>"#,
        TYPES
    ));
    let reply = coord.on_reply(&mut ctx, &out).unwrap();
    let xml = reply.to_xml().unwrap();

    assert!(xml.contains("<soapenv:Envelope"));
    assert!(xml.contains("Hello Eugene"));
}

#[test]
fn test_fault_without_code_is_a_receiver_fault() {
    let fault = soap_fault(&Fault::new("boom"));
    assert!(!fault.is_sender());
    assert_eq!(fault.reason, "boom");
}
