use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use parking_lot::Mutex;
use serde_json::Value;
use soapbus::bus::HTTP_LOCATION;
use soapbus::soap::{SOAP12_ENV_NS, fault_codes};
use soapbus::wrapper::unwrap_parts;
use soapbus::{
    ActiveEndpoint, BusError, EndpointProcessor, Exchange, ExchangeProcessor, ExchangeStatus,
    LoopbackBus, Mep, NormalizedMessage, OutboundProcessor, QName, Role,
};
use soapbusconfig::{EndpointConfig, EndpointRole, HttpSettings};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const GREETER_WSDL: &str = include_str!("wsdl/greeter.wsdl");
const TNS: &str = "urn:greet";
const TYPES: &str = "urn:greet:types";

const GREET_RESPONSE: &str = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body><GreetMeResponse xmlns="urn:greet:types">Hello Eugene</GreetMeResponse></soapenv:Body></soapenv:Envelope>"#;

const FAULT_RESPONSE: &str = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body><soapenv:Fault><faultcode>soapenv:Client</faultcode><faultstring>Unknown person</faultstring><detail><unknown xmlns="urn:greet:types">Eugene</unknown></detail></soapenv:Fault></soapenv:Body></soapenv:Envelope>"#;

type Recorded = Arc<Mutex<Vec<(HeaderMap, String)>>>;

async fn greet(State(seen): State<Recorded>, headers: HeaderMap, body: String) -> impl IntoResponse {
    seen.lock().push((headers, body));
    ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], GREET_RESPONSE)
}

async fn fault(State(seen): State<Recorded>, headers: HeaderMap, body: String) -> impl IntoResponse {
    seen.lock().push((headers, body));
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        FAULT_RESPONSE,
    )
}

/// Remote SOAP service bound on an ephemeral port.
async fn remote() -> (SocketAddr, Recorded) {
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/greet", post(greet))
        .route("/fault", post(fault))
        .route("/empty", post(|| async { StatusCode::ACCEPTED }))
        .route(
            "/broken",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        )
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

/// Consumer side of the bus, records what comes back.
struct Client(mpsc::UnboundedSender<Exchange>);

#[async_trait]
impl ExchangeProcessor for Client {
    async fn process(&self, exchange: Exchange) -> Result<(), BusError> {
        self.0.send(exchange).map_err(|_| BusError::ChannelClosed)
    }
}

struct Harness {
    bus: Arc<LoopbackBus>,
    outbound: OutboundProcessor,
    answers: mpsc::UnboundedReceiver<Exchange>,
    _endpoint: ActiveEndpoint,
}

fn harness(location: String, http: HttpSettings) -> Harness {
    let bus = LoopbackBus::new();
    let (tx, answers) = mpsc::unbounded_channel();
    bus.register_consumer("client", Arc::new(Client(tx)));

    let decl = EndpointConfig {
        name: "provider".into(),
        role: EndpointRole::Provider,
        wsdl: "greeter.wsdl".into(),
        location_uri: Some(location),
        ..Default::default()
    };
    let endpoint = ActiveEndpoint::from_wsdl(&decl, GREETER_WSDL, &http).unwrap();
    assert!(endpoint.register(&bus).is_none());
    let outbound = match &endpoint.processor {
        EndpointProcessor::Provider(outbound) => outbound.clone(),
        EndpointProcessor::Consumer(_) => unreachable!(),
    };
    Harness {
        bus,
        outbound,
        answers,
        _endpoint: endpoint,
    }
}

fn greet_exchange(mep: Mep) -> Exchange {
    let mut ex = Exchange::new(mep, Role::Consumer);
    ex.set_endpoint(Some("provider".into())).unwrap();
    ex.set_operation(Some(QName::new(TNS, "GreetMe"))).unwrap();
    ex.set_in_message(NormalizedMessage::new(format!(
        r#"<GreetMe xmlns="{}"><name>Eugene</name></GreetMe>"#,
        TYPES
    )))
    .unwrap();
    ex
}

async fn next_answer(h: &mut Harness) -> Exchange {
    timeout(Duration::from_secs(10), h.answers.recv())
        .await
        .expect("no answer from the provider")
        .unwrap()
}

async fn acknowledge(h: &Harness, mut exchange: Exchange) {
    exchange.done().unwrap();
    h.bus
        .channel("client", Role::Consumer)
        .send(exchange)
        .await
        .unwrap();
}

async fn wait_released(outbound: &OutboundProcessor) {
    for _ in 0..200 {
        if outbound.pending_count() == 0 {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("call never released");
}

#[tokio::test]
async fn test_request_response_call() {
    let (addr, seen) = remote().await;
    let mut h = harness(format!("http://{}/greet", addr), HttpSettings::default());

    h.bus
        .channel("client", Role::Consumer)
        .send(greet_exchange(Mep::InOut))
        .await
        .unwrap();

    let answer = next_answer(&mut h).await;
    assert_eq!(answer.status(), ExchangeStatus::Active);
    assert!(answer.fault().is_none());
    let out = answer.out_message().unwrap().content.clone().unwrap();
    let parts = unwrap_parts(&out, Some(1)).unwrap();
    assert!(parts[0].contains("Hello Eugene"));

    {
        let seen = seen.lock();
        let (headers, body) = &seen[0];
        assert_eq!(headers["soapaction"], "\"urn:greet:GreetMe\"");
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/xml"));
        assert!(body.contains("<name>Eugene</name>"));
        assert!(!body.contains("jbi:message"));
    }

    assert_eq!(h.outbound.pending_count(), 1);
    acknowledge(&h, answer).await;
    wait_released(&h.outbound).await;
    assert_eq!(h.bus.active_exchanges(), 0);
}

#[tokio::test]
async fn test_remote_fault_with_synchronous_answer() {
    let (addr, _seen) = remote().await;
    let mut h = harness(format!("http://{}/greet", addr), HttpSettings::default());

    let mut exchange = greet_exchange(Mep::InOut);
    exchange.set_transacted(true).unwrap();
    let mut message = exchange.in_message().cloned().unwrap();
    message.set_property(HTTP_LOCATION, Value::String("/fault".into()));
    exchange.set_in_message(message).unwrap();
    h.bus
        .channel("client", Role::Consumer)
        .send(exchange)
        .await
        .unwrap();

    let answer = next_answer(&mut h).await;
    assert_eq!(answer.status(), ExchangeStatus::Active);
    let fault = answer.fault().unwrap();
    assert_eq!(fault.reason.as_deref(), Some("Unknown person"));
    assert_eq!(fault.code, Some(QName::new(SOAP12_ENV_NS, fault_codes::SENDER)));
    assert!(fault.message.content.as_deref().unwrap().contains("<unknown"));
    assert_eq!(h.outbound.pending_count(), 1);

    // le send_sync du fournisseur se termine avec l'acquittement
    acknowledge(&h, answer).await;
    wait_released(&h.outbound).await;
}

#[tokio::test]
async fn test_non_soap_error_answer_becomes_a_fault() {
    let (addr, _seen) = remote().await;
    let mut h = harness(format!("http://{}/broken", addr), HttpSettings::default());

    h.bus
        .channel("client", Role::Consumer)
        .send(greet_exchange(Mep::InOut))
        .await
        .unwrap();

    let answer = next_answer(&mut h).await;
    let fault = answer.fault().unwrap();
    assert!(fault.reason.as_deref().unwrap().contains("502"));
    acknowledge(&h, answer).await;
    wait_released(&h.outbound).await;
}

#[tokio::test]
async fn test_optional_out_with_empty_answer_is_done() {
    let (addr, _seen) = remote().await;
    let mut h = harness(format!("http://{}/empty", addr), HttpSettings::default());

    h.bus
        .channel("client", Role::Consumer)
        .send(greet_exchange(Mep::InOptionalOut))
        .await
        .unwrap();

    let answer = next_answer(&mut h).await;
    assert_eq!(answer.status(), ExchangeStatus::Done);
    assert!(answer.out_message().is_none());
    wait_released(&h.outbound).await;
    assert_eq!(h.bus.active_exchanges(), 0);
}

#[tokio::test]
async fn test_one_way_call_is_done() {
    let (addr, seen) = remote().await;
    let mut h = harness(format!("http://{}/greet", addr), HttpSettings::default());

    h.bus
        .channel("client", Role::Consumer)
        .send(greet_exchange(Mep::InOnly))
        .await
        .unwrap();

    let answer = next_answer(&mut h).await;
    assert_eq!(answer.status(), ExchangeStatus::Done);
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn test_connection_failure_sets_the_error() {
    // port libre mais fermé
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let http = HttpSettings {
        retry_count: 1,
        ..Default::default()
    };
    let mut h = harness(format!("http://{}/greet", addr), http);

    h.bus
        .channel("client", Role::Consumer)
        .send(greet_exchange(Mep::InOut))
        .await
        .unwrap();

    let answer = next_answer(&mut h).await;
    assert_eq!(answer.status(), ExchangeStatus::Error);
    assert!(answer.error().unwrap().contains("HTTP transport error"));
    wait_released(&h.outbound).await;
}

#[tokio::test]
async fn test_streaming_call_completes_asynchronously() {
    let (addr, _seen) = remote().await;
    let http = HttpSettings {
        streaming_enabled: true,
        ..Default::default()
    };
    let mut h = harness(format!("http://{}/greet", addr), http);

    h.bus
        .channel("client", Role::Consumer)
        .send(greet_exchange(Mep::InOut))
        .await
        .unwrap();

    let answer = next_answer(&mut h).await;
    assert!(answer.out_message().is_some());
    acknowledge(&h, answer).await;
    wait_released(&h.outbound).await;
}
