//! # Module Inbound
//!
//! Côté serveur HTTP d'un endpoint consommateur.
//!
//! A POST carrying a SOAP envelope becomes a bus exchange. The handler then
//! waits (an `await`, no thread is blocked) for the bus to hand the exchange
//! back, and writes the SOAP reply, the SOAP fault or a bare `202 Accepted`.
//!
//! Correlation goes through a map `exchange id → slot`. A slot moves from
//! [`PendingState::Pending`] to either [`PendingState::Completed`] (the bus
//! answered in time) or [`PendingState::TimedOut`] (the caller got a 500).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use parking_lot::{Mutex, RwLock};
use soapbusconfig::{HttpSettings, LateResponseStrategy};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::bus::{DeliveryChannel, Exchange, ExchangeProcessor, ExchangeStatus, Fault};
use crate::coordinator::{Context, ExchangeCoordinator};
use crate::errors::{BusError, InboundError, SoapError};
use crate::soap::{SoapFault, SoapMessage, SoapVersion, read_soap};

/// Headers tied to the HTTP connection, never copied into `protocol.headers`.
/// `accept-encoding` en fait partie : le client sortant ne décompresse pas.
const CONNECTION_HEADERS: [&str; 11] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "accept-encoding",
];

/// Cycle de vie d'une requête suspendue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Pending,
    Completed,
    TimedOut,
}

struct Slot {
    state: PendingState,
    waker: Option<oneshot::Sender<Exchange>>,
}

pub struct InboundProcessor {
    name: String,
    coordinator: Arc<ExchangeCoordinator>,
    settings: HttpSettings,
    suspend_time: Duration,
    wsdl: Option<Arc<String>>,
    channel: RwLock<Option<Arc<dyn DeliveryChannel>>>,
    pending: Mutex<HashMap<String, Slot>>,
}

impl InboundProcessor {
    pub fn new(
        name: impl Into<String>,
        coordinator: Arc<ExchangeCoordinator>,
        settings: HttpSettings,
    ) -> Self {
        Self {
            name: name.into(),
            coordinator,
            suspend_time: settings.consumer_suspend_time,
            settings,
            wsdl: None,
            channel: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// WSDL served on `GET ?wsdl`.
    pub fn with_wsdl(mut self, wsdl: impl Into<String>) -> Self {
        self.wsdl = Some(Arc::new(wsdl.into()));
        self
    }

    /// Overrides `http.consumer_suspend_time_ms` for this endpoint.
    pub fn with_suspend_time(mut self, suspend_time: Duration) -> Self {
        self.suspend_time = suspend_time;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self, channel: Arc<dyn DeliveryChannel>) {
        info!(endpoint = %self.name, "✅ Inbound endpoint started");
        *self.channel.write() = Some(channel);
    }

    pub fn stop(&self) {
        info!(endpoint = %self.name, "🛑 Inbound endpoint stopped");
        *self.channel.write() = None;
    }

    pub fn is_started(&self) -> bool {
        self.channel.read().is_some()
    }

    /// State of the request waiting for `exchange_id`, if still tracked.
    pub fn pending_state(&self, exchange_id: &str) -> Option<PendingState> {
        self.pending.lock().get(exchange_id).map(|s| s.state)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Router serving this endpoint on `path`.
    ///
    /// Methods other than POST and GET are answered with 405 by axum.
    pub fn router(self: &Arc<Self>, path: &str) -> Router {
        Router::new()
            .route(path, post(handle_post).get(handle_get))
            .with_state(self.clone())
    }

    fn channel(&self) -> Result<Arc<dyn DeliveryChannel>, InboundError> {
        self.channel.read().clone().ok_or(InboundError::NotStarted)
    }

    /// Handles one SOAP request, from the body bytes to the HTTP response.
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Response {
        let channel = match self.channel() {
            Ok(channel) => channel,
            Err(e) => {
                warn!(endpoint = %self.name, "⚠️ {}", e);
                return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
            }
        };
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        let request = match read_soap(body, content_type) {
            Ok(request) => request,
            Err(e) => {
                error!(endpoint = %self.name, "❌ Failed to parse SOAP request: {}", e);
                let version = content_type
                    .and_then(SoapVersion::from_content_type)
                    .unwrap_or(self.coordinator.settings().soap_version);
                return error_response(version, &e);
            }
        };
        let version = request.version;

        let mut ctx = Context::new(request);
        if self.settings.want_headers_from_http {
            ctx.protocol_headers = protocol_headers(headers);
        }

        let exchange = match self.coordinator.on_receive(&mut ctx) {
            Ok(exchange) => exchange,
            Err(e) => {
                error!(endpoint = %self.name, "❌ Request rejected: {}", e);
                return error_response(version, &e);
            }
        };

        match self.dispatch(&channel, exchange).await {
            Ok(exchange) => self.resume(&channel, &mut ctx, exchange).await,
            Err(e) => {
                error!(endpoint = %self.name, "❌ {}", e);
                fault_response(
                    &SoapMessage::fault_message(version, SoapFault::receiver(e.to_string())),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    }

    /// Sends the exchange and waits for the bus to give it back.
    async fn dispatch(
        &self,
        channel: &Arc<dyn DeliveryChannel>,
        exchange: Exchange,
    ) -> Result<Exchange, InboundError> {
        let id = exchange.id().to_string();
        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().insert(
            id.clone(),
            Slot {
                state: PendingState::Pending,
                waker: Some(tx),
            },
        );

        debug!(endpoint = %self.name, exchange_id = %id, "⏳ Waiting for the bus");
        if let Err(e) = channel.send(exchange).await {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }

        let outcome = tokio::time::timeout(self.suspend_time, &mut rx).await;
        let mut pending = self.pending.lock();
        match outcome {
            Ok(answer) => {
                pending.remove(&id);
                answer.map_err(|_| InboundError::Bus(BusError::ChannelClosed))
            }
            Err(_) => {
                if let Some(slot) = pending.get_mut(&id) {
                    if slot.state == PendingState::Pending {
                        slot.state = PendingState::TimedOut;
                        slot.waker = None;
                        warn!(endpoint = %self.name, exchange_id = %id, "⏰ No answer from the bus");
                        return Err(InboundError::Timeout(self.suspend_time));
                    }
                }
                pending.remove(&id);
                // réponse arrivée pendant l'expiration du délai
                rx.try_recv()
                    .map_err(|_| InboundError::Timeout(self.suspend_time))
            }
        }
    }

    async fn resume(
        &self,
        channel: &Arc<dyn DeliveryChannel>,
        ctx: &mut Context,
        mut exchange: Exchange,
    ) -> Response {
        let id = exchange.id().to_string();
        debug!(endpoint = %self.name, exchange_id = %id, status = %exchange.status(), "🔁 Exchange back from the bus");

        let response = match exchange.status() {
            ExchangeStatus::Error => {
                let fault = exchange.fault().cloned().unwrap_or_else(|| {
                    Fault::new(exchange.error().unwrap_or("Exchange failed").to_string())
                });
                let message = self.coordinator.on_fault(ctx, &fault);
                let status = fault_status(&message);
                // l'échange est terminal : on le rend tel quel pour libérer le bus
                self.acknowledge(channel, exchange).await;
                return fault_response(&message, status);
            }
            ExchangeStatus::Done => StatusCode::ACCEPTED.into_response(),
            ExchangeStatus::Active => {
                if let Some(fault) = exchange.fault().cloned() {
                    let message = self.coordinator.on_fault(ctx, &fault);
                    fault_response(&message, fault_status(&message))
                } else if let Some(out) = exchange.out_message().cloned() {
                    match self.write_reply(ctx, &out) {
                        Ok(response) => response,
                        Err(e) => {
                            error!(endpoint = %self.name, exchange_id = %id, "❌ Cannot write reply: {}", e);
                            let response = fault_response(
                                &self.coordinator.on_fault(ctx, &Fault::new(e.to_string())),
                                StatusCode::INTERNAL_SERVER_ERROR,
                            );
                            if let Err(e) = exchange.set_error(e.to_string()) {
                                error!(exchange_id = %id, "❌ {}", e);
                            }
                            self.acknowledge(channel, exchange).await;
                            return response;
                        }
                    }
                } else {
                    StatusCode::ACCEPTED.into_response()
                }
            }
        };

        if !exchange.is_terminal() {
            if let Err(e) = exchange.done() {
                error!(exchange_id = %id, "❌ {}", e);
            }
            self.acknowledge(channel, exchange).await;
        }
        response
    }

    fn write_reply(
        &self,
        ctx: &mut Context,
        out: &crate::bus::NormalizedMessage,
    ) -> Result<Response, SoapError> {
        let reply = self.coordinator.on_reply(ctx, out)?;
        let body = reply.to_xml()?;
        let mut response = (StatusCode::OK, content_type(reply.version), body).into_response();
        for (name, value) in out.protocol_headers() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(&value),
            ) {
                if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
                    response.headers_mut().insert(name, value);
                }
            }
        }
        Ok(response)
    }

    async fn acknowledge(&self, channel: &Arc<dyn DeliveryChannel>, exchange: Exchange) {
        let id = exchange.id().to_string();
        if let Err(e) = channel.send(exchange).await {
            error!(endpoint = %self.name, exchange_id = %id, "❌ Cannot hand exchange back: {}", e);
        }
    }

    /// Answer for a request that already timed out.
    async fn late_response(&self, mut exchange: Exchange) -> Result<(), BusError> {
        let id = exchange.id().to_string();
        if exchange.status() == ExchangeStatus::Done {
            warn!(endpoint = %self.name, exchange_id = %id, "⚠️ Exchange completed after its HTTP request timed out");
            return Ok(());
        }
        match self.settings.late_response_strategy {
            LateResponseStrategy::Error => {
                error!(endpoint = %self.name, exchange_id = %id, "❌ Late response, HTTP request already timed out");
                if !exchange.is_terminal() {
                    exchange.set_error(format!(
                        "HTTP request timed out after {:?}",
                        self.suspend_time
                    ))?;
                }
            }
            LateResponseStrategy::Warning => {
                warn!(endpoint = %self.name, exchange_id = %id, "⚠️ Late response ignored, HTTP request already timed out");
                if !exchange.is_terminal() {
                    exchange.done()?;
                }
            }
        }
        let channel = self.channel().map_err(|_| BusError::ChannelClosed)?;
        channel.send(exchange).await
    }
}

enum Delivery {
    Wake(oneshot::Sender<Exchange>),
    Late,
    Unknown,
}

#[async_trait]
impl ExchangeProcessor for InboundProcessor {
    async fn process(&self, exchange: Exchange) -> Result<(), BusError> {
        let id = exchange.id().to_string();
        let delivery = {
            let mut pending = self.pending.lock();
            match pending.get(&id).map(|s| s.state) {
                Some(PendingState::Pending) => pending
                    .get_mut(&id)
                    .and_then(|slot| {
                        slot.state = PendingState::Completed;
                        slot.waker.take()
                    })
                    .map_or(Delivery::Unknown, Delivery::Wake),
                Some(PendingState::TimedOut) => {
                    pending.remove(&id);
                    Delivery::Late
                }
                Some(PendingState::Completed) | None => Delivery::Unknown,
            }
        };

        match delivery {
            Delivery::Wake(waker) => match waker.send(exchange) {
                Ok(()) => Ok(()),
                Err(exchange) => {
                    self.pending.lock().remove(&id);
                    warn!(exchange_id = %id, "⚠️ HTTP request gone before the answer");
                    self.late_response(exchange).await
                }
            },
            Delivery::Late => self.late_response(exchange).await,
            Delivery::Unknown if exchange.is_terminal() => {
                debug!(exchange_id = %id, "🧹 Terminal exchange for a finished request");
                Ok(())
            }
            Delivery::Unknown => Err(BusError::ExchangeNotFound(id)),
        }
    }
}

async fn handle_post(
    State(processor): State<Arc<InboundProcessor>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    processor.handle(&headers, &body).await
}

async fn handle_get(State(processor): State<Arc<InboundProcessor>>, RawQuery(query): RawQuery) -> Response {
    let wants_wsdl = query
        .as_deref()
        .is_some_and(|q| q.split('&').any(|p| p.eq_ignore_ascii_case("wsdl") || p.to_ascii_lowercase().starts_with("wsdl=")));
    match (&processor.wsdl, wants_wsdl) {
        (Some(wsdl), true) => {
            info!(endpoint = %processor.name, "📋 WSDL requested");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
                wsdl.as_str().to_owned(),
            )
                .into_response()
        }
        (None, true) => StatusCode::NOT_FOUND.into_response(),
        (_, false) => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// End-to-end request headers, minus the ones describing this hop or this body.
fn protocol_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    // `Connection: x-foo` rend aussi `x-foo` propre au saut
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !CONNECTION_HEADERS.contains(&name)
                && name != header::CONTENT_LENGTH.as_str()
                && !listed.iter().any(|l| l == name)
        })
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect()
}

fn content_type(version: SoapVersion) -> [(header::HeaderName, String); 1] {
    [(
        header::CONTENT_TYPE,
        format!("{}; charset=utf-8", version.content_type()),
    )]
}

/// 400 for faults caused by the request, 500 otherwise.
fn fault_status(message: &SoapMessage) -> StatusCode {
    match &message.fault {
        Some(fault) if fault.is_sender() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fault_response(message: &SoapMessage, status: StatusCode) -> Response {
    match message.to_xml() {
        Ok(body) => (status, content_type(message.version), body).into_response(),
        Err(e) => {
            error!("❌ Failed to serialize SOAP fault: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn error_response(version: SoapVersion, error: &SoapError) -> Response {
    let message = SoapMessage::fault_message(version, SoapFault::from(error));
    fault_response(&message, fault_status(&message))
}
