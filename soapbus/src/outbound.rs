//! # Module Outbound
//!
//! Côté client HTTP d'un endpoint fournisseur.
//!
//! An exchange delivered by the bus is serialized through the coordinator and
//! POSTed to the remote SOAP service. The HTTP answer is turned back into an
//! out message, a fault, or a plain DONE, and the exchange goes back to the bus.
//!
//! Calls in flight are tracked by exchange id. An entry is released exactly
//! once: when the bus acknowledges the answer, when a synchronous send returns,
//! or when the exchange could not be handed back at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Bytes;
use parking_lot::{Mutex, RwLock};
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use soapbusconfig::HttpSettings;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::bus::{DeliveryChannel, Exchange, ExchangeProcessor, HTTP_LOCATION, Mep};
use crate::coordinator::{Context, ExchangeCoordinator, bus_fault};
use crate::errors::{BusError, OutboundError, SoapError};
use crate::soap::{SOAP_ACTION_HEADER, SoapFault, SoapVersion, read_soap};

/// Headers never copied from the `protocol.headers` property.
const RESERVED_HEADERS: [&str; 5] = [
    "content-type",
    "content-length",
    "host",
    "transfer-encoding",
    "soapaction",
];

struct PendingCall {
    started: Instant,
    task: Option<AbortHandle>,
}

/// Raw HTTP answer of the remote service.
struct HttpAnswer {
    status: StatusCode,
    content_type: Option<String>,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

struct Outbound {
    name: String,
    coordinator: Arc<ExchangeCoordinator>,
    settings: HttpSettings,
    location_uri: Option<String>,
    client: reqwest::Client,
    channel: RwLock<Option<Arc<dyn DeliveryChannel>>>,
    pending: Mutex<HashMap<String, PendingCall>>,
}

/// Bus facing processor calling a remote SOAP service.
#[derive(Clone)]
pub struct OutboundProcessor {
    inner: Arc<Outbound>,
}

impl OutboundProcessor {
    pub fn new(
        name: impl Into<String>,
        coordinator: Arc<ExchangeCoordinator>,
        settings: HttpSettings,
    ) -> Result<Self, OutboundError> {
        let client = reqwest::Client::builder()
            .timeout(settings.client_timeout)
            .build()?;
        Ok(Self {
            inner: Arc::new(Outbound {
                name: name.into(),
                coordinator,
                settings,
                location_uri: None,
                client,
                channel: RwLock::new(None),
                pending: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Remote address used instead of the binding `soap:address`.
    ///
    /// Must be called before the processor is shared.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.location_uri = Some(location.into());
        } else {
            warn!(endpoint = %self.inner.name, "⚠️ Location ignored, processor already shared");
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn start(&self, channel: Arc<dyn DeliveryChannel>) {
        info!(endpoint = %self.inner.name, "✅ Outbound endpoint started");
        *self.inner.channel.write() = Some(channel);
    }

    /// Stops the endpoint and aborts the streaming calls still running.
    pub fn stop(&self) {
        *self.inner.channel.write() = None;
        let aborted: Vec<PendingCall> = self.inner.pending.lock().drain().map(|(_, c)| c).collect();
        for call in &aborted {
            if let Some(task) = &call.task {
                task.abort();
            }
        }
        info!(endpoint = %self.inner.name, aborted = aborted.len(), "🛑 Outbound endpoint stopped");
    }

    pub fn is_started(&self) -> bool {
        self.inner.channel.read().is_some()
    }

    /// Number of calls not yet released.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_pending(&self, exchange_id: &str) -> bool {
        self.inner.pending.lock().contains_key(exchange_id)
    }
}

#[async_trait]
impl ExchangeProcessor for OutboundProcessor {
    async fn process(&self, exchange: Exchange) -> Result<(), BusError> {
        let id = exchange.id().to_string();
        if exchange.is_terminal() {
            // acquittement du consommateur
            if !self.inner.release(&id) {
                debug!(endpoint = %self.inner.name, exchange_id = %id, "🧹 Acknowledgement for a released call");
            }
            return Ok(());
        }
        if !self.is_started() {
            return Err(BusError::InvalidState(id, format!("endpoint {} not started", self.inner.name)));
        }

        self.inner.pending.lock().insert(
            id.clone(),
            PendingCall {
                started: Instant::now(),
                task: None,
            },
        );

        if self.inner.settings.streaming_enabled {
            let inner = self.inner.clone();
            let handle = tokio::spawn(async move { inner.call(exchange).await });
            if let Some(call) = self.inner.pending.lock().get_mut(&id) {
                call.task = Some(handle.abort_handle());
            }
            debug!(endpoint = %self.inner.name, exchange_id = %id, "📤 Call queued");
        } else {
            self.inner.call(exchange).await;
        }
        Ok(())
    }
}

impl Outbound {
    fn channel(&self) -> Option<Arc<dyn DeliveryChannel>> {
        self.channel.read().clone()
    }

    /// Forgets the call for `id`. Returns false when it was already released.
    fn release(&self, id: &str) -> bool {
        match self.pending.lock().remove(id) {
            Some(call) => {
                debug!(
                    endpoint = %self.name,
                    exchange_id = %id,
                    elapsed_ms = call.started.elapsed().as_millis() as u64,
                    "🔓 Call released"
                );
                true
            }
            None => false,
        }
    }

    async fn call(&self, mut exchange: Exchange) {
        let id = exchange.id().to_string();
        let mut ctx = Context::default();

        let outcome = match self.invoke(&mut ctx, &exchange).await {
            Ok(answer) => self.apply(&mut ctx, &mut exchange, answer),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            error!(endpoint = %self.name, exchange_id = %id, "❌ Call failed: {}", e);
            if let Err(e) = exchange.set_error(e.to_string()) {
                error!(exchange_id = %id, "❌ {}", e);
            }
        }

        match self.channel() {
            Some(channel) => self.answer(&channel, exchange).await,
            None => {
                warn!(endpoint = %self.name, exchange_id = %id, "⚠️ Endpoint stopped, answer dropped");
                self.release(&id);
            }
        }
    }

    /// Sends the request, retrying on transport errors only.
    async fn invoke(&self, ctx: &mut Context, exchange: &Exchange) -> Result<HttpAnswer, OutboundError> {
        let request = self.coordinator.on_send(ctx, exchange)?;
        let location = self.location(exchange)?;
        let body = request.to_bytes()?;
        let action = self
            .coordinator
            .operation(ctx.operation.as_ref())
            .map(|op| op.soap_action.clone())
            .unwrap_or_default();
        let headers = request_headers(request.version, &action, &ctx.protocol_headers);

        let attempts = if self.settings.streaming_enabled {
            1
        } else {
            1 + self.settings.retry_count
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(
                endpoint = %self.name,
                exchange_id = %exchange.id(),
                attempt,
                "📤 POST {}",
                location
            );
            let sent = self
                .client
                .post(location.clone())
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;
            match sent {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers();
                    let content_type = headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let headers = headers
                        .iter()
                        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                        .collect();
                    let body = response.bytes().await?;
                    debug!(endpoint = %self.name, exchange_id = %exchange.id(), %status, "📥 Answer received");
                    return Ok(HttpAnswer {
                        status,
                        content_type,
                        headers,
                        body,
                    });
                }
                Err(e) if attempt < attempts => {
                    warn!(endpoint = %self.name, attempt, "🔁 Transport error, retrying: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// `http.location` of the in message (resolved against the endpoint
    /// address), else the configured address, else the `soap:address`.
    fn location(&self, exchange: &Exchange) -> Result<Url, OutboundError> {
        let base = self
            .location_uri
            .as_deref()
            .or(self.coordinator.binding().location_uri.as_deref());
        let overridden = exchange
            .in_message()
            .and_then(|m| m.string_property(HTTP_LOCATION));
        let url = match (base, overridden) {
            (Some(base), Some(path)) => Url::parse(base).and_then(|b| b.join(path)),
            (None, Some(location)) | (Some(location), None) => Url::parse(location),
            (None, None) => return Err(OutboundError::MissingLocation(self.name.clone())),
        };
        url.map_err(|e| OutboundError::Protocol(format!("invalid location: {}", e)))
    }

    fn apply(&self, ctx: &mut Context, exchange: &mut Exchange, answer: HttpAnswer) -> Result<(), OutboundError> {
        if answer.status != StatusCode::OK && answer.status != StatusCode::ACCEPTED {
            let fault = self.read_fault(ctx, &answer);
            warn!(
                endpoint = %self.name,
                exchange_id = %exchange.id(),
                status = %answer.status,
                "⚠️ Remote fault: {}",
                fault.reason
            );
            exchange.set_fault(bus_fault(&fault))?;
            return Ok(());
        }

        match exchange.mep() {
            Mep::InOnly | Mep::RobustInOnly => exchange.done()?,
            Mep::InOptionalOut if answer.body.iter().all(u8::is_ascii_whitespace) => exchange.done()?,
            Mep::InOut | Mep::InOptionalOut => {
                let soap = read_soap(&answer.body, answer.content_type.as_deref())?;
                match self.coordinator.on_answer(ctx, soap) {
                    Ok(mut out) => {
                        if self.settings.want_headers_from_http {
                            out.set_protocol_headers(answer.headers);
                        }
                        exchange.set_out_message(out)?;
                    }
                    Err(SoapError::Fault(fault)) => exchange.set_fault(bus_fault(&fault))?,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Fault carried by an error answer, or one describing the HTTP status.
    fn read_fault(&self, ctx: &mut Context, answer: &HttpAnswer) -> SoapFault {
        let fallback = || SoapFault::receiver(format!("HTTP {}", answer.status));
        match read_soap(&answer.body, answer.content_type.as_deref()) {
            Ok(soap) => match self.coordinator.on_answer(ctx, soap) {
                Err(SoapError::Fault(fault)) => *fault,
                Ok(_) => fallback(),
                Err(e) => {
                    warn!(endpoint = %self.name, "⚠️ Unusable fault answer: {}", e);
                    fallback()
                }
            },
            Err(e) => {
                debug!(endpoint = %self.name, "No SOAP envelope in error answer: {}", e);
                fallback()
            }
        }
    }

    async fn answer(&self, channel: &Arc<dyn DeliveryChannel>, exchange: Exchange) {
        let id = exchange.id().to_string();
        let terminal = exchange.is_terminal();

        if exchange.is_transacted() && !terminal {
            match channel.send_sync(exchange).await {
                Ok(ack) => {
                    debug!(endpoint = %self.name, exchange_id = %id, status = %ack.status(), "✅ Synchronous answer acknowledged")
                }
                Err(e) => error!(endpoint = %self.name, exchange_id = %id, "❌ Synchronous send failed: {}", e),
            }
            self.release(&id);
            return;
        }

        if let Err(e) = channel.send(exchange).await {
            error!(endpoint = %self.name, exchange_id = %id, "❌ Cannot hand exchange back: {}", e);
            self.release(&id);
            return;
        }
        // sinon libéré à l'acquittement
        if terminal {
            self.release(&id);
        }
    }
}

fn request_headers(version: SoapVersion, action: &str, protocol_headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in protocol_headers {
        if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("⚠️ Invalid protocol header {} skipped", name),
        }
    }

    let content_type = match version {
        SoapVersion::Soap11 => format!("{}; charset=utf-8", version.content_type()),
        SoapVersion::Soap12 if action.is_empty() => format!("{}; charset=utf-8", version.content_type()),
        SoapVersion::Soap12 => format!("{}; charset=utf-8; action=\"{}\"", version.content_type(), action),
    };
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if version == SoapVersion::Soap11 {
        let action = HeaderValue::from_str(&format!("\"{}\"", action));
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(SOAP_ACTION_HEADER), action) {
            headers.insert(name, value);
        }
    }
    headers
}
