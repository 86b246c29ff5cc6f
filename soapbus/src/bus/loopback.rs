use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::bus::{DeliveryChannel, Exchange, ExchangeProcessor, Role};
use crate::errors::BusError;
use crate::qname::QName;

struct ProviderRoute {
    endpoint: String,
    service: Option<QName>,
    interface: Option<QName>,
    processor: Arc<dyn ExchangeProcessor>,
}

/// Consumer and provider currently holding each side of an exchange.
#[derive(Debug, Clone)]
struct Route {
    consumer: String,
    provider: String,
}

/// In-process bus connecting consumer endpoints to provider endpoints.
///
/// A new exchange sent by a consumer is routed to the provider registered for
/// its endpoint name, else its service, else its interface. Every later send for
/// the same id goes to the opposite side. Delivery runs on a spawned task.
#[derive(Default)]
pub struct LoopbackBus {
    consumers: RwLock<HashMap<String, Arc<dyn ExchangeProcessor>>>,
    providers: RwLock<Vec<ProviderRoute>>,
    routes: Mutex<HashMap<String, Route>>,
    waiters: Mutex<HashMap<String, oneshot::Sender<Exchange>>>,
}

impl LoopbackBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_consumer(&self, name: &str, processor: Arc<dyn ExchangeProcessor>) {
        debug!(endpoint = name, "🚌 Consumer registered on the bus");
        self.consumers.write().insert(name.to_string(), processor);
    }

    pub fn register_provider(
        &self,
        name: &str,
        service: Option<QName>,
        interface: Option<QName>,
        processor: Arc<dyn ExchangeProcessor>,
    ) {
        debug!(endpoint = name, "🚌 Provider registered on the bus");
        self.providers.write().push(ProviderRoute {
            endpoint: name.to_string(),
            service,
            interface,
            processor,
        });
    }

    /// Channel owned by the endpoint `name`.
    pub fn channel(self: &Arc<Self>, name: &str, role: Role) -> Arc<dyn DeliveryChannel> {
        Arc::new(BusChannel {
            bus: self.clone(),
            owner: name.to_string(),
            role,
        })
    }

    /// Number of exchanges still routed.
    pub fn active_exchanges(&self) -> usize {
        self.routes.lock().len()
    }

    fn resolve_provider(&self, exchange: &Exchange) -> Result<(String, Arc<dyn ExchangeProcessor>), BusError> {
        let providers = self.providers.read();
        let found = exchange
            .endpoint()
            .and_then(|ep| providers.iter().find(|p| p.endpoint == ep))
            .or_else(|| {
                exchange
                    .service()
                    .and_then(|s| providers.iter().find(|p| p.service.as_ref() == Some(s)))
            })
            .or_else(|| {
                exchange
                    .interface_name()
                    .and_then(|i| providers.iter().find(|p| p.interface.as_ref() == Some(i)))
            });
        match found {
            Some(p) => Ok((p.endpoint.clone(), p.processor.clone())),
            None => Err(BusError::NoRoute(format!(
                "service={:?} interface={:?} endpoint={:?}",
                exchange.service().map(ToString::to_string),
                exchange.interface_name().map(ToString::to_string),
                exchange.endpoint()
            ))),
        }
    }

    fn consumer(&self, name: &str) -> Result<Arc<dyn ExchangeProcessor>, BusError> {
        self.consumers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::NoRoute(name.to_string()))
    }

    fn dispatch(
        &self,
        owner: &str,
        from: Role,
        mut exchange: Exchange,
        reply_to: Option<oneshot::Sender<Exchange>>,
    ) -> Result<(), BusError> {
        let id = exchange.id().to_string();
        let route = self.routes.lock().get(&id).cloned();

        let (target_role, processor) = match (from, route) {
            (Role::Consumer, None) if !exchange.is_terminal() => {
                let (provider, processor) = self.resolve_provider(&exchange)?;
                self.routes.lock().insert(
                    id.clone(),
                    Route {
                        consumer: owner.to_string(),
                        provider,
                    },
                );
                (Role::Provider, processor)
            }
            (_, None) if exchange.is_terminal() => {
                debug!(exchange_id = %id, status = %exchange.status(), "🧹 Exchange released");
                return Ok(());
            }
            (_, None) => return Err(BusError::ExchangeNotFound(id)),
            (Role::Consumer, Some(route)) => {
                let (_, processor) = self.resolve_provider_by_name(&route.provider)?;
                (Role::Provider, processor)
            }
            (Role::Provider, Some(route)) => (Role::Consumer, self.consumer(&route.consumer)?),
        };

        if exchange.is_terminal() {
            self.routes.lock().remove(&id);
        }
        exchange.assign_role(target_role);

        if let Some(waiter) = self.waiters.lock().remove(&id) {
            if waiter.send(exchange).is_err() {
                warn!(exchange_id = %id, "⚠️ Synchronous sender went away");
            }
            return Ok(());
        }
        if let Some(reply_to) = reply_to {
            self.waiters.lock().insert(id.clone(), reply_to);
        }

        tokio::spawn(async move {
            if let Err(e) = processor.process(exchange).await {
                error!(exchange_id = %id, "❌ Exchange processing failed: {}", e);
            }
        });
        Ok(())
    }

    fn resolve_provider_by_name(&self, name: &str) -> Result<(String, Arc<dyn ExchangeProcessor>), BusError> {
        self.providers
            .read()
            .iter()
            .find(|p| p.endpoint == name)
            .map(|p| (p.endpoint.clone(), p.processor.clone()))
            .ok_or_else(|| BusError::NoRoute(name.to_string()))
    }
}

struct BusChannel {
    bus: Arc<LoopbackBus>,
    owner: String,
    role: Role,
}

#[async_trait]
impl DeliveryChannel for BusChannel {
    async fn send(&self, exchange: Exchange) -> Result<(), BusError> {
        debug!(
            exchange_id = %exchange.id(),
            status = %exchange.status(),
            from = %self.owner,
            "📨 Exchange sent"
        );
        self.bus.dispatch(&self.owner, self.role, exchange, None)
    }

    async fn send_sync(&self, exchange: Exchange) -> Result<Exchange, BusError> {
        let (tx, rx) = oneshot::channel();
        self.bus.dispatch(&self.owner, self.role, exchange, Some(tx))?;
        rx.await.map_err(|_| BusError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ExchangeStatus, Mep, NormalizedMessage};
    use tokio::sync::mpsc;

    struct Recorder(mpsc::UnboundedSender<Exchange>);

    #[async_trait]
    impl ExchangeProcessor for Recorder {
        async fn process(&self, exchange: Exchange) -> Result<(), BusError> {
            self.0.send(exchange).map_err(|_| BusError::ChannelClosed)
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<Exchange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder(tx)), rx)
    }

    #[tokio::test]
    async fn test_routes_to_provider_by_service_and_back() {
        let bus = LoopbackBus::new();
        let (consumer, mut consumer_rx) = recorder();
        let (provider, mut provider_rx) = recorder();
        let service = QName::new("urn:test", "Echo");
        bus.register_consumer("in", consumer);
        bus.register_provider("out", Some(service.clone()), None, provider);

        let mut ex = Exchange::new(Mep::InOut, Role::Consumer);
        ex.set_service(Some(service)).unwrap();
        ex.set_in_message(NormalizedMessage::new("<ping/>")).unwrap();
        bus.channel("in", Role::Consumer).send(ex).await.unwrap();

        let mut ex = provider_rx.recv().await.unwrap();
        assert_eq!(ex.role(), Role::Provider);
        assert_eq!(bus.active_exchanges(), 1);

        ex.set_out_message(NormalizedMessage::new("<pong/>")).unwrap();
        bus.channel("out", Role::Provider).send(ex).await.unwrap();

        let mut ex = consumer_rx.recv().await.unwrap();
        assert_eq!(ex.role(), Role::Consumer);
        assert_eq!(ex.out_message().unwrap().content.as_deref(), Some("<pong/>"));

        ex.done().unwrap();
        bus.channel("in", Role::Consumer).send(ex).await.unwrap();
        let ex = provider_rx.recv().await.unwrap();
        assert_eq!(ex.status(), ExchangeStatus::Done);
        assert_eq!(bus.active_exchanges(), 0);
    }

    #[tokio::test]
    async fn test_send_sync_waits_for_the_answer() {
        let bus = LoopbackBus::new();
        let (consumer, mut consumer_rx) = recorder();
        let (provider, mut provider_rx) = recorder();
        bus.register_consumer("in", consumer);
        bus.register_provider("out", None, None, provider);

        let mut ex = Exchange::new(Mep::InOut, Role::Consumer);
        ex.set_endpoint(Some("out".into())).unwrap();
        bus.channel("in", Role::Consumer).send(ex).await.unwrap();
        let ex = provider_rx.recv().await.unwrap();

        let provider_channel = bus.channel("out", Role::Provider);
        let pending = tokio::spawn(async move { provider_channel.send_sync(ex).await });

        let mut ex = consumer_rx.recv().await.unwrap();
        ex.done().unwrap();
        bus.channel("in", Role::Consumer).send(ex).await.unwrap();

        let answered = pending.await.unwrap().unwrap();
        assert_eq!(answered.status(), ExchangeStatus::Done);
    }

    #[tokio::test]
    async fn test_unroutable_exchange_is_rejected() {
        let bus = LoopbackBus::new();
        let ex = Exchange::new(Mep::InOnly, Role::Consumer);
        let err = bus.channel("in", Role::Consumer).send(ex).await.unwrap_err();
        assert!(matches!(err, BusError::NoRoute(_)));
    }

    #[tokio::test]
    async fn test_terminal_exchange_without_route_is_released() {
        let bus = LoopbackBus::new();
        let mut ex = Exchange::new(Mep::InOnly, Role::Consumer);
        ex.set_error("boom").unwrap();
        bus.channel("in", Role::Consumer).send(ex).await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_answer_for_unknown_exchange() {
        let bus = LoopbackBus::new();
        let ex = Exchange::new(Mep::InOut, Role::Provider);
        let err = bus.channel("out", Role::Provider).send(ex).await.unwrap_err();
        assert!(matches!(err, BusError::ExchangeNotFound(_)));
    }
}
