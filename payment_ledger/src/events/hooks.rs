use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, GroupClosedEvent, Handler, TransactionRecordedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub transaction_recorded_producer: Vec<EventProducer<TransactionRecordedEvent>>,
    pub group_closed_producer: Vec<EventProducer<GroupClosedEvent>>,
}

impl EventProducers {
    pub async fn publish_transaction_recorded(&self, event: TransactionRecordedEvent) {
        for producer in &self.transaction_recorded_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_group_closed(&self, event: GroupClosedEvent) {
        for producer in &self.group_closed_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_transaction_recorded: Option<EventHandler<TransactionRecordedEvent>>,
    pub on_group_closed: Option<EventHandler<GroupClosedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_transaction_recorded = hooks.on_transaction_recorded.map(|f| EventHandler::new(buffer_size, f));
        let on_group_closed = hooks.on_group_closed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_transaction_recorded, on_group_closed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_transaction_recorded {
            result.transaction_recorded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_group_closed {
            result.group_closed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_transaction_recorded {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_group_closed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_transaction_recorded: Option<Handler<TransactionRecordedEvent>>,
    pub on_group_closed: Option<Handler<GroupClosedEvent>>,
}

impl EventHooks {
    pub fn on_transaction_recorded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionRecordedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transaction_recorded = Some(Arc::new(f));
        self
    }

    pub fn on_group_closed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(GroupClosedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_group_closed = Some(Arc::new(f));
        self
    }
}
