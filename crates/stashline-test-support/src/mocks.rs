//! Scripted bus client for driving the forwarding loop deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stashline_events::{
    BusRole, Event, EventBusClient, Subscription, SubscriptionError, SubscriptionItem,
    SubscriptionRequest, SubscriptionResult,
};

/// What happens after the scripted items run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEnd {
    /// Block forever, like an idle bus.
    Idle,
    /// Report the subscription as closed by the bus.
    Closed,
}

#[derive(Debug)]
struct ScriptState {
    items: Mutex<VecDeque<SubscriptionItem>>,
    end: ScriptEnd,
    fail_open: bool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    delivered: AtomicUsize,
}

/// Bus client replaying a fixed list of items.
#[derive(Debug, Clone)]
pub struct ScriptedBusClient {
    state: Arc<ScriptState>,
}

impl ScriptedBusClient {
    /// Client replaying `events`, then idling.
    #[must_use]
    pub fn new(events: Vec<Event>) -> Self {
        Self::with_items(
            events.into_iter().map(SubscriptionItem::Event).collect(),
            ScriptEnd::Idle,
        )
    }

    /// Client replaying arbitrary items, then ending as requested.
    #[must_use]
    pub fn with_items(items: Vec<SubscriptionItem>, end: ScriptEnd) -> Self {
        Self {
            state: Arc::new(ScriptState {
                items: Mutex::new(items.into()),
                end,
                fail_open: false,
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                delivered: AtomicUsize::new(0),
            }),
        }
    }

    /// Client whose `open` always fails.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            state: Arc::new(ScriptState {
                items: Mutex::new(VecDeque::new()),
                end: ScriptEnd::Closed,
                fail_open: true,
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                delivered: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of successful `open` calls.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Number of `close` calls observed across subscriptions.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Number of scripted items handed out so far.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.state.delivered.load(Ordering::SeqCst)
    }

    /// Number of scripted items not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.state.items.lock().map_or(0, |items| items.len())
    }
}

#[async_trait]
impl EventBusClient for ScriptedBusClient {
    async fn open(
        &self,
        request: &SubscriptionRequest,
    ) -> SubscriptionResult<Box<dyn Subscription>> {
        if self.state.fail_open {
            return Err(SubscriptionError::Unavailable { role: request.role });
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSubscription {
            role: request.role,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct ScriptedSubscription {
    role: BusRole,
    state: Arc<ScriptState>,
    closed: bool,
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    async fn next_item(&mut self) -> SubscriptionResult<SubscriptionItem> {
        if self.closed {
            return Err(SubscriptionError::Closed { role: self.role });
        }
        let next = self
            .state
            .items
            .lock()
            .ok()
            .and_then(|mut items| items.pop_front());
        if let Some(item) = next {
            self.state.delivered.fetch_add(1, Ordering::SeqCst);
            // Let other tasks observe progress between items.
            tokio::task::yield_now().await;
            return Ok(item);
        }
        match self.state.end {
            ScriptEnd::Idle => std::future::pending().await,
            ScriptEnd::Closed => Err(SubscriptionError::Closed { role: self.role }),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn endpoint(&self) -> &str {
        "scripted"
    }
}
