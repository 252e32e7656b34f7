//! Test doubles for the messaging core: a scripted channel and a recording publisher.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};

use bulksend::config::DeliveryConfig;
use bulksend::messaging::channel::{
    DestinationCheck, MessagingChannel, SendError, SendErrorKind, SendReceipt,
};
use bulksend::messaging::contacts::ContactRow;
use bulksend::messaging::events::{EventPublisher, ProgressEvent};
use bulksend::messaging::orchestrator::Orchestrator;
use bulksend::messaging::session::RunState;
use bulksend::messaging::stats::StatsSnapshot;

/// Channel whose send results are scripted per destination.
///
/// Destinations without a script succeed. When gated, every send waits for a
/// permit released by [`ScriptedChannel::release`].
#[derive(Default)]
pub struct ScriptedChannel {
    not_ready: AtomicBool,
    scripts: Mutex<HashMap<String, VecDeque<SendErrorKind>>>,
    invalid: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
    checks: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
    send_started: Notify,
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A channel whose sends block until released.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    /// Queue failures for `destination`; later sends succeed.
    pub fn fail(&self, destination: &str, kinds: &[SendErrorKind]) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .entry(destination.to_owned())
            .or_default()
            .extend(kinds.iter().copied());
    }

    /// Make `destination` fail the validity check.
    pub fn mark_invalid(&self, destination: &str) {
        self.invalid
            .lock()
            .expect("invalid lock")
            .insert(destination.to_owned());
    }

    pub fn set_ready(&self, ready: bool) {
        self.not_ready.store(!ready, Ordering::SeqCst);
    }

    /// Let `count` gated sends proceed.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Wait until a send has started.
    pub async fn wait_send_started(&self) {
        self.send_started.notified().await;
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("attempts lock").clone()
    }

    pub fn checks(&self) -> Vec<String> {
        self.checks.lock().expect("checks lock").clone()
    }
}

#[async_trait]
impl MessagingChannel for ScriptedChannel {
    async fn is_ready(&self) -> bool {
        !self.not_ready.load(Ordering::SeqCst)
    }

    async fn check_destination(&self, destination: &str) -> DestinationCheck {
        self.checks
            .lock()
            .expect("checks lock")
            .push(destination.to_owned());
        if self.invalid.lock().expect("invalid lock").contains(destination) {
            DestinationCheck::invalid("number not registered")
        } else {
            DestinationCheck::valid()
        }
    }

    async fn send(&self, destination: &str, _message: &str) -> Result<SendReceipt, SendError> {
        self.attempts
            .lock()
            .expect("attempts lock")
            .push(destination.to_owned());
        self.send_started.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        let scripted = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get_mut(destination)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(kind) => Err(SendError::new(kind, format!("{kind:?} for {destination}"))),
            None => Ok(SendReceipt {
                delivery_id: Some(format!("msg-{destination}")),
                timestamp: Utc::now(),
            }),
        }
    }
}

/// Publisher that keeps every event in order.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("events lock").clone()
    }

    /// Run states announced through `status_update`, in order.
    pub fn run_states(&self) -> Vec<RunState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::StatusUpdate { messaging, .. } => messaging,
                _ => None,
            })
            .collect()
    }

    /// Every `stats_update` payload, in order.
    pub fn stats_updates(&self) -> Vec<StatsSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::StatsUpdate(stats) => Some(stats),
                _ => None,
            })
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: ProgressEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

/// Delivery policy with deterministic pacing.
pub fn test_config() -> DeliveryConfig {
    DeliveryConfig {
        pacing_ms: 1_000,
        pacing_jitter_ms: 0,
        retry_backoff_ms: 5_000,
        validate_destinations: false,
        log_capacity: 100,
    }
}

pub fn row(index: usize, destinations: &[&str]) -> ContactRow {
    ContactRow::new(
        index,
        format!("Contact {index}"),
        format!("CID{index}"),
        destinations.iter().copied(),
        format!("Hello {index}"),
    )
}

pub fn orchestrator(
    channel: &Arc<ScriptedChannel>,
    publisher: &Arc<RecordingPublisher>,
    config: DeliveryConfig,
) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(channel) as Arc<dyn MessagingChannel>,
        Arc::clone(publisher) as Arc<dyn EventPublisher>,
        config,
    )
}
