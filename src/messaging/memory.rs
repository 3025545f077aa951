use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{BusError, BusMessage, EventBus, EventSource};

/// One consumer group: its topics plus a queue shared by every member
struct Group {
    topics: HashSet<String>,
    tx: mpsc::UnboundedSender<BusMessage>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<BusMessage>>>,
}

/// Messages retained for inspection when no capacity is given
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

struct BusState {
    log: VecDeque<BusMessage>,
    log_capacity: usize,
    offsets: HashMap<String, i64>,
    groups: HashMap<String, Group>,
}

/// In-process event bus
///
/// The most recent published messages are kept in a bounded log for
/// inspection, and every message is forwarded to each consumer group
/// subscribed to its topic. Members of the same group share one queue, so
/// each message reaches exactly one of them. Only messages published after a
/// group's first subscription are delivered to it.
#[derive(Clone)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
    fail_publishes: Arc<AtomicBool>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` messages in the inspection log
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                log: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
                log_capacity: capacity,
                offsets: HashMap::new(),
                groups: HashMap::new(),
            })),
            fail_publishes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent publish fail with a transport error
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Join `group_id`, listening to `topics`
    pub fn subscribe(&self, topics: &[&str], group_id: &str) -> InMemorySource {
        let mut state = self.lock();
        let group = state.groups.entry(group_id.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            Group {
                topics: HashSet::new(),
                tx,
                rx: Arc::new(tokio::sync::Mutex::new(rx)),
            }
        });
        group.topics.extend(topics.iter().map(|t| t.to_string()));

        InMemorySource {
            rx: group.rx.clone(),
            acknowledged: HashMap::new(),
            acknowledged_count: 0,
        }
    }

    /// Retained messages published to `topic`, oldest first
    pub fn published(&self, topic: &str) -> Vec<BusMessage> {
        self.lock()
            .log
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Publish raw bytes, bypassing serialization (poison message injection)
    pub fn publish_raw(&self, topic: &str, key: Option<&str>, payload: Option<Vec<u8>>) {
        let mut state = self.lock();
        let offset = {
            let next = state.offsets.entry(topic.to_string()).or_insert(0);
            let current = *next;
            *next += 1;
            current
        };

        let message = BusMessage {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: key.map(str::to_string),
            payload,
        };

        for group in state.groups.values() {
            if group.topics.contains(topic) {
                let _ = group.tx.send(message.clone());
            }
        }
        if state.log_capacity == 0 {
            return;
        }
        if state.log.len() == state.log_capacity {
            state.log.pop_front();
        }
        state.log.push_back(message);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(BusError::Transport("in-memory bus is failing publishes".to_string()));
        }
        self.publish_raw(topic, Some(key), Some(payload.as_bytes().to_vec()));
        Ok(())
    }
}

/// A member of an in-memory consumer group
pub struct InMemorySource {
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<BusMessage>>>,
    /// Last acknowledged offset per topic and partition
    acknowledged: HashMap<(String, i32), i64>,
    acknowledged_count: u64,
}

impl InMemorySource {
    /// Highest offset acknowledged on `topic`, across partitions
    pub fn last_acknowledged(&self, topic: &str) -> Option<i64> {
        self.acknowledged
            .iter()
            .filter(|((t, _), _)| t == topic)
            .map(|(_, offset)| *offset)
            .max()
    }

    pub fn acknowledged_count(&self) -> u64 {
        self.acknowledged_count
    }
}

#[async_trait]
impl EventSource for InMemorySource {
    async fn next_message(&mut self) -> Option<Result<BusMessage, BusError>> {
        self.rx.lock().await.recv().await.map(Ok)
    }

    async fn acknowledge(&mut self, message: &BusMessage) -> Result<(), BusError> {
        let last = self
            .acknowledged
            .entry((message.topic.clone(), message.partition))
            .or_insert(message.offset);
        *last = (*last).max(message.offset);
        self.acknowledged_count += 1;
        Ok(())
    }
}
