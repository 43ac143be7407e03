//! Engine Event Bus
//!
//! Named-topic publish/subscribe used by the ledger, the skill graph and the
//! engine to notify listeners without depending on them. Delivery is
//! synchronous, on the publishing call stack, in subscription order.

use dashmap::DashMap;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

use crate::ledger::LedgerSnapshot;
use crate::skill_tree::{Domain, SkillReward};

/// Topics that listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Topic {
    CredoChanged,
    LevelUp,
    CredoEarned,
    CredoSpent,
    SkillUnlocked,
    QuestCompleted,
    QuestClaimed,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CredoChanged => "credoChanged",
            Topic::LevelUp => "levelUp",
            Topic::CredoEarned => "credoEarned",
            Topic::CredoSpent => "credoSpent",
            Topic::SkillUnlocked => "skillUnlocked",
            Topic::QuestCompleted => "questCompleted",
            Topic::QuestClaimed => "questClaimed",
        }
    }
}

/// Payloads published on the bus. Each variant belongs to exactly one topic.
#[derive(Debug, Clone, Serialize)]
pub enum Event {
    /// Full ledger state after an earn, spend or reset
    CredoChanged(LedgerSnapshot),
    LevelUp {
        new_level: u32,
        /// Balance needed for the level after this one
        required_credo: i64,
    },
    CredoEarned {
        amount: i64,
        source: String,
        description: String,
    },
    CredoSpent {
        amount: i64,
        source: String,
        description: String,
    },
    SkillUnlocked {
        domain: Domain,
        category: String,
        skill_name: String,
        tier: u32,
        rewards: SkillReward,
    },
    QuestCompleted {
        quest_id: String,
        title: String,
    },
    QuestClaimed {
        quest_id: String,
        credo: i64,
    },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::CredoChanged(_) => Topic::CredoChanged,
            Event::LevelUp { .. } => Topic::LevelUp,
            Event::CredoEarned { .. } => Topic::CredoEarned,
            Event::CredoSpent { .. } => Topic::CredoSpent,
            Event::SkillUnlocked { .. } => Topic::SkillUnlocked,
            Event::QuestCompleted { .. } => Topic::QuestCompleted,
            Event::QuestClaimed { .. } => Topic::QuestClaimed,
        }
    }
}

/// Something that emits events. Producers hold this, never the bus type.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: Event);
}

/// A listener. Returning `Err` is logged by the bus and does not stop delivery.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<(), String>;
}

impl<F> Subscriber for F
where
    F: Fn(&Event) -> Result<(), String> + Send + Sync,
{
    fn on_event(&self, event: &Event) -> Result<(), String> {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    handler: Arc<dyn Subscriber>,
}

pub struct EventBus {
    handlers: DashMap<Topic, Vec<Registration>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, topic: Topic, handler: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .entry(topic)
            .or_default()
            .push(Registration { id, handler });
        debug!("Subscribed {:?} to {}", id, topic.as_str());
        id
    }

    /// Subscribe a closure
    pub fn subscribe_fn<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), String> + Send + Sync + 'static,
    {
        self.subscribe(topic, Arc::new(handler))
    }

    /// Returns false if the subscription was not registered on this topic
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        match self.handlers.get_mut(&topic) {
            Some(mut registrations) => {
                let before = registrations.len();
                registrations.retain(|r| r.id != id);
                before != registrations.len()
            }
            None => false,
        }
    }

    /// Drop every handler for a topic, or for all topics
    pub fn clear(&self, topic: Option<Topic>) {
        match topic {
            Some(topic) => {
                self.handlers.remove(&topic);
            }
            None => self.handlers.clear(),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.handlers.get(&topic).map_or(0, |r| r.len())
    }

    /// Deliver an event to every current subscriber of its topic.
    /// Returns the number of handlers that failed.
    pub fn dispatch(&self, event: &Event) -> usize {
        let topic = event.topic();
        // Clone the list so handlers can (un)subscribe while we iterate
        let snapshot: Vec<Registration> = self
            .handlers
            .get(&topic)
            .map(|r| r.value().clone())
            .unwrap_or_default();

        let mut failures = 0;
        for registration in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                registration.handler.on_event(event)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!(
                        "Event handler {:?} failed on {}: {}",
                        registration.id,
                        topic.as_str(),
                        e
                    );
                }
                Err(payload) => {
                    failures += 1;
                    error!(
                        "Event handler {:?} panicked on {}: {}",
                        registration.id,
                        topic.as_str(),
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        failures
    }
}

impl Publisher for EventBus {
    fn publish(&self, event: Event) {
        self.dispatch(&event);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn quest_done(id: &str) -> Event {
        Event::QuestCompleted {
            quest_id: id.to_string(),
            title: id.to_string(),
        }
    }

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    ) -> impl Fn(&Event) -> Result<(), String> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_event: &Event| {
            log.lock().unwrap().push(tag.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe_fn(Topic::QuestCompleted, recorder(&log, "first"));
        bus.subscribe_fn(Topic::QuestCompleted, recorder(&log, "second"));
        bus.subscribe_fn(Topic::QuestCompleted, recorder(&log, "third"));

        bus.publish(quest_done("q1"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_handlers_do_not_stop_delivery() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe_fn(Topic::QuestCompleted, |_: &Event| Err("boom".to_string()));
        bus.subscribe_fn(Topic::QuestCompleted, |_: &Event| -> Result<(), String> {
            panic!("handler panic")
        });
        bus.subscribe_fn(Topic::QuestCompleted, recorder(&log, "survivor"));

        let failures = bus.dispatch(&quest_done("q1"));
        assert_eq!(failures, 2);
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn test_topics_are_isolated() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe_fn(Topic::LevelUp, recorder(&log, "level"));

        bus.publish(quest_done("q1"));
        assert!(log.lock().unwrap().is_empty());

        bus.publish(Event::LevelUp { new_level: 2, required_credo: 200 });
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_late_subscriber_sees_no_replay() {
        let bus = EventBus::new();
        bus.publish(quest_done("early"));

        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe_fn(Topic::QuestCompleted, recorder(&log, "late"));
        assert!(log.lock().unwrap().is_empty());

        bus.publish(quest_done("later"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_self_unsubscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let own_id: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let handler_bus = Arc::clone(&bus);
        let handler_log = Arc::clone(&log);
        let handler_id = Arc::clone(&own_id);
        let id = bus.subscribe_fn(Topic::QuestCompleted, move |_: &Event| {
            handler_log.lock().unwrap().push("once".to_string());
            if let Some(id) = *handler_id.lock().unwrap() {
                handler_bus.unsubscribe(Topic::QuestCompleted, id);
            }
            Ok(())
        });
        *own_id.lock().unwrap() = Some(id);
        bus.subscribe_fn(Topic::QuestCompleted, recorder(&log, "sibling"));

        bus.publish(quest_done("q1"));
        bus.publish(quest_done("q2"));

        assert_eq!(*log.lock().unwrap(), vec!["once", "sibling", "sibling"]);
        assert_eq!(bus.subscriber_count(Topic::QuestCompleted), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_id() {
        let bus = EventBus::new();
        let id = bus.subscribe_fn(Topic::LevelUp, |_: &Event| Ok(()));
        assert!(!bus.unsubscribe(Topic::CredoChanged, id));
        assert!(bus.unsubscribe(Topic::LevelUp, id));
        assert!(!bus.unsubscribe(Topic::LevelUp, id));
    }

    #[test]
    fn test_clear_topic() {
        let bus = EventBus::new();
        bus.subscribe_fn(Topic::LevelUp, |_: &Event| Ok(()));
        bus.subscribe_fn(Topic::CredoSpent, |_: &Event| Ok(()));
        bus.clear(Some(Topic::LevelUp));
        assert_eq!(bus.subscriber_count(Topic::LevelUp), 0);
        assert_eq!(bus.subscriber_count(Topic::CredoSpent), 1);
        bus.clear(None);
        assert_eq!(bus.subscriber_count(Topic::CredoSpent), 0);
    }
}
