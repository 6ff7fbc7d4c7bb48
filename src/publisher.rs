//! Periodic data publisher.
//!
//! On every tick, renders a payload for each active context and broadcasts it
//! as a `data` event through the gateway.

use crate::config::ContextDefinition;
use crate::gateway::{BroadcastGateway, RealtimeTransport};
use crate::template::{default_payload, TemplateEngine, TickContext};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DATA_EVENT: &str = "data";

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub seq: u64,
    /// Contexts an event was broadcast to
    pub contexts: usize,
    /// Individual deliveries across all contexts
    pub delivered: usize,
}

pub struct TickPublisher<T> {
    gateway: Arc<BroadcastGateway<T>>,
    templates: TemplateEngine,
    payloads: HashMap<String, Value>,
    seq: AtomicU64,
}

impl<T: RealtimeTransport> TickPublisher<T> {
    /// Create a publisher using the payload templates of the given contexts.
    /// Contexts without a template (including dynamic ones) use a default
    /// payload.
    pub fn new(gateway: Arc<BroadcastGateway<T>>, contexts: &[ContextDefinition]) -> Self {
        let payloads = contexts
            .iter()
            .filter_map(|c| {
                c.payload
                    .as_ref()
                    .map(|p| (c.name.to_lowercase(), p.clone()))
            })
            .collect();

        Self {
            gateway,
            templates: TemplateEngine::new(),
            payloads,
            seq: AtomicU64::new(0),
        }
    }

    /// Broadcast one round of generated data.
    ///
    /// When subscriber counts are tracked, contexts nobody listens to are
    /// skipped.
    pub async fn tick(&self) -> TickReport {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let tracked = self.gateway.tracks_contexts();
        let mut report = TickReport {
            seq,
            ..TickReport::default()
        };

        let fallback = default_payload();
        for entry in self.gateway.registry().snapshot() {
            if !entry.is_active || (tracked && entry.connection_count == 0) {
                continue;
            }

            let template = self
                .payloads
                .get(&entry.name.to_lowercase())
                .unwrap_or(&fallback);
            let ctx = TickContext::new(&entry.name, seq, entry.connection_count, now);

            let payload = match self.templates.render_payload(template, &ctx) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(context = %entry.name, error = %e, "Failed to render payload");
                    continue;
                }
            };

            if let Ok(delivered) = self.gateway.broadcast(&entry.name, DATA_EVENT, payload).await {
                report.contexts += 1;
                report.delivered += delivered;
            }
        }

        debug!(
            seq,
            contexts = report.contexts,
            delivered = report.delivered,
            "Tick published"
        );
        report
    }

    /// Tick on a fixed interval until `shutdown` turns true or its sender is
    /// dropped.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis() as u64, "Tick publisher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(ticks = self.seq.load(Ordering::Relaxed), "Tick publisher stopped");
    }
}
