// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serialized delivery of color temperature updates.
//!
//! The [`DeliveryQueue`] holds one [`UpdateCommand`] per light and hands
//! them to the gateway one at a time. It is driven by [`DeliveryQueue::tick`],
//! normally from [`DeliveryQueue::spawn_ticker`] on a fixed cadence.
//!
//! # Retries
//!
//! Transient failures (rate limiting, timeouts, connection problems) park
//! the command for `base_delay * 2^(retry - 1)`. Once the backoff has
//! elapsed the command rejoins the *head* of the queue. After
//! [`RetryPolicy::max_retries`] retries the command is dropped. Permanent
//! failures are dropped immediately.
//!
//! # Ordering
//!
//! Commands that never failed are delivered in FIFO order. A retried
//! command jumps ahead of commands that arrived while it was parked, so
//! ordering across lights is not guaranteed. Deliveries never overlap.

mod command;
mod retry;

pub use command::{CommandState, DropReason, UpdateCommand};
pub use retry::RetryPolicy;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::DeliveryError;
use crate::event::DeliveryEvent;
use crate::gateway::LightGateway;
use crate::types::{Kelvin, LightId};

/// Default cadence of the queue worker.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Buffered events per subscriber before the oldest are overwritten.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Receiver of per-light color temperature targets.
///
/// The light controller only needs to hand off resolved targets; this trait
/// keeps it independent of the gateway type behind the queue.
pub trait UpdateSink: Send + Sync {
    /// Submits a target for a single light.
    fn submit(&self, light: &LightId, target: Kelvin) -> EnqueueOutcome;
}

/// Result of handing a target to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new command was appended.
    Queued,
    /// A waiting command for the same light now carries the new target.
    Superseded {
        /// The target that will no longer be delivered.
        previous: Kelvin,
    },
    /// The light is excluded; nothing was queued.
    Excluded,
}

/// Result of a single worker step.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Another delivery is still in flight.
    Busy,
    /// Nothing is ready to be delivered.
    Empty,
    /// The head command was delivered.
    Delivered,
    /// The head command failed transiently and was parked.
    Retrying {
        /// Backoff before the command rejoins the queue.
        delay: Duration,
    },
    /// The head command was removed without being delivered.
    Dropped(DropReason),
}

/// Counters over the lifetime of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Commands appended by [`DeliveryQueue::enqueue`].
    pub queued: u64,
    /// Commands accepted by the gateway.
    pub delivered: u64,
    /// Retries scheduled after transient failures.
    pub retries_scheduled: u64,
    /// Parked commands re-inserted at the head of the queue.
    pub reinsertions: u64,
    /// Commands dropped after a permanent failure, exhausted retries, or a
    /// cancelled delivery.
    pub dropped: u64,
    /// Updates skipped because the light is excluded.
    pub excluded: u64,
    /// Commands replaced by a newer target for the same light.
    pub superseded: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<UpdateCommand>,
    parked: Vec<UpdateCommand>,
    worker_active: bool,
    stats: QueueStats,
}

impl QueueState {
    fn has_waiting_command_for(&self, light: &LightId) -> bool {
        self.pending
            .iter()
            .chain(self.parked.iter())
            .any(|cmd| cmd.light_id() == light)
    }
}

/// Clears the worker flag when a delivery ends, including by cancellation.
///
/// A command still marked in flight when the slot drops was cancelled; it
/// is counted and reported as dropped.
struct WorkerSlot<'a> {
    state: &'a Mutex<QueueState>,
    events: &'a broadcast::Sender<DeliveryEvent>,
    in_flight: Option<(LightId, Kelvin)>,
}

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.worker_active = false;
        let Some((light, target)) = self.in_flight.take() else {
            return;
        };
        state.stats.dropped += 1;
        drop(state);

        tracing::warn!(light = %light, %target, "Delivery cancelled while in flight");
        let _ = self.events.send(DeliveryEvent::Dropped {
            light,
            target,
            reason: DropReason::Cancelled,
        });
    }
}

/// Serialized, retrying dispatcher of per-light updates.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use daylight_sync::delivery::{DeliveryQueue, DEFAULT_TICK_INTERVAL};
/// use daylight_sync::gateway::HueBridgeConfig;
/// use daylight_sync::types::{Kelvin, LightId};
///
/// # async fn example() -> daylight_sync::Result<()> {
/// let bridge = HueBridgeConfig::new("192.168.1.20", "app-key").into_client()?;
/// let queue = Arc::new(
///     DeliveryQueue::new(bridge).with_excluded_lights([LightId::new("porch")]),
/// );
/// let worker = queue.spawn_ticker(DEFAULT_TICK_INTERVAL);
///
/// queue.enqueue(LightId::new("desk"), Kelvin::new(4000)?);
/// # worker.abort();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DeliveryQueue<G> {
    gateway: G,
    policy: RetryPolicy,
    excluded: HashSet<LightId>,
    state: Mutex<QueueState>,
    events: broadcast::Sender<DeliveryEvent>,
}

impl<G: LightGateway> DeliveryQueue<G> {
    /// Creates a queue delivering through `gateway` with the default policy.
    #[must_use]
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            policy: RetryPolicy::default(),
            excluded: HashSet::new(),
            state: Mutex::new(QueueState::default()),
            events: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Adds lights whose updates are silently skipped.
    #[must_use]
    pub fn with_excluded_lights(mut self, lights: impl IntoIterator<Item = LightId>) -> Self {
        self.excluded.extend(lights);
        self
    }

    /// Returns the gateway.
    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns true if updates for `light` are skipped.
    #[must_use]
    pub fn is_excluded(&self, light: &LightId) -> bool {
        self.excluded.contains(light)
    }

    /// Subscribes to delivery events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.events.subscribe()
    }

    /// Returns the lifetime counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.state.lock().stats
    }

    /// Returns the number of commands ready for delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns true if no command is ready for delivery.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Returns the number of commands waiting out a backoff.
    #[must_use]
    pub fn parked_len(&self) -> usize {
        self.state.lock().parked.len()
    }

    /// Returns true while a delivery is in flight.
    #[must_use]
    pub fn is_worker_active(&self) -> bool {
        self.state.lock().worker_active
    }

    /// Returns a copy of the commands ready for delivery, head first.
    #[must_use]
    pub fn pending(&self) -> Vec<UpdateCommand> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Appends an update for `light`.
    ///
    /// Excluded lights are skipped. If a command for the same light is still
    /// waiting (pending or parked), it is superseded by the new target.
    pub fn enqueue(&self, light: LightId, target: Kelvin) -> EnqueueOutcome {
        if self.excluded.contains(&light) {
            tracing::debug!(light = %light, "Skipping excluded light");
            self.state.lock().stats.excluded += 1;
            self.publish(DeliveryEvent::Excluded { light });
            return EnqueueOutcome::Excluded;
        }

        let mut state = self.state.lock();

        if let Some(cmd) = state.pending.iter_mut().find(|c| c.light_id() == &light) {
            let previous = cmd.target();
            cmd.retarget(target);
            state.stats.superseded += 1;
            drop(state);

            tracing::debug!(light = %light, %previous, %target, "Replaced pending update");
            self.publish(DeliveryEvent::Superseded {
                light,
                previous,
                target,
            });
            return EnqueueOutcome::Superseded { previous };
        }

        let parked = state.parked.iter().position(|c| c.light_id() == &light);
        let outcome = if let Some(index) = parked {
            let mut old = state.parked.swap_remove(index);
            old.drop_with(DropReason::Superseded);
            state.stats.superseded += 1;
            EnqueueOutcome::Superseded {
                previous: old.target(),
            }
        } else {
            EnqueueOutcome::Queued
        };

        state.pending.push_back(UpdateCommand::new(light.clone(), target));
        state.stats.queued += 1;
        drop(state);

        match outcome {
            EnqueueOutcome::Superseded { previous } => {
                tracing::debug!(light = %light, %previous, %target, "Replaced update awaiting retry");
                self.publish(DeliveryEvent::Superseded {
                    light,
                    previous,
                    target,
                });
            }
            _ => {
                tracing::debug!(light = %light, %target, "Queued update");
                self.publish(DeliveryEvent::Queued { light, target });
            }
        }
        outcome
    }

    /// Runs one worker step.
    ///
    /// Returns [`TickOutcome::Busy`] immediately if a delivery is already in
    /// flight. Otherwise parked commands whose backoff has elapsed are moved
    /// to the head of the queue, and the head command (if any) is delivered.
    pub async fn tick(&self) -> TickOutcome {
        let command = {
            let mut state = self.state.lock();
            if state.worker_active {
                return TickOutcome::Busy;
            }
            self.promote_due(&mut state, Instant::now());
            let Some(command) = state.pending.pop_front() else {
                return TickOutcome::Empty;
            };
            state.worker_active = true;
            command
        };

        let mut slot = WorkerSlot {
            state: &self.state,
            events: &self.events,
            in_flight: Some((command.light_id().clone(), command.target())),
        };

        let result = self
            .gateway
            .set_color_temperature(command.light_id(), command.target().to_mired())
            .await;

        slot.in_flight = None;
        self.settle(command, result)
    }

    /// Sends an event, discarding it when nobody listens.
    fn publish(&self, event: DeliveryEvent) {
        let _ = self.events.send(event);
    }

    /// Moves parked commands whose backoff has elapsed to the queue head.
    fn promote_due(&self, state: &mut QueueState, now: Instant) {
        if state.parked.is_empty() {
            return;
        }

        let (mut due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.parked)
            .into_iter()
            .partition(|cmd| cmd.is_due(now));
        state.parked = waiting;

        due.sort_by_key(|cmd| match cmd.state() {
            CommandState::AwaitingBackoff { until } => Some(*until),
            _ => None,
        });

        // Earliest deadline ends up at the very front
        for mut cmd in due.into_iter().rev() {
            cmd.wake();
            state.stats.reinsertions += 1;
            tracing::debug!(light = %cmd.light_id(), retry = cmd.retry_count(), "Retrying update");
            self.publish(DeliveryEvent::Requeued {
                light: cmd.light_id().clone(),
                retry: cmd.retry_count(),
            });
            state.pending.push_front(cmd);
        }
    }

    /// Applies the result of a delivery attempt to the command.
    fn settle(
        &self,
        mut command: UpdateCommand,
        result: Result<(), DeliveryError>,
    ) -> TickOutcome {
        let light = command.light_id().clone();
        let target = command.target();
        let attempts = command.retry_count() + 1;

        let error = match result {
            Ok(()) => {
                self.state.lock().stats.delivered += 1;
                tracing::info!(light = %light, %target, attempts, "Light updated");
                self.publish(DeliveryEvent::Delivered {
                    light,
                    target,
                    attempts,
                });
                return TickOutcome::Delivered;
            }
            Err(error) => error,
        };

        let mut state = self.state.lock();

        let reason = if !error.is_transient() {
            tracing::error!(light = %light, %target, error = %error, "Dropping update after permanent failure");
            DropReason::Permanent(error)
        } else if !self.policy.should_retry(command.retry_count()) {
            tracing::error!(
                light = %light,
                %target,
                attempts,
                error = %error,
                "Dropping update, retries exhausted"
            );
            DropReason::RetriesExhausted {
                attempts,
                last_error: error,
            }
        } else if state.has_waiting_command_for(&light) {
            tracing::debug!(light = %light, error = %error, "Failed update already superseded");
            DropReason::Superseded
        } else {
            let retry = command.retry_count() + 1;
            let delay = self.policy.delay_for_retry(retry);
            tracing::warn!(
                light = %light,
                retry,
                max_retries = self.policy.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Failed to update light, scheduling retry"
            );

            command.park(error.clone(), Instant::now() + delay);
            state.parked.push(command);
            state.stats.retries_scheduled += 1;
            drop(state);

            self.publish(DeliveryEvent::RetryScheduled {
                light,
                retry,
                delay,
                error,
            });
            return TickOutcome::Retrying { delay };
        };

        if reason == DropReason::Superseded {
            state.stats.superseded += 1;
        } else {
            state.stats.dropped += 1;
        }
        drop(state);

        command.drop_with(reason.clone());
        self.publish(DeliveryEvent::Dropped {
            light,
            target,
            reason: reason.clone(),
        });
        TickOutcome::Dropped(reason)
    }
}

impl<G: LightGateway + 'static> DeliveryQueue<G> {
    /// Spawns a task calling [`tick`](Self::tick) every `cadence`.
    ///
    /// The task holds only a weak reference and ends once the queue is
    /// dropped, or when the returned handle is aborted.
    pub fn spawn_ticker(self: &Arc<Self>, cadence: Duration) -> JoinHandle<()> {
        let queue: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(queue) = queue.upgrade() else {
                    break;
                };
                queue.tick().await;
            }
            tracing::debug!("Delivery ticker stopped");
        })
    }
}

impl<G: LightGateway> UpdateSink for DeliveryQueue<G> {
    fn submit(&self, light: &LightId, target: Kelvin) -> EnqueueOutcome {
        self.enqueue(light.clone(), target)
    }
}
