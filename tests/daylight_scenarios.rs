// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios against an in-memory gateway on paused time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use daylight_sync::delivery::DropReason;
use daylight_sync::gateway::{LightGateway, LightInfo};
use daylight_sync::solar::{AstronomyProvider, Clock};
use daylight_sync::types::{Kelvin, LightId, Mired};
use daylight_sync::{DaylightConfig, DaylightSync, DeliveryError, DeliveryEvent};
use parking_lot::Mutex;
use tokio::time::Instant;

// ============================================================================
// Test doubles
// ============================================================================

/// Gateway that records every update and replays scripted failures.
#[derive(Default)]
struct RecordingGateway {
    lights: Vec<LightId>,
    failures: Mutex<VecDeque<DeliveryError>>,
    calls: Arc<Mutex<Vec<(LightId, Mired, Instant)>>>,
}

impl RecordingGateway {
    fn with_lights(ids: &[&str]) -> Self {
        Self {
            lights: ids.iter().map(|id| LightId::new(*id)).collect(),
            ..Self::default()
        }
    }

    fn failing(self, failures: impl IntoIterator<Item = DeliveryError>) -> Self {
        *self.failures.lock() = failures.into_iter().collect();
        self
    }

    fn calls(&self) -> Arc<Mutex<Vec<(LightId, Mired, Instant)>>> {
        Arc::clone(&self.calls)
    }
}

impl LightGateway for RecordingGateway {
    async fn list_lights(&self) -> Result<Vec<LightInfo>, DeliveryError> {
        Ok(self
            .lights
            .iter()
            .map(|id| LightInfo {
                id: id.clone(),
                name: id.to_string(),
                is_on: true,
                color_temperature: None,
            })
            .collect())
    }

    async fn set_color_temperature(
        &self,
        light: &LightId,
        mired: Mired,
    ) -> Result<(), DeliveryError> {
        self.calls.lock().push((light.clone(), mired, Instant::now()));
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Half sine between 06:00 and 18:00 UTC peaking at noon.
struct SineSun;

impl AstronomyProvider for SineSun {
    fn solar_altitude(&self, time: DateTime<Utc>, _lat: f64, _lon: f64) -> f64 {
        use chrono::Timelike;
        let hours = f64::from(time.num_seconds_from_midnight()) / 3600.0;
        ((hours - 6.0) / 12.0 * std::f64::consts::PI).sin()
    }

    fn solar_noon(&self, date: NaiveDate, _lat: f64, _lon: f64) -> DateTime<Utc> {
        date.and_hms_opt(12, 0, 0).unwrap().and_utc()
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn at(hour: u32) -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()))
}

fn located() -> DaylightConfig {
    DaylightConfig::default()
        .with_bridge("bridge", "key")
        .with_location(45.0, 0.001)
}

async fn start(
    config: DaylightConfig,
    gateway: RecordingGateway,
    hour: u32,
) -> DaylightSync<RecordingGateway> {
    DaylightSync::start_with(config, gateway, at(hour), Arc::new(SineSun))
        .await
        .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn morning_sun_drives_lights_to_curve_value() {
    // At 08:00 the sun is at half its noon altitude: 0.5^3 = 0.125
    let gateway = RecordingGateway::with_lights(&["desk"]);
    let calls = gateway.calls();
    let sync = start(located(), gateway, 8).await;

    assert_eq!(sync.state().current_temp, Kelvin::new(3175).unwrap());
    assert!(sync.state().is_auto_mode);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, Mired::new(315).unwrap());
}

#[tokio::test(start_paused = true)]
async fn slider_burst_produces_one_delivery() {
    let gateway = RecordingGateway::with_lights(&["desk"]);
    let calls = gateway.calls();
    let sync = start(located().with_default_auto_mode(false), gateway, 12).await;
    let t0 = Instant::now();

    sync.light().set_target_by_slider(10).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    sync.light().set_target_by_slider(50).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let last = sync.light().set_target_by_slider(90).unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, last.to_mired());

    // Debounce fires at 950ms, the next queue tick delivers
    let elapsed = calls[0].2 - t0;
    assert!(elapsed >= Duration::from_millis(950), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(1050), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn rate_limited_update_backs_off_then_drops() {
    let gateway = RecordingGateway::with_lights(&["desk"]).failing([
        DeliveryError::RateLimited,
        DeliveryError::RateLimited,
        DeliveryError::RateLimited,
        DeliveryError::RateLimited,
    ]);
    let calls = gateway.calls();
    let sync = start(located(), gateway, 8).await;
    let mut events = sync.queue().subscribe();

    tokio::time::sleep(Duration::from_secs(10)).await;

    let calls = calls.lock();
    assert_eq!(calls.len(), 4);

    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].2 - w[0].2).collect();
    for (gap, backoff) in gaps.iter().zip([1000, 2000, 4000]) {
        let backoff = Duration::from_millis(backoff);
        assert!(*gap >= backoff, "{gap:?} < {backoff:?}");
        assert!(*gap <= backoff + Duration::from_millis(100), "{gap:?}");
    }

    let stats = sync.queue().stats();
    assert_eq!(stats.reinsertions, 3);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.delivered, 0);

    let mut dropped = None;
    while let Ok(event) = events.try_recv() {
        if let DeliveryEvent::Dropped { reason, .. } = event {
            dropped = Some(reason);
        }
    }
    assert_eq!(
        dropped,
        Some(DropReason::RetriesExhausted {
            attempts: 4,
            last_error: DeliveryError::RateLimited,
        })
    );

    // The optimistic value is not rolled back
    assert_eq!(sync.state().current_temp, Kelvin::new(3175).unwrap());
}

#[tokio::test(start_paused = true)]
async fn excluded_light_is_never_addressed() {
    let gateway = RecordingGateway::with_lights(&["desk", "porch", "hall"]);
    let calls = gateway.calls();
    let sync = start(located().with_excluded_light("porch"), gateway, 12).await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    let addressed: Vec<LightId> = calls.lock().iter().map(|c| c.0.clone()).collect();
    assert_eq!(addressed, vec![LightId::new("desk"), LightId::new("hall")]);
    assert_eq!(sync.queue().stats().excluded, 1);
}

#[tokio::test(start_paused = true)]
async fn manual_change_disengages_auto_mode() {
    let gateway = RecordingGateway::with_lights(&["desk"]);
    let calls = gateway.calls();
    let sync = start(
        located().with_update_interval(Duration::from_secs(60)),
        gateway,
        12,
    )
    .await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let manual = sync.light().set_target_by_mired(300).unwrap();
    assert!(!sync.state().is_auto_mode);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(sync.state().current_temp, manual);

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].1, Mired::new(300).unwrap());
}

#[tokio::test(start_paused = true)]
async fn lights_off_suppresses_delivery() {
    let gateway = RecordingGateway::with_lights(&["desk"]);
    let calls = gateway.calls();
    let sync = start(located(), gateway, 12).await;

    sync.light().set_on(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(calls.lock().is_empty());
    assert!(!sync.state().is_on);

    sync.light().set_on(true);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(calls.lock().len(), 1);
    assert_eq!(calls.lock()[0].1, Kelvin::new(6500).unwrap().to_mired());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_worker() {
    let gateway = RecordingGateway::with_lights(&["desk"]);
    let calls = gateway.calls();
    let sync = start(located(), gateway, 12).await;

    sync.shutdown();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(calls.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_slider_input_settles_on_one_delivery_per_light() {
    let gateway = RecordingGateway::with_lights(&["desk", "hall"]);
    let calls = gateway.calls();
    let sync = Arc::new(start(located().with_default_auto_mode(false), gateway, 12).await);

    let writers: Vec<_> = (1..=16u8)
        .map(|n| {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.light().set_target_by_slider(n * 6).unwrap() })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    let settled = sync.state().current_temp;
    assert_eq!(settled, sync.light().target_temperature());
    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.1 == settled.to_mired()));
    assert_eq!(sync.queue().stats().delivered, 2);
}
