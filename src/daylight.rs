// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level wiring of the solar model, light state, and delivery queue.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::auto_mode::AutoModeController;
use crate::config::{ConfigIssue, DaylightConfig};
use crate::delivery::{DeliveryQueue, UpdateSink};
use crate::gateway::LightGateway;
use crate::light::LightStateController;
use crate::solar::{AstronomyProvider, Clock, NoaaAstronomy, SolarTransitionCalculator, SystemClock};
use crate::types::{Kelvin, LightId};

/// Externally visible state of a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionState {
    /// Last known temperature, always inside the configured range.
    pub current_temp: Kelvin,
    /// Whether the lights are on.
    pub is_on: bool,
    /// Whether automatic tracking is enabled.
    pub is_auto_mode: bool,
}

/// A running daylight sync instance.
///
/// # Examples
///
/// ```no_run
/// use daylight_sync::config::DaylightConfig;
/// use daylight_sync::DaylightSync;
///
/// # async fn example() -> daylight_sync::Result<()> {
/// let config = DaylightConfig::default()
///     .with_bridge("192.168.1.20", "app-key")
///     .with_location(52.52, 13.405);
/// let bridge = config.hue_bridge().expect("bridge configured").into_client()?;
///
/// let sync = DaylightSync::start(config, bridge).await?;
/// println!("{:?}", sync.state());
///
/// sync.light().set_target_by_slider(40)?;
/// assert!(!sync.state().is_auto_mode);
///
/// sync.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct DaylightSync<G: LightGateway + 'static> {
    config: DaylightConfig,
    issues: Vec<ConfigIssue>,
    queue: Arc<DeliveryQueue<G>>,
    light: LightStateController,
    auto_mode: AutoModeController,
    ticker: JoinHandle<()>,
}

impl<G: LightGateway + 'static> fmt::Debug for DaylightSync<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaylightSync")
            .field("state", &self.state())
            .field("lights", &self.light.lights())
            .field("auto_mode", &self.auto_mode)
            .finish_non_exhaustive()
    }
}

impl<G: LightGateway + 'static> DaylightSync<G> {
    /// Starts an instance on the wall clock and the NOAA sun model.
    ///
    /// # Errors
    ///
    /// See [`start_with`](Self::start_with).
    pub async fn start(config: DaylightConfig, gateway: G) -> crate::Result<Self> {
        Self::start_with(config, gateway, Arc::new(SystemClock), Arc::new(NoaaAstronomy)).await
    }

    /// Starts an instance with a custom clock and astronomy provider.
    ///
    /// The configuration is sanitized first; its problems are logged and
    /// available from [`config_issues`](Self::config_issues). The lights are
    /// listed once through the gateway. Excluded lights stay in the list and
    /// are filtered by the queue.
    ///
    /// # Errors
    ///
    /// Returns `Error::Delivery` if the gateway cannot list its lights.
    pub async fn start_with(
        mut config: DaylightConfig,
        gateway: G,
        clock: Arc<dyn Clock>,
        astronomy: Arc<dyn AstronomyProvider>,
    ) -> crate::Result<Self> {
        let issues = config.sanitize();
        let lights = list_light_ids(&gateway).await?;

        let solar = config.solar_config()?;
        let range = solar.range();
        let calculator = SolarTransitionCalculator::with_astronomy(solar, astronomy);

        let queue = Arc::new(
            DeliveryQueue::new(gateway)
                .with_retry_policy(config.retry_policy())
                .with_excluded_lights(config.excluded_lights()),
        );
        let ticker = queue.spawn_ticker(config.queue_tick());

        let sink: Arc<dyn UpdateSink> = queue.clone();
        let light = LightStateController::new(sink, lights, range, config.input_debounce());
        let auto_mode = AutoModeController::new(calculator, light.clone(), clock);
        auto_mode.start(config.default_auto_mode);

        Ok(Self {
            config,
            issues,
            queue,
            light,
            auto_mode,
            ticker,
        })
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransitionState {
        TransitionState {
            current_temp: self.light.current_temperature(),
            is_on: self.light.is_on(),
            is_auto_mode: self.auto_mode.is_enabled(),
        }
    }

    /// Returns the sanitized configuration.
    #[must_use]
    pub fn config(&self) -> &DaylightConfig {
        &self.config
    }

    /// Returns the problems found while sanitizing the configuration.
    #[must_use]
    pub fn config_issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    /// Returns the light controller.
    #[must_use]
    pub fn light(&self) -> &LightStateController {
        &self.light
    }

    /// Returns the auto mode controller.
    #[must_use]
    pub fn auto_mode(&self) -> &AutoModeController {
        &self.auto_mode
    }

    /// Returns the delivery queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<DeliveryQueue<G>> {
        &self.queue
    }

    /// Lists the lights again and addresses the new set from the next
    /// delivery on.
    ///
    /// # Errors
    ///
    /// Returns `Error::Delivery` if the gateway cannot list its lights. The
    /// previous set is kept.
    pub async fn refresh_lights(&self) -> crate::Result<Vec<LightId>> {
        let lights = list_light_ids(self.queue.gateway()).await?;
        self.light.set_lights(lights.clone());
        Ok(lights)
    }

    /// Stops the periodic timers and the queue worker.
    ///
    /// Commands still in the queue are discarded. A delivery in flight is
    /// cancelled and reported as dropped.
    pub fn shutdown(self) {
        self.auto_mode.disable();
        self.ticker.abort();
        tracing::info!(
            pending = self.queue.len(),
            parked = self.queue.parked_len(),
            "Daylight sync stopped"
        );
    }
}

async fn list_light_ids<G: LightGateway>(gateway: &G) -> crate::Result<Vec<LightId>> {
    match gateway.list_lights().await {
        Ok(lights) => {
            tracing::info!(count = lights.len(), "Discovered lights");
            Ok(lights.into_iter().map(|light| light.id).collect())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list lights");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeliveryError, Error};
    use crate::gateway::LightInfo;
    use crate::types::Mired;
    use std::time::Duration;

    struct Unreachable;

    impl LightGateway for Unreachable {
        async fn list_lights(&self) -> Result<Vec<LightInfo>, DeliveryError> {
            Err(DeliveryError::Timeout)
        }

        async fn set_color_temperature(
            &self,
            _light: &LightId,
            _mired: Mired,
        ) -> Result<(), DeliveryError> {
            Err(DeliveryError::Timeout)
        }
    }

    struct OneLight;

    /// Lists one light, then every further listing adds one more. Fails
    /// once `broken` is set.
    #[derive(Default)]
    struct GrowingGateway {
        listings: parking_lot::Mutex<usize>,
        broken: std::sync::atomic::AtomicBool,
        delivered: parking_lot::Mutex<Vec<LightId>>,
    }

    impl LightGateway for GrowingGateway {
        async fn list_lights(&self) -> Result<Vec<LightInfo>, DeliveryError> {
            if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(DeliveryError::Timeout);
            }
            let mut listings = self.listings.lock();
            *listings += 1;
            Ok((0..*listings)
                .map(|n| LightInfo {
                    id: LightId::new(format!("light-{n}")),
                    name: format!("Light {n}"),
                    is_on: true,
                    color_temperature: None,
                })
                .collect())
        }

        async fn set_color_temperature(
            &self,
            light: &LightId,
            _mired: Mired,
        ) -> Result<(), DeliveryError> {
            self.delivered.lock().push(light.clone());
            Ok(())
        }
    }

    impl LightGateway for OneLight {
        async fn list_lights(&self) -> Result<Vec<LightInfo>, DeliveryError> {
            Ok(vec![LightInfo {
                id: LightId::new("desk"),
                name: "Desk".into(),
                is_on: true,
                color_temperature: None,
            }])
        }

        async fn set_color_temperature(
            &self,
            _light: &LightId,
            _mired: Mired,
        ) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_fails_when_lights_cannot_be_listed() {
        let result = DaylightSync::start(DaylightConfig::default(), Unreachable).await;
        assert!(matches!(result, Err(Error::Delivery(DeliveryError::Timeout))));
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_location_uses_midpoint() {
        let sync = DaylightSync::start(DaylightConfig::default(), OneLight)
            .await
            .unwrap();

        assert!(sync.config_issues().contains(&ConfigIssue::MissingLocation));
        assert_eq!(
            sync.state(),
            TransitionState {
                current_temp: Kelvin::new(4600).unwrap(),
                is_on: true,
                is_auto_mode: true,
            }
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sync.queue().stats().delivered, 1);
        sync.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn start_with_auto_mode_off() {
        let config = DaylightConfig::default().with_default_auto_mode(false);
        let sync = DaylightSync::start(config, OneLight).await.unwrap();

        let state = sync.state();
        assert!(!state.is_auto_mode);
        assert_eq!(state.current_temp.value(), 2700);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sync.queue().stats().queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_picks_up_new_lights() {
        let config = DaylightConfig::default().with_default_auto_mode(false);
        let sync = DaylightSync::start(config, GrowingGateway::default())
            .await
            .unwrap();
        assert_eq!(sync.light().lights(), vec![LightId::new("light-0")]);

        let lights = sync.refresh_lights().await.unwrap();
        assert_eq!(lights.len(), 2);

        sync.light().set_target_by_slider(50).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            *sync.queue().gateway().delivered.lock(),
            vec![LightId::new("light-0"), LightId::new("light-1")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_previous_lights() {
        let sync = DaylightSync::start(DaylightConfig::default(), GrowingGateway::default())
            .await
            .unwrap();
        sync.queue()
            .gateway()
            .broken
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let result = sync.refresh_lights().await;
        assert!(matches!(result, Err(Error::Delivery(DeliveryError::Timeout))));
        assert_eq!(sync.light().lights(), vec![LightId::new("light-0")]);
    }
}
