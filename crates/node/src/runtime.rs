// Path: crates/node/src/runtime.rs

//! Background maintenance: the periodic GC driver, replay-nonce sweeps,
//! observation expiry, and replication backfill, all stopped through one
//! shutdown signal with a hard ceiling on the wait.

use crate::vault::Vault;
use bytecave_api::chain::{AppRegistry, ChainClient};
use bytecave_api::transport::PeerTransport;
use bytecave_types::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// In-flight work gets this long to finish at shutdown.
const SHUTDOWN_CEILING: Duration = Duration::from_secs(10);

const NONCE_SWEEP_PERIOD: Duration = Duration::from_secs(60);
const OBSERVATION_SWEEP_PERIOD: Duration = Duration::from_secs(3600);
const BACKFILL_PERIOD: Duration = Duration::from_secs(300);
const HEALTH_PROBE_PERIOD: Duration = Duration::from_secs(300);

/// Handles to the spawned maintenance tasks.
pub struct Background {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Background {
    /// Spawns the maintenance loops for a vault.
    pub fn spawn<T, C, R>(vault: &Arc<Vault<T, C, R>>) -> Background
    where
        T: PeerTransport + 'static,
        C: ChainClient + 'static,
        R: AppRegistry + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(
            vault.gc_engine().clone().run_periodic(rx.clone()),
        ));

        tasks.push(tokio::spawn(periodic(
            rx.clone(),
            NONCE_SWEEP_PERIOD,
            {
                let vault = vault.clone();
                move || {
                    let vault = vault.clone();
                    async move {
                        let swept = vault.sweep_nonces();
                        if swept > 0 {
                            tracing::debug!(target: "vault", event = "nonces_swept", swept);
                        }
                    }
                }
            },
        )));

        tasks.push(tokio::spawn(periodic(
            rx.clone(),
            OBSERVATION_SWEEP_PERIOD,
            {
                let vault = vault.clone();
                move || {
                    let vault = vault.clone();
                    async move {
                        let expired = vault.registry().sweep_observations(now_millis());
                        if expired > 0 {
                            tracing::debug!(target: "vault", event = "observations_expired", expired);
                        }
                    }
                }
            },
        )));

        tasks.push(tokio::spawn(periodic(rx.clone(), BACKFILL_PERIOD, {
            let vault = vault.clone();
            move || {
                let vault = vault.clone();
                async move {
                    vault.backfill_replication().await;
                }
            }
        })));

        tasks.push(tokio::spawn(periodic(rx, HEALTH_PROBE_PERIOD, {
            let vault = vault.clone();
            move || {
                let vault = vault.clone();
                async move {
                    vault.probe_peer_health().await;
                }
            }
        })));

        Background { shutdown, tasks }
    }

    /// Signals every loop and waits, bounded by the shutdown ceiling.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let drain = async {
            for task in self.tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_CEILING, drain).await.is_err() {
            tracing::warn!(target: "vault", event = "shutdown_ceiling_hit");
        }
    }
}

async fn periodic<F, Fut>(mut shutdown: watch::Receiver<bool>, period: Duration, mut tick: F)
where
    F: FnMut() -> Fut + Send,
    Fut: std::future::Future<Output = ()> + Send,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => tick().await,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
