//! Owns the running worlds, one simulation thread each.

use std::{
    path::Path,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use realm_core::{EntityFactory, TickTime, Transport, World, WorldStatus};
use realm_utils::locks::SyncMutex;
use scc::HashMap;
use tokio_util::sync::CancellationToken;

use crate::config::WorldConfig;

/// Creates worlds, steps each on its own thread at a fixed rate, and tears
/// down the ones that expire or fault.
pub struct WorldManager {
    worlds: Arc<HashMap<String, Arc<World>>>,
    threads: SyncMutex<Vec<JoinHandle<()>>>,
    transport: Arc<dyn Transport>,
    tick: Duration,
    cancel_token: CancellationToken,
}

impl WorldManager {
    /// Creates a manager stepping worlds every `tick`. Cancelling `cancel_token`
    /// stops every world thread.
    #[must_use]
    pub fn new(tick: Duration, transport: Arc<dyn Transport>, cancel_token: CancellationToken) -> Self {
        Self {
            worlds: Arc::new(HashMap::new()),
            threads: SyncMutex::new(Vec::new()),
            transport,
            tick,
            cancel_token,
        }
    }

    /// Builds a world from `config`, spawns its initial entities and starts
    /// its simulation thread.
    pub fn create_world(
        &self,
        config: &WorldConfig,
        base_dir: &Path,
        factory: &dyn EntityFactory,
    ) -> anyhow::Result<Arc<World>> {
        let name = config.settings.name.clone();
        let layout = config.load_layout(base_dir)?;
        let world = Arc::new(World::new(
            config.settings.clone(),
            &layout,
            self.transport.clone(),
        )?);
        world.spawn_initial_entities(&layout, factory)?;

        if self
            .worlds
            .insert_sync(name.clone(), world.clone())
            .is_err()
        {
            anyhow::bail!("A world named {name} is already running");
        }

        let runner = WorldRunner {
            world: world.clone(),
            worlds: self.worlds.clone(),
            tick: self.tick,
            cancel_token: self.cancel_token.child_token(),
        };
        let handle = thread::Builder::new()
            .name(format!("world-{name}"))
            .spawn(move || runner.run())
            .with_context(|| format!("failed to spawn the thread of world {name}"))?;
        self.threads.lock().push(handle);

        Ok(world)
    }

    /// A running world by name.
    #[must_use]
    pub fn world(&self, name: &str) -> Option<Arc<World>> {
        self.worlds.read_sync(name, |_, world| world.clone())
    }

    /// Names of the running worlds.
    #[must_use]
    pub fn world_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.worlds.len());
        self.worlds.iter_sync(|name, _| {
            names.push(name.clone());
            true
        });
        names.sort();
        names
    }

    /// Number of running worlds.
    #[must_use]
    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    /// Stops every world thread and waits for them to finish.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            let name = handle.thread().name().unwrap_or("world").to_string();
            if handle.join().is_err() {
                log::error!("Thread {name} panicked");
            }
        }
    }
}

/// The loop of one world thread.
struct WorldRunner {
    world: Arc<World>,
    worlds: Arc<HashMap<String, Arc<World>>>,
    tick: Duration,
    cancel_token: CancellationToken,
}

impl WorldRunner {
    fn run(self) {
        let tick_ms = i64::try_from(self.tick.as_millis()).unwrap_or(i64::MAX);
        let mut time = TickTime::default();
        let mut next_tick = Instant::now();

        while !self.cancel_token.is_cancelled() {
            let started = Instant::now();
            time = time.next(tick_ms);

            match self.world.update(&time) {
                Ok(WorldStatus::Active) => {}
                Ok(status) => {
                    log::info!("World {} is {status:?}, shutting it down", self.world.name());
                    break;
                }
                Err(err) => {
                    log::error!("World {} faulted: {err}", self.world.name());
                    break;
                }
            }

            let elapsed = started.elapsed();
            if elapsed > self.tick {
                log::warn!(
                    "World {} tick {} took {elapsed:?}, budget is {:?}",
                    self.world.name(),
                    time.tick_count,
                    self.tick
                );
            }

            next_tick += self.tick;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }

        self.worlds.remove_sync(self.world.name());
        self.world.destroy();
    }
}

#[cfg(test)]
mod tests {
    use realm_core::{Entity, WorldSettings, transport::NullTransport, world::map::EntitySpawn};

    use super::*;

    struct NoSpawns;

    impl EntityFactory for NoSpawns {
        fn create(&self, _spawn: &EntitySpawn) -> anyhow::Result<Option<Entity>> {
            Ok(None)
        }
    }

    fn world_config(name: &str, idle_expiry_ms: i64) -> WorldConfig {
        WorldConfig {
            map: None,
            size: 32,
            bots: 0,
            settings: WorldSettings {
                name: name.to_string(),
                idle_expiry_ms,
                ..WorldSettings::default()
            },
        }
    }

    fn manager() -> WorldManager {
        WorldManager::new(
            Duration::from_millis(10),
            Arc::new(NullTransport),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_expired_world_is_removed() {
        let manager = manager();
        let world = manager
            .create_world(&world_config("Short", 30), Path::new("."), &NoSpawns)
            .expect("create");
        assert_eq!(manager.world_count(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.world_count() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        manager.shutdown();

        assert_eq!(manager.world_count(), 0);
        assert_eq!(world.status(), WorldStatus::Destroyed);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let manager = manager();
        manager
            .create_world(&world_config("Same", 60_000), Path::new("."), &NoSpawns)
            .expect("create");
        assert!(
            manager
                .create_world(&world_config("Same", 60_000), Path::new("."), &NoSpawns)
                .is_err()
        );
        assert_eq!(manager.world_names(), vec!["Same".to_string()]);

        manager.shutdown();
        assert!(manager.world("Same").is_none());
    }
}
