//! # Realm
//!
//! The server host: loads the configuration, runs every configured world on its
//! own simulation thread and routes world output to connection queues.
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    missing_docs,
    clippy::unwrap_used
)]
#![allow(
    clippy::single_call_fn,
    clippy::multiple_inherent_impl,
    clippy::shadow_unrelated,
    clippy::missing_errors_doc,
    clippy::struct_excessive_bools,
    clippy::needless_pass_by_value,
    clippy::cargo_common_metadata
)]
use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use realm_core::{Entity, World, entity::PlayerData};
use tokio::{runtime::Handle, select, spawn, time::interval};
use tokio_util::sync::CancellationToken;

use crate::{
    config::RealmConfig,
    demo::{BOT_OBJECT_TYPE, Bot, DemoFactory},
    manager::WorldManager,
    transport::ChannelTransport,
};

pub mod config;
pub mod demo;
pub mod logger;
pub mod manager;
pub mod transport;

/// How often the server reports on its worlds.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// The main server struct.
pub struct RealmServer {
    /// The cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    /// The loaded configuration.
    pub config: RealmConfig,
    /// Directory the config was loaded from; map paths are relative to it.
    pub base_dir: PathBuf,
    /// Per-connection output queues.
    pub transport: Arc<ChannelTransport>,
    /// The running worlds.
    pub manager: WorldManager,
}

impl RealmServer {
    /// Creates the server. Nothing runs until [`RealmServer::start`].
    #[must_use]
    pub fn new(config: RealmConfig, base_dir: PathBuf) -> Self {
        log::info!("Starting Realm Server");

        let cancel_token = CancellationToken::new();
        let transport = Arc::new(ChannelTransport::new(config.connection_queue));
        let manager = WorldManager::new(
            Duration::from_millis(config.tick_ms),
            transport.clone(),
            cancel_token.child_token(),
        );

        Self {
            cancel_token,
            config,
            base_dir,
            transport,
            manager,
        }
    }

    /// Starts every configured world and its simulated clients. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) -> anyhow::Result<()> {
        let runtime = Handle::current();
        for world_config in &self.config.worlds {
            let world = self
                .manager
                .create_world(world_config, &self.base_dir, &DemoFactory)?;
            for _ in 0..world_config.bots {
                self.connect_bot(&world, &runtime);
            }
        }

        let cancel_token = self.cancel_token.clone();
        let transport = self.transport.clone();
        spawn(async move {
            let mut ticker = interval(STATUS_INTERVAL);
            loop {
                select! {
                    () = cancel_token.cancelled() => break,
                    _ = ticker.tick() => {
                        log::info!("{} open connections", transport.connection_count());
                    }
                }
            }
        });

        log::info!(
            "Started Realm Server with worlds {:?}",
            self.manager.world_names()
        );
        Ok(())
    }

    /// Admits a simulated client into `world` on one of its spawn points.
    ///
    /// The avatar enters from a timer on the world's own thread, so its queue
    /// is open before the world computes its first delta.
    fn connect_bot(&self, world: &Arc<World>, runtime: &Handle) {
        let spawns = world.spawn_points();
        let (x, y) = if spawns.is_empty() {
            (
                f64::from(world.map().width()) / 2.0,
                f64::from(world.map().height()) / 2.0,
            )
        } else {
            let spawn = spawns[rand::random_range(0..spawns.len())];
            (f64::from(spawn.x) + 0.5, f64::from(spawn.y) + 0.5)
        };

        let account_id = rand::random_range(1..i32::MAX);
        let mut avatar = Some(Arc::new(Entity::player(BOT_OBJECT_TYPE, account_id, x, y)));
        let transport = self.transport.clone();
        let home = Arc::downgrade(world);
        let runtime = runtime.clone();
        let tick = Duration::from_millis(self.config.tick_ms);
        let cancel_token = self.cancel_token.child_token();

        world.schedule_timer(0, false, move |world, _| {
            let Some(avatar) = avatar.take() else {
                return Ok(false);
            };
            let input = avatar
                .player()
                .map(PlayerData::input_sender)
                .context("bot avatar has no session")?;
            let id = world.enter_world(avatar.clone())?;
            let queue = transport.connect(id);

            let bot = Bot {
                avatar,
                input,
                queue,
                world: home.clone(),
                transport: transport.clone(),
            };
            runtime.spawn(bot.run(tick, cancel_token.clone()));
            Ok(false)
        });
    }

    /// Stops the server and waits for the world threads to finish.
    pub fn stop(&self) {
        self.cancel_token.cancel();
        self.manager.shutdown();
        log::info!("Stopped Realm Server");
    }
}
