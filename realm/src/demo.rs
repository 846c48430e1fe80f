//! Stand-in game logic so a bare server has something to simulate: wandering
//! enemies, the entity factory that spawns them, and simulated clients.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use crossbeam::channel::{Receiver, Sender};
use realm_core::{
    Behavior, Entity, EntityFactory, TickTime, World,
    entity::{EntityFlags, PlayerInput, StatKind, StatValue},
    world::map::EntitySpawn,
};
use realm_utils::{TilePos, math::Vector2};
use tokio::{select, time::interval};
use tokio_util::sync::CancellationToken;

use crate::transport::{ChannelTransport, Outbound};

/// Object type of the avatar given to simulated clients.
pub const BOT_OBJECT_TYPE: u16 = 0x0300;
/// Object types at or above this are spawned as static objects.
const STATIC_OBJECT_TYPES: u16 = 0x0700;

/// Walks an enemy around at random, one short step per tick, and slowly
/// regenerates its health.
pub struct Wander {
    /// Longest step per tick, in tiles.
    pub step: f64,
    /// Health regenerated per tick.
    pub regen: i32,
    /// Health cap.
    pub max_health: i32,
}

impl Default for Wander {
    fn default() -> Self {
        Self {
            step: 0.4,
            regen: 1,
            max_health: 100,
        }
    }
}

impl Behavior for Wander {
    fn tick(&self, world: &World, entity: &Arc<Entity>, _time: &TickTime) -> anyhow::Result<()> {
        let pos = entity.position();
        let x = pos.x + rand::random_range(-self.step..=self.step);
        let y = pos.y + rand::random_range(-self.step..=self.step);
        let tile = TilePos::containing(Vector2::new(x, y));
        if x >= 0.0 && y >= 0.0 && world.is_passable(tile.x, tile.y, false) {
            world.move_entity(entity, x, y);
        }

        if let Some(StatValue::Int(health)) = entity.stat(StatKind::Health)
            && health < self.max_health
        {
            entity.set_stat(world, StatKind::Health, (health + self.regen).min(self.max_health), false);
        }
        Ok(())
    }
}

/// Builds the initial entities of the bundled maps.
pub struct DemoFactory;

impl EntityFactory for DemoFactory {
    fn create(&self, spawn: &EntitySpawn) -> anyhow::Result<Option<Entity>> {
        let entity = if spawn.object_type >= STATIC_OBJECT_TYPES {
            Entity::static_object(spawn.object_type, spawn.x, spawn.y)
        } else {
            let mut enemy = Entity::enemy(spawn.object_type, spawn.x, spawn.y)
                .with_behavior(Arc::new(Wander::default()))
                .with_stat(StatKind::MaxHealth, 100)
                .with_stat(StatKind::Health, 60);
            if spawn.object_type & 1 == 1 {
                enemy = enemy.with_flags(EntityFlags::SPECIAL_ENEMY);
            }
            enemy
        };
        Ok(Some(entity))
    }
}

/// A simulated client: sends a random walk as input and drains its queue.
pub struct Bot {
    /// The bot's avatar.
    pub avatar: Arc<Entity>,
    /// Input handle of the avatar.
    pub input: Sender<PlayerInput>,
    /// The avatar's outbound queue.
    pub queue: Receiver<Outbound>,
    /// The world the avatar was admitted to.
    pub world: Weak<World>,
    /// Owner of the outbound queue.
    pub transport: Arc<ChannelTransport>,
}

impl Bot {
    /// Runs until `cancel_token` fires or the avatar leaves its world, then
    /// takes the avatar out of the world and closes its queue.
    pub async fn run(self, tick: Duration, cancel_token: CancellationToken) {
        let mut ticker = interval(tick);
        let (mut deltas, mut bytes) = (0usize, 0usize);

        loop {
            select! {
                () = cancel_token.cancelled() => break,
                _ = ticker.tick() => {
                    if self.avatar.is_removed() {
                        break;
                    }
                    for message in self.queue.try_iter() {
                        if let Outbound::Delta(delta) = message {
                            deltas += 1;
                            bytes += serde_json::to_vec(&delta).map_or(0, |json| json.len());
                        }
                    }

                    let pos = self.avatar.position();
                    let target = PlayerInput::Move {
                        x: pos.x + rand::random_range(-0.5..=0.5),
                        y: pos.y + rand::random_range(-0.5..=0.5),
                    };
                    if self.input.send(target).is_err() {
                        break;
                    }
                }
            }
        }
        log::debug!(
            "Bot {} stopped after {deltas} deltas ({bytes} bytes)",
            self.avatar.id()
        );
        self.leave();
    }

    /// Queues the avatar's removal on the world's own thread and disconnects.
    fn leave(&self) {
        if !self.avatar.is_removed()
            && let Some(world) = self.world.upgrade()
        {
            let avatar = self.avatar.clone();
            world.schedule_timer(0, false, move |world, _| {
                world.leave_world(&avatar);
                Ok(false)
            });
        }
        self.transport.disconnect(self.avatar.id());
    }
}

#[cfg(test)]
mod tests {
    use realm_core::{WorldSettings, world::MapLayout};

    use super::*;

    #[tokio::test]
    async fn test_stopped_bot_leaves_its_world() {
        let transport = Arc::new(ChannelTransport::new(64));
        let world = Arc::new(
            World::new(
                WorldSettings::default(),
                &MapLayout::filled(32, 32, 0),
                transport.clone(),
            )
            .expect("world"),
        );
        let avatar = Arc::new(Entity::player(BOT_OBJECT_TYPE, 7, 5.5, 5.5));
        let input = avatar.player().expect("player data").input_sender();
        let id = world.enter_world(avatar.clone()).expect("enter");
        let queue = transport.connect(id);
        assert_eq!(transport.connection_count(), 1);

        let cancel_token = CancellationToken::new();
        cancel_token.cancel();
        let bot = Bot {
            avatar: avatar.clone(),
            input,
            queue,
            world: Arc::downgrade(&world),
            transport: transport.clone(),
        };
        bot.run(Duration::from_millis(10), cancel_token).await;

        assert_eq!(transport.connection_count(), 0);
        assert!(!avatar.is_removed());

        world
            .update(&TickTime::default().next(200))
            .expect("step");
        assert!(avatar.is_removed());
        assert_eq!(world.player_count(), 0);
    }
}
