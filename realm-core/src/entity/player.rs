//! Session state carried by player entities.

use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};

use crossbeam::channel::{self, Receiver, Sender};
use realm_utils::locks::SyncMutex;

use super::{Entity, EntityId};
use crate::{ticks::TickTime, visibility::ViewerState, world::World};

/// Input received from the player's client, queued until the player's next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerInput {
    /// The client reports a new position.
    Move {
        /// Target x.
        x: f64,
        /// Target y.
        y: f64,
    },
}

/// Work queued for the player's next tick, run after movement resolution.
pub type PendingAction = Box<dyn FnOnce(&World, &Arc<Entity>, &TickTime) + Send>;

/// Per-player session state.
pub struct PlayerData {
    /// The account this player belongs to.
    pub account_id: i32,
    input_tx: Sender<PlayerInput>,
    input_rx: Receiver<PlayerInput>,
    pending_actions: SyncMutex<Vec<PendingAction>>,
    trade_partner: AtomicI32,
    pet: AtomicI32,
    quest: AtomicI32,
    /// What this player's client currently knows about the world.
    pub viewer: SyncMutex<ViewerState>,
}

impl PlayerData {
    /// Creates the session state for `account_id`.
    #[must_use]
    pub fn new(account_id: i32) -> Self {
        let (input_tx, input_rx) = channel::unbounded();
        Self {
            account_id,
            input_tx,
            input_rx,
            pending_actions: SyncMutex::new(Vec::new()),
            trade_partner: AtomicI32::new(0),
            pet: AtomicI32::new(0),
            quest: AtomicI32::new(0),
            viewer: SyncMutex::new(ViewerState::new()),
        }
    }

    /// A handle network threads use to queue input for this player.
    #[must_use]
    pub fn input_sender(&self) -> Sender<PlayerInput> {
        self.input_tx.clone()
    }

    pub(crate) fn drain_input(&self) -> Vec<PlayerInput> {
        self.input_rx.try_iter().collect()
    }

    /// Queues work for the player's next tick.
    pub fn queue_action(&self, action: PendingAction) {
        self.pending_actions.lock().push(action);
    }

    pub(crate) fn take_pending_actions(&self) -> Vec<PendingAction> {
        std::mem::take(&mut *self.pending_actions.lock())
    }

    /// The player currently trading with this one.
    #[must_use]
    pub fn trade_partner(&self) -> Option<EntityId> {
        EntityId::from_raw(self.trade_partner.load(Ordering::Acquire))
    }

    /// Links or unlinks a trade partner.
    pub fn set_trade_partner(&self, partner: Option<EntityId>) {
        self.trade_partner
            .store(partner.unwrap_or_default().0, Ordering::Release);
    }

    /// The pet following this player.
    #[must_use]
    pub fn pet(&self) -> Option<EntityId> {
        EntityId::from_raw(self.pet.load(Ordering::Acquire))
    }

    pub(crate) fn set_pet(&self, pet: Option<EntityId>) {
        self.pet.store(pet.unwrap_or_default().0, Ordering::Release);
    }

    /// Clears the pet link only if it still points at `pet`.
    pub(crate) fn clear_pet(&self, pet: EntityId) {
        let _ = self
            .pet
            .compare_exchange(pet.0, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    /// The quest target shown to this player.
    #[must_use]
    pub fn quest(&self) -> Option<EntityId> {
        EntityId::from_raw(self.quest.load(Ordering::Acquire))
    }

    /// Sets the quest target shown to this player.
    pub fn set_quest(&self, quest: Option<EntityId>) {
        self.quest.store(quest.unwrap_or_default().0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_queue_drains_in_order() {
        let data = PlayerData::new(1);
        let tx = data.input_sender();
        tx.send(PlayerInput::Move { x: 1.0, y: 1.0 }).expect("send");
        tx.send(PlayerInput::Move { x: 2.0, y: 2.0 }).expect("send");

        assert_eq!(
            data.drain_input(),
            vec![
                PlayerInput::Move { x: 1.0, y: 1.0 },
                PlayerInput::Move { x: 2.0, y: 2.0 },
            ]
        );
        assert!(data.drain_input().is_empty());
    }

    #[test]
    fn test_links() {
        let data = PlayerData::new(1);
        assert_eq!(data.pet(), None);

        data.set_pet(Some(EntityId(5)));
        data.clear_pet(EntityId(6));
        assert_eq!(data.pet(), Some(EntityId(5)));
        data.clear_pet(EntityId(5));
        assert_eq!(data.pet(), None);

        data.set_trade_partner(Some(EntityId(9)));
        assert_eq!(data.trade_partner(), Some(EntityId(9)));
        data.set_trade_partner(None);
        assert_eq!(data.trade_partner(), None);
    }
}
