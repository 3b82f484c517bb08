//! Tickets: shared handles for values that settle at most once.
//!
//! A ticket is a watch on a slot owned by the store. Every requester of a
//! pending key receives a clone of the same watch, so all of them observe the
//! one terminal state the slot reaches. A ticket taken after settlement sees
//! the final state immediately.

use std::fmt;

use tokio::sync::watch;

use flowmesh_core::{Error, Result};

use super::DataKey;
use crate::promise::Promise;

/// Observable state of a ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketState<V> {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Resolved(V),
    /// Settled with a failure.
    Failed(Error),
}

impl<V> TicketState<V> {
    /// Whether the state is terminal.
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl<V: Clone> TicketState<V> {
    fn terminal(&self) -> Option<Result<V>> {
        match self {
            Self::Pending => None,
            Self::Resolved(value) => Some(Ok(value.clone())),
            Self::Failed(e) => Some(Err(e.clone())),
        }
    }
}

/// Handle for a value keyed by `DataKey`.
#[derive(Clone)]
pub struct Ticket<V> {
    key: DataKey,
    state: watch::Receiver<TicketState<V>>,
}

impl<V> fmt::Debug for Ticket<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket").field("key", &self.key).finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync + 'static> Ticket<V> {
    /// A ticket that is already settled with `outcome`.
    pub fn settled(key: DataKey, outcome: Result<V>) -> Self {
        let state = match outcome {
            Ok(value) => TicketState::Resolved(value),
            Err(e) => TicketState::Failed(e),
        };
        let (_tx, rx) = watch::channel(state);
        Self { key, state: rx }
    }

    /// The key this ticket was issued for.
    pub const fn key(&self) -> DataKey {
        self.key
    }

    /// Snapshot of the current state.
    pub fn peek(&self) -> TicketState<V> {
        self.state.borrow().clone()
    }

    /// Whether the ticket has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.state.borrow().is_settled()
    }

    /// Wait for the terminal state.
    ///
    /// # Errors
    ///
    /// Returns the failure the ticket settled with, or `Error::Abandoned` if
    /// the owning store dropped the slot without settling it.
    pub async fn wait(mut self) -> Result<V> {
        loop {
            let settled = self.state.borrow_and_update().terminal();
            if let Some(outcome) = settled {
                return outcome;
            }
            if self.state.changed().await.is_err() {
                let last = self.state.borrow().terminal();
                return last.unwrap_or(Err(Error::Abandoned));
            }
        }
    }

    /// The ticket as a promise of its value.
    pub fn into_promise(self) -> Promise<V> {
        Promise::from_future(self.wait())
    }
}

/// The store-owned side of a pending ticket.
pub(crate) struct TicketSlot<V> {
    key: DataKey,
    sender: watch::Sender<TicketState<V>>,
    waiters: usize,
}

impl<V: Clone + Send + Sync + 'static> TicketSlot<V> {
    /// Open a pending slot.
    pub(crate) fn open(key: DataKey) -> Self {
        let (sender, _rx) = watch::channel(TicketState::Pending);
        Self {
            key,
            sender,
            waiters: 0,
        }
    }

    /// Issue another ticket sharing this slot.
    pub(crate) fn ticket(&mut self) -> Ticket<V> {
        self.waiters = self.waiters.saturating_add(1);
        Ticket {
            key: self.key,
            state: self.sender.subscribe(),
        }
    }

    /// Number of tickets issued for this slot.
    pub(crate) const fn waiters(&self) -> usize {
        self.waiters
    }

    /// Move the slot to its terminal state.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadySettled` on a second settlement.
    pub(crate) fn settle(&self, outcome: Result<V>) -> Result<()> {
        if self.sender.borrow().is_settled() {
            return Err(Error::AlreadySettled);
        }
        let state = match outcome {
            Ok(value) => TicketState::Resolved(value),
            Err(e) => TicketState::Failed(e),
        };
        self.sender.send_replace(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[tokio::test]
    async fn should_deliver_same_value_to_waiters_registered_before_settlement() {
        let key = DataKey::new();
        let mut slot = TicketSlot::open(key);
        let first = slot.ticket();
        let second = slot.ticket();

        let waiting = tokio::spawn(async move { (first.wait().await, second.wait().await) });
        slot.settle(Ok(7u32)).unwrap();

        let (a, b) = waiting.await.unwrap();
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(slot.waiters(), 2);
    }

    #[tokio::test]
    async fn should_see_settlement_immediately_when_registered_after() {
        let key = DataKey::new();
        let mut slot: TicketSlot<u32> = TicketSlot::open(key);
        slot.settle(Err(Error::failed_execution("load failed"))).unwrap();

        let late = slot.ticket();
        assert!(late.is_settled());
        assert_eq!(late.wait().await, Err(Error::failed_execution("load failed")));
    }

    #[tokio::test]
    async fn should_refuse_second_settlement() {
        let slot = TicketSlot::open(DataKey::new());
        slot.settle(Ok(1u32)).unwrap();
        assert_eq!(slot.settle(Ok(2)), Err(Error::AlreadySettled));
    }

    #[tokio::test]
    async fn should_report_abandoned_when_slot_dropped() {
        let mut slot = TicketSlot::<u32>::open(DataKey::new());
        let ticket = slot.ticket();
        drop(slot);
        assert_eq!(ticket.wait().await, Err(Error::Abandoned));
    }

    #[tokio::test]
    async fn should_build_settled_tickets() {
        let ticket = Ticket::settled(DataKey::new(), Ok("ready".to_string()));
        assert_eq!(ticket.peek(), TicketState::Resolved("ready".to_string()));
        assert_eq!(ticket.into_promise().await, Ok("ready".to_string()));
    }
}
