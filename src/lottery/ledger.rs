//! Entry ledger: current-round participants and the pot

use crate::common::types::{Address, Amount};
use std::sync::Arc;

/// Default cap on entries per round
pub const DEFAULT_MAX_PLAYERS: usize = 10_000;

/// Participants in entry order plus the pot they funded.
///
/// The player list is shared copy-on-write with published snapshots, so a
/// snapshot holding the list only costs a clone when the next entry lands.
#[derive(Debug, Clone)]
pub struct EntryLedger {
    players: Arc<Vec<Address>>,
    pot: Amount,
    max_players: usize,
}

impl EntryLedger {
    pub fn new(max_players: usize) -> Self {
        Self {
            players: Arc::new(Vec::new()),
            pot: 0,
            max_players,
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn pot(&self) -> Amount {
        self.pot
    }

    pub fn player(&self, index: usize) -> Option<Address> {
        self.players.get(index).copied()
    }

    pub fn players(&self) -> &[Address] {
        &self.players
    }

    pub fn shared_players(&self) -> Arc<Vec<Address>> {
        Arc::clone(&self.players)
    }

    /// Append an entry. Capacity is checked by the caller.
    pub(crate) fn record(&mut self, player: Address, payment: Amount) {
        Arc::make_mut(&mut self.players).push(player);
        self.pot = self.pot.saturating_add(payment);
    }

    /// Empty the ledger once the pot has been paid out.
    ///
    /// Published snapshots keep the old list; the ledger starts a fresh one
    /// instead of mutating the shared allocation.
    pub(crate) fn clear_round(&mut self) {
        self.players = Arc::new(Vec::new());
        self.pot = 0;
    }
}

impl Default for EntryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PLAYERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_order_and_duplicates() {
        let mut ledger = EntryLedger::default();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        ledger.record(alice, 10);
        ledger.record(bob, 10);
        ledger.record(alice, 15);

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.player(0), Some(alice));
        assert_eq!(ledger.player(1), Some(bob));
        assert_eq!(ledger.player(2), Some(alice));
        assert_eq!(ledger.player(3), None);
        assert_eq!(ledger.pot(), 35);
    }

    #[test]
    fn test_clear_round_resets_players_and_pot() {
        let mut ledger = EntryLedger::default();
        ledger.record(Address::from_label("alice"), 10);
        let snapshot = ledger.shared_players();

        ledger.clear_round();
        assert!(ledger.is_empty());
        assert_eq!(ledger.player(0), None);
        assert_eq!(ledger.pot(), 0);
        // An outstanding snapshot keeps its own view
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut ledger = EntryLedger::new(2);
        ledger.record(Address::from_label("a"), 1);
        assert!(!ledger.is_full());
        ledger.record(Address::from_label("b"), 1);
        assert!(ledger.is_full());
    }
}
