//! The participant roster: who is in a room, in what role, and who hosts.
//!
//! The roster is join-ordered — that order is load-bearing. It decides
//! host promotion (earliest-joined connected player) and serves as the
//! final leaderboard tie-break, so it is stored explicitly as a sequence
//! number per participant rather than recovered from a map's iteration
//! order.

use berean_protocol::{ParticipantId, Role, RosterEntry};

/// One participant attached to a room.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: Role,
    pub connected: bool,
    /// Pre-start readiness flag; meaningless once a session runs.
    pub ready: bool,
    /// Monotone join sequence within the room.
    pub join_seq: u64,
}

impl Participant {
    pub fn is_player(&self) -> bool {
        matches!(self.role, Role::Player)
    }
}

/// Tracks a room's participants, join order, and the host pointer.
///
/// The host is an explicit, reassignable pointer — never "whoever joined
/// first" by convention. It always references a connected player; when
/// that stops being true the roster repairs it by promotion.
#[derive(Debug, Default)]
pub struct ParticipantRoster {
    /// Participants in join order.
    participants: Vec<Participant>,
    host: Option<ParticipantId>,
    next_seq: u64,
}

impl ParticipantRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant and returns it.
    ///
    /// Capacity and phase rules are the state machine's job; the roster
    /// only records. The first player to join becomes host.
    pub fn join(&mut self, name: &str, role: Role) -> &Participant {
        self.next_seq += 1;
        let id = ParticipantId(self.next_seq);
        self.participants.push(Participant {
            id,
            name: name.to_string(),
            role,
            connected: true,
            ready: false,
            join_seq: self.next_seq,
        });

        if self.host.is_none() && matches!(role, Role::Player) {
            self.host = Some(id);
        }

        tracing::debug!(%id, name, ?role, "participant joined roster");
        self.participants.last().expect("just pushed")
    }

    /// Removes a participant entirely. Repairs the host pointer if it
    /// pointed at the removed participant; returns the removed entry.
    pub fn remove(&mut self, id: ParticipantId) -> Option<Participant> {
        let idx = self.participants.iter().position(|p| p.id == id)?;
        let removed = self.participants.remove(idx);
        if self.host == Some(id) {
            self.host = self.pick_host();
        }
        Some(removed)
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    /// The current host, if any player is attached and connected.
    pub fn host(&self) -> Option<ParticipantId> {
        self.host
    }

    pub fn is_host(&self, id: ParticipantId) -> bool {
        self.host == Some(id)
    }

    /// Sets the readiness flag. Returns the new value, or `None` for an
    /// unknown participant.
    pub fn set_ready(&mut self, id: ParticipantId, ready: bool) -> Option<bool> {
        let p = self.get_mut(id)?;
        p.ready = ready;
        Some(p.ready)
    }

    /// Clears every readiness flag (done when a session starts, so a
    /// later "play again" requires readying up afresh).
    pub fn clear_ready(&mut self) {
        for p in &mut self.participants {
            p.ready = false;
        }
    }

    /// Marks a participant disconnected. If the host dropped, promotes
    /// the earliest-joined connected player. Returns the new host when a
    /// promotion happened.
    pub fn mark_disconnected(
        &mut self,
        id: ParticipantId,
    ) -> Option<ParticipantId> {
        let Some(p) = self.get_mut(id) else {
            return None;
        };
        p.connected = false;

        if self.host == Some(id) {
            self.host = self.pick_host();
            if let Some(new_host) = self.host {
                tracing::info!(old = %id, new = %new_host, "host promoted");
                return Some(new_host);
            }
        }
        None
    }

    /// Marks a participant connected again. If the room was hostless,
    /// promotes; returns the new host when a promotion happened.
    pub fn mark_connected(&mut self, id: ParticipantId) -> Option<ParticipantId> {
        let Some(p) = self.get_mut(id) else {
            return None;
        };
        p.connected = true;

        if self.host.is_none() {
            self.host = self.pick_host();
            return self.host;
        }
        None
    }

    /// Earliest-joined connected player, the promotion rule.
    fn pick_host(&self) -> Option<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| p.is_player() && p.connected)
            .min_by_key(|p| p.join_seq)
            .map(|p| p.id)
    }

    /// All participants in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// All players (connected or not) in join order.
    pub fn players(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_player())
    }

    /// Connected players in join order.
    pub fn connected_players(&self) -> impl Iterator<Item = &Participant> {
        self.players().filter(|p| p.connected)
    }

    pub fn player_count(&self) -> usize {
        self.players().count()
    }

    pub fn spectator_count(&self) -> usize {
        self.participants.iter().filter(|p| !p.is_player()).count()
    }

    pub fn connected_player_count(&self) -> usize {
        self.connected_players().count()
    }

    /// Whether every connected player has readied up. Vacuously false
    /// with zero connected players — an empty room is never "all ready".
    pub fn all_players_ready(&self) -> bool {
        let mut any = false;
        for p in self.connected_players() {
            any = true;
            if !p.ready {
                return false;
            }
        }
        any
    }

    /// Join sequence for the leaderboard tie-break. Participants that
    /// left mid-session rank after everyone still known.
    pub fn join_order(&self, id: ParticipantId) -> u64 {
        self.get(id).map(|p| p.join_seq).unwrap_or(u64::MAX)
    }

    /// Roster rows for lobby events.
    pub fn entries(&self) -> Vec<RosterEntry> {
        self.participants
            .iter()
            .map(|p| RosterEntry {
                participant_id: p.id,
                name: p.name.clone(),
                role: p.role,
                ready: p.ready,
                connected: p.connected,
                is_host: self.host == Some(p.id),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_first_player_becomes_host() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("Aquila", Role::Player).id;
        assert_eq!(roster.host(), Some(p1));
        assert!(roster.is_host(p1));
    }

    #[test]
    fn test_join_spectator_first_does_not_host() {
        let mut roster = ParticipantRoster::new();
        roster.join("Watcher", Role::Spectator);
        assert_eq!(roster.host(), None);

        // First actual player takes the host slot.
        let p = roster.join("Aquila", Role::Player).id;
        assert_eq!(roster.host(), Some(p));
    }

    #[test]
    fn test_join_assigns_increasing_ids_and_seq() {
        let mut roster = ParticipantRoster::new();
        let a = roster.join("a", Role::Player).id;
        let b = roster.join("b", Role::Player).id;
        assert!(roster.join_order(a) < roster.join_order(b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_mark_disconnected_host_promotes_next_joined() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("a", Role::Player).id;
        let p2 = roster.join("b", Role::Player).id;
        let p3 = roster.join("c", Role::Player).id;

        let new_host = roster.mark_disconnected(p1);
        assert_eq!(new_host, Some(p2));
        assert_eq!(roster.host(), Some(p2));

        // Promotion skips disconnected players.
        roster.mark_disconnected(p2);
        assert_eq!(roster.host(), Some(p3));
    }

    #[test]
    fn test_mark_disconnected_spectators_never_promoted() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("a", Role::Player).id;
        roster.join("watcher", Role::Spectator);

        roster.mark_disconnected(p1);
        assert_eq!(roster.host(), None, "spectators cannot host");
    }

    #[test]
    fn test_mark_disconnected_nonhost_keeps_host() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("a", Role::Player).id;
        let p2 = roster.join("b", Role::Player).id;

        let promoted = roster.mark_disconnected(p2);
        assert_eq!(promoted, None);
        assert_eq!(roster.host(), Some(p1));
    }

    #[test]
    fn test_mark_connected_restores_host_when_hostless() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("a", Role::Player).id;
        roster.mark_disconnected(p1);
        assert_eq!(roster.host(), None);

        let promoted = roster.mark_connected(p1);
        assert_eq!(promoted, Some(p1));
        assert_eq!(roster.host(), Some(p1));
    }

    #[test]
    fn test_remove_host_repairs_pointer() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("a", Role::Player).id;
        let p2 = roster.join("b", Role::Player).id;

        roster.remove(p1);
        assert_eq!(roster.host(), Some(p2));
        assert!(roster.get(p1).is_none());
    }

    #[test]
    fn test_remove_unknown_returns_none() {
        let mut roster = ParticipantRoster::new();
        assert!(roster.remove(ParticipantId(99)).is_none());
    }

    #[test]
    fn test_all_players_ready_requires_everyone_connected_ready() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("a", Role::Player).id;
        let p2 = roster.join("b", Role::Player).id;
        roster.join("watcher", Role::Spectator);

        assert!(!roster.all_players_ready());

        roster.set_ready(p1, true);
        assert!(!roster.all_players_ready());

        // Spectator readiness is irrelevant.
        roster.set_ready(p2, true);
        assert!(roster.all_players_ready());

        // A disconnected unready player no longer blocks.
        roster.set_ready(p2, false);
        roster.mark_disconnected(p2);
        assert!(roster.all_players_ready());
    }

    #[test]
    fn test_all_players_ready_false_when_empty() {
        let roster = ParticipantRoster::new();
        assert!(!roster.all_players_ready());
    }

    #[test]
    fn test_clear_ready_resets_flags() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("a", Role::Player).id;
        roster.set_ready(p1, true);

        roster.clear_ready();
        assert!(!roster.get(p1).unwrap().ready);
    }

    #[test]
    fn test_entries_marks_host_and_order() {
        let mut roster = ParticipantRoster::new();
        let p1 = roster.join("a", Role::Player).id;
        roster.join("b", Role::Player);

        let entries = roster.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].participant_id, p1);
        assert!(entries[0].is_host);
        assert!(!entries[1].is_host);
    }

    #[test]
    fn test_counts_split_players_and_spectators() {
        let mut roster = ParticipantRoster::new();
        roster.join("a", Role::Player);
        roster.join("b", Role::Player);
        roster.join("w", Role::Spectator);

        assert_eq!(roster.player_count(), 2);
        assert_eq!(roster.spectator_count(), 1);
        assert_eq!(roster.len(), 3);
    }
}
