//! Room registry: allocates codes, routes lookups, reclaims the idle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use berean_engine::{QuestionBank, RoomConfig};
use berean_protocol::{RoomCode, RoomId, CODE_ALPHABET, CODE_LEN};
use rand::Rng;

use crate::room::spawn_room;
use crate::{RoomError, RoomHandle};

/// Counter for generating unique room IDs.
static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Maps live room codes to their actor handles.
///
/// The map is the only state shared across rooms, guarded by its own
/// lock and held only for map operations — room work happens behind the
/// handles, fully in parallel. Codes are unique among *live* rooms; a
/// reclaimed room's code goes back into circulation.
pub struct RoomRegistry<B: QuestionBank> {
    rooms: Mutex<HashMap<RoomCode, RoomHandle>>,
    bank: Arc<B>,
}

impl<B: QuestionBank> RoomRegistry<B> {
    pub fn new(bank: Arc<B>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            bank,
        }
    }

    /// Creates a room and returns its code and id.
    ///
    /// Code generation retries on collision against the live map. At
    /// ~2.2 × 10⁹ combinations a collision is vanishingly rare, but the
    /// retry is a correctness requirement, not tuning — two rooms must
    /// never share a code, however unlikely the draw.
    pub fn create(&self, config: RoomConfig) -> (RoomCode, RoomId) {
        let room_id = RoomId(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed));

        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        let code = loop {
            let candidate = generate_code();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
            tracing::warn!(code = %candidate, "room code collision — retrying");
        };

        let handle = spawn_room(
            room_id,
            code.clone(),
            config,
            Arc::clone(&self.bank),
            DEFAULT_CHANNEL_SIZE,
        );
        rooms.insert(code.clone(), handle);

        tracing::info!(%room_id, %code, "room created");
        (code, room_id)
    }

    /// Looks up a live room by code.
    ///
    /// Unknown and reclaimed codes produce the same error; terminal
    /// rooms that haven't been swept yet reject joins with the same
    /// error from inside the actor. All three cases look identical from
    /// outside.
    pub fn lookup(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .lock()
            .expect("registry lock poisoned")
            .get(code)
            .cloned()
            .ok_or(RoomError::RoomNotFound)
    }

    /// Shuts a room down and removes it from the map.
    pub async fn release(&self, code: &RoomCode) -> Result<(), RoomError> {
        let handle = {
            let mut rooms = self.rooms.lock().expect("registry lock poisoned");
            rooms.remove(code).ok_or(RoomError::RoomNotFound)?
        };
        let _ = handle.shutdown().await;
        tracing::info!(%code, "room released");
        Ok(())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().expect("registry lock poisoned").len()
    }

    /// Runs one reclamation sweep: every room is *asked* to reclaim
    /// itself, and the idleness re-check happens inside the room's own
    /// command loop — so a join in flight during the sweep either lands
    /// before the check (room no longer idle) or after a reclaim
    /// (`RoomNotFound`), never half of each. Returns how many rooms
    /// were removed.
    pub async fn sweep(&self) -> usize {
        let handles: Vec<(RoomCode, RoomHandle)> = {
            let rooms = self.rooms.lock().expect("registry lock poisoned");
            rooms
                .iter()
                .map(|(code, handle)| (code.clone(), handle.clone()))
                .collect()
        };

        let mut removed = 0;
        for (code, handle) in handles {
            let gone = match handle.reclaim_if_idle().await {
                Ok(reclaimed) => reclaimed,
                // Actor already stopped (archived, aborted) — sweep the
                // dangling handle.
                Err(_) => true,
            };
            if gone {
                self.rooms
                    .lock()
                    .expect("registry lock poisoned")
                    .remove(&code);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "reclamation sweep finished");
        }
        removed
    }

    /// Spawns the background sweeper task.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );
            loop {
                ticker.tick().await;
                registry.sweep().await;
            }
        })
    }
}

/// Draws a 6-character code from the registry alphabet using the
/// process CSPRNG.
fn generate_code() -> RoomCode {
    let mut rng = rand::rng();
    let mut bytes = [0u8; CODE_LEN];
    for b in &mut bytes {
        *b = CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())];
    }
    RoomCode::from_generated(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_shape() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.as_str().len(), CODE_LEN);
            assert!(code
                .as_str()
                .bytes()
                .all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_generate_code_is_not_constant() {
        // Statistically, 20 draws from a 2-billion space never repeat.
        let codes: std::collections::HashSet<String> = (0..20)
            .map(|_| generate_code().as_str().to_string())
            .collect();
        assert!(codes.len() > 1, "generator must not be constant");
    }
}
