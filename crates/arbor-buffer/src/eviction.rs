//! Victim selection for the buffer pool.
//!
//! The pool reports pin transitions; the policy decides which unpinned
//! frame gives up its page when every frame is occupied.

use crate::frame::FrameId;
use parking_lot::Mutex;

/// Chooses which unpinned frame to evict when the pool is out of space.
pub trait EvictionPolicy: Send + Sync {
    /// A frame was pinned (or re-pinned) and must not be chosen.
    fn frame_pinned(&self, frame_id: FrameId);

    /// A frame's pin count dropped to zero; it is now a candidate.
    fn frame_unpinned(&self, frame_id: FrameId);

    /// Picks a victim and withdraws it from the candidate set, or None
    /// if nothing is evictable.
    fn pick_victim(&self) -> Option<FrameId>;

    /// Drops a frame from consideration entirely (its page was deleted).
    fn forget(&self, frame_id: FrameId);

    /// Number of frames currently eligible for eviction.
    fn candidate_count(&self) -> usize;
}

/// Per-frame standing with the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Standing {
    /// Pinned, free, or already claimed; never a victim.
    Held,
    /// Unpinned recently; spared once before becoming a victim.
    Warm,
    /// Unpinned and already passed over; next sweep takes it.
    Cool,
}

/// Second-chance eviction.
///
/// Every frame that reaches pin count zero starts out warm. The sweep
/// hand demotes warm frames to cool and evicts the first cool frame it
/// meets, so a frame survives exactly one pass after its last use.
pub struct SecondChancePolicy {
    inner: Mutex<PolicyState>,
}

struct PolicyState {
    /// Standing of every frame, indexed by frame id.
    standings: Vec<Standing>,
    /// Where the next sweep resumes.
    hand: usize,
    /// Count of Warm + Cool entries, kept in step with `standings`.
    candidates: usize,
}

impl SecondChancePolicy {
    /// Creates a policy covering `num_frames` frames, none evictable.
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(PolicyState {
                standings: vec![Standing::Held; num_frames],
                hand: 0,
                candidates: 0,
            }),
        }
    }
}

impl PolicyState {
    fn set(&mut self, frame_id: FrameId, standing: Standing) {
        let Some(slot) = self.standings.get_mut(frame_id.0 as usize) else {
            return;
        };
        let was_candidate = *slot != Standing::Held;
        let is_candidate = standing != Standing::Held;
        *slot = standing;
        match (was_candidate, is_candidate) {
            (false, true) => self.candidates += 1,
            (true, false) => self.candidates -= 1,
            _ => {}
        }
    }
}

impl EvictionPolicy for SecondChancePolicy {
    fn frame_pinned(&self, frame_id: FrameId) {
        self.inner.lock().set(frame_id, Standing::Held);
    }

    fn frame_unpinned(&self, frame_id: FrameId) {
        self.inner.lock().set(frame_id, Standing::Warm);
    }

    fn pick_victim(&self) -> Option<FrameId> {
        let mut state = self.inner.lock();
        if state.candidates == 0 {
            return None;
        }

        // Two sweeps suffice: the first demotes every warm frame it
        // passes, so the second cannot miss a cool one.
        let len = state.standings.len();
        for _ in 0..2 * len {
            let at = state.hand;
            state.hand = (at + 1) % len;
            let standing = state.standings[at];
            match standing {
                Standing::Cool => {
                    let victim = FrameId(at as u32);
                    state.set(victim, Standing::Held);
                    return Some(victim);
                }
                Standing::Warm => state.standings[at] = Standing::Cool,
                Standing::Held => {}
            }
        }
        None
    }

    fn forget(&self, frame_id: FrameId) {
        self.inner.lock().set(frame_id, Standing::Held);
    }

    fn candidate_count(&self) -> usize {
        self.inner.lock().candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_evictable_at_start() {
        let policy = SecondChancePolicy::new(4);
        assert_eq!(policy.candidate_count(), 0);
        assert!(policy.pick_victim().is_none());
    }

    #[test]
    fn test_unpinned_frame_becomes_victim() {
        let policy = SecondChancePolicy::new(4);

        policy.frame_unpinned(FrameId(2));
        assert_eq!(policy.candidate_count(), 1);

        assert_eq!(policy.pick_victim(), Some(FrameId(2)));
        assert_eq!(policy.candidate_count(), 0);
        assert!(policy.pick_victim().is_none());
    }

    #[test]
    fn test_repin_withdraws_candidate() {
        let policy = SecondChancePolicy::new(4);

        policy.frame_unpinned(FrameId(0));
        policy.frame_unpinned(FrameId(1));
        policy.frame_pinned(FrameId(0));

        assert_eq!(policy.candidate_count(), 1);
        assert_eq!(policy.pick_victim(), Some(FrameId(1)));
    }

    #[test]
    fn test_sweep_demotes_then_takes_in_hand_order() {
        let policy = SecondChancePolicy::new(3);

        policy.frame_unpinned(FrameId(0));
        policy.frame_unpinned(FrameId(1));

        // Both warm frames get one pass of grace; the hand then takes
        // them in sweep order
        assert_eq!(policy.pick_victim(), Some(FrameId(0)));
        policy.frame_unpinned(FrameId(2));
        assert_eq!(policy.pick_victim(), Some(FrameId(1)));
        assert_eq!(policy.pick_victim(), Some(FrameId(2)));
    }

    #[test]
    fn test_eviction_order_cycles_with_hand() {
        let policy = SecondChancePolicy::new(3);

        for i in 0..3 {
            policy.frame_unpinned(FrameId(i));
        }

        let mut victims = Vec::new();
        while let Some(victim) = policy.pick_victim() {
            victims.push(victim);
        }

        victims.sort_by_key(|f| f.0);
        assert_eq!(victims, vec![FrameId(0), FrameId(1), FrameId(2)]);
        assert_eq!(policy.candidate_count(), 0);
    }

    #[test]
    fn test_forget_removes_frame() {
        let policy = SecondChancePolicy::new(4);

        policy.frame_unpinned(FrameId(0));
        policy.frame_unpinned(FrameId(1));
        policy.forget(FrameId(0));

        assert_eq!(policy.candidate_count(), 1);
        assert_eq!(policy.pick_victim(), Some(FrameId(1)));
    }

    #[test]
    fn test_out_of_range_ids_are_ignored() {
        let policy = SecondChancePolicy::new(2);

        policy.frame_unpinned(FrameId(50));
        policy.frame_pinned(FrameId(50));
        policy.forget(FrameId(50));

        assert_eq!(policy.candidate_count(), 0);
        assert!(policy.pick_victim().is_none());
    }

    #[test]
    fn test_double_unpin_counts_once() {
        let policy = SecondChancePolicy::new(2);

        policy.frame_unpinned(FrameId(0));
        policy.frame_unpinned(FrameId(0));

        assert_eq!(policy.candidate_count(), 1);
        assert_eq!(policy.pick_victim(), Some(FrameId(0)));
        assert_eq!(policy.candidate_count(), 0);
    }
}
