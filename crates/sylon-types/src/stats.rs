//! Per-user accuracy stats and leaderboard rows

use serde::{Deserialize, Serialize};

/// Running accuracy record for one user.
///
/// Created lazily the first time one of the user's predictions is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub username: String,
    pub total_predictions: u32,
    pub wins: u32,
    pub losses: u32,
    /// Consecutive correct predictions, reset to 0 by any miss
    pub current_streak: u32,
    /// All-time maximum of `current_streak`
    pub max_streak: u32,
}

impl UserStats {
    /// Zeroed baseline for a user with no settled predictions
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            total_predictions: 0,
            wins: 0,
            losses: 0,
            current_streak: 0,
            max_streak: 0,
        }
    }

    /// Fold one settled prediction into the record
    pub fn record(&mut self, correct: bool) {
        self.total_predictions += 1;
        if correct {
            self.wins += 1;
            self.current_streak += 1;
            self.max_streak = self.max_streak.max(self.current_streak);
        } else {
            self.losses += 1;
            self.current_streak = 0;
        }
    }

    /// Fold one settled prediction when arenas may resolve out of order.
    ///
    /// `history` is the user's settled results in arena deadline order,
    /// including this one. Totals follow `record`. A miss always drops
    /// `current_streak` to 0; a hit takes the trailing run of the ordered
    /// history, so a hit settled after a later-deadline miss does not
    /// extend a streak.
    ///
    /// `max_streak` never decreases. A run that only existed before a
    /// late-settled miss was folded in (hits on d1 and d3 settled before
    /// the miss on d2) stays counted.
    pub fn settle(&mut self, correct: bool, history: &[bool]) {
        let previous_max = self.max_streak;
        self.record(correct);

        let (current, longest) = streaks(history);
        if correct {
            self.current_streak = current;
        }
        self.max_streak = previous_max.max(longest).max(self.current_streak);
    }

    /// Win percentage rounded to two decimals; 0 with no predictions
    pub fn accuracy(&self) -> f64 {
        accuracy_percent(self.wins, self.total_predictions)
    }
}

/// Trailing run of `true` and the longest run in `history`
pub fn streaks(history: &[bool]) -> (u32, u32) {
    let mut current = 0u32;
    let mut longest = 0u32;
    for correct in history {
        current = if *correct { current + 1 } else { 0 };
        longest = longest.max(current);
    }
    (current, longest)
}

/// `round(100 * wins / total, 2)`
pub fn accuracy_percent(wins: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = f64::from(wins) * 100.0 / f64::from(total);
    (raw * 100.0).round() / 100.0
}

/// One ranked row of the leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub rank: u32,
    pub username: String,
    pub total_predictions: u32,
    pub wins: u32,
    pub losses: u32,
    pub accuracy: f64,
    pub current_streak: u32,
    pub max_streak: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn win_loss_streak_sequence() {
        let mut stats = UserStats::new("alice");
        stats.record(true);
        stats.record(true);
        stats.record(false);
        stats.record(true);

        assert_eq!(stats.total_predictions, 4);
        assert_eq!(stats.wins, 3);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.max_streak, 2);
        assert_eq!(stats.accuracy(), 75.0);
    }

    #[test]
    fn settle_is_order_independent() {
        // Arena A (correct) has the earlier deadline, arena B (miss) the later
        let mut a_first = UserStats::new("alice");
        a_first.settle(true, &[true]);
        a_first.settle(false, &[true, false]);

        let mut b_first = UserStats::new("alice");
        b_first.settle(false, &[false]);
        b_first.settle(true, &[true, false]);

        assert_eq!(a_first, b_first);
        assert_eq!(a_first.total_predictions, 2);
        assert_eq!(a_first.current_streak, 0);
        assert_eq!(a_first.max_streak, 1);
    }

    #[test]
    fn settle_miss_resets_streak_even_when_earlier_by_deadline() {
        // Later-deadline hit settles first, then the earlier-deadline miss
        let mut stats = UserStats::new("alice");
        stats.settle(true, &[true]);
        stats.settle(false, &[false, true]);

        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.max_streak, 1);
        assert_eq!((stats.wins, stats.losses), (1, 1));
    }

    #[test]
    fn settle_keeps_max_streak_from_before_a_late_miss() {
        // Deadlines d1 hit, d2 miss, d3 hit; settled d1, d3, d2
        let mut stats = UserStats::new("erin");
        stats.settle(true, &[true]);
        stats.settle(true, &[true, true]);
        stats.settle(false, &[true, false, true]);

        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.max_streak, 2);
        assert_eq!(stats.total_predictions, 3);
    }

    #[test]
    fn streaks_of_history() {
        assert_eq!(streaks(&[]), (0, 0));
        assert_eq!(streaks(&[true, true, false, true]), (1, 2));
        assert_eq!(streaks(&[false, true, true, true]), (3, 3));
    }

    #[test]
    fn accuracy_rounds_to_two_places() {
        assert_eq!(accuracy_percent(1, 3), 33.33);
        assert_eq!(accuracy_percent(2, 3), 66.67);
        assert_eq!(accuracy_percent(0, 0), 0.0);
    }

    proptest! {
        #[test]
        fn stats_invariants_hold(results in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut stats = UserStats::new("prop");
            for correct in &results {
                stats.record(*correct);
                prop_assert!(stats.current_streak <= stats.max_streak);
                if !*correct {
                    prop_assert_eq!(stats.current_streak, 0);
                }
            }
            prop_assert_eq!(stats.wins + stats.losses, stats.total_predictions);
            prop_assert_eq!(stats.total_predictions as usize, results.len());
            prop_assert_eq!(stats.wins as usize, results.iter().filter(|c| **c).count());
        }

        #[test]
        fn settle_out_of_order_keeps_invariants(
            results in proptest::collection::vec(any::<bool>(), 1..32),
            seed in any::<u64>(),
        ) {
            // Settle positions in a scrambled order; history is what has
            // been settled so far, kept in position order
            let n = results.len();
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by_key(|i| (*i as u64).wrapping_mul(6364136223846793005).wrapping_add(seed) % 1_000_003);

            let mut settled = vec![false; n];
            let mut stats = UserStats::new("prop");
            for i in order {
                settled[i] = true;
                let history: Vec<bool> = (0..n).filter(|j| settled[*j]).map(|j| results[j]).collect();
                stats.settle(results[i], &history);
                prop_assert!(stats.current_streak <= stats.max_streak);
                if !results[i] {
                    prop_assert_eq!(stats.current_streak, 0);
                }
            }
            prop_assert_eq!(stats.wins + stats.losses, stats.total_predictions);
            prop_assert_eq!(stats.total_predictions as usize, n);
        }

        #[test]
        fn settle_in_order_matches_record(results in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut recorded = UserStats::new("prop");
            let mut settled = UserStats::new("prop");
            for (i, correct) in results.iter().enumerate() {
                recorded.record(*correct);
                settled.settle(*correct, &results[..=i]);
                prop_assert_eq!(&recorded, &settled);
            }
        }
    }
}
