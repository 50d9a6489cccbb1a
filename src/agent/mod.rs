use nalgebra::DMatrix;
use prettytable::{Cell, Row, Table};
use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::blackjack::{Action, Card};

pub const NUM_ACTIONS: usize = 2;

// Discretized states: usable ace (2) x player total 12..=21 (10) x dealer
// upcard (10).
pub const NUM_STATES: usize = 200;

const PROBABILITY_TOLERANCE: f64 = 1e-9;

// Tabular player. The policy is a NUM_ACTIONS x NUM_STATES matrix whose
// columns are action distributions; row order follows Action::index (hit,
// then stick). The table is only changed from outside, between episodes,
// through set_action_probs.
pub struct Agent {
    rng: StdRng,
    policy: DMatrix<f64>,
}

impl Agent {
    // Panics unless the table is NUM_ACTIONS x NUM_STATES with every column
    // a probability distribution.
    pub fn new(policy: DMatrix<f64>, seed: Option<u64>) -> Agent {
        assert_eq!(policy.nrows(), NUM_ACTIONS, "one policy row per action");
        assert_eq!(policy.ncols(), NUM_STATES, "one policy column per state");
        for state in 0..NUM_STATES {
            validate_action_probs(state, policy.column(state).iter().copied());
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Agent { rng, policy }
    }

    pub fn policy(&self) -> &DMatrix<f64> {
        &self.policy
    }

    // Samples hit or stick from the state's action distribution. Panics if
    // the index is out of range. Given the same seed, policy and call
    // sequence, the sampled actions are identical run to run.
    pub fn take_action(&mut self, state_idx: usize) -> Action {
        assert!(state_idx < NUM_STATES, "state index {} out of range", state_idx);
        let column = self.policy.column(state_idx);
        let distribution = WeightedIndex::new(column.iter()).unwrap();
        Action::from_index(distribution.sample(&mut self.rng))
    }

    // Replaces one state's action distribution; this is the external policy
    // improvement hook used between episodes.
    pub fn set_action_probs(&mut self, state_idx: usize, probs: [f64; NUM_ACTIONS]) {
        assert!(state_idx < NUM_STATES, "state index {} out of range", state_idx);
        validate_action_probs(state_idx, probs.iter().copied());
        for (action, prob) in probs.iter().enumerate() {
            self.policy[(action, state_idx)] = *prob;
        }
    }
}

fn validate_action_probs<I: Iterator<Item = f64>>(state: usize, probs: I) {
    let mut sum = 0.0;
    for prob in probs {
        assert!(
            prob >= 0.0,
            "negative action probability {} in state {}",
            prob,
            state
        );
        sum += prob;
    }
    assert!(
        (sum - 1.0).abs() < PROBABILITY_TOLERANCE,
        "action probabilities in state {} sum to {}",
        state,
        sum
    );
}

// Column index for a (usable ace, player total, dealer upcard) triple. The
// mapping is a bijection onto 0..NUM_STATES: the ace flag selects a block of
// 100, the player total a row of 10, and the dealer upcard the offset (ace
// first, then ranks 2..=10).
//
// Only player totals in [12, 21] are representable; the environment never
// offers a decision below 12, and anything above 21 is already a bust.
pub fn state_index(usable_ace: bool, player_value: u32, dealer_up: Card) -> usize {
    debug_assert!(player_value >= 12 && player_value <= 21);
    let usable_idx = if usable_ace { 1 } else { 0 };
    let player_idx = player_value as usize - 12;
    let dealer_idx = match dealer_up {
        Card::Ace => 0,
        Card::Numeric(v) => v as usize - 1,
    };
    usable_idx * 100 + player_idx * 10 + dealer_idx
}

// The ten distinct dealer upcards, in state-index order.
pub fn dealer_cards() -> Vec<Card> {
    std::iter::once(Card::Ace)
        .chain((2..=10).map(Card::Numeric))
        .collect()
}

// Uniform start policy; epsilon-soft for any exploration fraction.
pub fn uniform_policy() -> DMatrix<f64> {
    DMatrix::from_element(NUM_ACTIONS, NUM_STATES, 1.0 / NUM_ACTIONS as f64)
}

// A baseline that only sticks on 20 or higher.
pub fn stick_at_20_policy() -> DMatrix<f64> {
    let mut policy = DMatrix::zeros(NUM_ACTIONS, NUM_STATES);
    for usable_ace in &[false, true] {
        for player_value in 12..=21 {
            for dealer_up in dealer_cards() {
                let action = if player_value < 20 {
                    Action::Hit
                } else {
                    Action::Stick
                };
                policy[(action.index(), state_index(*usable_ace, player_value, dealer_up))] = 1.0;
            }
        }
    }
    policy
}

pub fn print_policy(policy: &DMatrix<f64>) {
    let all_cards = dealer_cards();

    let mut table = Table::new();

    // Print header.
    let mut header = Vec::new();
    header.push(Cell::new(""));
    header.push(Cell::new("Ace?"));
    for dealer_card in all_cards.iter() {
        header.push(match dealer_card {
            Card::Ace => Cell::new("A"),
            Card::Numeric(v) => Cell::new(&format!("{}", v)),
        });
    }
    table.add_row(Row::new(header));

    for usable_ace in &[false, true] {
        for player_value in 12..=21 {
            let mut cells = Vec::new();
            cells.push(Cell::new(&format!("{}", player_value)));
            cells.push(Cell::new(match usable_ace {
                true => "Y",
                false => "N",
            }));
            for dealer_card in all_cards.iter() {
                let state = state_index(*usable_ace, player_value, *dealer_card);
                let hit_prob = policy[(Action::Hit.index(), state)];
                let stick_prob = policy[(Action::Stick.index(), state)];
                cells.push(Cell::new(if hit_prob >= stick_prob { "H" } else { "S" }));
            }
            table.add_row(Row::new(cells));
        }
    }
    table.printstd();
}
