use rand::prelude::*;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Card {
    Ace,
    Numeric(u32),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Action {
    Hit,
    Stick,
}

// Draw source for every deal: one ace, ranks 2-9, and four tens standing in
// for 10/J/Q/K. Cards are drawn uniformly with replacement; there is no shoe.
const CARDS: [Card; 13] = [
    Card::Ace,
    Card::Numeric(2),
    Card::Numeric(3),
    Card::Numeric(4),
    Card::Numeric(5),
    Card::Numeric(6),
    Card::Numeric(7),
    Card::Numeric(8),
    Card::Numeric(9),
    Card::Numeric(10),
    Card::Numeric(10),
    Card::Numeric(10),
    Card::Numeric(10),
];

impl Card {
    pub fn is_ace(&self) -> bool {
        match self {
            Card::Ace => true,
            _ => false,
        }
    }

    // Rank with the ace at its high value; `Hand` demotes aces as needed.
    fn rank_value(&self) -> u32 {
        match self {
            Card::Ace => 11,
            Card::Numeric(v) => *v,
        }
    }
}

impl Action {
    // Row index into the policy and action-value tables.
    pub fn index(&self) -> usize {
        match self {
            Action::Hit => 0,
            Action::Stick => 1,
        }
    }

    pub fn from_index(index: usize) -> Action {
        match index {
            0 => Action::Hit,
            1 => Action::Stick,
            _ => panic!("no action with index {}", index),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    pub fn from_cards(cards: &[Card]) -> Hand {
        Hand {
            cards: cards.to_vec(),
        }
    }

    fn add_card(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn value(&self) -> u32 {
        self.value_and_usable_ace().0
    }

    // Sums ranks with every ace at 11, then demotes aces to 1 one at a time
    // while the total is over 21. The hand is soft (usable ace) when an ace
    // survives undemoted.
    pub fn value_and_usable_ace(&self) -> (u32, bool) {
        let mut sum: u32 = self.cards.iter().map(Card::rank_value).sum();
        let mut aces = self.cards.iter().filter(|c| c.is_ace()).count();
        while sum > 21 && aces > 0 {
            sum -= 10;
            aces -= 1;
        }
        (sum, aces > 0)
    }
}

// Result of the initial deal. A natural 21 settles against the dealer's two
// cards on the spot; otherwise play continues with the dealer's hole card
// withheld.
#[derive(Clone, Debug, PartialEq)]
pub enum DealResult {
    Terminal(f64),
    Continuing { player: Hand, dealer_up: Card },
}

#[derive(Clone, Debug, PartialEq)]
pub enum HitResult {
    Terminal(f64),
    Continuing(Hand),
}

// Single-hand Blackjack table. One episode is deal_cards(), any number of
// hit() calls while the result stays Continuing, then stick(). Calling the
// operations out of that order is a caller error and is not guarded against.
pub struct Environment {
    rng: StdRng,
    dealer_hand: Hand,
    player_hand: Hand,
}

impl Environment {
    pub fn new(seed: Option<u64>) -> Environment {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Environment {
            rng,
            dealer_hand: Hand::default(),
            player_hand: Hand::default(),
        }
    }

    fn draw(&mut self) -> Card {
        *CARDS.choose(&mut self.rng).unwrap()
    }

    // Deals two cards each, then keeps dealing to the player below 12 -- no
    // decision exists there, hitting is the only sensible move. A player 21
    // at this point is a natural: push against a dealer 21, win otherwise.
    // Non-terminal deals leave the player total in [12, 20].
    pub fn deal_cards(&mut self) -> DealResult {
        self.dealer_hand = Hand::default();
        self.player_hand = Hand::default();
        for _ in 0..2 {
            let card = self.draw();
            self.dealer_hand.add_card(card);
        }
        for _ in 0..2 {
            let card = self.draw();
            self.player_hand.add_card(card);
        }

        while self.player_hand.value() < 12 {
            let card = self.draw();
            self.player_hand.add_card(card);
        }

        if self.player_hand.value() == 21 {
            if self.dealer_hand.value() == 21 {
                return DealResult::Terminal(0.0);
            }
            return DealResult::Terminal(1.0);
        }

        DealResult::Continuing {
            player: self.player_hand.clone(),
            dealer_up: self.dealer_hand.cards()[0],
        }
    }

    // Deals one card to the player. Going over 21 loses immediately.
    pub fn hit(&mut self) -> HitResult {
        let card = self.draw();
        self.player_hand.add_card(card);
        if self.player_hand.value() > 21 {
            return HitResult::Terminal(-1.0);
        }
        HitResult::Continuing(self.player_hand.clone())
    }

    // Dealer draws to 17 or more, then the hands are compared. Always ends
    // the episode.
    pub fn stick(&mut self) -> f64 {
        while self.dealer_hand.value() < 17 {
            let card = self.draw();
            self.dealer_hand.add_card(card);
        }

        let player_value = self.player_hand.value();
        let dealer_value = self.dealer_hand.value();
        if dealer_value > 21 || dealer_value < player_value {
            1.0
        } else if dealer_value == player_value {
            0.0
        } else {
            -1.0
        }
    }

    pub fn player_hand(&self) -> &Hand {
        &self.player_hand
    }

    pub fn dealer_hand(&self) -> &Hand {
        &self.dealer_hand
    }
}
