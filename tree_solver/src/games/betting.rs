use iota::iota;
use itertools::Itertools;
use log::debug;

use super::Game;
use crate::{
    error::{
        SolverError,
        SolverResult,
    },
    solvers::policy::LearningConfig,
    tree::{
        GameTree,
        NodeId,
        Outcome,
        MAX_DEPTH,
    },
};

iota! {
    const FOLD: usize = iota;
        , RAISE
        , CALL
}

pub const ACTION_SLOTS: usize = 3;
const LAST_ROUND: i32 = 2;

#[derive(Debug, Clone)]
pub struct BettingRule {
    pub players: usize,
    pub suits: usize,
    pub ranks: usize,
    // Chips every player puts into the pot before the deal
    pub ante: i32,
    // A raise in round r increases the bet by r * raise_unit
    pub raise_unit: i32,
    // Raising is allowed while the bet is below r * raise_cap
    pub raise_cap: i32,
}

impl Default for BettingRule {
    fn default() -> BettingRule {
        BettingRule {
            players: 2,
            suits: 2,
            ranks: 3,
            ante: 1,
            raise_unit: 2,
            raise_cap: 4,
        }
    }
}

impl BettingRule {
    pub fn deck_size(&self) -> usize {
        self.suits.saturating_mul(self.ranks)
    }

    pub fn rank(&self, card: usize) -> usize {
        card % self.ranks
    }

    /// Probability of one particular ordered private deal.
    pub fn private_deal_probability(&self) -> f64 {
        count_permutations(self.deck_size(), self.players).map_or(0.0, |n| 1.0 / n as f64)
    }

    /// Probability of one particular public card once the private cards are out.
    pub fn public_card_probability(&self) -> f64 {
        1.0 / (self.deck_size() - self.players) as f64
    }

    pub fn validate(&self) -> SolverResult<()> {
        if self.players < 2 {
            return Err(SolverError::InvalidInput(format!(
                "at least 2 players are required, got {}",
                self.players
            )));
        }
        if self.suits == 0 || self.ranks == 0 {
            return Err(SolverError::InvalidInput(format!(
                "the deck needs at least one suit and one rank, got {} x {}",
                self.suits, self.ranks
            )));
        }
        if self.suits.checked_mul(self.ranks).is_none() {
            return Err(SolverError::InvalidInput(format!(
                "a deck of {} x {} cards is too large",
                self.suits, self.ranks
            )));
        }
        if self.deck_size() <= self.players {
            return Err(SolverError::InvalidInput(format!(
                "a deck of {} cards cannot deal {} private cards and a public card",
                self.deck_size(),
                self.players
            )));
        }
        if count_permutations(self.deck_size(), self.players).is_none() {
            return Err(SolverError::InvalidInput(format!(
                "too many private deals of {} cards to {} players",
                self.deck_size(),
                self.players
            )));
        }
        if self.ante < 0 || self.raise_unit <= 0 || self.raise_cap < 0 {
            return Err(SolverError::InvalidInput(format!(
                "invalid chip amounts: ante {}, raise unit {}, raise cap {}",
                self.ante, self.raise_unit, self.raise_cap
            )));
        }
        Ok(())
    }
}

/// Ordered selections of `r` out of `n`, `None` on overflow.
pub fn count_permutations(n: usize, r: usize) -> Option<usize> {
    if r > n {
        return Some(0);
    }
    (n - r + 1..=n).try_fold(1usize, |acc, k| acc.checked_mul(k))
}

/// Splits the pot among the non-folded players holding the strongest hand.
/// Returns the net result of every player.
pub fn showdown(strength: &[usize], folded: &[bool], invested: &[i32]) -> Vec<f64> {
    let pot: i32 = invested.iter().sum();
    let mut utility: Vec<f64> = invested.iter().map(|&chips| -(chips as f64)).collect();
    let best = (0..strength.len()).filter(|&p| !folded[p]).map(|p| strength[p]).max();
    let winners: Vec<usize> =
        (0..strength.len()).filter(|&p| !folded[p] && Some(strength[p]) == best).collect();
    debug_assert!(!winners.is_empty(), "everybody folded");

    let share = pot as f64 / winners.len() as f64;
    for p in winners {
        utility[p] += share;
    }
    utility
}

/// Betting state threaded through the tree construction. Every transition
/// returns a fresh copy so sibling subtrees never see each other's changes.
#[derive(Debug, Clone)]
struct Table {
    round: i32,
    bet: i32,
    // Players who have matched the current bet in this round
    matched: usize,
    active: usize,
    to_act: usize,

    // Bets of the current round
    committed: Vec<i32>,
    // Everything put into the pot, ante included
    invested: Vec<i32>,
    folded: Vec<bool>,
    cards: Vec<usize>,
    strength: Vec<usize>,

    chance: f64,
    depth: usize,
}

impl Table {
    fn deal(rule: &BettingRule, cards: Vec<usize>, chance: f64) -> Self {
        Table {
            round: 1,
            bet: 0,
            matched: 0,
            active: rule.players,
            to_act: 0,
            committed: vec![0; rule.players],
            invested: vec![rule.ante; rule.players],
            folded: vec![false; rule.players],
            strength: cards.iter().map(|&c| rule.rank(c)).collect(),
            cards,
            chance,
            depth: 1,
        }
    }

    fn can_fold(&self) -> bool {
        self.committed[self.to_act] < self.bet
    }

    fn can_raise(&self, rule: &BettingRule) -> bool {
        self.bet < self.round * rule.raise_cap
    }

    fn skip(mut self) -> Self {
        self.to_act = (self.to_act + 1) % self.folded.len();
        self
    }

    fn acted(mut self) -> Self {
        self.depth += 1;
        self.skip()
    }

    fn pay_to_bet(&mut self) {
        let p = self.to_act;
        let diff = self.bet - self.committed[p];
        self.committed[p] += diff;
        self.invested[p] += diff;
    }

    fn fold(&self) -> Self {
        let mut next = self.clone();
        next.folded[self.to_act] = true;
        next.active -= 1;
        next.acted()
    }

    fn raise(&self, rule: &BettingRule) -> Self {
        let mut next = self.clone();
        next.bet += self.round * rule.raise_unit;
        next.pay_to_bet();
        next.matched = 1;
        next.acted()
    }

    fn call(&self) -> Self {
        let mut next = self.clone();
        next.pay_to_bet();
        next.matched += 1;
        next.acted()
    }

    fn reveal(&self, rule: &BettingRule, card: usize) -> Self {
        let mut next = self.clone();
        next.round += 1;
        next.bet = 0;
        next.matched = 0;
        next.committed = vec![0; rule.players];
        next.to_act = self.folded.iter().position(|f| !f).unwrap_or(0);
        for (strength, &own) in next.strength.iter_mut().zip(self.cards.iter()) {
            if rule.rank(own) == rule.rank(card) {
                // any pair beats any single card
                *strength += rule.ranks;
            }
        }
        next.chance *= rule.public_card_probability();
        next.depth += 1;
        next
    }

    fn payoffs(&self) -> Vec<f64> {
        showdown(&self.strength, &self.folded, &self.invested)
    }
}

/// Two-round poker-like game: ante, a betting round, a public card, a second
/// betting round and a showdown.
pub struct BettingGame {
    rule: BettingRule,
}

impl BettingGame {
    pub fn new(rule: BettingRule) -> SolverResult<Self> {
        rule.validate()?;
        Ok(BettingGame {
            rule,
        })
    }

    pub fn rule(&self) -> &BettingRule {
        &self.rule
    }

    fn grow(&self, tree: &mut GameTree, table: Table) -> SolverResult<NodeId> {
        if table.depth > MAX_DEPTH {
            return Err(SolverError::DepthExceeded {
                depth: table.depth,
                max: MAX_DEPTH,
            });
        }

        if table.matched == table.active {
            if table.active == 1 || table.round == LAST_ROUND {
                return tree.add_terminal(table.payoffs(), table.chance);
            }
            return self.deal_public_card(tree, &table);
        }

        if table.folded[table.to_act] {
            return self.grow(tree, table.skip());
        }

        let node = tree.add_decision(table.to_act)?;
        if table.can_fold() {
            let child = self.grow(tree, table.fold())?;
            tree.add_action(node, FOLD, child)?;
        }
        if table.can_raise(&self.rule) {
            let child = self.grow(tree, table.raise(&self.rule))?;
            tree.add_action(node, RAISE, child)?;
        }
        let child = self.grow(tree, table.call())?;
        tree.add_action(node, CALL, child)?;
        Ok(node)
    }

    fn deal_public_card(&self, tree: &mut GameTree, table: &Table) -> SolverResult<NodeId> {
        let node = tree.add_chance(self.rule.public_card_probability())?;
        for card in 0..self.rule.deck_size() {
            if table.cards.contains(&card) {
                continue;
            }
            let child = self.grow(tree, table.reveal(&self.rule, card))?;
            tree.add_outcome(node, Outcome::Reveal(card), child)?;
        }
        Ok(node)
    }
}

impl Game for BettingGame {
    fn name(&self) -> &'static str {
        "betting"
    }

    fn build_tree(&self, node_limit: Option<usize>) -> SolverResult<GameTree> {
        let mut tree =
            GameTree::new(self.rule.players, ACTION_SLOTS, true).with_node_limit(node_limit);
        let probability = self.rule.private_deal_probability();
        let root = tree.add_chance(probability)?;
        for cards in (0..self.rule.deck_size()).permutations(self.rule.players) {
            let table = Table::deal(&self.rule, cards.clone(), probability);
            let child = self.grow(&mut tree, table)?;
            tree.add_outcome(root, Outcome::Deal(cards), child)?;
        }
        tree.set_root(root)?;
        debug!(
            "betting tree: {} nodes, {} terminals, depth {}",
            tree.len(),
            tree.terminals().count(),
            tree.depth()
        );
        Ok(tree)
    }

    fn learning_config(&self) -> LearningConfig {
        LearningConfig {
            eta: 1e-4,
            epsilon: 0.025,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn build(rule: BettingRule) -> GameTree {
        BettingGame::new(rule).unwrap().build_tree(None).unwrap()
    }

    #[derive(Debug)]
    enum Step {
        Act(usize),
        Card(usize),
    }
    use Step::*;

    fn follow(tree: &GameTree, deal: Vec<usize>, path: &[Step]) -> NodeId {
        let root = tree.root().unwrap();
        let mut node = tree.outcome_child(root, &Outcome::Deal(deal)).unwrap();
        for step in path {
            node = match step {
                Act(slot) => tree.action_child(node, *slot),
                Card(card) => tree.outcome_child(node, &Outcome::Reveal(*card)),
            }
            .unwrap_or_else(|| panic!("no edge {:?} below {}", step, node));
        }
        node
    }

    fn leaf(tree: &GameTree, node: NodeId) -> (Vec<f64>, f64) {
        match tree.node(node) {
            Node::Terminal {
                utility,
                chance_weight,
            } => (utility.clone(), *chance_weight),
            n => panic!("expected a terminal, got {:?}", n),
        }
    }

    // [round-1 fold, round-2 fold, showdown]
    fn count_terminals(
        tree: &GameTree,
        node: NodeId,
        revealed: bool,
        last: Option<usize>,
        counts: &mut [usize; 3],
    ) {
        match tree.node(node) {
            Node::Terminal {
                ..
            } => {
                if !revealed {
                    assert_eq!(Some(FOLD), last);
                    counts[0] += 1;
                } else if last == Some(FOLD) {
                    counts[1] += 1;
                } else {
                    counts[2] += 1;
                }
            }
            Node::Chance {
                outcomes,
                ..
            } => {
                for e in outcomes {
                    let revealed = revealed || matches!(e.label, Outcome::Reveal(_));
                    count_terminals(tree, e.target, revealed, None, counts);
                }
            }
            Node::Decision {
                actions,
                ..
            } => {
                for e in actions {
                    count_terminals(tree, e.target, revealed, Some(e.label), counts);
                }
            }
        }
    }

    #[test]
    fn test_terminal_counts() {
        let tree = build(BettingRule::default());
        let mut counts = [0; 3];
        count_terminals(&tree, tree.root().unwrap(), false, None, &mut counts);

        // 30 deals; per deal 4 folding lines in round 1, 5 lines reaching the
        // public card, 4 cards left, then 4 folding and 5 showdown lines.
        assert_eq!(30 * 4, counts[0]);
        assert_eq!(30 * 5 * 4 * 4, counts[1]);
        assert_eq!(30 * 5 * 4 * 5, counts[2]);
        assert_eq!(counts.iter().sum::<usize>(), tree.terminals().count());
    }

    #[test]
    fn test_showdown_split() {
        assert_eq!(vec![0.5, 0.5, -1.0], showdown(&[2, 2, 1], &[false, false, false], &[1, 1, 1]));
        assert_eq!(vec![5.0, -5.0], showdown(&[0, 5], &[false, true], &[3, 5]));
        assert_eq!(vec![0.0, 0.0], showdown(&[4, 4], &[false, false], &[7, 7]));
    }

    #[test]
    fn test_pot_is_conserved() {
        let tree = build(BettingRule::default());
        for (id, node) in tree.terminals() {
            let (utility, _) = leaf(&tree, id);
            let total: f64 = utility.iter().sum();
            assert!(total.abs() < 1e-9, "{}: {:?} sums to {}", id, node, total);
        }
    }

    #[test]
    fn test_three_player_pot_is_conserved() {
        let tree = build(BettingRule {
            players: 3,
            suits: 2,
            ranks: 2,
            ..BettingRule::default()
        });
        for (id, _) in tree.terminals() {
            let (utility, _) = leaf(&tree, id);
            assert!(utility.iter().sum::<f64>().abs() < 1e-9);
        }
    }

    #[test]
    fn test_deterministic_rebuild() {
        let a = build(BettingRule::default());
        let b = build(BettingRule::default());
        assert_eq!(a.len(), b.len());
        for ((ia, na), (ib, nb)) in a.nodes().zip(b.nodes()) {
            assert_eq!(ia, ib);
            assert_eq!(na, nb);
        }
    }

    #[test]
    fn test_showdown_payoffs() {
        let tree = build(BettingRule::default());

        // K vs J, raise and call, no pair on the board, check check.
        let node = follow(&tree, vec![2, 0], &[Act(RAISE), Act(CALL), Card(1), Act(CALL), Act(CALL)]);
        let (utility, chance_weight) = leaf(&tree, node);
        assert_eq!(vec![3.0, -3.0], utility);
        assert!((chance_weight - 1.0 / 30.0 / 4.0).abs() < 1e-12);

        // J pairs with the board and beats the Q.
        let node = follow(&tree, vec![0, 1], &[Act(CALL), Act(CALL), Card(3), Act(CALL), Act(CALL)]);
        assert_eq!(vec![1.0, -1.0], leaf(&tree, node).0);

        // Same rank, different suits: the pot is split.
        let node = follow(
            &tree,
            vec![0, 3],
            &[Act(CALL), Act(RAISE), Act(CALL), Card(2), Act(RAISE), Act(CALL)],
        );
        assert_eq!(vec![0.0, 0.0], leaf(&tree, node).0);

        // A fold loses what was invested so far.
        let node = follow(&tree, vec![0, 1], &[Act(RAISE), Act(RAISE), Act(FOLD)]);
        let (utility, chance_weight) = leaf(&tree, node);
        assert_eq!(vec![-3.0, 3.0], utility);
        assert!((chance_weight - 1.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_legal_actions() {
        let tree = build(BettingRule::default());
        let first = follow(&tree, vec![0, 1], &[]);
        assert_eq!(None, tree.action_child(first, FOLD));

        // Two raises reach the cap in the first round.
        let capped = follow(&tree, vec![0, 1], &[Act(RAISE), Act(RAISE)]);
        assert_eq!(None, tree.action_child(capped, RAISE));
        assert!(tree.action_child(capped, FOLD).is_some());
        assert!(tree.action_child(capped, CALL).is_some());
    }

    #[test]
    fn test_node_limit() {
        let game = BettingGame::new(BettingRule::default()).unwrap();
        match game.build_tree(Some(100)) {
            Err(SolverError::CapacityExceeded {
                limit,
            }) => assert_eq!(100, limit),
            r => panic!("unexpected result: {:?}", r.map(|t| t.len())),
        }
    }

    #[test]
    fn test_invalid_rule() {
        let one_player = BettingRule {
            players: 1,
            ..BettingRule::default()
        };
        assert!(matches!(BettingGame::new(one_player), Err(SolverError::InvalidInput(_))));

        let tiny_deck = BettingRule {
            suits: 1,
            ranks: 2,
            ..BettingRule::default()
        };
        assert!(matches!(BettingGame::new(tiny_deck), Err(SolverError::InvalidInput(_))));

        let huge_deck = BettingRule {
            suits: usize::MAX / 2,
            ranks: 4,
            ..BettingRule::default()
        };
        assert!(matches!(BettingGame::new(huge_deck), Err(SolverError::InvalidInput(_))));

        let too_many_deals = BettingRule {
            players: 30,
            suits: 20,
            ranks: 20,
            ..BettingRule::default()
        };
        match BettingGame::new(too_many_deals) {
            Err(SolverError::InvalidInput(msg)) => assert!(msg.contains("private deals"), "{}", msg),
            r => panic!("unexpected result: {:?}", r.map(|g| g.rule().players)),
        }
    }

    #[test]
    fn test_probabilities() {
        let rule = BettingRule::default();
        assert_eq!(Some(30), count_permutations(6, 2));
        assert_eq!(Some(0), count_permutations(2, 3));
        assert_eq!(None, count_permutations(400, 30));
        assert!((rule.private_deal_probability() - 1.0 / 30.0).abs() < 1e-15);
        assert!((rule.public_card_probability() - 0.25).abs() < 1e-15);
    }
}
