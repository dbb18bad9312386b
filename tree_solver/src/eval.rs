use log::debug;

use crate::{
    error::SolverResult,
    infoset::{
        InfoSetId,
        InfoSetTree,
    },
    tree::{
        GameTree,
        Node,
        NodeId,
    },
};

pub trait Strategy {
    /// Probability of choosing `slot` at `infoset`. Invalid slots are 0.
    fn probability(&self, infoset: InfoSetId, slot: usize) -> f64;
}

/// Plain table indexed by `InfoSetId`, then by action slot.
impl Strategy for Vec<Vec<f64>> {
    fn probability(&self, infoset: InfoSetId, slot: usize) -> f64 {
        self[infoset.index()].get(slot).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exploitability {
    /// What each player gains by switching to a best response.
    pub gains: Vec<f64>,
    /// Expected utility of each player under the evaluated strategy.
    pub values: Vec<f64>,
}

impl Exploitability {
    pub fn total(&self) -> f64 {
        self.gains.iter().sum()
    }
}

struct Memo {
    visited: Vec<bool>,
    value: Vec<f64>,
}

impl Memo {
    fn new(len: usize) -> Self {
        Memo {
            visited: vec![false; len],
            value: vec![0.0; len],
        }
    }

    fn set(&mut self, node: NodeId, value: f64) {
        self.visited[node.index()] = true;
        self.value[node.index()] = value;
    }
}

/// Best pure deviation of one player against the others' fixed strategies.
struct BestResponse<'a, S: Strategy> {
    tree: &'a GameTree,
    infosets: &'a InfoSetTree,
    strategy: &'a S,
    player: usize,
    memo: Memo,
}

impl<'a, S: Strategy> BestResponse<'a, S> {
    fn new(tree: &'a GameTree, infosets: &'a InfoSetTree, strategy: &'a S, player: usize) -> Self {
        BestResponse {
            tree,
            infosets,
            strategy,
            player,
            memo: Memo::new(tree.len()),
        }
    }

    /// Value of `node` when everybody follows the strategy. Stores
    /// `belief * utility` at every terminal, where `belief` is the
    /// probability contributed by chance and the other players.
    fn re_calc(&mut self, node: NodeId, belief: f64) -> f64 {
        let tree = self.tree;
        match tree.node(node) {
            Node::Terminal {
                utility,
                ..
            } => {
                self.memo.set(node, belief * utility[self.player]);
                utility[self.player]
            }
            Node::Chance {
                probability,
                outcomes,
            } => {
                let mut value = 0.0;
                for e in outcomes {
                    value += probability * self.re_calc(e.target, belief * probability);
                }
                value
            }
            Node::Decision {
                player,
                actions,
                ..
            } => {
                let set = self.infosets.set_of(node);
                let mut value = 0.0;
                for e in actions {
                    let p = self.strategy.probability(set, e.label);
                    let belief = if *player == self.player {
                        belief
                    } else {
                        belief * p
                    };
                    value += p * self.re_calc(e.target, belief);
                }
                value
            }
        }
    }

    fn query(&self, node: NodeId) -> f64 {
        if self.memo.visited[node.index()] {
            return self.memo.value[node.index()];
        }
        self.tree.node(node).children().into_iter().map(|c| self.query(c)).sum()
    }

    /// Fills the memo bottom-up over the player's image tree.
    fn deviate(&mut self, id: InfoSetId) {
        let infosets = self.infosets;
        let set = infosets.get(id);
        for &child in set.children() {
            self.deviate(child);
        }

        if set.owner().is_none() {
            for &member in set.members() {
                let value = self.query(member);
                self.memo.set(member, value);
            }
            return;
        }

        let tree = self.tree;
        let slots = set.valid().len();
        let mut totals = vec![0.0; slots];
        let mut per_member = Vec::with_capacity(set.members().len());
        for &member in set.members() {
            let mut values = vec![0.0; slots];
            if let Node::Decision {
                actions,
                ..
            } = tree.node(member)
            {
                for e in actions {
                    values[e.label] = self.query(e.target);
                    totals[e.label] += values[e.label];
                }
            }
            per_member.push(values);
        }

        let mut best: Option<usize> = None;
        for slot in (0..slots).filter(|s| set.valid()[*s]) {
            if best.map_or(true, |b| totals[slot] > totals[b]) {
                best = Some(slot);
            }
        }
        let Some(best) = best else {
            return;
        };
        for (&member, values) in set.members().iter().zip(per_member) {
            self.memo.set(member, values[best]);
        }
    }
}

/// How much every player could gain by deviating from `strategy`, in the
/// game's original units.
pub fn compute_exploitability<S: Strategy>(
    tree: &GameTree,
    infosets: &InfoSetTree,
    strategy: &S,
) -> SolverResult<Exploitability> {
    let root = tree.root()?;
    let scale = tree.utility_scale();
    let mut gains = Vec::with_capacity(tree.players());
    let mut values = Vec::with_capacity(tree.players());
    for player in 0..tree.players() {
        let mut br = BestResponse::new(tree, infosets, strategy, player);
        let value = br.re_calc(root, 1.0);
        br.deviate(infosets.root(player));
        let best = br.memo.value[root.index()];
        debug!("player {}: value {}, best response {}", player, value / scale, best / scale);
        gains.push((best - value) / scale);
        values.push(value / scale);
    }
    Ok(Exploitability {
        gains,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        games::{
            betting::{
                BettingGame,
                BettingRule,
            },
            normal_form::{
                NormalFormGame,
                PayoffTensor,
            },
            Game,
        },
        tree::Outcome,
    };

    fn uniform(infosets: &InfoSetTree) -> Vec<Vec<f64>> {
        infosets
            .iter()
            .map(|(_, s)| {
                let count = s.valid().iter().filter(|v| **v).count() as f64;
                s.valid().iter().map(|&v| if v { 1.0 / count } else { 0.0 }).collect()
            })
            .collect()
    }

    #[test]
    fn test_single_action_game() {
        let mut tree = GameTree::new(2, 1, true);
        let root = tree.add_chance(0.5).unwrap();
        for (card, utility) in [(0, vec![1.0, -1.0]), (1, vec![-0.5, 0.5])] {
            let first = tree.add_decision(0).unwrap();
            let second = tree.add_decision(1).unwrap();
            let leaf = tree.add_terminal(utility, 0.5).unwrap();
            tree.add_outcome(root, Outcome::Reveal(card), first).unwrap();
            tree.add_action(first, 0, second).unwrap();
            tree.add_action(second, 0, leaf).unwrap();
        }
        tree.set_root(root).unwrap();
        let infosets = InfoSetTree::build(&tree).unwrap();

        let result = compute_exploitability(&tree, &infosets, &uniform(&infosets)).unwrap();
        assert_eq!(vec![0.0, 0.0], result.gains);
        assert_eq!(0.0, result.total());
        assert_eq!(vec![0.25, -0.25], result.values);
    }

    #[test]
    fn test_matching_pennies() {
        let tensor =
            PayoffTensor::new(2, 2, vec![1.0, -1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0]).unwrap();
        let tree = NormalFormGame::new(tensor, 2.0).unwrap().build_tree(None).unwrap();
        let infosets = InfoSetTree::build(&tree).unwrap();

        let result = compute_exploitability(&tree, &infosets, &uniform(&infosets)).unwrap();
        assert_eq!(0.0, result.total());

        // Player 0 always plays heads; player 1 answers with tails.
        let strategy: Vec<Vec<f64>> = infosets
            .iter()
            .map(|(_, s)| match s.owner() {
                Some(0) => vec![1.0, 0.0],
                Some(_) => vec![0.5, 0.5],
                None => vec![],
            })
            .collect();
        let result = compute_exploitability(&tree, &infosets, &strategy).unwrap();
        assert_eq!(vec![0.0, 1.0], result.gains);
        assert_eq!(vec![0.0, 0.0], result.values);
        assert_eq!(1.0, result.total());
    }

    #[test]
    fn test_betting_gains_are_non_negative() {
        let tree = BettingGame::new(BettingRule::default()).unwrap().build_tree(None).unwrap();
        let infosets = InfoSetTree::build(&tree).unwrap();
        let result = compute_exploitability(&tree, &infosets, &uniform(&infosets)).unwrap();
        for gain in &result.gains {
            assert!(*gain >= -1e-9, "{:?}", result);
        }
        assert!(result.total() > 0.1, "{:?}", result);
        assert!(result.values.iter().sum::<f64>().abs() < 1e-9);
    }
}
