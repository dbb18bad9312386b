use crate::{
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

use super::policy::{
    LearningConfig,
    Policy,
};

/// One learning iteration over the whole tree.
pub struct Optimizer<'a> {
    tree: &'a GameTree,
    infosets: &'a InfoSetTree,
    policy: &'a mut Policy,
}

impl<'a> Optimizer<'a> {
    pub fn new(tree: &'a GameTree, infosets: &'a InfoSetTree, policy: &'a mut Policy) -> Self {
        Optimizer {
            tree,
            infosets,
            policy,
        }
    }

    /// Accumulates the advantage of every action for every player, then
    /// moves every policy toward it. Returns the expected utility of each
    /// player under the policy the iteration started from.
    pub fn step(&mut self, root: NodeId, config: &LearningConfig) -> Vec<f64> {
        self.policy.reset();
        let values = (0..self.tree.players()).map(|p| self.calc(p, root, 1.0, 1.0)).collect();
        for player in 0..self.tree.players() {
            self.update(self.infosets.root(player), config);
        }
        values
    }

    /// Expected utility of `player` at `node`. `reach` is the probability
    /// of the player's own choices on the path, `belief` that of chance and
    /// the other players.
    pub fn calc(&mut self, player: usize, node: NodeId, reach: f64, belief: f64) -> f64 {
        let tree = self.tree;
        match tree.node(node) {
            Node::Terminal {
                utility,
                ..
            } => utility[player],
            Node::Chance {
                probability,
                outcomes,
            } => {
                let mut value = 0.0;
                for e in outcomes {
                    value += probability * self.calc(player, e.target, reach, belief * probability);
                }
                value
            }
            Node::Decision {
                player: actor,
                actions,
                ..
            } if *actor != player => {
                let set = self.infosets.set_of(node);
                let mut value = 0.0;
                for e in actions {
                    let p = self.policy.node(set).policy(e.label);
                    value += p * self.calc(player, e.target, reach, belief * p);
                }
                value
            }
            Node::Decision {
                valid,
                actions,
                ..
            } => {
                let set = self.infosets.set_of(node);
                let mut q = vec![0.0; valid.len()];
                for e in actions {
                    let p = self.policy.node(set).policy(e.label);
                    q[e.label] = self.calc(player, e.target, reach * p, belief);
                }
                let state = self.policy.node_mut(set);
                let baseline: f64 = actions.iter().map(|e| state.policy(e.label) * q[e.label]).sum();
                state.accumulate(reach * belief, &q, baseline);
                baseline
            }
        }
    }

    fn update(&mut self, id: InfoSetId, config: &LearningConfig) {
        let infosets = self.infosets;
        self.policy.node_mut(id).update(config);
        for &child in infosets.get(id).children() {
            self.update(child, config);
        }
    }
}
