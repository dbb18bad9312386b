use std::fmt::Display;

use more_asserts::{
    assert_gt,
    debug_assert_ge,
};

use crate::{
    eval::Strategy,
    infoset::{
        InfoSetId,
        InfoSetTree,
    },
};

/// Step size and temperature of the softmax update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningConfig {
    pub eta: f64,
    pub epsilon: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        LearningConfig {
            eta: 1e-4,
            epsilon: 0.03,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActionRecord {
    pub score: f64,
    pub policy: f64,
    // Accumulated advantage of this iteration
    pub weight: f64,
}

/// Learning state of one information set.
#[derive(Debug, Clone)]
pub struct Node {
    valid: Vec<bool>,
    records: Vec<ActionRecord>,
    normalizer: f64,
}

impl Node {
    pub fn new(valid: &[bool]) -> Self {
        let count = valid.iter().filter(|v| **v).count();
        let records = valid
            .iter()
            .map(|&v| ActionRecord {
                policy: if v { 1.0 / count as f64 } else { 0.0 },
                ..ActionRecord::default()
            })
            .collect();
        Node {
            valid: valid.to_vec(),
            records,
            normalizer: 0.0,
        }
    }

    #[inline]
    pub fn policy(&self, slot: usize) -> f64 {
        self.records[slot].policy
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn normalizer(&self) -> f64 {
        self.normalizer
    }

    pub fn reset(&mut self) {
        for r in self.records.iter_mut() {
            r.weight = 0.0;
        }
        self.normalizer = 0.0;
    }

    /// Adds `mass * (q[slot] - baseline)` to every valid slot.
    pub fn accumulate(&mut self, mass: f64, q: &[f64], baseline: f64) {
        for (slot, r) in self.records.iter_mut().enumerate() {
            if self.valid[slot] {
                r.weight += mass * (q[slot] - baseline);
            }
        }
        self.normalizer += mass;
    }

    pub fn update(&mut self, config: &LearningConfig) {
        if self.records.is_empty() {
            return;
        }
        let valid = &self.valid;
        if self.normalizer > 0.0 {
            for (slot, r) in self.records.iter_mut().enumerate() {
                if valid[slot] {
                    r.weight /= self.normalizer;
                }
            }
        }

        let mut max = f64::NEG_INFINITY;
        for (slot, r) in self.records.iter_mut().enumerate() {
            if valid[slot] {
                r.score += config.eta * (r.weight - r.score);
                max = max.max(r.score / config.epsilon);
            }
        }

        let mut sum = 0.0;
        for (slot, r) in self.records.iter_mut().enumerate() {
            if valid[slot] {
                r.policy = (r.score / config.epsilon - max).exp();
                sum += r.policy;
            }
        }
        assert_gt!(sum, 0.0);
        for (slot, r) in self.records.iter_mut().enumerate() {
            if valid[slot] {
                r.policy /= sum;
                debug_assert_ge!(r.policy, 0.0);
            }
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (slot, r) in self.records.iter().enumerate() {
            if self.valid[slot] {
                write!(f, "{}: {:.03}, ", slot, r.policy)?;
            }
        }
        write!(f, "]")
    }
}

/// Current softmax policy of every information set, indexed by `InfoSetId`.
#[derive(Debug, Clone)]
pub struct Policy {
    nodes: Vec<Node>,
}

impl Policy {
    pub fn new(infosets: &InfoSetTree) -> Self {
        Policy {
            nodes: infosets.iter().map(|(_, s)| Node::new(s.valid())).collect(),
        }
    }

    #[inline]
    pub fn node(&self, id: InfoSetId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: InfoSetId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn reset(&mut self) {
        self.nodes.iter_mut().for_each(Node::reset);
    }
}

impl Strategy for Policy {
    fn probability(&self, infoset: InfoSetId, slot: usize) -> f64 {
        self.node(infoset).policy(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_distribution(node: &Node) {
        let sum: f64 = node.records().iter().map(|r| r.policy).sum();
        assert!((sum - 1.0).abs() < 1e-12, "{}", sum);
        for (slot, r) in node.records().iter().enumerate() {
            if !node.valid[slot] {
                assert_eq!(0.0, r.policy);
            }
        }
    }

    #[test]
    fn test_initial_policy_is_uniform() {
        let node = Node::new(&[false, true, true]);
        assert_eq!(0.0, node.policy(0));
        assert_eq!(0.5, node.policy(1));
        assert_eq!(0.5, node.policy(2));
        assert!(node.records().iter().all(|r| r.score == 0.0 && r.weight == 0.0));
    }

    #[test]
    fn test_update() {
        let config = LearningConfig {
            eta: 0.5,
            epsilon: 1.0,
        };
        let mut node = Node::new(&[true, false, true]);
        node.accumulate(0.5, &[2.0, 100.0, 0.0], 1.0);
        node.accumulate(0.5, &[2.0, 100.0, 0.0], 1.0);
        assert_eq!(1.0, node.normalizer());
        node.update(&config);

        assert_eq!(0.5, node.records()[0].score);
        assert_eq!(-0.5, node.records()[2].score);
        assert_eq!(0.0, node.records()[1].weight);
        let e = 1.0f64.exp();
        assert!((node.policy(0) - e / (e + 1.0)).abs() < 1e-12);
        assert_distribution(&node);

        node.reset();
        assert_eq!(0.0, node.normalizer());
        assert!(node.records().iter().all(|r| r.weight == 0.0));
    }

    #[test]
    fn test_unreached_set_decays() {
        let config = LearningConfig {
            eta: 0.5,
            epsilon: 1.0,
        };
        let mut node = Node::new(&[true, true]);
        node.accumulate(1.0, &[1.0, 0.0], 0.0);
        node.update(&config);
        let before = node.records()[0].score;

        // No mass this time: weights stay 0 and the scores move toward it.
        node.reset();
        node.update(&config);
        assert_eq!(before / 2.0, node.records()[0].score);
        assert_distribution(&node);
    }

    #[test]
    fn test_large_scores_do_not_overflow() {
        let config = LearningConfig {
            eta: 1.0,
            epsilon: 1e-3,
        };
        let mut node = Node::new(&[true, true, true]);
        node.accumulate(1.0, &[1e6, 0.0, -1e6], 0.0);
        node.update(&config);
        assert_eq!(1.0, node.policy(0));
        assert_eq!(0.0, node.policy(2));
        assert_distribution(&node);
    }

    #[test]
    fn test_empty_node() {
        let mut node = Node::new(&[]);
        node.update(&LearningConfig::default());
        assert!(node.records().is_empty());
    }
}
