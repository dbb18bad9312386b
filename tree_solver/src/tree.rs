use std::fmt::Display;

use crate::{
    error::{
        SolverError,
        SolverResult,
    },
    games::PlayerId,
};

/// Deepest root-to-leaf path the builders and the aggregator accept.
/// Every traversal in this crate is recursive, so the bound keeps the call
/// stack small.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a chance event.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    /// One private card per player, indexed by player.
    Deal(Vec<usize>),
    /// A public card seen by everybody.
    Reveal(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge<L> {
    pub label: L,
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Chance {
        /// Probability of each outcome. Chance events of both games are uniform.
        probability: f64,
        outcomes: Vec<Edge<Outcome>>,
    },
    Decision {
        player: usize,
        valid: Vec<bool>,
        actions: Vec<Edge<usize>>,
    },
    Terminal {
        utility: Vec<f64>,
        chance_weight: f64,
    },
}

impl Node {
    pub fn owner(&self) -> Option<PlayerId> {
        match self {
            Node::Chance {
                ..
            } => Some(PlayerId::Chance),
            Node::Decision {
                player,
                ..
            } => Some(PlayerId::Player(*player)),
            Node::Terminal {
                ..
            } => None,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Terminal { .. })
    }

    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Node::Chance {
                outcomes,
                ..
            } => outcomes.iter().map(|e| e.target).collect(),
            Node::Decision {
                actions,
                ..
            } => actions.iter().map(|e| e.target).collect(),
            Node::Terminal {
                ..
            } => vec![],
        }
    }
}

/// Arena holding an explicit extensive-form tree.
///
/// Nodes are appended and never removed; a `NodeId` stays valid for the
/// lifetime of the tree. Parents are linked to children with `add_action` /
/// `add_outcome` once both exist.
#[derive(Debug, Clone)]
pub struct GameTree {
    nodes: Vec<Node>,
    attached: Vec<bool>,
    root: Option<NodeId>,

    players: usize,
    action_slots: usize,
    public_actions: bool,
    utility_scale: f64,
    node_limit: Option<usize>,
}

impl GameTree {
    pub fn new(players: usize, action_slots: usize, public_actions: bool) -> Self {
        GameTree {
            nodes: vec![],
            attached: vec![],
            root: None,
            players,
            action_slots,
            public_actions,
            utility_scale: 1.0,
            node_limit: None,
        }
    }

    pub fn with_node_limit(mut self, limit: Option<usize>) -> Self {
        self.node_limit = limit;
        self
    }

    pub fn with_utility_scale(mut self, scale: f64) -> Self {
        self.utility_scale = scale;
        self
    }

    pub fn players(&self) -> usize {
        self.players
    }

    pub fn action_slots(&self) -> usize {
        self.action_slots
    }

    /// Whether a player's action is observed by the other players.
    pub fn public_actions(&self) -> bool {
        self.public_actions
    }

    /// Factor the utilities were multiplied by when the tree was built.
    pub fn utility_scale(&self) -> f64 {
        self.utility_scale
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> SolverResult<NodeId> {
        self.root.ok_or_else(|| SolverError::InvalidTree("the tree has no root".to_string()))
    }

    pub fn set_root(&mut self, root: NodeId) -> SolverResult<()> {
        self.check(root)?;
        if self.attached[root.index()] {
            return Err(SolverError::InvalidTree(format!("{} already has a parent", root)));
        }
        self.root = Some(root);
        Ok(())
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn terminals(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes().filter(|(_, n)| n.is_terminal())
    }

    pub fn add_chance(&mut self, probability: f64) -> SolverResult<NodeId> {
        if !(probability > 0.0 && probability <= 1.0) {
            return Err(SolverError::InvalidInput(format!(
                "chance probability must be in (0, 1]: {}",
                probability
            )));
        }
        self.push(Node::Chance {
            probability,
            outcomes: vec![],
        })
    }

    pub fn add_decision(&mut self, player: usize) -> SolverResult<NodeId> {
        if player >= self.players {
            return Err(SolverError::OutOfRange(format!(
                "player {} in a {}-player game",
                player, self.players
            )));
        }
        self.push(Node::Decision {
            player,
            valid: vec![false; self.action_slots],
            actions: vec![],
        })
    }

    pub fn add_terminal(&mut self, utility: Vec<f64>, chance_weight: f64) -> SolverResult<NodeId> {
        if utility.len() != self.players {
            return Err(SolverError::InvalidInput(format!(
                "utility vector has {} entries for {} players",
                utility.len(),
                self.players
            )));
        }
        self.push(Node::Terminal {
            utility,
            chance_weight,
        })
    }

    pub fn add_action(&mut self, parent: NodeId, slot: usize, child: NodeId) -> SolverResult<()> {
        self.check(parent)?;
        self.attach(child)?;
        if slot >= self.action_slots {
            return Err(SolverError::OutOfRange(format!(
                "action slot {} (the tree has {} slots)",
                slot, self.action_slots
            )));
        }
        match &mut self.nodes[parent.index()] {
            Node::Decision {
                valid,
                actions,
                ..
            } => {
                if valid[slot] {
                    return Err(SolverError::InvalidTree(format!(
                        "{} already has an action in slot {}",
                        parent, slot
                    )));
                }
                valid[slot] = true;
                actions.push(Edge {
                    label: slot,
                    target: child,
                });
            }
            _ => {
                return Err(SolverError::InvalidTree(format!(
                    "{} is not a decision node",
                    parent
                )))
            }
        }
        self.attached[child.index()] = true;
        Ok(())
    }

    pub fn add_outcome(
        &mut self,
        parent: NodeId,
        outcome: Outcome,
        child: NodeId,
    ) -> SolverResult<()> {
        self.check(parent)?;
        self.attach(child)?;
        match &mut self.nodes[parent.index()] {
            Node::Chance {
                outcomes,
                ..
            } => outcomes.push(Edge {
                label: outcome,
                target: child,
            }),
            _ => {
                return Err(SolverError::InvalidTree(format!("{} is not a chance node", parent)))
            }
        }
        self.attached[child.index()] = true;
        Ok(())
    }

    /// Follows the action `slot` from a decision node.
    pub fn action_child(&self, parent: NodeId, slot: usize) -> Option<NodeId> {
        match self.get(parent)? {
            Node::Decision {
                actions,
                ..
            } => actions.iter().find(|e| e.label == slot).map(|e| e.target),
            _ => None,
        }
    }

    /// Follows a chance outcome from a chance node.
    pub fn outcome_child(&self, parent: NodeId, outcome: &Outcome) -> Option<NodeId> {
        match self.get(parent)? {
            Node::Chance {
                outcomes,
                ..
            } => outcomes.iter().find(|e| e.label == *outcome).map(|e| e.target),
            _ => None,
        }
    }

    /// Length of the longest root-to-leaf path, in edges.
    pub fn depth(&self) -> usize {
        fn walk(tree: &GameTree, node: NodeId) -> usize {
            tree.node(node).children().into_iter().map(|c| walk(tree, c) + 1).max().unwrap_or(0)
        }
        match self.root {
            Some(root) => walk(self, root),
            None => 0,
        }
    }

    fn push(&mut self, node: Node) -> SolverResult<NodeId> {
        if let Some(limit) = self.node_limit {
            if self.nodes.len() >= limit {
                return Err(SolverError::CapacityExceeded {
                    limit,
                });
            }
        }
        self.nodes.push(node);
        self.attached.push(false);
        Ok(NodeId(self.nodes.len() - 1))
    }

    fn check(&self, id: NodeId) -> SolverResult<()> {
        if id.index() >= self.nodes.len() {
            return Err(SolverError::OutOfRange(format!(
                "node {} (the tree has {} nodes)",
                id,
                self.nodes.len()
            )));
        }
        Ok(())
    }

    fn attach(&self, child: NodeId) -> SolverResult<()> {
        self.check(child)?;
        if self.attached[child.index()] || self.root == Some(child) {
            return Err(SolverError::InvalidTree(format!("{} already has a parent", child)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_small_tree() {
        let mut tree = GameTree::new(2, 3, true);
        let root = tree.add_chance(0.5).unwrap();
        let left = tree.add_decision(0).unwrap();
        let right = tree.add_terminal(vec![1.0, -1.0], 0.5).unwrap();
        tree.add_outcome(root, Outcome::Reveal(0), left).unwrap();
        tree.add_outcome(root, Outcome::Reveal(1), right).unwrap();
        let leaf = tree.add_terminal(vec![-2.0, 2.0], 0.5).unwrap();
        tree.add_action(left, 2, leaf).unwrap();
        tree.set_root(root).unwrap();

        assert_eq!(4, tree.len());
        assert_eq!(2, tree.depth());
        assert_eq!(Some(PlayerId::Chance), tree.node(root).owner());
        assert_eq!(Some(PlayerId::Player(0)), tree.node(left).owner());
        assert_eq!(None, tree.node(leaf).owner());
        assert_eq!(Some(leaf), tree.action_child(left, 2));
        assert_eq!(None, tree.action_child(left, 0));
        assert_eq!(Some(right), tree.outcome_child(root, &Outcome::Reveal(1)));
        match tree.node(left) {
            Node::Decision {
                valid,
                ..
            } => assert_eq!(&vec![false, false, true], valid),
            _ => panic!("expected a decision node"),
        }
        assert_eq!(2, tree.terminals().count());
    }

    #[test]
    fn test_node_limit() {
        let mut tree = GameTree::new(2, 3, true).with_node_limit(Some(2));
        tree.add_chance(1.0).unwrap();
        tree.add_decision(1).unwrap();
        match tree.add_decision(0) {
            Err(SolverError::CapacityExceeded {
                limit,
            }) => assert_eq!(2, limit),
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn test_invalid_links() {
        let mut tree = GameTree::new(2, 2, false);
        let root = tree.add_decision(0).unwrap();
        let child = tree.add_terminal(vec![0.0, 0.0], 1.0).unwrap();

        assert!(matches!(tree.add_action(root, 2, child), Err(SolverError::OutOfRange(_))));
        assert!(matches!(
            tree.add_outcome(root, Outcome::Reveal(0), child),
            Err(SolverError::InvalidTree(_))
        ));
        tree.add_action(root, 0, child).unwrap();
        assert!(matches!(tree.add_action(root, 1, child), Err(SolverError::InvalidTree(_))));
        assert!(matches!(tree.add_decision(2), Err(SolverError::OutOfRange(_))));
        assert!(matches!(tree.add_terminal(vec![0.0], 1.0), Err(SolverError::InvalidInput(_))));
        assert!(tree.root().is_err());
    }
}
