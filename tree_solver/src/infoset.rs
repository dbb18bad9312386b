use std::fmt::Display;

use log::debug;

use crate::{
    error::{
        SolverError,
        SolverResult,
    },
    games::PlayerId,
    tree::{
        GameTree,
        Node,
        NodeId,
        Outcome,
        MAX_DEPTH,
    },
};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct InfoSetId(usize);

impl InfoSetId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Something a player sees along the way to a decision.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Observation {
    Action(usize),
    Card(usize),
}

impl Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observation::Action(slot) => write!(f, "a{}", slot),
            Observation::Card(card) => write!(f, "c{}", card),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InfoSet {
    player: usize,
    // None for the synthetic root of a player's image tree
    owner: Option<usize>,
    key: Vec<Observation>,
    valid: Vec<bool>,
    members: Vec<NodeId>,
    children: Vec<InfoSetId>,
}

impl InfoSet {
    /// The player whose image tree holds this set.
    pub fn player(&self) -> usize {
        self.player
    }

    pub fn owner(&self) -> Option<usize> {
        self.owner
    }

    pub fn key(&self) -> &[Observation] {
        &self.key
    }

    pub fn valid(&self) -> &[bool] {
        &self.valid
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn children(&self) -> &[InfoSetId] {
        &self.children
    }
}

impl Display for InfoSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{} [", self.player)?;
        for (i, obs) in self.key.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", obs)?;
        }
        write!(f, "] ({} nodes)", self.members.len())
    }
}

/// Image tree of information sets, one per player, over a `GameTree`.
#[derive(Debug, Clone)]
pub struct InfoSetTree {
    sets: Vec<InfoSet>,
    roots: Vec<InfoSetId>,
    // decision node -> its information set
    lookup: Vec<Option<InfoSetId>>,
}

impl InfoSetTree {
    pub fn build(tree: &GameTree) -> SolverResult<Self> {
        let root = tree.root()?;
        if tree.node(root).is_terminal() {
            return Err(SolverError::InvalidTree("the root is a terminal node".to_string()));
        }

        let mut infosets = InfoSetTree {
            sets: vec![],
            roots: vec![],
            lookup: vec![None; tree.len()],
        };
        for player in 0..tree.players() {
            let anchor = infosets.push(InfoSet {
                player,
                owner: None,
                key: vec![],
                valid: vec![],
                members: vec![root],
                children: vec![],
            });
            infosets.roots.push(anchor);
            let mut key = vec![];
            // A root owned by the player opens its first information set.
            let parent = if tree.node(root).owner() == Some(PlayerId::Player(player)) {
                infosets.find_or_insert(tree, anchor, player, root, &key)?
            } else {
                anchor
            };
            infosets.traverse(tree, root, player, parent, &mut key, 0)?;
        }

        for (id, node) in tree.nodes() {
            if let Node::Decision {
                actions,
                ..
            } = node
            {
                if actions.is_empty() {
                    return Err(SolverError::InvalidTree(format!("{} has no actions", id)));
                }
            }
        }
        debug!(
            "{} information sets over {} tree nodes",
            infosets.sets.len() - infosets.roots.len(),
            tree.len()
        );
        Ok(infosets)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    #[inline]
    pub fn get(&self, id: InfoSetId) -> &InfoSet {
        &self.sets[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (InfoSetId, &InfoSet)> {
        self.sets.iter().enumerate().map(|(i, s)| (InfoSetId(i), s))
    }

    /// Synthetic root of `player`'s image tree.
    pub fn root(&self, player: usize) -> InfoSetId {
        self.roots[player]
    }

    /// Information set of a decision node owned by a player.
    #[inline]
    pub fn of_node(&self, node: NodeId) -> Option<InfoSetId> {
        self.lookup.get(node.index()).copied().flatten()
    }

    /// Like `of_node`, but panics if `node` is not a decision node of the
    /// aggregated tree.
    #[inline]
    pub fn set_of(&self, node: NodeId) -> InfoSetId {
        match self.of_node(node) {
            Some(id) => id,
            None => panic!("{} is not linked to an information set", node),
        }
    }

    /// Information sets owned by `player`, the synthetic root excluded.
    pub fn owned_by(&self, player: usize) -> impl Iterator<Item = (InfoSetId, &InfoSet)> {
        self.iter().filter(move |(_, s)| s.owner == Some(player))
    }

    fn push(&mut self, set: InfoSet) -> InfoSetId {
        self.sets.push(set);
        InfoSetId(self.sets.len() - 1)
    }

    fn traverse(
        &mut self,
        tree: &GameTree,
        node: NodeId,
        player: usize,
        parent: InfoSetId,
        key: &mut Vec<Observation>,
        depth: usize,
    ) -> SolverResult<()> {
        if depth >= MAX_DEPTH {
            return Err(SolverError::DepthExceeded {
                depth: depth + 1,
                max: MAX_DEPTH,
            });
        }

        let edges: Vec<(Option<Observation>, NodeId)> = match tree.node(node) {
            Node::Chance {
                outcomes,
                ..
            } => outcomes.iter().map(|e| (observe_outcome(&e.label, player), e.target)).collect(),
            Node::Decision {
                player: actor,
                actions,
                ..
            } => {
                let seen = *actor == player || tree.public_actions();
                actions
                    .iter()
                    .map(|e| (seen.then_some(Observation::Action(e.label)), e.target))
                    .collect()
            }
            Node::Terminal {
                ..
            } => vec![],
        };

        for (observation, child) in edges {
            if tree.node(child).is_terminal() {
                continue;
            }
            if let Some(observation) = observation {
                key.push(observation);
            }

            if tree.node(child).owner() == Some(PlayerId::Player(player)) {
                let set = self.find_or_insert(tree, parent, player, child, key)?;
                self.traverse(tree, child, player, set, key, depth + 1)?;
            } else {
                self.traverse(tree, child, player, parent, key, depth + 1)?;
            }

            if observation.is_some() {
                key.pop();
            }
        }
        Ok(())
    }

    fn find_or_insert(
        &mut self,
        tree: &GameTree,
        parent: InfoSetId,
        player: usize,
        node: NodeId,
        key: &[Observation],
    ) -> SolverResult<InfoSetId> {
        let valid = match tree.node(node) {
            Node::Decision {
                valid,
                ..
            } => valid.clone(),
            _ => unreachable!("only decision nodes have an owner"),
        };

        let found =
            self.get(parent).children.iter().copied().find(|c| self.get(*c).key.as_slice() == key);
        let set = match found {
            Some(set) => {
                if self.get(set).valid != valid {
                    return Err(SolverError::InvalidTree(format!(
                        "{} and {} share an information set but not their legal actions",
                        self.get(set).members[0],
                        node
                    )));
                }
                set
            }
            None => {
                let set = self.push(InfoSet {
                    player,
                    owner: Some(player),
                    key: key.to_vec(),
                    valid,
                    members: vec![],
                    children: vec![],
                });
                self.sets[parent.index()].children.push(set);
                set
            }
        };

        debug_assert!(self.lookup[node.index()].is_none(), "{} is linked twice", node);
        self.lookup[node.index()] = Some(set);
        self.sets[set.index()].members.push(node);
        Ok(set)
    }
}

fn observe_outcome(outcome: &Outcome, player: usize) -> Option<Observation> {
    match outcome {
        Outcome::Deal(cards) => cards.get(player).map(|&c| Observation::Card(c)),
        Outcome::Reveal(card) => Some(Observation::Card(*card)),
    }
}
