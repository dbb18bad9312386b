use std::io::Read;

use itertools::Itertools;
use log::debug;
use rand::Rng;
use rand_distr::{
    Distribution,
    Uniform,
};

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

/// Payoffs are multiplied by this factor before training and reported
/// metrics are divided by it again.
pub const DEFAULT_SCALE: f64 = 10.0;

/// Payoffs of a simultaneous-move game, stored row-major as
/// `[player][a_1][a_2]...[a_n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoffTensor {
    players: usize,
    actions: usize,
    values: Vec<f64>,
}

impl PayoffTensor {
    pub fn new(players: usize, actions: usize, values: Vec<f64>) -> SolverResult<Self> {
        let expected = Self::entry_count(players, actions)?;
        if values.len() != expected {
            return Err(SolverError::InvalidInput(format!(
                "expected {} payoffs ({} players x {}^{} profiles), got {}",
                expected,
                players,
                actions,
                players,
                values.len()
            )));
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(SolverError::InvalidInput(format!(
                "payoff #{} is not finite: {}",
                i + 1,
                values[i]
            )));
        }
        Ok(PayoffTensor {
            players,
            actions,
            values,
        })
    }

    /// Parses whitespace separated numbers.
    pub fn parse(text: &str, players: usize, actions: usize) -> SolverResult<Self> {
        let values = text
            .split_whitespace()
            .enumerate()
            .map(|(i, token)| match token.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                Ok(_) => Err(SolverError::InvalidInput(format!(
                    "payoff #{} ({:?}) is not finite",
                    i + 1,
                    token
                ))),
                Err(e) => Err(SolverError::InvalidInput(format!(
                    "payoff #{} ({:?}) is not a number: {}",
                    i + 1,
                    token,
                    e
                ))),
            })
            .collect::<SolverResult<Vec<f64>>>()?;
        Self::new(players, actions, values)
    }

    pub fn read<R: Read>(mut reader: R, players: usize, actions: usize) -> SolverResult<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(&text, players, actions)
    }

    /// Uniform payoffs in [-1, 1) for every player but the last, who receives
    /// the negated sum so the game is zero-sum.
    pub fn random<R: Rng>(rng: &mut R, players: usize, actions: usize) -> SolverResult<Self> {
        let profiles = Self::entry_count(players, actions)? / players;
        let dist = Uniform::new(-1.0, 1.0);
        let mut values = vec![0.0; players * profiles];
        for profile in 0..profiles {
            let mut total = 0.0;
            for player in 0..players - 1 {
                let v: f64 = dist.sample(rng);
                values[player * profiles + profile] = v;
                total += v;
            }
            values[(players - 1) * profiles + profile] = -total;
        }
        Self::new(players, actions, values)
    }

    /// Every player plays the two-player game `matrix` against each opponent
    /// and receives the sum. A zero-sum `matrix` yields a zero-sum game.
    pub fn pairwise(players: usize, matrix: &[Vec<f64>]) -> SolverResult<Self> {
        let actions = matrix.len();
        if matrix.iter().any(|row| row.len() != actions) {
            return Err(SolverError::InvalidInput("the pairwise matrix must be square".to_string()));
        }
        let mut values = Vec::with_capacity(Self::entry_count(players, actions)?);
        for player in 0..players {
            for profile in (0..players).map(|_| 0..actions).multi_cartesian_product() {
                let own = profile[player];
                let payoff: f64 = profile
                    .iter()
                    .enumerate()
                    .filter(|(opponent, _)| *opponent != player)
                    .map(|(_, &theirs)| matrix[own][theirs])
                    .sum();
                values.push(payoff);
            }
        }
        Self::new(players, actions, values)
    }

    pub fn players(&self) -> usize {
        self.players
    }

    pub fn actions(&self) -> usize {
        self.actions
    }

    pub fn payoff(&self, player: usize, profile: &[usize]) -> f64 {
        debug_assert_eq!(self.players, profile.len());
        let offset = profile.iter().fold(player, |acc, &a| acc * self.actions + a);
        self.values[offset]
    }

    pub fn is_zero_sum(&self) -> bool {
        (0..self.players).map(|_| 0..self.actions).multi_cartesian_product().all(|profile| {
            let total: f64 = (0..self.players).map(|p| self.payoff(p, &profile)).sum();
            total.abs() < 1e-9
        })
    }

    fn entry_count(players: usize, actions: usize) -> SolverResult<usize> {
        if players == 0 || actions == 0 {
            return Err(SolverError::InvalidInput(format!(
                "a payoff tensor needs players and actions, got {} x {}",
                players, actions
            )));
        }
        u32::try_from(players)
            .ok()
            .and_then(|exp| actions.checked_pow(exp))
            .and_then(|profiles| profiles.checked_mul(players))
            .ok_or_else(|| {
                SolverError::InvalidInput(format!(
                    "a tensor of {} players with {} actions is too large",
                    players, actions
                ))
            })
    }
}

/// One-shot game: every player picks an action without seeing the others.
pub struct NormalFormGame {
    tensor: PayoffTensor,
    scale: f64,
}

impl NormalFormGame {
    pub fn new(tensor: PayoffTensor, scale: f64) -> SolverResult<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "the payoff scale must be positive, got {}",
                scale
            )));
        }
        Ok(NormalFormGame {
            tensor,
            scale,
        })
    }

    pub fn tensor(&self) -> &PayoffTensor {
        &self.tensor
    }

    fn layer(&self, tree: &mut GameTree, profile: &mut Vec<usize>) -> SolverResult<NodeId> {
        let player = profile.len();
        if player == self.tensor.players() {
            let profile = &profile[..];
            let utility =
                (0..player).map(|p| self.scale * self.tensor.payoff(p, profile)).collect();
            return tree.add_terminal(utility, 1.0);
        }
        if player + 2 > MAX_DEPTH {
            return Err(SolverError::DepthExceeded {
                depth: player + 2,
                max: MAX_DEPTH,
            });
        }

        let node = tree.add_decision(player)?;
        for action in 0..self.tensor.actions() {
            profile.push(action);
            let child = self.layer(tree, profile)?;
            profile.pop();
            tree.add_action(node, action, child)?;
        }
        Ok(node)
    }
}

impl Game for NormalFormGame {
    fn name(&self) -> &'static str {
        "normal-form"
    }

    fn build_tree(&self, node_limit: Option<usize>) -> SolverResult<GameTree> {
        let mut tree = GameTree::new(self.tensor.players(), self.tensor.actions(), false)
            .with_node_limit(node_limit)
            .with_utility_scale(self.scale);
        // A single deal with no cards keeps the layout of the betting game.
        let root = tree.add_chance(1.0)?;
        let child = self.layer(&mut tree, &mut vec![])?;
        tree.add_outcome(root, Outcome::Deal(vec![]), child)?;
        tree.set_root(root)?;
        debug!("normal-form tree: {} nodes, {} terminals", tree.len(), tree.terminals().count());
        Ok(tree)
    }

    fn learning_config(&self) -> LearningConfig {
        LearningConfig {
            eta: 1e-4,
            epsilon: 0.03,
        }
    }
}
