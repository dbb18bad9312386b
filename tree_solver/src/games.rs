use crate::{
    error::SolverResult,
    solvers::policy::LearningConfig,
    tree::GameTree,
};

pub mod betting;
pub mod normal_form;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlayerId {
    Chance,
    Player(usize),
}

/// A game that can be laid out as an explicit tree.
pub trait Game {
    fn name(&self) -> &'static str;

    /// Builds the full tree. `node_limit` caps the arena size.
    fn build_tree(&self, node_limit: Option<usize>) -> SolverResult<GameTree>;

    fn learning_config(&self) -> LearningConfig;
}
