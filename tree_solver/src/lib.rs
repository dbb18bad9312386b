pub mod error;
pub mod eval;
pub mod games;
pub mod infoset;
pub mod solvers;
pub mod tree;
