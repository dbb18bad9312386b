use std::{
    fs::File,
    io::{
        BufWriter,
        Write,
    },
    path::PathBuf,
    time::{
        Duration,
        Instant,
    },
};

use clap::{
    Args,
    ValueHint,
};
use log::{
    debug,
    info,
    warn,
};

use crate::{
    error::{
        SolverError,
        SolverResult,
    },
    eval::{
        compute_exploitability,
        Exploitability,
    },
    infoset::InfoSetTree,
    tree::{
        GameTree,
        NodeId,
    },
};

pub mod optimizer;
pub mod policy;

use optimizer::Optimizer;
use policy::{
    LearningConfig,
    Policy,
};

#[derive(Args, Debug, Clone)]
pub struct TrainingArgs {
    #[clap(long, short, value_parser, default_value_t = 1_000_000)]
    pub iterations: usize,

    /// Iterations between two exploitability reports
    #[clap(long, value_parser, default_value_t = 100)]
    pub interval: usize,

    /// Overrides the game's default learning rate
    #[clap(long, value_parser)]
    pub eta: Option<f64>,

    /// Overrides the game's default softmax temperature
    #[clap(long, value_parser)]
    pub epsilon: Option<f64>,

    #[clap(long, short, value_parser, value_hint(ValueHint::FilePath))]
    pub log_path: Option<PathBuf>,

    /// Fails instead of building a tree with more nodes than this
    #[clap(long, value_parser)]
    pub node_limit: Option<usize>,
}

impl TrainingArgs {
    pub fn new(iterations: usize, interval: usize) -> Self {
        TrainingArgs {
            iterations,
            interval,
            eta: None,
            epsilon: None,
            log_path: None,
            node_limit: None,
        }
    }

    /// `default` with the overrides given on the command line.
    pub fn learning_config(&self, default: LearningConfig) -> LearningConfig {
        LearningConfig {
            eta: self.eta.unwrap_or(default.eta),
            epsilon: self.epsilon.unwrap_or(default.epsilon),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub iteration: usize,
    pub elapsed: Duration,
    pub exploitability: f64,
    pub values: Vec<f64>,
}

pub struct Trainer {
    tree: GameTree,
    infosets: InfoSetTree,
    policy: Policy,
    config: LearningConfig,
    root: NodeId,
    iterations: usize,
}

impl Trainer {
    pub fn new(tree: GameTree, config: LearningConfig) -> SolverResult<Self> {
        if !(config.eta > 0.0 && config.eta <= 1.0) {
            return Err(SolverError::InvalidInput(format!(
                "eta must be in (0, 1], got {}",
                config.eta
            )));
        }
        if !(config.epsilon > 0.0 && config.epsilon.is_finite()) {
            return Err(SolverError::InvalidInput(format!(
                "epsilon must be positive, got {}",
                config.epsilon
            )));
        }

        let root = tree.root()?;
        let infosets = InfoSetTree::build(&tree)?;
        let policy = Policy::new(&infosets);
        Ok(Trainer {
            tree,
            infosets,
            policy,
            config,
            root,
            iterations: 0,
        })
    }

    pub fn tree(&self) -> &GameTree {
        &self.tree
    }

    pub fn infosets(&self) -> &InfoSetTree {
        &self.infosets
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Number of iterations run so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Runs one learning iteration and returns each player's expected
    /// utility before the update, in the game's original units.
    pub fn iterate(&mut self) -> Vec<f64> {
        let scale = self.tree.utility_scale();
        let values = Optimizer::new(&self.tree, &self.infosets, &mut self.policy)
            .step(self.root, &self.config);
        self.iterations += 1;
        values.into_iter().map(|v| v / scale).collect()
    }

    pub fn exploitability(&self) -> SolverResult<Exploitability> {
        compute_exploitability(&self.tree, &self.infosets, &self.policy)
    }

    pub fn train(&mut self, args: &TrainingArgs) -> SolverResult<Vec<Checkpoint>> {
        if args.interval == 0 {
            return Err(SolverError::InvalidInput("the report interval must be positive".to_string()));
        }
        if args.interval > args.iterations {
            warn!(
                "the report interval ({}) exceeds the iteration count ({}); nothing will be reported",
                args.interval, args.iterations
            );
        }

        let mut log_writer = match &args.log_path {
            Some(path) => {
                let mut w = BufWriter::new(File::create(path)?);
                writeln!(w, "iteration,elapsed_seconds,exploitability")?;
                Some(w)
            }
            None => None,
        };

        info!(
            "training {} information sets with eta {} and epsilon {}",
            self.infosets.len(),
            self.config.eta,
            self.config.epsilon
        );
        let mut checkpoints = vec![];
        let start_t = Instant::now();
        for _ in 0..args.iterations {
            let values = self.iterate();
            if self.iterations % args.interval != 0 {
                continue;
            }

            let exploitability = self.exploitability()?.total();
            let elapsed = start_t.elapsed();
            info!(
                "iteration {:10}: exploitability: {:.6e}, game values: {:?}",
                self.iterations, exploitability, values
            );
            if let Some(w) = &mut log_writer {
                writeln!(
                    w,
                    "{},{:.3},{:.12}",
                    self.iterations,
                    elapsed.as_secs_f64(),
                    exploitability
                )?;
                w.flush()?;
            }
            checkpoints.push(Checkpoint {
                iteration: self.iterations,
                elapsed,
                exploitability,
                values,
            });
        }

        let elapsed = Duration::from_millis(start_t.elapsed().as_millis() as u64);
        info!("Training has finished in {}", humantime::format_duration(elapsed));
        info!("# of infoset: {}", self.infosets.len() - self.tree.players());
        self.print_strategy();
        Ok(checkpoints)
    }

    pub fn print_strategy(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        for player in 0..self.tree.players() {
            debug!("Player {} [", player);
            for (id, set) in self.infosets.owned_by(player) {
                debug!("    {} {}", set, self.policy.node(id));
            }
            debug!("]");
        }
    }
}
