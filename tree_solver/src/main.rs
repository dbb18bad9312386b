use std::{
    error::Error,
    fs::File,
    io,
    path::PathBuf,
};

use clap::{
    Parser,
    Subcommand,
    ValueHint,
};
use log::{
    info,
    warn,
};
use rand::SeedableRng;
use wyhash::WyRng;

use tree_solver::{
    games::{
        betting::{
            BettingGame,
            BettingRule,
        },
        normal_form::{
            NormalFormGame,
            PayoffTensor,
            DEFAULT_SCALE,
        },
        Game,
    },
    solvers::{
        Trainer,
        TrainingArgs,
    },
};

#[derive(Parser)]
struct AppArgs {
    #[clap(subcommand)]
    game: GameArgs,
}

#[derive(Subcommand)]
enum GameArgs {
    /// Two betting rounds around a public card
    Betting {
        #[clap(long, value_parser, default_value_t = 2)]
        players: usize,

        #[clap(long, value_parser, default_value_t = 2)]
        suits: usize,

        #[clap(long, value_parser, default_value_t = 3)]
        ranks: usize,

        #[clap(flatten)]
        training: TrainingArgs,
    },
    /// Simultaneous-move game given by a payoff tensor
    NormalForm {
        /// Whitespace separated payoffs, player-major; `-` reads stdin
        #[clap(
            long,
            value_parser,
            value_hint(ValueHint::FilePath),
            required_unless_present = "seed",
            conflicts_with = "seed"
        )]
        payoff: Option<PathBuf>,

        /// Generates a random zero-sum tensor instead of reading one
        #[clap(long, value_parser)]
        seed: Option<u64>,

        #[clap(long, value_parser, default_value_t = 3)]
        players: usize,

        #[clap(long, value_parser, default_value_t = 3)]
        actions: usize,

        #[clap(long, value_parser, default_value_t = DEFAULT_SCALE)]
        scale: f64,

        #[clap(flatten)]
        training: TrainingArgs,
    },
}

fn load_tensor(
    payoff: Option<PathBuf>,
    seed: Option<u64>,
    players: usize,
    actions: usize,
) -> Result<PayoffTensor, Box<dyn Error>> {
    let tensor = match (payoff, seed) {
        (Some(path), _) if path.as_os_str() == "-" => {
            PayoffTensor::read(io::stdin().lock(), players, actions)?
        }
        (Some(path), _) => PayoffTensor::read(File::open(&path)?, players, actions)?,
        (None, Some(seed)) => {
            info!("random payoffs with seed {}", seed);
            PayoffTensor::random(&mut WyRng::seed_from_u64(seed), players, actions)?
        }
        (None, None) => return Err("either --payoff or --seed is required".into()),
    };
    Ok(tensor)
}

fn run<G: Game>(game: &G, args: &TrainingArgs) -> Result<(), Box<dyn Error>> {
    let tree = game.build_tree(args.node_limit)?;
    info!("{}: {} nodes, {} terminals", game.name(), tree.len(), tree.terminals().count());

    let config = args.learning_config(game.learning_config());
    let mut trainer = Trainer::new(tree, config)?;
    info!("learning config: {:?}", trainer.config());
    trainer.train(args)?;

    let result = trainer.exploitability()?;
    info!("game values: {:?}", result.values);
    info!("exploitability: {}", result.total());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger with a default log level of INFO.
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = AppArgs::parse();
    match args.game {
        GameArgs::Betting {
            players,
            suits,
            ranks,
            training,
        } => {
            let game = BettingGame::new(BettingRule {
                players,
                suits,
                ranks,
                ..BettingRule::default()
            })?;
            info!("{:?}", game.rule());
            run(&game, &training)
        }
        GameArgs::NormalForm {
            payoff,
            seed,
            players,
            actions,
            scale,
            training,
        } => {
            let tensor = load_tensor(payoff, seed, players, actions)?;
            let game = NormalFormGame::new(tensor, scale)?;
            if !game.tensor().is_zero_sum() {
                warn!(
                    "the payoffs are not zero-sum; exploitability is only meaningful for zero-sum games"
                );
            }
            run(&game, &training)
        }
    }
}
