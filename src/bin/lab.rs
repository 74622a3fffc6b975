use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use algo_lab::clustering::{KMeansEngine, KMeansPreset};
use algo_lab::config::AppConfig;
use algo_lab::engine::{drive, Engine};
use algo_lab::grid::{Direction, GridPos};
use algo_lab::mdp::{MdpSolver, MdpTerrain};
use algo_lab::neural::{Dataset, NeuralPlayground};
use algo_lab::persistence::PolicyStore;
use algo_lab::rl::gridworld::{GridWorldMethod, GridWorldStep, GridWorldTerrain};
use algo_lab::rl::{GridWorldLab, SnakeLab};
use algo_lab::search::{GridSearchEngine, SearchAlgorithm, SearchStatus, SearchTerrain};
use algo_lab::supervised::{SupervisedLab, SupervisedTask};

/// Run the algorithm lab engines from the command line.
#[derive(Parser)]
#[command(name = "lab", about = "Step classic algorithms headlessly")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "lab.toml")]
    config: PathBuf,

    /// Seed every engine for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search a grid from start to goal
    Search {
        /// bfs, dfs, ucs or astar
        #[arg(long)]
        algorithm: Option<SearchAlgorithm>,

        /// Scatter random walls first
        #[arg(long)]
        random_map: bool,

        #[arg(long, default_value_t = 10_000)]
        max_steps: usize,
    },
    /// Solve the slippery grid MDP and roll out its policy
    Mdp {
        /// Policy steps to roll out after solving
        #[arg(long, default_value_t = 20)]
        rollout: usize,
    },
    /// Train the grid-world agent
    Gridworld {
        #[arg(long, default_value_t = 500)]
        episodes: u64,

        /// qlearning or valueiteration
        #[arg(long)]
        method: Option<GridWorldMethod>,

        /// Load the saved policy before training
        #[arg(long)]
        load: bool,

        /// Save the policy after training
        #[arg(long)]
        save: bool,
    },
    /// Train the Snake agent
    Snake {
        #[arg(long, default_value_t = 200)]
        episodes: u64,

        #[arg(long)]
        load: bool,

        #[arg(long)]
        save: bool,
    },
    /// Train the neural network on a dataset
    Neural {
        /// xor, circle, spiral or moons
        #[arg(long)]
        dataset: Option<Dataset>,

        #[arg(long, default_value_t = 1_000)]
        epochs: usize,
    },
    /// Fit a regression or classification model to sample points
    Supervised {
        /// regression or classification
        #[arg(long)]
        task: Option<SupervisedTask>,

        #[arg(long, default_value_t = 500)]
        ticks: usize,
    },
    /// Cluster a point preset with k-means
    Kmeans {
        #[arg(long)]
        k: Option<usize>,

        /// empty, random, blobs, rings or smiley
        #[arg(long)]
        preset: Option<KMeansPreset>,

        #[arg(long, default_value_t = 100)]
        max_iterations: usize,
    },
    /// Print the default configuration as TOML
    DefaultConfig,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if matches!(cli.command, Command::DefaultConfig) {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    match cli.command {
        Command::Search {
            algorithm,
            random_map,
            max_steps,
        } => run_search(config, algorithm, random_map, max_steps),
        Command::Mdp { rollout } => run_mdp(config, rollout),
        Command::Gridworld {
            episodes,
            method,
            load,
            save,
        } => run_gridworld(config, episodes, method, load, save),
        Command::Snake {
            episodes,
            load,
            save,
        } => run_snake(config, episodes, load, save),
        Command::Neural { dataset, epochs } => run_neural(config, dataset, epochs),
        Command::Supervised { task, ticks } => run_supervised(config, task, ticks),
        Command::Kmeans {
            k,
            preset,
            max_iterations,
        } => run_kmeans(config, k, preset, max_iterations),
        Command::DefaultConfig => Ok(()),
    }
}

fn run_search(
    mut config: AppConfig,
    algorithm: Option<SearchAlgorithm>,
    random_map: bool,
    max_steps: usize,
) -> Result<()> {
    if let Some(algorithm) = algorithm {
        config.search.algorithm = algorithm;
    }
    let mut engine = GridSearchEngine::new(config.search).context("building search grid")?;
    if random_map {
        // Logs a warning itself when no solvable map turns up.
        engine.randomize_map();
    }

    let steps = drive(&mut engine, max_steps);
    let status = engine.status();
    println!(
        "{}: {:?} after {} steps, {} nodes visited",
        engine.algorithm(),
        status,
        steps,
        engine.visited_count()
    );
    if status == SearchStatus::Found {
        println!(
            "path: {} cells, cost {}",
            engine.path().len(),
            engine.path_cost()
        );
    }

    let on_path: std::collections::HashSet<GridPos> = engine.path().iter().copied().collect();
    for row in 0..engine.rows() {
        let line: String = (0..engine.cols())
            .map(|col| {
                let pos = GridPos::new(col, row);
                if pos == engine.start() {
                    'S'
                } else if pos == engine.goal() {
                    'G'
                } else if on_path.contains(&pos) {
                    '*'
                } else {
                    match engine.terrain(pos) {
                        SearchTerrain::Wall => '#',
                        SearchTerrain::Mud => ',',
                        SearchTerrain::Water => '~',
                        SearchTerrain::Empty => '.',
                    }
                }
            })
            .collect();
        println!("{line}");
    }
    Ok(())
}

fn arrow(direction: Option<Direction>) -> char {
    match direction {
        Some(Direction::Up) => '^',
        Some(Direction::Right) => '>',
        Some(Direction::Down) => 'v',
        Some(Direction::Left) => '<',
        None => ' ',
    }
}

fn run_mdp(config: AppConfig, rollout: usize) -> Result<()> {
    let mut solver = MdpSolver::with_default_scenario(config.mdp).context("building MDP grid")?;
    let report = solver.solve();
    println!(
        "value iteration: {} sweeps, delta {:.6}, converged {}",
        report.iteration, report.delta, report.converged
    );

    let cells = solver.cells();
    for row in 0..cells.rows() {
        let line: Vec<String> = (0..cells.cols())
            .map(|col| {
                let cell = cells.get(GridPos::new(col, row));
                match cell.terrain {
                    MdpTerrain::Gold => "  GOLD ".to_string(),
                    MdpTerrain::Fire => "  FIRE ".to_string(),
                    _ => format!("{:6.1}{}", cell.v, arrow(cell.policy)),
                }
            })
            .collect();
        println!("{}", line.join(" "));
    }

    let mut at = solver.start_agent();
    println!("rollout from {at}:");
    for _ in 0..rollout {
        let Some(outcome) = solver.policy_step() else {
            break;
        };
        println!(
            "  {} -> {}{}{}",
            at,
            outcome.position,
            if outcome.slipped { " (slipped)" } else { "" },
            if outcome.bumped { " (bumped)" } else { "" }
        );
        at = outcome.position;
        if let Some(reward) = outcome.terminal_reward {
            println!("  reached a terminal cell, reward {reward}");
            break;
        }
    }
    solver.stop_agent();
    Ok(())
}

fn open_store(config: &AppConfig) -> Result<PolicyStore> {
    PolicyStore::new(config.store.clone())
        .with_context(|| format!("opening policy store at {}", config.store.dir.display()))
}

fn run_gridworld(
    mut config: AppConfig,
    episodes: u64,
    method: Option<GridWorldMethod>,
    load: bool,
    save: bool,
) -> Result<()> {
    if let Some(method) = method {
        config.gridworld.method = method;
    }
    let mut lab = GridWorldLab::new(config.gridworld.clone()).context("building grid world")?;
    if load {
        open_store(&config)?
            .load_gridworld(&mut lab)
            .context("loading grid-world policy")?;
    }

    match lab.method() {
        GridWorldMethod::QLearning => {
            let target = lab.episode() + episodes;
            while lab.episode() < target {
                lab.step();
            }
            println!(
                "{} episodes trained, mean reward over the last 50: {:.2}",
                lab.episode(),
                lab.reward_history().average(50)
            );
        }
        GridWorldMethod::ValueIteration => {
            let mut sweeps = 0;
            while let GridWorldStep::Swept { delta } = lab.step() {
                sweeps += 1;
                if delta < 1e-6 || sweeps >= 1_000 {
                    break;
                }
            }
            println!("{sweeps} value sweeps");
        }
    }

    lab.set_testing(true);
    let max_steps = lab.config().max_steps;
    let mut reached = None;
    for taken in 1..=max_steps {
        if let GridWorldStep::Moved { to, done: true, .. } = lab.step() {
            reached = Some((lab.terrain(to), taken));
            break;
        }
    }
    match reached {
        Some((GridWorldTerrain::Goal, steps)) => println!("greedy run reached the goal in {steps} steps"),
        Some((_, steps)) => println!("greedy run fell into a hole after {steps} steps"),
        None => println!("greedy run did not finish within {max_steps} steps"),
    }
    lab.set_testing(false);

    if save {
        let path = open_store(&config)?
            .save_gridworld(&lab)
            .context("saving grid-world policy")?;
        println!("policy saved to {}", path.display());
    }
    Ok(())
}

fn run_snake(config: AppConfig, episodes: u64, load: bool, save: bool) -> Result<()> {
    let mut lab = SnakeLab::new(config.snake.clone()).context("building snake board")?;
    if load {
        open_store(&config)?
            .load_snake(&mut lab)
            .context("loading snake policy")?;
    }

    let target = lab.episode() + episodes;
    while lab.episode() < target {
        lab.step();
    }
    println!(
        "{} episodes, high score {}, mean reward over the last 50: {:.2}",
        lab.episode(),
        lab.high_score(),
        lab.reward_history().average(50)
    );
    println!("{} states learned", lab.q_table().len());

    if save {
        let path = open_store(&config)?
            .save_snake(&lab)
            .context("saving snake policy")?;
        println!("policy saved to {}", path.display());
    }
    Ok(())
}

fn run_neural(mut config: AppConfig, dataset: Option<Dataset>, epochs: usize) -> Result<()> {
    if let Some(dataset) = dataset {
        config.neural.dataset = dataset;
    }
    let mut playground = NeuralPlayground::new(config.neural).context("building network")?;
    println!(
        "topology {:?}, {} parameters, {} points",
        playground.topology(),
        playground.parameter_count(),
        playground.points().len()
    );

    for _ in 0..epochs {
        if let Err(err) = playground.train_epoch() {
            bail!("training stopped: {err}");
        }
        if playground.epoch() % 100 == 0 {
            println!("epoch {:>6}  loss {:.4}", playground.epoch(), playground.loss());
        }
    }
    if let Some(accuracy) = playground.accuracy()? {
        println!("accuracy {:.1}%", accuracy * 100.0);
    }
    Ok(())
}

fn run_supervised(mut config: AppConfig, task: Option<SupervisedTask>, ticks: usize) -> Result<()> {
    if let Some(task) = task {
        config.supervised.task = task;
    }
    let mut lab = SupervisedLab::new(config.supervised).context("building model")?;
    match lab.task() {
        SupervisedTask::Regression => {
            for i in 0..10 {
                let x = i as f64 / 9.0;
                lab.add_point(x, 0.6 * x + 0.2, 0);
            }
        }
        SupervisedTask::Classification => {
            for i in 0..5 {
                let t = i as f64 / 10.0;
                lab.add_point(0.1 + t, 0.2 + t * 0.5, 0);
                lab.add_point(0.5 + t, 0.8 - t * 0.3, 1);
            }
        }
    }

    for _ in 0..ticks {
        if let Err(err) = lab.tick() {
            bail!("training stopped: {err}");
        }
    }
    println!(
        "{:?}: {} steps, loss {:.6}, parameters {:?}",
        lab.task(),
        lab.epoch(),
        lab.loss(),
        lab.model().parameters()
    );
    if let Some((slope, intercept)) = lab.decision_boundary() {
        println!("decision boundary: y = {slope:.3} x + {intercept:.3}");
    }
    Ok(())
}

fn run_kmeans(
    mut config: AppConfig,
    k: Option<usize>,
    preset: Option<KMeansPreset>,
    max_iterations: usize,
) -> Result<()> {
    if let Some(k) = k {
        config.kmeans.k = k;
    }
    if let Some(preset) = preset {
        config.kmeans.preset = preset;
    }
    let mut engine = KMeansEngine::new(config.kmeans).context("building k-means")?;
    let taken = drive(&mut engine, max_iterations);
    println!(
        "{}: {} points, {} iterations, converged {}, inertia {:.2}",
        engine.name(),
        engine.points().len(),
        taken,
        engine.is_converged(),
        engine.inertia()
    );
    for (i, c) in engine.centroids().iter().enumerate() {
        let members = engine
            .points()
            .iter()
            .filter(|p| p.cluster == Some(i))
            .count();
        println!("  centroid {i}: ({:.1}, {:.1}) with {members} points", c.x, c.y);
    }
    Ok(())
}
