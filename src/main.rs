use anyhow::Context;
use clap::Parser;
use quadlearn::{
    config::ControllerConfig,
    control::{Controller, FrameClock},
    learner::{DeepQLearner, Learner, RandomLearner},
    physics::{Physics, RawKinematics, RigidBody, World},
    Point,
};
use rand::{rngs::StdRng, SeedableRng};
use std::{fs, path::PathBuf};

/// Trains a quadcopter hover controller online, headless.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Number of ticks to run.
    #[arg(long, default_value_t = 20_000)]
    ticks: u64,

    /// JSON configuration; missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fixed frame rate. Omit to measure the wall-clock rate instead.
    #[arg(long)]
    fps: Option<f64>,

    /// Overrides the configured seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Learner snapshot to load before training.
    #[arg(long)]
    load: Option<PathBuf>,

    /// Where to write the learner snapshot when done.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Ticks between progress reports.
    #[arg(long, default_value_t = 1000)]
    report_every: u64,

    /// Act at random instead of learning.
    #[arg(long)]
    random: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ControllerConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let rng = || match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };
    let learner: Box<dyn Learner> = if args.random {
        Box::new(RandomLearner::new(rng()))
    } else {
        Box::new(DeepQLearner::new(config.learner.clone(), rng()))
    };

    let mut world = World::new(&config.world);
    let body = world.add_body(RigidBody::new(
        config.quad.mass,
        config.quad.half_extents(),
        config.quad.collision_radius,
    ));
    world.set_kinematics(body, RawKinematics::at_rest(Point::origin()));

    let mut controller = Controller::new(&config, world, body, learner);
    if let Some(path) = &args.load {
        let blob = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        controller.restore(&blob)?;
        log::info!("loaded learner from {}", path.display());
    }

    let mut clock = FrameClock::new();
    let mut error_sum = 0.0;
    for tick in 1..=args.ticks {
        let fps = args.fps.unwrap_or_else(|| clock.frame());
        let report = controller.tick(config.timestep.timestep(fps))?;
        error_sum += report.training_error;

        if args.report_every > 0 && tick % args.report_every == 0 {
            let scores = controller.diagnostics();
            let line: Vec<String> = scores
                .diagnostics()
                .iter()
                .map(|(name, value)| format!("{}={:.2}", name, value))
                .collect();
            println!(
                "tick {:>7} respawns {:>4} mean error {:+.4} | {}",
                tick,
                controller.resets(),
                error_sum / args.report_every as f64,
                line.join(" ")
            );
            error_sum = 0.0;
        }
    }

    if let Some(path) = &args.save {
        fs::write(path, controller.snapshot()?)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("saved learner to {}", path.display());
    }
    controller.stop();
    Ok(())
}
