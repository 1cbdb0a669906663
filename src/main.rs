use std::time::Instant;

use clap::Parser;
use log::{error, info};

use cell_list::cli::{self, Args};
use cell_list::particle::seeded_particles;
use cell_list::trajectory::{self, SnapshotSink};
use cell_list::{ParallelScheduler, Result, RunOptions, Scheduler, SerialScheduler, Simulation};

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let settings = cli::load_and_apply_config(args)?;
    let physics = settings.physics.clone();
    let n = args.particles;

    let particles = seeded_particles(n, physics.domain_side(n), settings.run.seed);
    let mut sim = Simulation::with_density(particles, physics)?;

    let mut writer = trajectory::open_sink(args.output.as_deref());
    let sink = writer.as_mut().map(|w| w as &mut dyn SnapshotSink);

    let scheduler: Box<dyn Scheduler> = if args.serial {
        Box::new(SerialScheduler)
    } else {
        Box::new(ParallelScheduler::new(
            settings.resolved_threads(),
            settings.run.migration,
        )?)
    };
    let options = RunOptions {
        steps: settings.run.steps,
        save_frequency: settings.run.save_frequency,
        verify: args.verify,
    };

    let started = Instant::now();
    let report = scheduler.run(&mut sim, &options, sink)?;
    let simulation_time = started.elapsed().as_secs_f64();

    if args.serial {
        println!("n = {n}, simulation time = {simulation_time} seconds");
    } else {
        println!(
            "n = {n}, threads = {}, simulation time = {simulation_time} seconds",
            report.threads
        );
    }
    info!(
        "{} scheduler finished {} steps: {} snapshots, {} cell migrations",
        scheduler.name(),
        report.steps,
        report.snapshots,
        report.migrations
    );
    Ok(())
}
