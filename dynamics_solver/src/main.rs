use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use dynamics_solver::{ChainDynamicsSolver, DynamicsSolver, Wrench};
use multibody::RobotModel;
use nalgebra::Vector3;
use std::{error::Error, path::PathBuf, process::ExitCode, sync::Arc};
use tracing_subscriber::EnvFilter;

/// Inverse dynamics and payload limits for a serial joint group
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Robot description (.ron)
    #[arg(short, long)]
    model: PathBuf,
    /// Joint group to solve for
    #[arg(short, long)]
    group: String,
    /// Gravity vector in the base frame
    #[arg(
        long,
        num_args = 3,
        value_names = ["GX", "GY", "GZ"],
        allow_negative_numbers = true,
        default_values_t = vec![0.0, 0.0, -9.81]
    )]
    gravity: Vec<f64>,
    /// Log more (-v debug, -vv trace). RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Joint torques for a motion sample without external wrenches
    Torques {
        #[arg(long, num_args = 1.., allow_negative_numbers = true, required = true)]
        positions: Vec<f64>,
        /// Defaults to zero
        #[arg(long, num_args = 1.., allow_negative_numbers = true)]
        velocities: Vec<f64>,
        /// Defaults to zero
        #[arg(long, num_args = 1.., allow_negative_numbers = true)]
        accelerations: Vec<f64>,
    },
    /// Maximum point mass the tip can hold at rest
    Payload {
        #[arg(long, num_args = 1.., allow_negative_numbers = true, required = true)]
        positions: Vec<f64>,
    },
    /// Joint torques holding a point mass at the tip, at rest
    PayloadTorques {
        #[arg(long, num_args = 1.., allow_negative_numbers = true, required = true)]
        positions: Vec<f64>,
        /// Payload mass in kg
        #[arg(long)]
        mass: f64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let model = Arc::new(RobotModel::load(&cli.model)?);
    let gravity = Vector3::from_column_slice(&cli.gravity);
    let dynamics: DynamicsSolver = DynamicsSolver::new(model, &cli.group, gravity);
    let solver = dynamics.solver()?;

    println!(
        "{} '{}' from '{}' to '{}'",
        "group".bright_blue(),
        solver.group_name(),
        solver.base_name(),
        solver.tip_name()
    );

    let n = solver.num_joints();
    let or_zeros = |values: Vec<f64>| if values.is_empty() { vec![0.0; n] } else { values };

    match cli.command {
        Commands::Torques {
            positions,
            velocities,
            accelerations,
        } => {
            let wrenches = vec![Wrench::zeros(); solver.num_segments()];
            let mut torques = vec![0.0; n];
            solver.torques(
                &positions,
                &or_zeros(velocities),
                &or_zeros(accelerations),
                &wrenches,
                &mut torques,
            )?;
            print_torques(solver, &torques);
        }
        Commands::Payload { positions } => {
            let result = solver.max_payload(&positions)?;
            let tip = solver.chain().forward_kinematics(&positions)?.translation.vector;
            println!(
                "{} ({:.4}, {:.4}, {:.4}) in '{}'",
                "tip at".bright_blue(),
                tip.x,
                tip.y,
                tip.z,
                solver.base_name()
            );
            let names = solver.chain().joint_names();
            match result.saturated_joint {
                Some(joint) => println!(
                    "{} {:.4} kg, limited by '{}'",
                    "max payload".bright_blue(),
                    result.mass,
                    names[joint]
                ),
                None => println!(
                    "{} unbounded, no joint responds to a tip load",
                    "max payload".bright_blue()
                ),
            }
        }
        Commands::PayloadTorques { positions, mass } => {
            let mut torques = vec![0.0; n];
            solver.payload_torques(&positions, mass, &mut torques)?;
            print_torques(solver, &torques);
        }
    }
    Ok(())
}

fn print_torques(solver: &ChainDynamicsSolver, torques: &[f64]) {
    let names = solver.chain().joint_names();
    for ((name, tau), limit) in names.iter().zip(torques).zip(solver.max_torques()) {
        let value = format!("{tau:>12.4}");
        let value = if tau.abs() > *limit {
            value.red()
        } else {
            value.green()
        };
        println!("{name:>20} {value} / {limit:.4}");
    }
}
