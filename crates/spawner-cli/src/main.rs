//! Spawner CLI - spawn, list and kill worlds on ECS Fargate.
//!
//! Spawning reads a task definition from stdin and prints the world it
//! started. Killing reads one world, or an array of worlds as printed by
//! `--ps`, from stdin.

use std::error::Error;
use std::io::{self, Read};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use spawner_core::{decode_worlds, encode_worlds, Context, Spawner};
use spawner_ecs::{AwsBackend, AwsConfig, Fargate, TaskDefinition};

mod config;

use config::Config;

/// Spawner CLI - world lifecycle on ECS Fargate
#[derive(Debug, Parser)]
#[command(name = "spawner", disable_version_flag = true)]
#[command(about = "Spawn, list and kill worlds running as Fargate tasks", long_about = None)]
struct Cli {
    /// Print the version and the adapter name
    #[arg(short = 'v', long = "version", conflicts_with_all = ["kill", "ps", "example"])]
    version: bool,

    /// Kill the world(s) read from stdin
    #[arg(short = 'k', long = "kill", conflicts_with_all = ["ps", "example"])]
    kill: bool,

    /// Ignore stdin and list the running worlds of a galaxy
    #[arg(long, requires = "galaxy", conflicts_with = "example")]
    ps: bool,

    /// Galaxy (cluster) to list
    #[arg(short, long, requires = "ps")]
    galaxy: Option<String>,

    /// Print a sample task definition
    #[arg(long)]
    example: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

#[derive(Debug, PartialEq)]
enum Command {
    Version,
    Example,
    Kill,
    Ps(String),
    Spawn,
}

impl Cli {
    fn command(&self) -> Command {
        match (&self.galaxy, self.version, self.example, self.kill) {
            (_, true, _, _) => Command::Version,
            (_, _, true, _) => Command::Example,
            (_, _, _, true) => Command::Kill,
            (Some(galaxy), ..) if self.ps => Command::Ps(galaxy.clone()),
            _ => Command::Spawn,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("spawner: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command() {
        Command::Version => {
            println!("{} {}", env!("CARGO_PKG_VERSION"), spawner_ecs::NAME);
            return Ok(());
        }
        Command::Example => {
            println!("{}", serde_json::to_string_pretty(&TaskDefinition::example())?);
            return Ok(());
        }
        _ => {}
    }

    let config = Config::from_env()?;
    let backend = AwsBackend::new(AwsConfig::from_env()?);
    let fargate = Fargate::new(backend).with_config(config.fargate());

    let ctx = root_context(cli.timeout);
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, cancelling");
                interrupt.cancel();
            }
            Err(err) => warn!(?err, "failed to install Ctrl+C handler"),
        }
    });

    match cli.command() {
        Command::Kill => kill(&fargate, &ctx).await,
        Command::Ps(galaxy) => ps(&fargate, &ctx, &galaxy).await,
        _ => spawn(&fargate, &ctx).await,
    }
}

fn root_context(timeout: Option<u64>) -> Context {
    let root = Context::background();
    match timeout {
        Some(secs) => root.with_timeout(Duration::from_secs(secs)),
        None => root.with_cancel(),
    }
}

async fn spawn(spawner: &dyn Spawner, ctx: &Context) -> Result<(), Box<dyn Error>> {
    let mut request = Vec::new();
    io::stdin().lock().read_to_end(&mut request)?;

    let world = spawner.spawn(ctx, &request).await?;
    encode_worlds(io::stdout().lock(), &[world])?;
    Ok(())
}

async fn kill(spawner: &dyn Spawner, ctx: &Context) -> Result<(), Box<dyn Error>> {
    let worlds = decode_worlds(io::stdin().lock())?;
    for world in &worlds {
        spawner.kill(ctx, world).await?;
        info!(world = %world.id, "Killed");
    }
    Ok(())
}

async fn ps(spawner: &dyn Spawner, ctx: &Context, galaxy: &str) -> Result<(), Box<dyn Error>> {
    let worlds = spawner.ps(ctx, galaxy).await?;
    encode_worlds(io::stdout().lock(), &worlds)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("spawner").chain(args.iter().copied()))
    }

    #[test]
    fn test_default_is_spawn() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.command(), Command::Spawn);
        assert_eq!(cli.timeout, None);
    }

    #[test]
    fn test_modes() {
        assert_eq!(parse(&["-v"]).unwrap().command(), Command::Version);
        assert_eq!(parse(&["-k"]).unwrap().command(), Command::Kill);
        assert_eq!(parse(&["--example"]).unwrap().command(), Command::Example);
        assert_eq!(
            parse(&["--ps", "-g", "keepinmind"]).unwrap().command(),
            Command::Ps("keepinmind".to_string())
        );
    }

    #[test]
    fn test_ps_requires_galaxy() {
        assert!(parse(&["--ps"]).is_err());
        assert!(parse(&["-g", "keepinmind"]).is_err());
    }

    #[test]
    fn test_modes_are_exclusive() {
        assert!(parse(&["-k", "--ps", "-g", "c1"]).is_err());
        assert!(parse(&["-k", "-v"]).is_err());
        assert!(parse(&["-v", "--ps", "-g", "c1"]).is_err());
        assert!(parse(&["--example", "-k"]).is_err());
    }

    #[test]
    fn test_timeout() {
        let cli = parse(&["--timeout", "30", "-k"]).unwrap();
        assert_eq!(cli.timeout, Some(30));
        assert!(parse(&["--timeout", "soon"]).is_err());
    }

    #[tokio::test]
    async fn test_root_context_deadline() {
        assert!(root_context(None).deadline().is_none());
        assert!(root_context(Some(5)).deadline().is_some());
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_panic() {
        let cli = parse(&["--timeout", "18446744073709551615"]).unwrap();
        let ctx = root_context(cli.timeout);
        assert!(ctx.deadline().is_none());
        assert_eq!(ctx.err(), None);
    }
}
