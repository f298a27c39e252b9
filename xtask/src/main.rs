use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

/// Exit status of a harness run where every selected subtest skipped
const HARNESS_EXIT_SKIP: i32 = 77;

#[derive(Parser)]
#[command(name = "x")]
#[command(about = "Development automation for pm-rpm")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// fmt check, clippy, tests, then a full simulated run
    Ci,
    /// Format code
    Fmt {
        #[arg(long)]
        check: bool,
    },
    /// Run clippy with warnings denied
    Clippy,
    /// Run tests
    Test {
        /// Restrict to these library modules (sim, oracle, kms, gem, ...)
        #[arg(long = "module")]
        modules: Vec<String>,
        /// Run the `#[ignore]`d tests that need an i915 GPU
        #[arg(long)]
        hardware: bool,
    },
    /// Run benchmarks
    Bench,
    /// Run subtests against the simulated device
    Sim {
        #[arg(long)]
        release: bool,
        /// Subtests to run, all if empty
        #[arg(long = "subtest")]
        subtests: Vec<String>,
        /// Write the JSON report here
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Run subtests on this machine's GPU (needs root)
    Hw {
        /// Also compare raw registers across suspend
        #[arg(long)]
        register_compare: bool,
        #[arg(long = "subtest")]
        subtests: Vec<String>,
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => run_ci(),
        Commands::Fmt { check } => run_fmt(check),
        Commands::Clippy => cargo(&["clippy", "--all-targets", "--", "-D", "warnings"]),
        Commands::Test { modules, hardware } => run_test(&modules, hardware),
        Commands::Bench => cargo(&["bench"]),
        Commands::Sim {
            release,
            subtests,
            json,
        } => run_sim(release, &subtests, json),
        Commands::Hw {
            register_compare,
            subtests,
            json,
        } => run_hw(register_compare, &subtests, json),
    }
}

fn run_ci() -> Result<()> {
    println!("{}", "=== CI ===".bold().blue());
    let start = Instant::now();

    step("Format check", || run_fmt(true))?;
    step("Clippy", || cargo(&["clippy", "--all-targets", "--", "-D", "warnings"]))?;
    step("Tests", || run_test(&[], false))?;
    // A skip-only simulated run means the simulator lost its platform
    step("Simulated run", || {
        let args = harness_args(&["--simulate"], &[], None);
        let code = run_harness(sim_command(false, args))?;
        if code == HARNESS_EXIT_SKIP {
            anyhow::bail!("every subtest skipped on the simulated device");
        }
        Ok(())
    })?;

    println!(
        "\n{} {}",
        "✓ CI passed in".green().bold(),
        format!("{:.2}s", start.elapsed().as_secs_f64()).bold()
    );
    Ok(())
}

fn run_fmt(check: bool) -> Result<()> {
    if check {
        cargo(&["fmt", "--all", "--", "--check"])
    } else {
        cargo(&["fmt", "--all"])
    }
}

fn run_test(modules: &[String], hardware: bool) -> Result<()> {
    let tail: &[&str] = if hardware { &["--", "--ignored"] } else { &[] };

    if modules.is_empty() {
        let mut args = vec!["test", "--workspace"];
        if hardware {
            // Hardware tests live in tests/hardware.rs only
            args.extend(["--test", "hardware"]);
        }
        args.extend(tail);
        return cargo(&args);
    }

    let mut failed = Vec::new();
    for module in modules {
        let filter = format!("core::{module}");
        println!("{} {} tests", "→".blue(), module.bold());

        let mut args = vec!["test", "--lib", filter.as_str()];
        args.extend(tail);
        if cargo(&args).is_err() {
            failed.push(module.as_str());
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("tests failed in: {}", failed.join(", "))
    }
}

fn run_sim(release: bool, subtests: &[String], json: Option<PathBuf>) -> Result<()> {
    println!("{}", "=== Simulated run ===".bold().blue());
    let args = harness_args(&["--simulate"], subtests, json.as_ref());
    report_harness_exit(run_harness(sim_command(release, args))?)
}

fn run_hw(register_compare: bool, subtests: &[String], json: Option<PathBuf>) -> Result<()> {
    println!("{}", "=== Hardware run ===".bold().blue());

    if !std::path::Path::new("/sys/kernel/debug/dri").exists() {
        println!("{} debugfs not readable, run as root", "ℹ".blue());
    }

    cargo(&["build", "--release", "--bin", "pm-rpm"])?;

    let flags: &[&str] = if register_compare {
        &["--do-register-compare"]
    } else {
        &[]
    };
    let mut cmd = Command::new("target/release/pm-rpm");
    cmd.args(harness_args(flags, subtests, json.as_ref()));
    report_harness_exit(run_harness(cmd)?)
}

fn harness_args(flags: &[&str], subtests: &[String], json: Option<&PathBuf>) -> Vec<OsString> {
    let mut args: Vec<OsString> = flags.iter().map(OsString::from).collect();
    for subtest in subtests {
        args.push("--run-subtest".into());
        args.push(subtest.into());
    }
    if let Some(path) = json {
        args.push("--json".into());
        args.push(path.into());
    }
    args
}

fn sim_command(release: bool, args: Vec<OsString>) -> Command {
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "--quiet", "--bin", "pm-rpm"]);
    if release {
        cmd.arg("--release");
    }
    cmd.arg("--").args(args);
    cmd
}

/// Run the harness and return its exit code; 0 and 77 are not errors
fn run_harness(mut cmd: Command) -> Result<i32> {
    let status = cmd
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;

    match status.code() {
        Some(code @ (0 | HARNESS_EXIT_SKIP)) => Ok(code),
        _ => anyhow::bail!("harness failed with {}", status),
    }
}

fn report_harness_exit(code: i32) -> Result<()> {
    if code == HARNESS_EXIT_SKIP {
        println!("\n{} All subtests skipped", "ℹ".yellow().bold());
    } else {
        println!("\n{} No subtest failed", "✓".green().bold());
    }
    Ok(())
}

fn step<F>(name: &str, task: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    println!("{} {}", "→".blue(), name);
    let start = Instant::now();

    match task() {
        Ok(()) => {
            println!(
                "{} {} ({:.2}s)",
                "✓".green().bold(),
                name,
                start.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red().bold(), name);
            Err(e)
        }
    }
}

fn cargo(args: &[&str]) -> Result<()> {
    let status = Command::new("cargo")
        .args(args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;

    if !status.success() {
        anyhow::bail!("cargo {} failed with {}", args.join(" "), status);
    }
    Ok(())
}
