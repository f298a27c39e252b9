// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{error, info};
use pm_rpm::core::sim::{SimBackend, SimConfig};
use pm_rpm::PmError;
use pm_rpm::core::{
    Backend, HardwareBackend, Harness, HarnessConfig, RunOptions, RunReport, ScenarioRunner,
    Subtest,
};

/// i915 runtime power management tests
#[derive(Parser)]
#[command(name = "pm-rpm")]
#[command(about = "Runtime PM and PC8+ residency tests for Intel GPUs", long_about = None)]
struct Args {
    /// Also run register-compare (reads raw MMIO)
    #[arg(long)]
    do_register_compare: bool,

    /// Run only this subtest (repeatable)
    #[arg(long = "run-subtest", value_name = "NAME")]
    run_subtest: Vec<Subtest>,

    /// Print the subtest names and exit
    #[arg(long)]
    list_subtests: bool,

    /// TOML file overriding device paths
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Run against the in-process simulated device
    #[arg(long)]
    simulate: bool,

    /// Write the run report as JSON to this file
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,
}

fn run(args: &Args) -> RunReport {
    let selected: Vec<Subtest> = if args.run_subtest.is_empty() {
        Subtest::ALL.to_vec()
    } else {
        args.run_subtest.clone()
    };

    let config = match HarnessConfig::resolve(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return RunReport::setup_failed(&selected, &e);
        }
    };

    let mut backend: Box<dyn Backend> = if args.simulate {
        info!("Using the simulated device");
        Box::new(SimBackend::new(SimConfig::default()))
    } else {
        Box::new(HardwareBackend::new(config.clone()))
    };

    let mut harness = match Harness::setup(config, backend.as_mut()) {
        Ok(harness) => harness,
        Err(e) => {
            if e.is_skip() {
                info!("Setup skipped: {}", e);
            } else {
                error!("Setup failed: {}", e);
            }
            return RunReport::setup_failed(&selected, &e);
        }
    };

    let options = RunOptions {
        do_register_compare: args.do_register_compare,
    };
    ScenarioRunner::new(&mut harness, options).run_all(&selected)
}

fn main() {
    // Load .env before the logger reads RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize logger with default level INFO
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    if args.list_subtests {
        for subtest in Subtest::ALL {
            println!("{}", subtest);
        }
        return;
    }

    info!("pm-rpm v{}", env!("CARGO_PKG_VERSION"));

    let report = run(&args);

    info!(
        "{} passed, {} skipped, {} failed",
        report.passed(),
        report.skipped(),
        report.failed()
    );

    if let Some(path) = &args.json {
        let written = report
            .to_json()
            .and_then(|json| fs::write(path, json).map_err(PmError::from));
        match written {
            Ok(()) => info!("Report written to {}", path.display()),
            Err(e) => error!("Failed to write report to {}: {}", path.display(), e),
        }
    }

    process::exit(report.exit_code());
}
