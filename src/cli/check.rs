//! hierlock check command implementation
//!
//! Holds the first request on a fresh in-process substrate, attempts the
//! second with a short deadline, and compares what happened with the
//! prediction from the resolved paths.

use serde::Serialize;

use crate::config::{parse_duration, Config};
use crate::coordinator::{AcquireOptions, LockCoordinator};
use crate::error::{Error, Result};
use crate::hierarchy::{LockMode, LockRequest, LockTarget};
use crate::memory::MemorySubstrate;
use crate::output::{emit_success, HumanOutput, OutputOptions};

pub struct CheckOptions {
    pub first: String,
    pub second: String,
    pub wait: String,
    pub config: Config,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct SharedTarget {
    target: LockTarget,
    first: LockMode,
    second: LockMode,
}

#[derive(Serialize)]
struct CheckReport {
    first: String,
    second: String,
    predicted: &'static str,
    observed: &'static str,
    shared_targets: Vec<SharedTarget>,
}

fn verdict(blocks: bool) -> &'static str {
    if blocks {
        "blocks"
    } else {
        "compatible"
    }
}

pub fn run(options: CheckOptions) -> Result<()> {
    let first: LockRequest = options.first.parse()?;
    let second: LockRequest = options.second.parse()?;
    let wait = parse_duration(&options.wait)?;

    let substrate = MemorySubstrate::new(options.config.substrate.settings()?);
    let coordinator = LockCoordinator::new(substrate, options.config.bucket_space()?);

    let first_path = first.resolve(coordinator.hasher())?;
    let second_path = second.resolve(coordinator.hasher())?;
    let predicted = first_path.conflicts_with(&second_path);

    let shared_targets: Vec<SharedTarget> = first_path
        .steps()
        .iter()
        .filter_map(|step| {
            second_path.mode_of(&step.target).map(|theirs| SharedTarget {
                target: step.target,
                first: step.mode,
                second: theirs,
            })
        })
        .collect();

    let mut held = coordinator.acquire_path(first_path, &AcquireOptions::default())?;
    let observed = match coordinator.acquire_path(second_path, &AcquireOptions::with_timeout(wait)) {
        Ok(mut handle) => {
            handle.release();
            false
        }
        Err(Error::Timeout { .. }) | Err(Error::Conflict { .. }) => true,
        Err(err) => return Err(err),
    };
    held.release();

    let mut human = HumanOutput::new(format!("{first} vs {second}: {}", verdict(observed)));
    human.push_summary("predicted", verdict(predicted));
    human.push_summary("observed", verdict(observed));
    for shared in &shared_targets {
        human.push_detail(format!(
            "{} held {} / requested {}",
            shared.target, shared.first, shared.second
        ));
    }
    if predicted != observed {
        human.push_warning("observed behaviour differs from the conflict prediction");
    }

    let report = CheckReport {
        first: first.to_string(),
        second: second.to_string(),
        predicted: verdict(predicted),
        observed: verdict(observed),
        shared_targets,
    };
    emit_success(options.output, "check", &report, Some(&human))
}
