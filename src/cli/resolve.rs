//! hierlock resolve / resolve-leaves command implementation

use serde::Serialize;

use crate::bucket::BucketHasher;
use crate::config::Config;
use crate::error::Result;
use crate::hierarchy::{resolve_leaves, LockRequest, PathStep, ResolvedPath};
use crate::output::{emit_success, HumanOutput, OutputOptions};

pub struct ResolveOptions {
    pub request: String,
    pub config: Config,
    pub output: OutputOptions,
}

pub struct ResolveLeavesOptions {
    pub top: String,
    pub child: String,
    pub leaves: Vec<String>,
    pub config: Config,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct ResolveReport<'a> {
    request: String,
    steps: &'a [PathStep],
}

pub fn run_resolve(options: ResolveOptions) -> Result<()> {
    let request: LockRequest = options.request.parse()?;
    let hasher = BucketHasher::new(options.config.bucket_space()?);
    let path = request.resolve(&hasher)?;

    emit(options.output, "resolve", request.to_string(), &path)
}

pub fn run_resolve_leaves(options: ResolveLeavesOptions) -> Result<()> {
    let hasher = BucketHasher::new(options.config.bucket_space()?);
    let path = resolve_leaves(&hasher, &options.top, &options.child, &options.leaves)?;
    let label = format!(
        "leaves:{}/{}/[{}]",
        options.top,
        options.child,
        options.leaves.join(",")
    );

    emit(options.output, "resolve-leaves", label, &path)
}

fn emit(output: OutputOptions, command: &str, label: String, path: &ResolvedPath) -> Result<()> {
    let mut human = HumanOutput::new(format!("Resolved {label}"));
    human.push_summary("targets", path.len().to_string());
    for (idx, step) in path.steps().iter().enumerate() {
        human.push_detail(format!(
            "{idx}: {} {} ({})",
            step.target, step.mode, step.chain
        ));
    }

    let report = ResolveReport {
        request: label,
        steps: path.steps(),
    };
    emit_success(output, command, &report, Some(&human))
}
