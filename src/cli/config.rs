//! hierlock config command implementation

use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};

pub fn run(config: Config, output: OutputOptions) -> Result<()> {
    let settings = config.substrate.settings()?;

    let mut human = HumanOutput::new("Effective configuration");
    human.push_summary("buckets.top", config.buckets.top.to_string());
    human.push_summary("buckets.child", config.buckets.child.to_string());
    human.push_summary("buckets.leaf", config.buckets.leaf.to_string());
    human.push_summary("substrate.wait_mode", format!("{:?}", settings.wait_mode).to_lowercase());
    human.push_summary(
        "substrate.lock_wait_timeout",
        settings
            .lock_wait_timeout
            .map(|timeout| format!("{timeout:?}"))
            .unwrap_or_else(|| "off".to_string()),
    );
    human.push_summary(
        "substrate.deadlock_detection",
        settings.deadlock_detection.to_string(),
    );
    human.push_summary(
        "substrate.provisioning",
        format!("{:?}", settings.provisioning).to_lowercase(),
    );
    if !settings.deadlock_detection {
        human.push_warning("deadlocks surface only as lock wait timeouts");
    }

    emit_success(output, "config", &config, Some(&human))
}
