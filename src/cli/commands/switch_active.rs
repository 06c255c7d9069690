use crate::cli::commands::SwitchActiveArgs;
use crate::cli::Output;
use crate::deploy::{link, status};
use anyhow::{bail, Context, Result};
use std::fs;

pub async fn run(args: &SwitchActiveArgs) -> Result<()> {
    let versioned_dir = status::agent_dir(&args.target, &args.version);

    let meta = fs::metadata(&versioned_dir).with_context(|| {
        format!(
            "version {} is not deployed under {}",
            args.version,
            args.target.display()
        )
    })?;
    if !meta.is_dir() {
        bail!("{} is not a directory", versioned_dir.display());
    }

    link::switch_active(&args.work, &versioned_dir)?;

    Output::success(&format!("Active link now points at {}", args.version));
    Ok(())
}
