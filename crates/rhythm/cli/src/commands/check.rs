//! Lint a Rhythm without running it

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::*;
use rhythm_sandbox::{outline, RhythmOutline};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_single, print_success, print_warning, OutputFormat};

/// Arguments for `rhythm check`
#[derive(Args)]
pub struct CheckArgs {
    /// Rhythm script
    #[arg(short, long)]
    pub rhythm: PathBuf,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,
}

#[derive(Serialize, Tabled)]
struct FunctionRow {
    #[tabled(rename = "Function")]
    name: String,
    #[tabled(rename = "Params")]
    params: String,
    #[tabled(rename = "Hook")]
    hook: &'static str,
}

fn function_rows(outline: &RhythmOutline) -> Vec<FunctionRow> {
    outline
        .functions
        .iter()
        .map(|f| FunctionRow {
            name: f.name.clone(),
            params: f.params.join(", "),
            hook: match (f.name.as_str(), f.params.len()) {
                ("init", 0) | ("main", 1) | ("finalize", 1) => "yes",
                _ => "",
            },
        })
        .collect()
}

/// Execute a check
pub fn execute(args: CheckArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.rhythm)
        .with_context(|| format!("reading rhythm {}", args.rhythm.display()))?;
    let outline = outline(&source)?;

    match args.output {
        OutputFormat::Json => print_single(&outline),
        OutputFormat::Table => {
            print_output(function_rows(&outline), OutputFormat::Table);
            for warning in &outline.warnings {
                print_warning(warning);
            }
        }
    }

    if !outline.is_runnable() {
        bail!("{} does not define main(post)", args.rhythm.display());
    }
    if matches!(args.output, OutputFormat::Table) {
        print_success(&format!("{} is runnable", args.rhythm.display().to_string().bold()));
    }
    Ok(())
}
