// CLI entry point for the commutativity/idempotence checker

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use katara::aci::{check_aci, check_c, check_i, SolverConfig};
use katara::analysis;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <basename> [c|i]", args[0]);
        std::process::exit(1);
    }

    let basename = &args[1];
    let ll_path = PathBuf::from(format!("tests/{basename}.ll"));
    let loops_path = PathBuf::from(format!("tests/{basename}.loops"));

    let next_state = analysis::analyze(&ll_path, "test_next_state", &loops_path)
        .with_context(|| format!("failed to load lifted routines from {}", ll_path.display()))?;

    let solver = SolverConfig::default();
    match args.get(2).map(String::as_str) {
        None => {
            let (commutativity, idempotence) = check_aci(&next_state, &solver)
                .with_context(|| "commutativity/idempotence check failed")?;
            println!("{commutativity}");
            println!("{idempotence}");
        }
        Some("c") => {
            let report = check_c(&next_state, &solver)
                .with_context(|| "commutativity check failed")?;
            println!("{report}");
        }
        Some("i") => {
            let report = check_i(&next_state, &solver)
                .with_context(|| "idempotence check failed")?;
            println!("{report}");
        }
        Some(other) => {
            eprintln!("Unknown check type '{other}' (expected 'c' or 'i')");
            std::process::exit(1);
        }
    }

    Ok(())
}
