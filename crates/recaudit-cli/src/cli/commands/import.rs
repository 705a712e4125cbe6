use recaudit_core::config::PairMode;
use recaudit_core::errors::RunError;
use recaudit_core::ExperimentConfig;

use crate::cli::args::ImportArgs;
use crate::exit_codes::{ReasonCode, SUCCESS};

pub(crate) fn run(args: ImportArgs) -> anyhow::Result<i32> {
    let mode: PairMode = match args.mode.parse::<PairMode>() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {}", e.message);
            return Ok(ReasonCode::EInvalidArgs.exit_code());
        }
    };

    let cfg = match ExperimentConfig::from_pairs_json(&args.pairs, mode) {
        Ok(c) => c,
        Err(e) => {
            let run_err = RunError::from_anyhow(&e);
            eprintln!("error: {}", run_err.message);
            return Ok(ReasonCode::from_run_error(&run_err).exit_code());
        }
    };

    let out = args
        .out
        .unwrap_or_else(|| args.pairs.with_extension("yaml"));
    cfg.to_yaml(&out)?;
    eprintln!(
        "Imported {} task(s) from {} into {}",
        cfg.tasks.len(),
        args.pairs.display(),
        out.display()
    );
    Ok(SUCCESS)
}
