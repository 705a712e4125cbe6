use recaudit_core::errors::RunError;
use recaudit_core::load_config;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::exit_codes::{ReasonCode, SUCCESS};

pub(crate) fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let cfg = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            let run_err = RunError::from_anyhow(&e);
            eprintln!("error: {}", run_err.message);
            return Ok(ReasonCode::from_run_error(&run_err).exit_code());
        }
    };

    let diags = cfg.validate();
    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&diags)?);
        }
        OutputFormat::Text => {
            if diags.is_empty() {
                eprintln!(
                    "{}: ok ({} tasks)",
                    args.config.display(),
                    cfg.tasks.len()
                );
            }
            for d in &diags {
                eprintln!("{d}");
            }
        }
    }

    if diags.iter().any(|d| d.is_error()) {
        Ok(ReasonCode::ECfgParse.exit_code())
    } else {
        Ok(SUCCESS)
    }
}
