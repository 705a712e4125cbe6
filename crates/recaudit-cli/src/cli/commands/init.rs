use crate::cli::args::InitArgs;
use crate::exit_codes::{ReasonCode, SUCCESS};
use crate::templates::STARTER_CONFIG;

pub(crate) fn run(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() && !args.force {
        eprintln!(
            "error: {} already exists (use --force to overwrite)",
            args.config.display()
        );
        return Ok(ReasonCode::EInvalidArgs.exit_code());
    }
    std::fs::write(&args.config, STARTER_CONFIG)?;
    eprintln!("Wrote {}", args.config.display());
    eprintln!("Next: edit the task list, then `recaudit validate --config {}`",
        args.config.display());
    Ok(SUCCESS)
}
