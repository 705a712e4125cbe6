mod import;
mod init;
mod run;
mod status;
mod validate;
mod watch;

use crate::cli::args::{Cli, Command};
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args).await,
        Command::Validate(args) => validate::run(args),
        Command::Init(args) => init::run(args),
        Command::Import(args) => import::run(args),
        Command::Status(args) => status::run(args),
        Command::Watch(args) => watch::run(args).await,
        Command::Version => {
            println!("recaudit {}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
