use std::io::Write;
use std::time::Duration;

use recaudit_core::status::StatusTracker;

use crate::cli::args::WatchArgs;
use crate::exit_codes::SUCCESS;

use super::status::render_status;

fn render_once(path: &std::path::Path, clear: bool, last: &mut Option<String>) {
    let rendered = match StatusTracker::load(path) {
        Ok(state) => render_status(&state),
        Err(_) => format!("waiting for {}...\n", path.display()),
    };
    if last.as_deref() == Some(rendered.as_str()) {
        return;
    }
    if clear {
        print!("\x1B[2J\x1B[H");
        let _ = std::io::stdout().flush();
    }
    eprintln!(
        "[{}]",
        chrono::Local::now().format("%H:%M:%S")
    );
    eprint!("{rendered}");
    eprintln!("---");
    *last = Some(rendered);
}

pub(crate) async fn run(args: WatchArgs) -> anyhow::Result<i32> {
    let status_path = args.experiment_dir.join("status.json");
    let interval = Duration::from_millis(args.interval_ms.max(100));

    eprintln!("Watching {} (Ctrl+C to stop)", status_path.display());
    let mut last: Option<String> = None;
    render_once(&status_path, args.clear, &mut last);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Stopping watch loop.");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        render_once(&status_path, args.clear, &mut last);
    }

    Ok(SUCCESS)
}
