#![windows_subsystem = "windows"]
use std::io::{self, BufRead, Write};
use std::panic::AssertUnwindSafe;

use photo_prompt_core::config::Config;
use photo_prompt_core::logging;
use photo_prompt_core::protocol::Session;
use tracing::{error, info};

fn main() {
    logging::init();

    let config = Config::load();
    info!(
        data_dir = %config.data_dir.display(),
        edit_model = %config.edit_model,
        analyze_model = %config.analyze_model,
        api_key = config.has_api_key(),
        "starting photo-prompt-core"
    );

    let mut session = match Session::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to start session");
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };

        if line.trim().is_empty() {
            continue;
        }

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            session.handle(&line, &mut |frame| {
                // progress goes out as soon as it is produced
                let _ = writeln!(io::stdout(), "{frame}");
                let _ = io::stdout().flush();
            })
        }));

        let response = match result {
            Ok(resp) => resp,
            Err(_) => {
                error!("panic while handling request");
                serde_json::json!({
                    "status": "error",
                    "message": "internal core error"
                })
                .to_string()
            }
        };

        if writeln!(stdout, "{response}").is_err() {
            break;
        }

        let _ = stdout.flush();
    }
}
