use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use deskpilot_client::{ClientConfig, CommandTemplate, Controller};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "deskpilot", about = "Interactive desktop control shell", long_about = None)]
struct Args {
    /// Server address
    #[arg(long, default_value = "localhost")]
    ip: String,

    /// Server port
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Template wrapped around every expression, must contain `{command}`
    #[arg(long)]
    template: Option<CommandTemplate>,

    /// Directory screenshots are saved to
    #[arg(long, default_value = "screenshots")]
    screenshots_dir: PathBuf,

    /// Seconds to wait after a command before taking a screenshot
    #[arg(long, default_value_t = 2.0)]
    settle: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settle = Duration::try_from_secs_f64(args.settle).context("invalid settle delay")?;

    let mut config = ClientConfig::new(&args.ip, args.port);
    if let Some(template) = args.template {
        config = config.with_template(template);
    }

    let controller = Controller::new(config)?;
    tokio::fs::create_dir_all(&args.screenshots_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create screenshots directory {}",
                args.screenshots_dir.display()
            )
        })?;

    println!("controlling {}:{}", args.ip, args.port);
    println!("type 'exit' or 'quit' to leave");
    println!("enter an automation expression, e.g. pyautogui.position()");
    println!(r#"or a JSON action, e.g. {{"action_type": "CLICK", "x": 100, "y": 100}}"#);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut counter = 1;

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        run_line(&controller, line).await;

        tokio::time::sleep(settle).await;

        let Some(screenshot) = controller.fetch_screenshot().await else {
            println!("could not get a screenshot");
            continue;
        };

        let path = screenshot_path(&args.screenshots_dir, counter);
        match tokio::fs::write(&path, screenshot).await {
            Ok(()) => {
                println!("screenshot saved to {}", path.display());
                counter += 1;
            }
            Err(error) => tracing::error!("failed to save {}: {error}", path.display()),
        }
    }

    Ok(())
}

async fn run_line(controller: &Controller, line: &str) {
    match serde_json::from_str::<Value>(line) {
        Ok(action @ (Value::Object(_) | Value::String(_))) => {
            match controller.execute_json(action).await {
                Ok(results) => {
                    for result in results {
                        println!("{}", describe(result));
                    }
                    println!("action done");
                }
                Err(error) => println!("invalid action: {error}"),
            }
        }
        _ => {
            let result = controller.run_command(line).await;
            println!("{}", describe(result));
        }
    }
}

fn describe<T: std::fmt::Debug>(result: Option<T>) -> String {
    match result {
        Some(result) => format!("result: {result:?}"),
        None => "no result".to_string(),
    }
}

fn screenshot_path(dir: &Path, counter: usize) -> PathBuf {
    dir.join(format!("screenshot_{counter}.png"))
}
