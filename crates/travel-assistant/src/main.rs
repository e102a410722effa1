//! The travel assistant in the terminal.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::pin::pin;
use std::process::ExitCode;
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use travel_assistant::core::{CORRECTION_PLACEHOLDER, Transcript, TurnStage};
use travel_assistant::prompts::PromptMetadata;
use travel_assistant::{AppConfig, SessionBuilder};
use travel_assistant_gemini_model::{GeminiConfigBuilder, GeminiProvider};

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    debug!("starting with {config:?}");

    let mut gemini_config =
        GeminiConfigBuilder::with_api_key(&config.google_api_key);
    if let Some(base_url) = &config.gemini_base_url {
        gemini_config = gemini_config.with_base_url(base_url);
    }
    let model_provider = GeminiProvider::new(gemini_config.build());

    let client = reqwest::Client::new();
    let metadata =
        PromptMetadata::fetch(&client, &config.exchange_rate_api_key).await;

    let (stage_tx, mut stage_rx) = mpsc::unbounded_channel();
    let mut session = SessionBuilder::with_model_provider(model_provider)
        .with_travel_tools(&client, &config)
        .with_app_config(&config)
        .with_prompt_metadata(metadata)
        .on_stage(move |stage| {
            stage_tx.send(stage).ok();
        })
        .build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    println!(
        "{}",
        "Ask me anything about your trip, or type /clear to start over."
            .dimmed()
    );
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/clear" {
            session.clear();
            println!("{}", "Conversation cleared.".dimmed());
            continue;
        }

        let mut turn = pin!(session.send_message(message));
        let mut printer = AnswerPrinter::default();
        let mut progress_bar: Option<ProgressBar> = None;

        loop {
            let sleep = sleep(Duration::from_millis(100));
            select! {
                snapshot = turn.next() => {
                    let Some(snapshot) = snapshot else {
                        break;
                    };
                    // Finish the progress bar before printing anything else.
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    printer.print(&snapshot);
                }
                Some(stage) = stage_rx.recv() => {
                    let message = match stage {
                        TurnStage::Generating => "🤔 Thinking...",
                        TurnStage::Verifying => "🔎 Double-checking the answer...",
                        TurnStage::Correcting => "✍️  Correcting the answer...",
                        TurnStage::Done => continue,
                    };
                    printer.finish_line();
                    let spinner = ProgressBar::new_spinner();
                    spinner.set_style(progress_style.clone());
                    spinner.set_message(message);
                    if let Some(previous) = progress_bar.replace(spinner) {
                        previous.finish_and_clear();
                    }
                }
                _ = sleep => {
                    if let Some(progress_bar) = &progress_bar {
                        progress_bar.inc(1);
                    }
                }
            }
        }

        if let Some(progress_bar) = progress_bar {
            progress_bar.finish_and_clear();
        }
        printer.finish_line();
        // Stages of the finished turn that were not received yet.
        while stage_rx.try_recv().is_ok() {}
        println!();
    }

    ExitCode::SUCCESS
}

/// Prints the answer of a turn incrementally, one snapshot at a time.
#[derive(Default)]
struct AnswerPrinter {
    printed: String,
    line_open: bool,
}

impl AnswerPrinter {
    fn print(&mut self, snapshot: &Transcript) {
        let Some(answer) = snapshot
            .last()
            .and_then(|exchange| exchange.assistant.as_deref())
        else {
            return;
        };

        if answer == CORRECTION_PLACEHOLDER {
            self.finish_line();
            println!("{}⚠️  {}", BAR_CHAR.bright_yellow(), answer.yellow());
        } else if let Some(delta) = answer.strip_prefix(self.printed.as_str())
        {
            if self.line_open {
                print!("{}", delta.bright_white());
            } else if !delta.trim().is_empty() {
                self.start_line();
                print!("{}", delta.trim_start().bright_white());
            }
        } else {
            // The answer was replaced.
            self.finish_line();
            self.start_line();
            print!("{}", answer.bright_white());
        }
        std::io::stdout().flush().ok();

        self.printed.clear();
        self.printed.push_str(answer);
    }

    fn start_line(&mut self) {
        print!("{}🤖 ", BAR_CHAR.bright_cyan());
        self.line_open = true;
    }

    fn finish_line(&mut self) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
