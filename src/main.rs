use std::io::{self, Write};
use std::process::ExitCode;

use agent_client::AgentClient;
use futures_util::StreamExt;
use glod::commands::HELP_TEXT;
use glod::logging::init_logging;
use glod::render::history_summary;
use glod::{
    parse_slash_command, ClientSettings, ProcessLauncher, SessionController, SlashCommand,
    TurnRenderer,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const SERVER_ADDR_ENV_VAR: &str = "GLOD_SERVER_ADDR";

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let settings = match ClientSettings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::from(2);
        }
    };
    let client = match AgentClient::new(settings.client_config()) {
        Ok(client) => client,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::from(2);
        }
    };
    let base_url = client.base_url().to_string();

    let mut session = SessionController::new(client);
    if let Some(program) = &settings.server_bin {
        let mut launcher = ProcessLauncher::new(program);
        if let Some(addr) = settings.listen_addr() {
            launcher = launcher.with_env(SERVER_ADDR_ENV_VAR, addr);
        }
        session = session.with_launcher(launcher);
    }

    let health = match session.initialize().await {
        Ok(health) => health,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::FAILURE;
        }
    };
    println!(
        "connected to {base_url} (provider {}, model {}). Type /help for commands.",
        health.provider, health.model
    );

    match repl(&mut session).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn repl(session: &mut SessionController<AgentClient>) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = TurnRenderer::new(io::stdout(), io::stderr());

    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            return Ok(());
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = parse_slash_command(input) {
            match command {
                SlashCommand::Help => println!("{HELP_TEXT}"),
                SlashCommand::Clear => {
                    session.clear_history();
                    println!("history cleared");
                }
                SlashCommand::Allow(Some(path)) => match session.add_allowed_dir(&path).await {
                    Ok(resolved) => println!("allowed {}", resolved.display()),
                    Err(error) => eprintln!("error: {error}"),
                },
                SlashCommand::Allow(None) => eprintln!("error: usage: /allow <dir>"),
                SlashCommand::History => println!("{}", history_summary(session.history())),
                SlashCommand::Quit => return Ok(()),
                SlashCommand::Unknown(name) => {
                    eprintln!("error: unknown command {name}; try /help");
                }
            }
            continue;
        }

        match session.send_turn(input).await {
            Ok(mut stream) => {
                while let Some(event) = stream.next().await {
                    renderer.render(&event)?;
                }
            }
            Err(error) => eprintln!("error: {error}"),
        }
    }
}
