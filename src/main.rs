use clap::{Arg, ArgAction, Command};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use thinkshell::command_router::{CommandRouter, InvocationOutcome};
use thinkshell::config::Config;
use thinkshell::error::{HookError, ThinkError};
use thinkshell::providers::ProviderKind;
use thinkshell::pty_shell::{PtyShell, TerminalPrompt};
use thinkshell::session::CapturedInput;
use thinkshell::shell_hook::ShellHook;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Follow-up questions answered before an invocation is given up.
const MAX_CLARIFICATIONS: usize = 3;

fn init_logging(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("THINKSHELL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("thinkshell")
        .about("Your own bash, with a language model behind every failed command")
        .long_about(
            "thinkshell starts your interactive bash inside a pseudo-terminal. Lines bash \
             cannot run, and lines starting with the trigger prefix (`,` by default), are \
             turned into commands by a language model, checked by a safety gate and run \
             in the same session.",
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .help("Provider to try first (openai, anthropic, gemini)")
                .value_name("NAME")
                .value_parser(|s: &str| s.parse::<ProviderKind>()),
        )
        .arg(
            Arg::new("openai-key")
                .long("openai-key")
                .help("Save an OpenAI API key")
                .value_name("API_KEY"),
        )
        .arg(
            Arg::new("anthropic-key")
                .long("anthropic-key")
                .help("Save an Anthropic API key")
                .value_name("API_KEY"),
        )
        .arg(
            Arg::new("gemini-key")
                .long("gemini-key")
                .help("Save a Google Gemini API key")
                .value_name("API_KEY"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Configuration file to use")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("show-config")
                .long("show-config")
                .help("Show configuration information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("shell")
                .long("shell")
                .help("Bash binary to host")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write logs to this file instead of stderr")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Summarise every completed plan")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_logging(matches.get_one::<PathBuf>("log-file"))?;

    let config_path = match matches.get_one::<PathBuf>("config") {
        Some(path) => path.clone(),
        None => Config::get_config_path()?,
    };
    let mut config = Config::load(Some(&config_path))?;

    // Key commands update the file and exit.
    let keys = [
        (ProviderKind::OpenAi, "openai-key"),
        (ProviderKind::Anthropic, "anthropic-key"),
        (ProviderKind::Gemini, "gemini-key"),
    ];
    let mut saved = false;
    for (kind, flag) in keys {
        if let Some(key) = matches.get_one::<String>(flag) {
            config.set_api_key(kind, key.clone());
            saved = true;
        }
    }
    if saved {
        config.save(Some(&config_path))?;
        println!("✅ API key saved to {}", config_path.display());
        return Ok(());
    }

    if let Some(kind) = matches.get_one::<ProviderKind>("provider") {
        config.prefer_provider(*kind);
        config.save(Some(&config_path))?;
        info!("{} is now tried first", kind.label());
    }
    if let Some(shell) = matches.get_one::<PathBuf>("shell") {
        config.shell = Some(shell.clone());
    }

    if matches.get_flag("show-config") {
        config.show_config_info_with_io(&config_path, &mut std::io::stdout())?;
        return Ok(());
    }

    let mut router = CommandRouter::from_config(&config)?;
    let shell_path = config.shell_path();
    info!("Hosting {}", shell_path.display());
    let (mut shell, mut prompt) =
        PtyShell::spawn(&shell_path, &config.trigger_prefix, matches.get_flag("verbose"))?;

    loop {
        let input = match shell.capture().await {
            Ok(input) => input,
            Err(HookError::SessionLost) => break,
            Err(e) => {
                warn!("Lost track of the shell: {}", e);
                break;
            }
        };

        match handle_invocation(&mut router, &mut shell, &mut prompt, input).await {
            Ok(InvocationOutcome::SessionLost) => break,
            Ok(outcome) => prompt.report(&outcome),
            Err(ThinkError::SessionLost) => break,
            Err(e) => {
                warn!("Invocation failed: {}", e);
                prompt.print(&format!("\r\n❌ {}\r\n", e));
            }
        }
        shell.refresh_prompt();
    }

    let code = shell.wait_exit();
    info!("Shell exited with status {}", code);
    // Restore the terminal before exiting.
    drop(prompt);
    drop(shell);
    std::process::exit(code);
}

/// Runs one invocation, asking the user whenever the planner needs more
/// information.
async fn handle_invocation(
    router: &mut CommandRouter,
    shell: &mut PtyShell,
    prompt: &mut TerminalPrompt,
    mut input: CapturedInput,
) -> Result<InvocationOutcome, ThinkError> {
    for _ in 0..MAX_CLARIFICATIONS {
        match router.handle(input.clone(), shell, prompt).await? {
            InvocationOutcome::NeedsClarification { question } => match prompt.ask(&question).await {
                Some(answer) if !answer.trim().is_empty() => {
                    input = CommandRouter::with_answer(&input, &answer);
                }
                _ => {
                    prompt.print("Cancelled\r\n");
                    return Ok(InvocationOutcome::Passthrough);
                }
            },
            outcome => return Ok(outcome),
        }
    }
    prompt.print("\r\n❌ Still unclear after several answers; nothing was run.\r\n");
    Ok(InvocationOutcome::Passthrough)
}
