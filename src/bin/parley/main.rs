use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use parley::audio::device;
use parley::config::{Config, DeviceDirection};
use parley::error::ParleyError;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Talk to a live voice model from your terminal",
    long_about = "Parley opens a duplex voice session with a real-time speech model. \
        Microphone audio streams to the model as it is captured, spoken replies \
        are played back gaplessly, barge-in cancels the reply in flight, and the \
        transcript of both sides is printed as each turn completes."
)]
struct Cli {
    /// Path to config file
    ///
    /// Defaults to ~/.config/parley/config.yaml if not specified.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    ///
    /// Sets the log level to debug for the parley crate, showing playback
    /// scheduling, transport traffic and session transitions.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a live voice session (foreground)
    ///
    /// Connects to the configured session endpoint, streams the microphone
    /// and plays the model's replies. Completed turns are printed as they
    /// are sealed. Runs until interrupted with Ctrl+C or the remote ends
    /// the session.
    Talk {
        /// End the session after this many seconds without a message from
        /// the remote
        #[arg(long, value_name = "SECS")]
        idle_timeout: Option<u64>,
    },

    /// Speak a line of text through the configured speech endpoint
    ///
    /// Synthesizes TEXT, plays it on the output device and exits once it
    /// has finished playing.
    Say {
        /// Text to speak
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// List available audio devices
    ///
    /// Shows every input and output device recognized by the system. Use
    /// --set-input or --set-output to write a device name to the config
    /// file instead.
    Devices {
        /// Write the input device name to the config file
        #[arg(long, value_name = "NAME", conflicts_with = "set_output")]
        set_input: Option<String>,

        /// Write the output device name to the config file
        #[arg(long, value_name = "NAME", conflicts_with = "set_input")]
        set_output: Option<String>,
    },

    /// Generate shell completions
    ///
    /// Prints a completion script for the given shell to stdout.
    /// Source or install the output to enable tab completion.
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(Config::default_path)
}

/// An explicit --config must exist; a missing default file means defaults.
fn load_config(cli: &Cli) -> Result<Config, ParleyError> {
    let path = config_path(cli);
    if cli.config.is_none() && !path.exists() {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(&path)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("parley=debug,info")
    } else {
        EnvFilter::new("parley=info,warn")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    install_completions_if_missing();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Auto-install shell completions for `$SHELL` if the completion file does not
/// already exist. Errors are ignored so that missing dirs or unsupported
/// shells never block normal operation.
fn install_completions_if_missing() {
    let Ok(shell_env) = std::env::var("SHELL") else {
        return;
    };

    let Some(home) = dirs::home_dir() else {
        return;
    };

    let (shell, path) = if shell_env.ends_with("/bash") {
        let dir = home.join(".local/share/bash-completion/completions");
        (Shell::Bash, dir.join("parley"))
    } else if shell_env.ends_with("/zsh") {
        (Shell::Zsh, home.join(".zfunc/_parley"))
    } else if shell_env.ends_with("/fish") {
        (Shell::Fish, home.join(".config/fish/completions/parley.fish"))
    } else {
        return;
    };

    if path.exists() {
        return;
    }

    if let Some(parent) = path.parent()
        && std::fs::create_dir_all(parent).is_err()
    {
        return;
    }

    let mut buf = Vec::new();
    generate(shell, &mut Cli::command(), "parley", &mut buf);

    let _ = std::fs::write(&path, buf);
}

fn run(cli: Cli) -> Result<(), ParleyError> {
    match cli.command {
        Command::Devices {
            ref set_input,
            ref set_output,
        } => run_devices(&cli, set_input.as_deref(), set_output.as_deref()),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "parley", &mut std::io::stdout());
            Ok(())
        }
        _ => run_with_config(cli),
    }
}

fn print_device_list(devices: &[String], default_name: Option<&str>) {
    for (i, name) in devices.iter().enumerate() {
        let marker = if default_name == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  {}: {name}{marker}", i + 1);
    }
}

fn run_devices(
    cli: &Cli,
    set_input: Option<&str>,
    set_output: Option<&str>,
) -> Result<(), ParleyError> {
    let chosen = set_input
        .map(|name| (DeviceDirection::Input, name))
        .or_else(|| set_output.map(|name| (DeviceDirection::Output, name)));

    if let Some((direction, name)) = chosen {
        let path = config_path(cli);
        Config::set_audio_device(&path, direction, name)?;
        let label = match direction {
            DeviceDirection::Input => "input",
            DeviceDirection::Output => "output",
        };
        println!("Set {label} device to: {name}");
        return Ok(());
    }

    let inputs = device::list_input_devices()?;
    let outputs = device::list_output_devices()?;

    println!("Input devices:");
    if inputs.is_empty() {
        println!("  (none)");
    }
    print_device_list(&inputs, device::default_input_device_name().as_deref());

    println!("Output devices:");
    if outputs.is_empty() {
        println!("  (none)");
    }
    print_device_list(&outputs, device::default_output_device_name().as_deref());

    Ok(())
}

fn run_with_config(cli: Cli) -> Result<(), ParleyError> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Talk { idle_timeout } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(parley::talk::run_talk(
                config,
                idle_timeout.map(Duration::from_secs),
            ))
        }
        Command::Say { text } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(parley::speech::speak(&config, &text.join(" ")))
        }
        Command::Devices { .. } | Command::Completions { .. } => unreachable!(),
    }
}
