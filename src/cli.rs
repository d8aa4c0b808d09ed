use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use crate::client::SssClient;
use crate::config::{ConfigFile, EffectiveConfig, Overrides};
use crate::error::SssError;
use crate::page::ResponsePage;

#[derive(Debug, Parser)]
#[command(name = "sss")]
#[command(about = "Command-line client for the SSS student-submission system")]
#[command(version)]
pub struct Cli {
    /// File that stores username, password, term, course, and session id
    #[arg(short = 'f', long, global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Save the resolved configuration back into the configuration file
    #[arg(short = 'w', long, global = true)]
    write_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in to SSS and cache the issued session id
    Login {
        /// bronconame
        #[arg(short, long)]
        username: Option<String>,

        /// SSS password
        #[arg(short, long)]
        password: Option<String>,

        /// session id
        #[arg(short = 'e', long)]
        session: Option<String>,

        /// school
        #[arg(short = 'o', long)]
        school: Option<String>,

        /// ex: 2020_fall
        #[arg(short, long)]
        term: Option<String>,

        /// ex: CS_2600
        #[arg(short, long)]
        course: Option<String>,
    },

    /// List assignments that can be submitted, or submit one
    Assignment(AssignmentArgs),

    /// Show current scores
    Status,

    /// Change the SSS password
    Password {
        old_password: String,
        new_password: String,
    },
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("action").required(true)))]
struct AssignmentArgs {
    /// Lists assignments that can be submitted
    #[arg(short, long, group = "action")]
    list: bool,

    /// Filename to upload to SSS
    #[arg(short, long, group = "action", value_name = "FILE")]
    submit: Option<PathBuf>,

    /// Assignment number to submit as; auto-selected when exactly one
    /// assignment is open
    #[arg(short, long, requires = "submit", conflicts_with = "list", value_name = "N")]
    number: Option<String>,
}

impl Command {
    /// The CLI layer of the configuration merge; only `login` carries
    /// override flags
    fn overrides(&self) -> Overrides {
        match self {
            Command::Login {
                username,
                password,
                session,
                school,
                term,
                course,
            } => Overrides {
                school: school.clone(),
                course: course.clone(),
                term: term.clone(),
                username: username.clone(),
                password: password.clone(),
                session_id: session.clone(),
            },

            _ => Overrides::default(),
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config_path = match &cli.config_file {
        Some(path) => path.clone(),
        None => ConfigFile::default_path()?,
    };
    debug!(path = %config_path.display(), "using config file");

    let on_disk = ConfigFile::load(&config_path).await?;
    let config = EffectiveConfig::resolve(&cli.command.overrides(), &on_disk);
    debug!(?config, "resolved configuration");

    let client = SssClient::new()?;

    match &cli.command {
        Command::Login { .. } => {
            login(&client, &config, &on_disk, &config_path, cli.write_config).await?;
            return Ok(());
        }

        Command::Status => {
            let page = probe(&client, &config).await?;
            render_scores(&page);
        }

        Command::Assignment(args) => {
            probe(&client, &config).await?;

            if let Some(file) = &args.submit {
                submit_assignment(&client, &config, file, args.number.as_deref()).await?;
            } else {
                list_assignments(&client, &config).await?;
            }
        }

        Command::Password {
            old_password,
            new_password,
        } => {
            probe(&client, &config).await?;
            change_password(&client, &config, old_password, new_password).await?;
        }
    }

    if cli.write_config {
        config.to_file().save(&config_path).await?;
        debug!("configuration written back");
    }

    Ok(())
}

/// Validates the cached session against the remote status page
///
/// Every non-login action starts here; on success the fetched page is
/// handed back so `status` can render it without a second round trip.
async fn probe(client: &SssClient, config: &EffectiveConfig) -> Result<ResponsePage> {
    let session_id = config.require_session()?;
    let body = client.status_page(config, session_id).await?;

    let page = ResponsePage::parse(&body);
    page.classify_probe(session_id)?;
    Ok(page)
}

async fn login(
    client: &SssClient,
    config: &EffectiveConfig,
    on_disk: &ConfigFile,
    config_path: &Path,
    write_config: bool,
) -> Result<()> {
    let (username, password) = config.require_credentials()?;
    let body = client.login(config, username, password).await?;
    let session_id = session_from_login_response(&body)?;

    if write_config {
        let mut full = config.to_file();
        full.session_id = Some(session_id.clone());
        full.save(config_path).await?;
    } else {
        let mut updated = on_disk.clone();
        updated.session_id = Some(session_id.clone());
        updated.save(config_path).await?;
    }

    println!("Login successful.");
    Ok(())
}

fn render_scores(page: &ResponsePage) {
    let scores = page.score_table();

    if scores.is_empty() {
        println!("No score data, yet.");
        return;
    }

    for (label, score) in scores {
        println!("{}: {}", label.bold(), score);
    }
}

async fn list_assignments(client: &SssClient, config: &EffectiveConfig) -> Result<()> {
    let session_id = config.require_session()?;
    let body = client.submit_page(config, session_id).await?;
    let page = ResponsePage::parse(&body);

    let options = page.assignment_options();
    if options.is_empty() {
        match page.submit_container_text() {
            Some(text) if !text.is_empty() => println!("{}", text),
            _ => println!("No assignments are open for submission."),
        }
        return Ok(());
    }

    for option in options {
        println!("{}  {}", option.number.bold(), option.label);
    }

    Ok(())
}

async fn submit_assignment(
    client: &SssClient,
    config: &EffectiveConfig,
    file: &Path,
    number: Option<&str>,
) -> Result<()> {
    let session_id = config.require_session()?;

    let number = match number {
        Some(number) => number.to_string(),
        None => {
            let body = client.submit_page(config, session_id).await?;
            let options = ResponsePage::parse(&body).assignment_options();

            match options.as_slice() {
                [only] => only.number.clone(),
                [] => bail!("No assignments are open for submission."),
                _ => {
                    let listing = options
                        .iter()
                        .map(|o| format!("  {}  {}", o.number, o.label))
                        .collect::<Vec<_>>()
                        .join("\n");

                    bail!("Multiple assignments are open; pass --number <N>:\n{listing}");
                }
            }
        }
    };

    let contents = tokio::fs::read(file)
        .await
        .with_context(|| format!("read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("file name of {}", file.display()))?
        .to_string();

    let body = client
        .submit_assignment(config, session_id, &number, &file_name, contents)
        .await?;

    check_remote_error(&body)?;
    println!("Submitted {} as assignment {}.", file_name, number);
    Ok(())
}

async fn change_password(
    client: &SssClient,
    config: &EffectiveConfig,
    old_password: &str,
    new_password: &str,
) -> Result<()> {
    let session_id = config.require_session()?;
    let body = client
        .change_password(config, session_id, old_password, new_password)
        .await?;

    check_remote_error(&body)?;
    println!("Password changed.");
    Ok(())
}

/// Interprets the login response
///
/// A non-empty error element rejects the credentials. Otherwise the
/// confirmation anchor must carry the newly issued session id; a page
/// with neither is an unknown failure.
fn session_from_login_response(body: &str) -> Result<String, SssError> {
    let page = ResponsePage::parse(body);

    if let Some(error) = page.login_error().filter(|text| !text.is_empty()) {
        debug!(error = %error, "login rejected");
        return Err(SssError::InvalidCredentials);
    }

    page.session_id().ok_or_else(|| page.unknown_failure())
}

/// Fails the action when the response carries a non-empty error element
fn check_remote_error(body: &str) -> Result<(), SssError> {
    let page = ResponsePage::parse(body);

    match page.login_error().filter(|text| !text.is_empty()) {
        Some(error) => Err(SssError::Remote(error)),
        None => Ok(()),
    }
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();
}
