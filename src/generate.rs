use std::path::{Path, PathBuf};

use clap::Args;
use colored::Colorize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::ai::{self, CompletionModel, GeneratedTest, TestSummary};
use crate::auth;
use crate::browser::{self, DEFAULT_BRANCH};
use crate::config::Config;
use crate::error::{AppError, AuthError};
use crate::files::{self, MAX_FILES};
use crate::github::{BranchRef, FileRef, HostingApi, PullRequestResult};
use crate::publisher::{self, PublishRequest};
use crate::session::ClientSession;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Repository must be given as owner/name, got '{0}'")]
    InvalidRepository(String),

    #[error("No GitHub token configured. Set GITHUB_TOKEN or [github].token")]
    MissingToken,

    #[error("Repository '{0}' is not accessible with this token")]
    UnknownRepository(String),

    #[error("Branch '{0}' not found")]
    UnknownBranch(String),

    #[error("No code files found under '{0}'")]
    NoFiles(String),

    #[error("File '{0}' is not in the listing")]
    UnknownFile(String),

    #[error("Summary {index} is out of range (1-{count})")]
    SummaryOutOfRange { index: usize, count: usize },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    App(#[from] AppError),
}

/// Run one generation cycle from the terminal.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Repository as owner/name (e.g., octocat/hello-world)
    pub repository: String,

    /// Branch to read sources from and to open the pull request against
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Directory to list code files from (repository root by default)
    #[arg(short, long, default_value = "")]
    pub path: String,

    /// Files to analyze, by path or file name. Defaults to the whole listing.
    #[arg(short, long = "file")]
    pub files: Vec<String>,

    /// 1-based index of the summary to generate code for
    #[arg(short, long, default_value_t = 1)]
    pub summary: usize,

    /// Write the generated test here instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Commit the generated test and open a pull request
    #[arg(long)]
    pub open_pr: bool,
}

#[derive(Debug)]
pub struct Outcome {
    pub generated: GeneratedTest,
    pub pull: Option<PullRequestResult>,
}

#[instrument(skip_all, fields(repository = %args.repository))]
pub async fn run(
    args: &GenerateArgs,
    config: &Config,
    hosting: &dyn HostingApi,
    model: &dyn CompletionModel,
) -> Result<Outcome, GenerateError> {
    if args.repository.split_once('/').is_none() {
        return Err(GenerateError::InvalidRepository(args.repository.clone()));
    }
    let token = config.github.token.as_deref().ok_or(GenerateError::MissingToken)?;

    let session = auth::validate_token(hosting, token).await?;
    let mut state = ClientSession::new();
    state.sign_in(session.clone());
    info!(login = %session.user.login, "signed in");

    state.enter_repository_selection();
    let repository = browser::list_repositories(hosting, &session)
        .await?
        .into_iter()
        .find(|r| r.full_name.eq_ignore_ascii_case(&args.repository))
        .ok_or_else(|| GenerateError::UnknownRepository(args.repository.clone()))?;
    let (owner, repo) = repository
        .owner_and_name()
        .map(|(owner, repo)| (owner.to_string(), repo.to_string()))
        .ok_or_else(|| GenerateError::InvalidRepository(repository.full_name.clone()))?;
    state.select_repository(repository);

    let branch_name = args.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
    let branch = browser::list_branches(hosting, &session, &owner, &repo)
        .await?
        .into_iter()
        .find(|b| b.name == branch_name)
        .ok_or_else(|| GenerateError::UnknownBranch(branch_name.to_string()))?;
    print_header(&owner, &repo, &branch);
    state.select_branch(branch.clone());

    let listing =
        browser::list_code_files(hosting, &session, &owner, &repo, &args.path, &branch.name)
            .await?;
    let chosen = choose_files(listing, &args.files, &args.path)?;
    println!("{}", "Files:".bold());
    for file in &chosen {
        println!("  • {} ({} bytes)", file.path, file.size);
    }
    println!();
    state.select_files(chosen.clone());

    let contents =
        files::fetch_contents(hosting, &session, &owner, &repo, &branch.name, &chosen).await?;
    state.set_file_contents(contents);

    let summaries = ai::generate_test_summaries(
        model,
        &state.selection().file_contents,
        config.ai.max_prompt_bytes,
    )
    .await?;
    print_summaries(&summaries, args.summary);
    state.set_summaries(summaries);

    let count = state.selection().summaries.len();
    let summary = args
        .summary
        .checked_sub(1)
        .and_then(|i| state.selection().summaries.get(i))
        .cloned()
        .ok_or(GenerateError::SummaryOutOfRange {
            index: args.summary,
            count,
        })?;
    state.select_summary(summary.clone());

    let original = state
        .original_file_for(&summary)
        .cloned()
        .ok_or_else(|| GenerateError::NoFiles(args.path.clone()))?;
    debug!(path = %original.path(), "generating test code");
    let generated =
        ai::generate_test_code(model, original, summary, config.ai.max_prompt_bytes).await?;
    state.set_generated_test(generated.clone());

    output_test(&generated, args.output.as_deref())?;

    let pull = if args.open_pr {
        let request = PublishRequest {
            test_code: Some(generated.test_code.clone()),
            test_summary: Some(generated.test_summary.clone()),
            original_file: Some(generated.original_file.file.clone()),
            branch: Some(branch.name.clone()),
        };
        let pull = publisher::publish(hosting, &session, &owner, &repo, request).await?;
        println!(
            "{} #{} {}",
            "Opened pull request".green().bold(),
            pull.number,
            pull.url
        );
        Some(pull)
    } else {
        None
    };

    Ok(Outcome { generated, pull })
}

/// Pick the requested files out of the listing, or the first `MAX_FILES` when none are named.
fn choose_files(
    listing: Vec<FileRef>,
    wanted: &[String],
    path: &str,
) -> Result<Vec<FileRef>, GenerateError> {
    if listing.is_empty() {
        return Err(GenerateError::NoFiles(path.to_string()));
    }

    if wanted.is_empty() {
        if listing.len() > MAX_FILES {
            warn!(found = listing.len(), "too many files, using the first {MAX_FILES}");
        }
        return Ok(listing.into_iter().take(MAX_FILES).collect());
    }

    wanted
        .iter()
        .map(|name| {
            listing
                .iter()
                .find(|f| f.path == *name || f.file_name() == name.as_str())
                .cloned()
                .ok_or_else(|| GenerateError::UnknownFile(name.clone()))
        })
        .collect()
}

fn print_header(owner: &str, repo: &str, branch: &BranchRef) {
    println!();
    println!(
        "{}/{} @ {} ({})",
        owner,
        repo.bold(),
        branch.name.cyan(),
        branch.short_sha().dimmed()
    );
    println!();
}

fn print_summaries(summaries: &[TestSummary], selected: usize) {
    println!("═══ {} ═══", "Test Summaries".bold());
    for (i, summary) in summaries.iter().enumerate() {
        let marker = if i + 1 == selected { "→".green().bold() } else { " ".normal() };
        let file = summary
            .file
            .as_deref()
            .map(|f| format!(" [{f}]"))
            .unwrap_or_default();
        println!("{marker} {}. {}{}", i + 1, summary.title.bold(), file.dimmed());
        println!("     {}", summary.description);
    }
    println!();
}

fn output_test(generated: &GeneratedTest, path: Option<&Path>) -> Result<(), GenerateError> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "writing test to file");
            std::fs::write(path, &generated.test_code).map_err(|source| GenerateError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            println!("{} {}", "Wrote".green().bold(), path.display());
        }
        None => {
            println!("═══ {} ═══", generated.test_file_name.bold());
            println!("{}", generated.test_code);
            println!();
        }
    }
    Ok(())
}
