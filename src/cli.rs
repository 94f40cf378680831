use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::api::{ApiClient, AssignmentDraft};
use crate::assessment::{
    format_time, AssessmentBackend, AssessmentKind, FakeBackend, HttpBackend, Question, ResponseSlot,
};
use crate::config::AppConfig;
use crate::session::{PhaseKind, SessionController, SessionError};

#[derive(Parser, Debug)]
#[command(author, version, about = "Take and manage timed candidate assessments", long_about = None)]
pub struct Cli {
    /// Configuration file (without extension works too)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Override the backend base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Take an assessment interactively
    Take {
        /// aptitude, coding or communication
        #[arg(long)]
        kind: Option<AssessmentKind>,
        /// Run against a built-in sample round instead of the backend
        #[arg(long)]
        offline: bool,
    },
    /// List assessment templates
    Assessments,
    /// Assign an assessment to a candidate
    Assign {
        #[arg(long)]
        candidate_id: i64,
        #[arg(long)]
        assessment_id: i64,
        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// List assignments
    Assignments {
        /// Include per-assignment progress
        #[arg(long)]
        with_status: bool,
    },
    /// Show aptitude results
    Results {
        #[arg(long, conflicts_with = "id")]
        email: Option<String>,
        /// Candidate id assigned by the aptitude backend
        #[arg(long)]
        id: Option<i64>,
    },
    /// Show communication round attempts
    CommResults,
    /// List candidates, or show one
    Candidates {
        #[arg(long)]
        id: Option<i64>,
    },
    /// Show aptitude statistics
    Stats,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(Some(path.as_path()))?,
        None => AppConfig::load()?,
    };
    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
    }

    match cli.command {
        Commands::Take { kind, offline } => take(&config, kind, offline).await,
        Commands::Assessments => {
            let api = config.api_client()?;
            let templates = api.list_assessments().await?;
            if templates.is_empty() {
                println!("No assessments yet.");
            }
            for t in templates {
                println!(
                    "{:>4}  {:<30} {:<14} {}",
                    t.id,
                    t.name,
                    t.kind,
                    t.difficulty.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        Commands::Assign {
            candidate_id,
            assessment_id,
            due,
        } => {
            let api = config.api_client()?;
            let assignment = api
                .assign_assessment(&AssignmentDraft {
                    candidate_id,
                    assessment_id,
                    due_date: due,
                })
                .await?;
            println!(
                "✅ Assignment {} created (candidate {}, assessment {})",
                assignment.id, assignment.candidate_id, assignment.assessment_id
            );
            Ok(())
        }
        Commands::Assignments { with_status } => {
            let api = config.api_client()?;
            if with_status {
                for row in api.list_assignments_with_status().await? {
                    println!("{}", row);
                }
            } else {
                for a in api.list_assignments().await? {
                    println!(
                        "{:>4}  candidate {:<6} assessment {:<6} due {:<10} {}",
                        a.id,
                        a.candidate_id,
                        a.assessment_id,
                        a.due_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                        a.status.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(())
        }
        Commands::Results { email, id } => results(&config.api_client()?, email, id).await,
        Commands::CommResults => {
            let attempts = config.api_client()?.communication_attempts().await?;
            if attempts.is_empty() {
                println!("No communication attempts yet.");
            }
            for a in attempts {
                println!(
                    "{:<24} {:<32} {:>5.1} {:<6} {}",
                    a.name,
                    a.email,
                    a.total_score.unwrap_or_default(),
                    match a.passed {
                        Some(true) => "passed",
                        Some(false) => "failed",
                        None => "-",
                    },
                    a.submitted_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
            Ok(())
        }
        Commands::Candidates { id } => candidates(&config.api_client()?, id).await,
        Commands::Stats => {
            let stats = config.api_client()?.aptitude_statistics().await?;
            println!("Tests taken:   {}", stats.total_tests);
            println!("Passed:        {}", stats.passed);
            println!("Failed:        {}", stats.failed);
            println!("Average score: {:.1}", stats.average_score);
            println!("Pass rate:     {:.1}%", stats.pass_rate);
            Ok(())
        }
    }
}

async fn results(api: &ApiClient, email: Option<String>, id: Option<i64>) -> Result<()> {
    let records = match (email, id) {
        (Some(email), _) => match api.aptitude_result_by_email(&email).await? {
            Some(record) => vec![record],
            None => {
                println!("No result for {}", email);
                return Ok(());
            }
        },
        (None, Some(id)) => match api.aptitude_result_by_id(id).await? {
            Some(record) => vec![record],
            None => {
                println!("No result for candidate {}", id);
                return Ok(());
            }
        },
        (None, None) => api.aptitude_results().await?,
    };
    for r in records {
        println!(
            "{:<24} {:<32} {:>3}/{:<3} {}",
            r.name,
            r.email,
            r.score.unwrap_or_default(),
            r.total_questions.unwrap_or_default(),
            r.status.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn candidates(api: &ApiClient, id: Option<i64>) -> Result<()> {
    let records = match id {
        Some(id) => vec![api.get_candidate(id).await?],
        None => api.list_candidates().await?,
    };
    if records.is_empty() {
        println!("No candidates yet.");
    }
    for c in records {
        println!(
            "{:>4}  {:<24} {:<32} {:<20} {}",
            c.id,
            c.name,
            c.email,
            c.role.as_deref().unwrap_or("-"),
            c.final_score.map(|s| format!("{:.1}", s)).unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

async fn take(config: &AppConfig, kind: Option<AssessmentKind>, offline: bool) -> Result<()> {
    let kind = match kind {
        Some(kind) => kind,
        None => config.kind()?,
    };
    let backend: Arc<dyn AssessmentBackend> = if offline {
        info!("🔌 Offline mode: using the built-in {} round", kind);
        Arc::new(FakeBackend::demo(kind))
    } else {
        Arc::new(HttpBackend::new(config.api_client()?, kind).with_coding_language(&config.assessment.coding_language))
    };

    let controller = SessionController::new(backend, config.controller_options());
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let outcome = wizard(&controller, &mut input).await;
    controller.teardown();
    outcome
}

type Input = Lines<BufReader<Stdin>>;

async fn prompt(input: &mut Input, label: &str) -> Result<String> {
    print!("{}", label);
    flush()?;
    let line = input.next_line().await?.context("input closed")?;
    Ok(line.trim().to_string())
}

fn flush() -> std::io::Result<()> {
    use std::io::Write;
    std::io::stdout().flush()
}

fn report(err: &SessionError) {
    println!("❌ {}", err);
}

async fn wizard(controller: &SessionController<dyn AssessmentBackend>, input: &mut Input) -> Result<()> {
    println!("=== {} ===", controller.snapshot().kind.round_name());

    loop {
        let name = prompt(input, "Full name: ").await?;
        let email = prompt(input, "Email: ").await?;
        match controller.request_code(&name, &email).await {
            Ok(()) => break,
            Err(e) => report(&e),
        }
    }
    println!("📧 A verification code was sent to your email.");

    loop {
        let code = prompt(input, "Verification code: ").await?;
        match controller.verify_code(&code).await {
            Ok(_) => break,
            Err(e) => report(&e),
        }
    }

    if controller.phase() == PhaseKind::InstructionsShown {
        if let Some(instructions) = controller.snapshot().instructions {
            println!("\n📋 {}", instructions.round_name);
            if let Some(total) = instructions.total_questions {
                println!("Questions:  {}", total);
            }
            if let Some(limit) = instructions.time_limit_seconds {
                println!("Time limit: {}", format_time(limit));
            }
            if let Some(text) = instructions.instructions {
                println!("\n{}", text);
            }
        }
        loop {
            prompt(input, "\nPress Enter to start the exam").await?;
            match controller.start_exam().await {
                Ok(()) => break,
                Err(e) => report(&e),
            }
        }
    }

    exam(controller, input).await
}

fn print_question(question: &Question) {
    println!("\n[{}] {}", question.id, question.prompt);
    if let Some(context) = &question.context {
        println!("    {}", context);
    }
    match &question.slot {
        ResponseSlot::MultipleChoice { options } => {
            for option in options {
                println!("    {}) {}", option.key, option.label);
            }
        }
        ResponseSlot::FreeText => println!("    (free text)"),
        ResponseSlot::Code { language, .. } => println!("    ({} code)", language),
    }
}

async fn read_block(input: &mut Input) -> Result<String> {
    println!("Enter your answer, finish with a line containing only '.'");
    let mut lines = Vec::new();
    while let Some(line) = input.next_line().await? {
        if line.trim() == "." {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

/// One line typed during the exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExamCommand<'a> {
    Nothing,
    Time,
    List,
    Submit,
    Run(&'a str),
    Answer(&'a str, &'a str),
    Block(&'a str),
}

impl<'a> ExamCommand<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        match line {
            "" => ExamCommand::Nothing,
            "time" => ExamCommand::Time,
            "list" => ExamCommand::List,
            "submit" => ExamCommand::Submit,
            _ => match line.split_once(' ') {
                Some(("run", id)) => ExamCommand::Run(id.trim()),
                Some((id, value)) => ExamCommand::Answer(id, value.trim()),
                None => ExamCommand::Block(line),
            },
        }
    }

    /// An empty-sheet confirmation only carries over to a `submit` typed
    /// right after the prompt.
    fn keeps_confirmation(&self, pending: bool) -> bool {
        pending && *self == ExamCommand::Submit
    }
}

async fn exam(controller: &SessionController<dyn AssessmentBackend>, input: &mut Input) -> Result<()> {
    let questions = controller.questions().context("exam did not start")?;
    for question in questions.iter() {
        print_question(question);
    }
    println!("\nCommands: <id> <answer> | <id> (multi-line) | run <id> | time | list | submit");

    let mut watch = tokio::time::interval(Duration::from_millis(250));
    let mut pending_confirmation = false;
    loop {
        if controller.phase() == PhaseKind::Submitted {
            break;
        }
        if let Some(remaining) = controller.snapshot().time_remaining() {
            print!("[{}] > ", format_time(remaining));
            flush()?;
        }

        let line = loop {
            tokio::select! {
                line = input.next_line() => break line?,
                _ = watch.tick() => {
                    if controller.phase() == PhaseKind::Submitted {
                        println!("\n⏰ Time is up. Your answers were submitted.");
                        break None;
                    }
                }
            }
        };
        let Some(line) = line else {
            break;
        };
        let command = ExamCommand::parse(&line);
        debug!("exam input: {:?}", command);
        pending_confirmation = command.keeps_confirmation(pending_confirmation);

        match command {
            ExamCommand::Nothing | ExamCommand::Time => {}
            ExamCommand::List => {
                let snapshot = controller.snapshot();
                println!("{}/{} answered", snapshot.answered, snapshot.total_questions);
            }
            ExamCommand::Submit => match controller.submit(pending_confirmation).await {
                Ok(_) => break,
                Err(SessionError::ConfirmationRequired) => {
                    println!("⚠️ {} Type 'submit' again to confirm.", SessionError::ConfirmationRequired);
                    pending_confirmation = true;
                }
                Err(e) => report(&e),
            },
            ExamCommand::Run(id) => {
                let code = read_block(input).await?;
                match controller.run_code(id, &code).await {
                    Ok(run) => println!("{} {}", if run.success { "✅" } else { "❌" }, run.output),
                    Err(e) => report(&e),
                }
            }
            ExamCommand::Answer(id, value) => {
                if let Err(e) = controller.record_answer(id, value) {
                    report(&e);
                }
            }
            ExamCommand::Block(id) => {
                let value = read_block(input).await?;
                if let Err(e) = controller.record_answer(id, &value) {
                    report(&e);
                }
            }
        }
    }

    let snapshot = controller.snapshot();
    match snapshot.result {
        Some(result) => {
            println!("\n{}", result.view());
            println!("{}/{} questions answered", snapshot.answered, snapshot.total_questions);
        }
        None => println!("\nThe exam was not submitted."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exam_commands() {
        assert_eq!(ExamCommand::parse("  "), ExamCommand::Nothing);
        assert_eq!(ExamCommand::parse("submit"), ExamCommand::Submit);
        assert_eq!(ExamCommand::parse("3 B"), ExamCommand::Answer("3", "B"));
        assert_eq!(ExamCommand::parse("writing"), ExamCommand::Block("writing"));
        assert_eq!(ExamCommand::parse("run  2"), ExamCommand::Run("2"));
    }

    #[test]
    fn test_confirmation_resets_on_other_commands() {
        assert!(ExamCommand::Submit.keeps_confirmation(true));
        assert!(!ExamCommand::Submit.keeps_confirmation(false));
        assert!(!ExamCommand::Answer("1", "A").keeps_confirmation(true));
        assert!(!ExamCommand::List.keeps_confirmation(true));
        assert!(!ExamCommand::Nothing.keeps_confirmation(true));
    }

    #[test]
    fn test_results_flags_conflict() {
        assert!(Cli::try_parse_from(["talentgate", "results", "--email", "a@b.c", "--id", "4"]).is_err());
        let cli = Cli::try_parse_from(["talentgate", "candidates", "--id", "7"]).unwrap();
        assert!(matches!(cli.command, Commands::Candidates { id: Some(7) }));
    }
}
