use crate::infra::{in_memory_engine, parse_date};
use chrono::{Local, NaiveDate, Utc};
use clap::Args;
use shelter_intake::clock::SystemClock;
use shelter_intake::config::JobConfig;
use shelter_intake::error::AppError;
use shelter_intake::workflows::profiles::{
    Actor, ActorId, AuditFilter, Profile, ProfileDraft, ProfileId, ProfileStatus,
    RecordingScheduler, Role, ValidationConfig, ValidationEngine, ValidationOutcome,
    ValidationReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ValidateArgs {
    /// Profile draft as JSON (same shape as the submit payload)
    pub(crate) file: PathBuf,
    /// Date the year rules are checked against (YYYY-MM-DD, defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Use this draft instead of the built-in sample
    #[arg(long)]
    pub(crate) draft: Option<PathBuf>,
    /// Stop after the validation gate instead of publishing
    #[arg(long)]
    pub(crate) skip_publish: bool,
}

pub(crate) fn run_validate(args: ValidateArgs) -> Result<(), AppError> {
    let draft = read_draft(&args.file)?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    let report = check_draft(draft, today);
    render_report(&args.file.display().to_string(), &report);
    Ok(())
}

fn read_draft(path: &Path) -> Result<ProfileDraft, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn check_draft(draft: ProfileDraft, today: NaiveDate) -> ValidationReport {
    let profile = Profile::from_draft(
        ProfileId("offline".to_string()),
        draft,
        &ActorId("cli".to_string()),
        Utc::now(),
    );
    ValidationEngine::new(ValidationConfig::default()).validate(&profile, today)
}

fn render_report(source: &str, report: &ValidationReport) {
    if report.passed() {
        println!("{source}: passes validation");
        return;
    }

    println!("{source}: {} rule(s) violated", report.errors.len());
    for error in &report.errors {
        println!("  - {}: {}", error.field, error.message);
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let draft = match &args.draft {
        Some(path) => read_draft(path)?,
        None => sample_draft(),
    };

    let scheduler = Arc::new(RecordingScheduler::default());
    let engine = in_memory_engine(
        scheduler.clone(),
        Arc::new(SystemClock),
        JobConfig::default(),
    );
    let author = Actor::new("demo-author", Role::Author);
    let reviewer = Actor::new("demo-reviewer", Role::Reviewer);
    let admin = Actor::new("demo-admin", Role::Administrator);

    println!("Profile lifecycle demo (follow-up jobs are recorded, not delivered)");
    let profile = engine.submit(draft, &author)?;
    println!("- Submitted {} ({}) -> {}", profile.name, profile.id, profile.status);
    print_jobs(&scheduler);

    match engine.run_validation(&profile.id)? {
        ValidationOutcome::Accepted => println!("- Validation passed -> ACCEPTED"),
        ValidationOutcome::Rejected(report) => {
            println!("- Validation failed -> REJECTED");
            for error in &report.errors {
                println!("    - {}: {}", error.field, error.message);
            }
        }
        ValidationOutcome::Skipped(status) => println!("- Validation skipped (status {status})"),
    }
    print_jobs(&scheduler);

    let current = engine.get(&profile.id, &reviewer)?;
    if current.status == ProfileStatus::Accepted && !args.skip_publish {
        let published = engine.set_status(&profile.id, ProfileStatus::Published, &reviewer)?;
        println!("- Reviewer {} published the profile -> {}", reviewer.id, published.status);
        print_jobs(&scheduler);
    }

    let page = engine.audit_entries(&AuditFilter::default(), None, None, &admin)?;
    println!("\nAudit trail (newest first)");
    for entry in &page.entries {
        let actor = entry
            .actor
            .as_ref()
            .map(|actor| actor.0.as_str())
            .unwrap_or("system");
        match &entry.change {
            Some(change) => println!(
                "  - {} by {} ({} -> {})",
                entry.action, actor, change.before, change.after
            ),
            None => println!("  - {} by {}", entry.action, actor),
        }
    }

    Ok(())
}

fn print_jobs(scheduler: &RecordingScheduler) {
    for (job, delay) in scheduler.take() {
        println!("    scheduled {} job (delay {}s)", job.kind(), delay.as_secs());
    }
}

fn sample_draft() -> ProfileDraft {
    ProfileDraft {
        name: "Luna".to_string(),
        category: "Hund".to_string(),
        desc_short: "Verspielte Hündin, liebt lange Spaziergänge und Kinder.".to_string(),
        location: "Tierheim Berlin".to_string(),
        gallery: vec!["luna/1.jpg".to_string(), "luna/2.jpg".to_string()],
        characteristics: Some("verspielt, verschmust, lernwillig".to_string()),
        compatibility: Some("verträgt sich mit Katzen".to_string()),
        birth_date: Some("14.03.2019".to_string()),
        size: Some("55".to_string()),
        seeking_home_since: Some("2023".to_string()),
        ..ProfileDraft::default()
    }
}
