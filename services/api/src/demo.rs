use crate::infra::{seed_demo_data, DEMO_CANDIDATE, DEMO_EMPLOYER, DEMO_HOURLY_RATE, DEMO_POSTING};
use chrono::{Duration, Utc};
use clap::Args;
use rust_decimal::Decimal;
use talent_ledger::config::EngineConfig;
use talent_ledger::engagement::memory::InMemoryBackend;
use talent_ledger::engagement::{
    Actor, Decision, EngagementEngine, PostingId, SettlementOutcome, TaskDecision, TaskSubmission,
    TimeReport,
};
use talent_ledger::error::AppError;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Hourly rate published on the demo posting
    #[arg(long, default_value_t = DEMO_HOURLY_RATE)]
    pub(crate) hourly_rate: Decimal,
    /// Minutes of work reported on the demo task
    #[arg(long, default_value_t = 210)]
    pub(crate) minutes: i64,
    /// Stop after the employer rejects a second candidacy
    #[arg(long)]
    pub(crate) skip_settlement: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            hourly_rate: DEMO_HOURLY_RATE,
            minutes: 210,
            skip_settlement: false,
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        hourly_rate,
        minutes,
        skip_settlement,
    } = args;

    let backend = InMemoryBackend::new();
    seed_demo_data(&backend, hourly_rate).await;
    let engine = EngagementEngine::new(backend.ports(), &EngineConfig::default());

    let posting = PostingId::new(DEMO_POSTING);
    let employer = Actor::employer(DEMO_EMPLOYER);
    let candidate = Actor::candidate(DEMO_CANDIDATE);

    println!("Talent ledger demo");
    println!("Posting {posting} pays {hourly_rate}/hour");

    let application = engine.lifecycle().apply(&candidate, &posting).await?;
    println!(
        "\n1. {} applied -> application {} is {} / {}",
        candidate.id,
        application.id,
        application.application_status.label(),
        application.approval_status.label()
    );
    println!(
        "   applicants on posting: {}",
        backend
            .job_board
            .applicant_count(&posting)
            .await
            .unwrap_or_default()
    );

    let rival = Actor::candidate("candidate-2");
    backend.profiles.complete_all(&rival.id).await;
    let rival_application = engine.lifecycle().apply(&rival, &posting).await?;
    engine
        .lifecycle()
        .decide_approval(&employer, &rival_application.id, Decision::Rejected)
        .await?;
    let blocked = engine
        .tracker()
        .submit(&rival, &rival_application.id, shift("Unapproved work", 60))
        .await;
    match blocked {
        Ok(_) => println!("\n2. unexpected: rejected candidacy accepted a task"),
        Err(err) => println!(
            "\n2. {} was rejected; task submission refused ({}: {err})",
            rival.id,
            err.kind().code()
        ),
    }

    if skip_settlement {
        return Ok(());
    }

    engine
        .lifecycle()
        .decide_approval(&employer, &application.id, Decision::Approved)
        .await?;
    let task = engine
        .tracker()
        .submit(
            &candidate,
            &application.id,
            shift("Build ingestion pipeline", minutes),
        )
        .await?;
    println!(
        "\n3. {} approved; task {} reports {} hours at {}% ({:?})",
        candidate.id, task.id, task.reported_hours, task.progress_percent, task.track_status
    );

    let decided = engine
        .approvals()
        .decide(&employer, &task.id, TaskDecision::approve())
        .await?;
    println!(
        "\n4. task {} is {}",
        decided.record.id,
        decided.record.approval_status.label()
    );

    let paid = engine
        .settlement()
        .set_paid_flag(&employer, &application.id, true)
        .await?;
    render_settlement("   first settlement", &paid);

    let repeat = engine
        .settlement()
        .set_paid_flag(&employer, &application.id, true)
        .await?;
    render_settlement("\n5. repeated settlement", &repeat);

    let history = engine
        .settlement()
        .history(&candidate, &application.id)
        .await?;
    println!(
        "   ledger: {} batch(es), {} paid hours, {} settled",
        history.batches.len(),
        history.summary.paid_hours,
        history.summary.settled_amount
    );

    println!("\nNotifications");
    for event in backend.notifications.events() {
        println!("  - [{}] {}: {}", event.target, event.title, event.message);
    }

    Ok(())
}

fn shift(title: &str, minutes: i64) -> TaskSubmission {
    let end = Utc::now();
    TaskSubmission {
        title: title.to_string(),
        description: String::new(),
        attachment_ref: None,
        time: TimeReport::span(end - Duration::minutes(minutes), end),
        progress_percent: None,
    }
}

fn render_settlement(label: &str, outcome: &SettlementOutcome) {
    println!("{label}: {}", outcome.message);
    if let Some(batch) = &outcome.batch {
        println!(
            "   batch {} covers {} task(s): {} hours x {} = {}",
            batch.id,
            batch.task_ids.len(),
            batch.total_hours,
            batch.hourly_rate,
            batch.total_amount
        );
    }
}
