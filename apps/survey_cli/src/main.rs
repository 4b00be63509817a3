use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client_core::{
    admin::{self, SurveyDraft},
    load_settings,
    results::format_number,
    CancelToken, ClientSettings, EntryMode, HttpSurveyApi, LoadOutcome, ResultView, SurveyApi,
    SurveyDetailController,
};
use shared::domain::{OptionId, SurveyId, SurveyStatus};
use tracing::info_span;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Browse surveys, vote, and register new ones")]
struct Args {
    /// Overrides survey_client.toml and the SURVEY_BASE_URL / APP__BASE_URL env vars.
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List surveys by status.
    List {
        #[arg(long, default_value = "ongoing")]
        status: SurveyStatus,
        #[arg(long)]
        json: bool,
    },
    /// Show a survey and its options.
    Show { id: i64 },
    /// Show aggregated results.
    Results { id: i64 },
    /// Cast a vote, then print the refreshed results.
    Vote {
        id: i64,
        #[arg(long)]
        option: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Check an organization code.
    VerifyCode { code: String },
    /// Register a two-option survey (requires a valid organization code).
    Create {
        #[arg(long)]
        code: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// e.g. 2025-09-01T09:00
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        positive: String,
        #[arg(long)]
        negative: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let settings = match &args.base_url {
        Some(url) => ClientSettings::with_base_url(url)?,
        None => load_settings(),
    };
    let api: Arc<dyn SurveyApi> =
        Arc::new(HttpSurveyApi::new(&settings).context("failed to build survey client")?);

    match args.command {
        Command::List { status, json } => list(api.as_ref(), status, json).await,
        Command::Show { id } => {
            let controller = open(api, SurveyId(id), EntryMode::Vote).await?;
            print_detail(&controller);
            Ok(())
        }
        Command::Results { id } => {
            let controller = open(api, SurveyId(id), EntryMode::ShowResult).await?;
            print_results(&controller.result_view());
            Ok(())
        }
        Command::Vote { id, option, reason } => vote(api, SurveyId(id), OptionId(option), reason).await,
        Command::VerifyCode { code } => {
            let status = admin::verify_code(api.as_ref(), &code).await;
            match status.caption() {
                Some(caption) => println!("{caption}"),
                None => println!("{status:?}"),
            }
            if !status.is_verified() {
                bail!("organization code was not accepted");
            }
            Ok(())
        }
        Command::Create {
            code,
            title,
            content,
            start,
            end,
            positive,
            negative,
        } => {
            let mut status = admin::verify_code(api.as_ref(), &code).await;
            let mut draft = SurveyDraft {
                code,
                title,
                content,
                start_at: start,
                end_at: end,
                positive_label: positive,
                negative_label: negative,
            };
            let created = draft.submit(api.as_ref(), &mut status).await?;
            match created.id {
                Some(id) => println!("survey registered (id {id})"),
                None => println!("survey registered"),
            }
            Ok(())
        }
    }
}

async fn list(api: &dyn SurveyApi, status: SurveyStatus, json: bool) -> Result<()> {
    let surveys = api
        .list_surveys(status)
        .await
        .map_err(|e| anyhow!(e.explain()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&surveys)?);
        return Ok(());
    }
    if surveys.is_empty() {
        println!("no {status} surveys");
    }
    for survey in surveys {
        println!(
            "#{:<5} {}  [{}]",
            survey.id,
            survey.title,
            survey.agency_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Loads a detail view; Ctrl-C during the load abandons it.
async fn open(
    api: Arc<dyn SurveyApi>,
    survey_id: SurveyId,
    entry: EntryMode,
) -> Result<SurveyDetailController> {
    let mut controller = SurveyDetailController::new(api, survey_id, entry)
        .with_span(info_span!("cli", survey_id = survey_id.0));
    let token = CancelToken::new();
    let watcher = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };
    let outcome = controller.load(&token).await;
    watcher.abort();

    match outcome {
        LoadOutcome::Applied => Ok(controller),
        LoadOutcome::Failed => Err(anyhow!(controller
            .load_error()
            .unwrap_or("failed to load survey")
            .to_string())),
        LoadOutcome::Cancelled => bail!("interrupted"),
    }
}

async fn vote(
    api: Arc<dyn SurveyApi>,
    survey_id: SurveyId,
    option_id: OptionId,
    reason: Option<String>,
) -> Result<()> {
    let mut controller = open(api, survey_id, EntryMode::Vote).await?;
    controller
        .select(option_id)
        .map_err(|e| anyhow!(e.user_message()))?;
    if let Some(reason) = reason {
        controller.set_reason(reason);
    }
    controller
        .submit()
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    println!("Thanks for taking part. Today's vote shapes a better neighborhood tomorrow.");
    controller
        .view_results()
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    print_results(&controller.result_view());
    Ok(())
}

fn print_detail(controller: &SurveyDetailController) {
    let Some(detail) = controller.detail() else {
        return;
    };
    println!("{}", detail.display_agency());
    println!("{}", detail.display_title());
    if !detail.description.is_empty() {
        println!("{}", detail.description);
    }
    if detail.period.is_bounded() {
        println!("period: {}", detail.period.display_text());
    }
    let period = controller.period_status(Utc::now());
    if !period.is_valid() {
        println!("! {}", period.message());
    }
    for option in detail.sorted_options() {
        println!("  [{}] {}", option.id, option.label);
    }
}

fn print_results(view: &ResultView) {
    if !view.has_votes() {
        println!("no votes have been counted yet.");
        return;
    }
    let bar: Vec<String> = view
        .segments
        .iter()
        .map(|segment| {
            segment
                .caption
                .clone()
                .unwrap_or_else(|| format!("{:?}", segment.tone))
        })
        .collect();
    println!("{}", bar.join(" | "));
    println!("total {} votes", format_number(view.total));
    for row in &view.rows {
        println!(
            "  {:<20} {} votes ({}%)",
            row.label,
            format_number(row.count),
            format_number(row.percent)
        );
    }
}
