use std::panic;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exam_runner::{
    config::Config,
    core::{
        domain::{CaseStatus, Question},
        executor::build_executor,
        loader::RuntimeLoader,
        pipeline::{
            samples::{SampleRunner, sample_cases},
            streaming::RemoteStreamClient,
            submission::{SubmissionRequest, SubmissionSession},
        },
        traits::exam_api::ExamApi,
    },
    http::{exam_api::HttpExamApi, transport::ReqwestTransport},
    native::runtime::NativeHost,
};

#[derive(Parser, Debug)]
#[command(name = "exam-runner", version, about = "Run and submit code exam answers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    config: Config,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a question's sample cases against local code
    Run {
        #[arg(long, help = "Question JSON file")]
        question: PathBuf,
        #[arg(long, help = "Python source file")]
        code: PathBuf,
        #[arg(long, help = "Execute on the backend instead of locally")]
        remote: bool,
    },
    /// Submit code for grading against the question's hidden cases
    Submit {
        #[arg(long)]
        question_id: String,
        #[arg(long, help = "Python source file")]
        code: PathBuf,
        #[arg(long)]
        category_id: Option<String>,
    },
}

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let Cli { command, config } = Cli::parse();
    tracing::debug!("Using {:?}", config);

    let client = reqwest::Client::new();
    match command {
        Commands::Run {
            question,
            code,
            remote,
        } => {
            let question = tokio::fs::read_to_string(question).await?;
            let question: Question = serde_json::from_str(&question)?;
            let code = tokio::fs::read_to_string(code).await?;
            if remote {
                run_remote(&config, client, &question, &code).await?;
            } else {
                run_local(&config, &question, &code).await?;
            }
        }
        Commands::Submit {
            question_id,
            code,
            category_id,
        } => {
            let code = tokio::fs::read_to_string(code).await?;
            submit(&config, client, question_id, category_id, code).await?;
        }
    }

    Ok(())
}

async fn run_local(
    config: &Config,
    question: &Question,
    code: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = Arc::new(NativeHost::new(config.distribution().version));
    let loader = Arc::new(RuntimeLoader::new(host, config.distribution()));
    loader.ensure_ready().await?;

    let runner = SampleRunner::new(build_executor(config.executor, loader));
    let run = runner.run(question, code).await;
    for (index, case) in run.cases.iter().enumerate() {
        println!("Case {}: {:?}", index + 1, case.status);
        if !case.passed {
            println!("  expected: {}", case.expected_output);
            println!("  actual:   {}", case.actual_output);
        }
    }
    match run.all_passed {
        Some(true) => println!("All sample cases passed"),
        Some(false) => println!("Some sample cases failed"),
        None => println!("No sample cases to check"),
    }
    Ok(())
}

async fn run_remote(
    config: &Config,
    client: reqwest::Client,
    question: &Question,
    code: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(ReqwestTransport::new(client, &config.backend_url));
    let stream = RemoteStreamClient::new(transport);
    let input = sample_cases(question)
        .first()
        .map(|case| case.input.clone())
        .unwrap_or_default();

    let outcome = stream.run(code, &input).await?;
    for message in stream.system_messages().borrow().iter() {
        println!("[{:?}] {}", message.level, message.text);
    }
    for line in stream.execution_output().borrow().iter() {
        println!("{}", line);
    }
    tracing::info!("Remote run finished: {:?}", outcome.completion);
    Ok(())
}

async fn submit(
    config: &Config,
    client: reqwest::Client,
    question_id: String,
    category_id: Option<String>,
    code: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = Arc::new(HttpExamApi::new(client.clone(), &config.backend_url));
    let expected_cases = match api.get_question(&question_id).await {
        Ok(question) => sample_cases(&question).len(),
        Err(e) => {
            tracing::warn!("Could not fetch question {}: {}", question_id, e);
            0
        }
    };

    let transport = Arc::new(ReqwestTransport::new(client, &config.backend_url));
    let session = SubmissionSession::new(Arc::new(RemoteStreamClient::new(transport)), api);
    let report = session
        .submit(&SubmissionRequest {
            question_id,
            category_id,
            code,
            expected_cases,
        })
        .await?;

    for (index, status) in report.progress.cases().iter().enumerate() {
        let label = match status {
            CaseStatus::Passed => "passed",
            CaseStatus::Failed => "failed",
            CaseStatus::Running => "running",
            CaseStatus::Pending => "not run",
        };
        println!("Test case {}: {}", index + 1, label);
    }
    if report.progress.all_complete() {
        println!(
            "{}",
            if report.progress.is_correct() {
                "Correct answer"
            } else {
                "Incorrect answer"
            }
        );
    } else {
        println!("Submission did not complete");
    }
    if let Some(Err(e)) = report.recorded {
        println!("Answer was not recorded: {}", e);
    }
    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
