//! CLI harness for the book-report interview coordination core.
//!
//! Stands in for the UI layer described by the external interface contract:
//! it drives the real bus and agents over stdin/stdout, issuing `start`,
//! free-text responses, and `reset`, while printing every question,
//! observation, and directive as it is published.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use interview_runtime::content::TopicId;
use interview_runtime::message::{
    AgentKind, BusMessage, DirectiveKind, InterviewEvent, ObservationPayload,
};
use interview_runtime::{bus::Topic, config::InterviewConfig, supervisor, RuntimeHandles};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bookreport-interview", about = "Run a book-report interview over stdin/stdout")]
struct Cli {
    /// Optional TOML file overlaying the built-in defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), interview_runtime::RuntimeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = InterviewConfig::load(cli.config.as_deref())?;
    if !InterviewConfig::has_api_key() {
        tracing::warn!("ANTHROPIC_API_KEY not set; running with deterministic fallbacks only");
    }

    let (handles, _watchdog) = supervisor::start(config);
    let current_topic = Arc::new(Mutex::new(TopicId::first()));
    spawn_printer(handles.clone(), current_topic.clone());

    println!("Book report interview. Type `start` to begin, `reset` to start over, `quit` to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.unwrap_or(None) {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "start" => {
                handles.state.start().await?;
                let topic = TopicId::first();
                *current_topic.lock() = topic;
                handles.interviewer().ask_starter(topic).await?;
            }
            "reset" => {
                handles.state.reset().await?;
                *current_topic.lock() = TopicId::first();
            }
            text => {
                let topic = *current_topic.lock();
                if let Err(e) = handles.state.record_response(topic, text).await {
                    println!("(not recorded: {e})");
                }
            }
        }
    }

    Ok(())
}

/// Print every student-facing question and every agent/coordinator event to
/// stdout, standing in for the real UI's subscriptions.
fn spawn_printer(handles: RuntimeHandles, current_topic: Arc<Mutex<TopicId>>) {
    tokio::spawn(async move {
        let mut questions = handles.bus.subscribe(Topic::QuestionAsked, "cli:question_asked");
        let mut observations = handles.bus.subscribe(Topic::AgentObservation, "cli:agent_observation");
        let mut directives = handles.bus.subscribe(Topic::CoordinatorDirective, "cli:coordinator_directive");
        let mut events = handles.bus.subscribe(Topic::Events, "cli:events");

        loop {
            tokio::select! {
                Some(msg) = questions.recv() => {
                    if let BusMessage::QuestionAsked(q) = msg {
                        *current_topic.lock() = q.topic;
                        println!("\nInterviewer [{}]: {}", q.topic, q.question);
                    }
                }
                Some(msg) = observations.recv() => {
                    if let BusMessage::AgentObservation(o) = msg {
                        print_observation(o.agent, &o.observation);
                    }
                }
                Some(msg) = directives.recv() => {
                    if let BusMessage::CoordinatorDirective(d) = msg {
                        println!("  [coordinator] {:?} (source: {:?}) — {}", d.directive, d.source, d.reasoning);
                        if d.directive == DirectiveKind::EndInterview {
                            println!("\nInterview complete.");
                        }
                    }
                }
                Some(msg) = events.recv() => {
                    if matches!(msg, BusMessage::Event(InterviewEvent::Finished)) {
                        println!("\n(interview finished)");
                    }
                }
                else => break,
            }
        }
    });
}

fn print_observation(agent: AgentKind, payload: &ObservationPayload) {
    match payload {
        ObservationPayload::Timekeeper(t) => {
            println!("  [timekeeper] {:?}, {:.0}s left, {} topics left", t.pressure, t.remaining_secs, t.topics_left);
        }
        ObservationPayload::Grader(g) => {
            println!("  [grader] grade so far: {} ({} topics scored)", g.running_grade, g.topics_scored);
        }
        ObservationPayload::DepthExpert(d) => {
            println!("  [depth_expert] rating {} -> {:?}{}", d.rating, d.recommendation, if d.frustration_detected { " (frustration detected)" } else { "" });
        }
    }
    let _ = agent;
}
