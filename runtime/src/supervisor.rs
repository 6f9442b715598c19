//! Supervisor
//!
//! Deterministic startup order and crash-only restart for every agent.
//! Mirrors the teacher's `DefaultErrorHandler` restart/circuit-breaker
//! shape, narrowed from cross-process agent fleets down to one
//! `tokio::select!` watchdog over a handful of in-process tasks.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::agents::{DepthExpert, Grader, Interviewer, InterviewerHandle, Timekeeper};
use crate::bus::MessageBus;
use crate::config::InterviewConfig;
use crate::content::ContentRegistry;
use crate::coordinator::Coordinator;
use crate::llm::{AnthropicClient, LlmClient};
use crate::state::InterviewStateHandle;
use crate::ticker::Ticker;

/// An agent gets this many automatic restarts before the Supervisor gives
/// up on it and leaves the system running in degraded mode.
const MAX_RESTARTS_PER_AGENT: u32 = 3;

/// The handles external callers (the CLI harness, tests) need to drive the
/// running system. Everything else (the individual agent tasks) is owned
/// by the watchdog task and never touched directly again after startup.
#[derive(Clone)]
pub struct RuntimeHandles {
    pub bus: MessageBus,
    pub state: InterviewStateHandle,
    pub registry: Arc<ContentRegistry>,
    interviewer: Arc<RwLock<InterviewerHandle>>,
}

impl RuntimeHandles {
    /// The current Interviewer handle. Reread after a restart; a directly
    /// held handle from before a restart talks to a task that has shut down.
    pub fn interviewer(&self) -> InterviewerHandle {
        self.interviewer.read().clone()
    }
}

fn build_llm() -> Option<Arc<dyn LlmClient>> {
    AnthropicClient::from_env().map(|client| Arc::new(client) as Arc<dyn LlmClient>)
}

fn spawn_ticker(bus: &MessageBus, config: &InterviewConfig) -> JoinHandle<()> {
    Ticker::new(bus.clone(), config.tick_period).spawn()
}

fn spawn_timekeeper(bus: &MessageBus, config: &InterviewConfig) -> JoinHandle<()> {
    Timekeeper::new(bus.clone(), config.total_seconds).spawn()
}

fn spawn_grader(bus: &MessageBus) -> JoinHandle<()> {
    Grader::new(bus.clone()).spawn()
}

fn spawn_depth_expert(bus: &MessageBus, registry: &Arc<ContentRegistry>, llm: &Option<Arc<dyn LlmClient>>, config: &InterviewConfig) -> JoinHandle<()> {
    DepthExpert::new(bus.clone(), registry.clone(), llm.clone(), config.llm_model.clone(), config.llm_temperature, config.llm_max_tokens).spawn()
}

fn spawn_interviewer(
    bus: &MessageBus,
    state: &InterviewStateHandle,
    registry: &Arc<ContentRegistry>,
    llm: &Option<Arc<dyn LlmClient>>,
    config: &InterviewConfig,
) -> (JoinHandle<()>, InterviewerHandle) {
    let (agent, handle) = Interviewer::new(
        bus.clone(),
        state.clone(),
        registry.clone(),
        llm.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
        config.llm_max_tokens,
        config.max_history,
    );
    (agent.spawn(), handle)
}

fn spawn_coordinator(
    bus: &MessageBus,
    state: &InterviewStateHandle,
    registry: &Arc<ContentRegistry>,
    llm: &Option<Arc<dyn LlmClient>>,
    config: &InterviewConfig,
) -> JoinHandle<()> {
    Coordinator::new(
        bus.clone(),
        state.clone(),
        registry.clone(),
        llm.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
        config.llm_max_tokens,
        config.collection_window,
    )
    .spawn()
}

/// Bring up the whole system in the spec's fixed order and hand back the
/// handles a caller needs plus the watchdog's own background task.
pub fn start(config: InterviewConfig) -> (RuntimeHandles, JoinHandle<()>) {
    let bus = MessageBus::new();
    let registry = Arc::new(ContentRegistry::default());
    let state = InterviewStateHandle::spawn(bus.clone());
    let llm = build_llm();

    let ticker = spawn_ticker(&bus, &config);
    let timekeeper = spawn_timekeeper(&bus, &config);
    let grader = spawn_grader(&bus);
    let depth_expert = spawn_depth_expert(&bus, &registry, &llm, &config);
    let (interviewer, interviewer_handle) = spawn_interviewer(&bus, &state, &registry, &llm, &config);
    let coordinator = spawn_coordinator(&bus, &state, &registry, &llm, &config);

    let interviewer_cell = Arc::new(RwLock::new(interviewer_handle));
    let handles = RuntimeHandles { bus: bus.clone(), state: state.clone(), registry: registry.clone(), interviewer: interviewer_cell.clone() };

    let watchdog = tokio::spawn(watch(
        bus,
        state,
        registry,
        llm,
        config,
        ticker,
        timekeeper,
        grader,
        depth_expert,
        interviewer,
        coordinator,
        interviewer_cell,
    ));

    (handles, watchdog)
}

/// Spawn a task that never completes, used once an agent has exhausted its
/// restart budget: the watchdog still needs *something* to select on so the
/// loop doesn't spin, but this agent is down for good.
fn retired() -> JoinHandle<()> {
    tokio::spawn(std::future::pending())
}

#[allow(clippy::too_many_arguments)]
async fn watch(
    bus: MessageBus,
    state: InterviewStateHandle,
    registry: Arc<ContentRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    config: InterviewConfig,
    mut ticker: JoinHandle<()>,
    mut timekeeper: JoinHandle<()>,
    mut grader: JoinHandle<()>,
    mut depth_expert: JoinHandle<()>,
    mut interviewer: JoinHandle<()>,
    mut coordinator: JoinHandle<()>,
    interviewer_cell: Arc<RwLock<InterviewerHandle>>,
) {
    let mut ticker_restarts = 0u32;
    let mut timekeeper_restarts = 0u32;
    let mut grader_restarts = 0u32;
    let mut depth_expert_restarts = 0u32;
    let mut interviewer_restarts = 0u32;
    let mut coordinator_restarts = 0u32;

    loop {
        tokio::select! {
            res = &mut ticker => {
                log_exit("ticker", res);
                ticker = restart_or_retire("ticker", &mut ticker_restarts, || spawn_ticker(&bus, &config));
            }
            res = &mut timekeeper => {
                log_exit("timekeeper", res);
                timekeeper = restart_or_retire("timekeeper", &mut timekeeper_restarts, || spawn_timekeeper(&bus, &config));
            }
            res = &mut grader => {
                log_exit("grader", res);
                grader = restart_or_retire("grader", &mut grader_restarts, || spawn_grader(&bus));
            }
            res = &mut depth_expert => {
                log_exit("depth_expert", res);
                depth_expert = restart_or_retire("depth_expert", &mut depth_expert_restarts, || spawn_depth_expert(&bus, &registry, &llm, &config));
            }
            res = &mut interviewer => {
                log_exit("interviewer", res);
                if interviewer_restarts < MAX_RESTARTS_PER_AGENT {
                    interviewer_restarts += 1;
                    let (handle, fresh) = spawn_interviewer(&bus, &state, &registry, &llm, &config);
                    *interviewer_cell.write() = fresh;
                    interviewer = handle;
                } else {
                    warn!("interviewer: restart budget exhausted, running in degraded mode");
                    interviewer = retired();
                }
            }
            res = &mut coordinator => {
                log_exit("coordinator", res);
                coordinator = restart_or_retire("coordinator", &mut coordinator_restarts, || spawn_coordinator(&bus, &state, &registry, &llm, &config));
            }
        }
    }
}

fn log_exit(agent: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => error!(agent, "agent task exited unexpectedly"),
        Err(e) if e.is_panic() => error!(agent, "agent task panicked"),
        Err(e) => error!(agent, error = %e, "agent task failed"),
    }
}

fn restart_or_retire(agent: &str, restarts: &mut u32, spawn: impl FnOnce() -> JoinHandle<()>) -> JoinHandle<()> {
    if *restarts < MAX_RESTARTS_PER_AGENT {
        *restarts += 1;
        spawn()
    } else {
        warn!(agent, "restart budget exhausted, running in degraded mode");
        retired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TopicId;

    #[tokio::test]
    async fn start_brings_up_a_working_interview() {
        let (handles, _watchdog) = start(InterviewConfig::default());
        handles.state.start().await.unwrap();
        handles.interviewer().ask_starter(TopicId::Theme).await.unwrap();

        let mut questions = handles.bus.subscribe(crate::bus::Topic::QuestionAsked, "test");
        let msg = tokio::time::timeout(std::time::Duration::from_millis(200), questions.recv()).await.unwrap().unwrap();
        assert!(matches!(msg, crate::message::BusMessage::QuestionAsked(_)));
    }
}
