//! # Feed-update orchestrator
//!
//! Drives one merge cycle end to end:
//!
//! ```text
//! IDLE → FETCHING_NEW_CONTENT → PARSING → MERGING → SERIALIZING → WRITING_BACK → IDLE
//!                    │               │        │           │             │
//!                    └───────────────┴────────┴───────────┴─────────────┴──► FAILED → IDLE
//! ```
//!
//! The managed block lives between byte-exact sentinel markers inside the
//! transcript's first message (the "floor"). A cycle extracts the block,
//! parses it as `existing`, asks the generation collaborator for `incoming`
//! markup, merges, serializes, and splices the result back at the same
//! position, leaving surrounding text byte-for-byte untouched.
//!
//! ## Concurrency
//! One authoritative state variable behind a mutex; no parallel cycles. A
//! forced trigger may pre-empt an automatic cycle that has not reached its
//! write step (the epoch counter invalidates the old cycle, which aborts at
//! its mandatory pre-write re-check). Two forced triggers never run
//! concurrently. A watchdog task hard-resets the phase after a safety delay
//! in case an error path fails to clear it. Failed cycles are not retried;
//! the next threshold-triggered opportunity picks up the work.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::grammar::{BLOCK_END, BLOCK_HEADER, BLOCK_START};
use crate::merge::{merge, MergeConfig};
use crate::model::FeedSet;
use crate::parser::parse;
use crate::serializer::serialize;
use crate::settings::FeedSettings;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// One message of the host transcript.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub text: String,
    pub is_user: bool,
    pub author: String,
}

/// Read-only snapshot of the transcript.
#[derive(Debug, Clone, Default)]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub character_name: String,
}

/// Transcript storage, implemented by the embedding host. Both mutation
/// primitives are assumed to be effectively atomic single-message writes.
pub trait ChatHost: Send + Sync {
    fn snapshot(&self) -> ChatSnapshot;
    /// Returns false when the host rejects the mutation.
    fn modify_message(&self, index: usize, new_text: &str) -> bool;
    /// Appends a message, returning its index.
    fn add_message(&self, text: &str, is_user: bool, author: &str) -> usize;
}

/// Produces new markup text from a prompt. May fail or hang; the orchestrator
/// applies its own deadline.
pub trait ContentGenerator: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, FeedError>> + Send;
}

// ---------------------------------------------------------------------------
// Cycle state machine
// ---------------------------------------------------------------------------

/// Phase of the current merge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    FetchingNewContent,
    Parsing,
    Merging,
    Serializing,
    WritingBack,
    Failed,
}

#[derive(Debug)]
struct CycleState {
    phase: CyclePhase,
    /// Bumped on every cycle start; an in-flight cycle whose epoch no longer
    /// matches has been pre-empted and must not write.
    epoch: u64,
    forced: bool,
    cycle_id: String,
    /// Floor message count recorded at the end of the last completed cycle.
    last_cycle_message_count: usize,
}

/// Outcome notification consumed by the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed { cycle_id: String, post_count: usize, comment_count: usize },
    Failed { cycle_id: String, reason: String },
    Busy,
}

/// Counters readable from outside the cycle.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorStatus {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Knobs for the cycle runner.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub merge: MergeConfig,
    /// Deadline for the generation call. Expiry is a terminal cycle failure.
    pub generate_timeout: Duration,
    /// Hard fallback: the watchdog returns the phase to Idle after this delay
    /// if the same cycle is still holding it.
    pub safety_reset: Duration,
    /// How many trailing transcript messages feed the generation prompt.
    pub prompt_tail: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            merge: MergeConfig::default(),
            generate_timeout: Duration::from_secs(60),
            safety_reset: Duration::from_secs(300),
            prompt_tail: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// Managed-block helpers (pure)
// ---------------------------------------------------------------------------

/// Byte offsets of the managed block's inner text, when both sentinels are
/// present in order.
pub fn locate_block(text: &str) -> Option<(usize, usize)> {
    let start = text.find(BLOCK_START)?;
    let inner_start = start + BLOCK_START.len();
    let inner_len = text[inner_start..].find(BLOCK_END)?;
    Some((inner_start, inner_start + inner_len))
}

/// Inner text of the managed block, if present.
pub fn extract_block(text: &str) -> Option<&str> {
    locate_block(text).map(|(s, e)| &text[s..e])
}

/// Wrap serialized markup with the sentinel markers and the fixed header.
pub fn wrap_block(body: &str) -> String {
    if body.is_empty() {
        format!("{BLOCK_START}\n{BLOCK_HEADER}\n{BLOCK_END}")
    } else {
        format!("{BLOCK_START}\n{BLOCK_HEADER}\n{body}\n{BLOCK_END}")
    }
}

/// Replace the managed block inside `text` with `block` (sentinels included),
/// leaving surrounding text byte-for-byte untouched. When no block exists the
/// new one is appended after the existing text.
pub fn splice_block(text: &str, block: &str) -> String {
    match locate_block(text) {
        Some((inner_start, inner_end)) => {
            let outer_start = inner_start - BLOCK_START.len();
            let outer_end = inner_end + BLOCK_END.len();
            format!("{}{}{}", &text[..outer_start], block, &text[outer_end..])
        }
        None if text.is_empty() => block.to_string(),
        None => format!("{text}\n\n{block}"),
    }
}

/// Unix epoch in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// FeedOrchestrator
// ---------------------------------------------------------------------------

/// Owns the cycle state machine and the two collaborators.
pub struct FeedOrchestrator<H: ChatHost, G: ContentGenerator> {
    config: OrchestratorConfig,
    host: H,
    generator: G,
    state: Arc<Mutex<CycleState>>,
    status: Arc<Mutex<OrchestratorStatus>>,
    outcome_tx: broadcast::Sender<CycleOutcome>,
}

impl<H: ChatHost, G: ContentGenerator> FeedOrchestrator<H, G> {
    pub fn new(config: OrchestratorConfig, host: H, generator: G) -> Self {
        let (outcome_tx, _rx) = broadcast::channel(32);
        FeedOrchestrator {
            config,
            host,
            generator,
            state: Arc::new(Mutex::new(CycleState {
                phase: CyclePhase::Idle,
                epoch: 0,
                forced: false,
                cycle_id: String::new(),
                last_cycle_message_count: 0,
            })),
            status: Arc::new(Mutex::new(OrchestratorStatus::default())),
            outcome_tx,
        }
    }

    /// Subscribe to cycle outcome notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Current phase, for dashboards and tests.
    pub fn phase(&self) -> CyclePhase {
        self.state.lock().map(|s| s.phase).unwrap_or(CyclePhase::Idle)
    }

    pub fn status_snapshot(&self) -> OrchestratorStatus {
        self.status.lock().map(|s| s.clone()).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Entry guard
    // -----------------------------------------------------------------------

    /// Claim the state machine for a new cycle. Returns the epoch token the
    /// cycle must present at every later transition.
    fn begin_cycle(&self, force: bool) -> Result<(u64, String), FeedError> {
        let mut state = self.state.lock().map_err(|_| FeedError::Busy)?;
        let in_flight = state.phase != CyclePhase::Idle && state.phase != CyclePhase::Failed;
        if in_flight {
            // A forced trigger may override an automatic cycle that has not
            // reached its write step. Forced-vs-forced is always rejected.
            let preemptable = !state.forced && state.phase != CyclePhase::WritingBack;
            if !(force && preemptable) {
                let _ = self.outcome_tx.send(CycleOutcome::Busy);
                return Err(FeedError::Busy);
            }
            warn!(cycle_id = %state.cycle_id, "forced trigger pre-empting automatic cycle");
        }
        state.epoch += 1;
        state.phase = CyclePhase::FetchingNewContent;
        state.forced = force;
        state.cycle_id = uuid::Uuid::new_v4().to_string();
        Ok((state.epoch, state.cycle_id.clone()))
    }

    /// Advance the phase, verifying the cycle still owns the state machine.
    fn transition(&self, epoch: u64, phase: CyclePhase) -> Result<(), FeedError> {
        let mut state = self.state.lock().map_err(|_| FeedError::Busy)?;
        if state.epoch != epoch {
            return Err(FeedError::Preempted);
        }
        debug!(prev = ?state.phase, next = ?phase, "cycle transition");
        state.phase = phase;
        Ok(())
    }

    /// Terminal failure: no write was committed; the busy flag is cleared.
    fn fail(&self, epoch: u64, cycle_id: &str, err: &FeedError) {
        if let Ok(mut state) = self.state.lock() {
            if state.epoch == epoch {
                state.phase = CyclePhase::Failed;
                state.phase = CyclePhase::Idle;
            }
        }
        if let Ok(mut status) = self.status.lock() {
            status.cycles_failed += 1;
            status.last_error = Some(err.to_string());
        }
        let _ = self.outcome_tx.send(CycleOutcome::Failed {
            cycle_id: cycle_id.to_string(),
            reason: err.to_string(),
        });
    }

    /// Spawn the hard fallback that clears a stuck busy flag.
    fn arm_watchdog(&self, epoch: u64) {
        let state = Arc::clone(&self.state);
        let delay = self.config.safety_reset;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut s) = state.lock() {
                if s.epoch == epoch && s.phase != CyclePhase::Idle {
                    warn!("watchdog reset: cycle held the busy flag past the safety delay");
                    s.phase = CyclePhase::Idle;
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// True when the automatic trigger is armed: auto-update enabled and the
    /// transcript has grown by at least `threshold` messages since the last
    /// completed cycle.
    pub fn should_trigger(&self, settings: &FeedSettings) -> bool {
        if !settings.auto_update {
            return false;
        }
        let count = self.host.snapshot().messages.len();
        let last = self
            .state
            .lock()
            .map(|s| s.last_cycle_message_count)
            .unwrap_or(0);
        count.saturating_sub(last) >= settings.threshold as usize
    }

    /// Run an automatic cycle when the threshold trigger is armed.
    pub async fn maybe_auto_cycle(&self, settings: &FeedSettings) -> Option<Result<CycleOutcome, FeedError>> {
        if self.should_trigger(settings) {
            Some(self.run_cycle(false).await)
        } else {
            None
        }
    }

    /// Timer-based fallback poll. Settings are re-read from disk on every
    /// tick so user edits take effect without a restart; failed cycles simply
    /// wait for the next tick.
    pub async fn poll_loop(&self, settings_path: &std::path::Path, interval: Duration) {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let settings = match FeedSettings::load(settings_path) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "settings unreadable, using defaults for this tick");
                    FeedSettings::default()
                }
            };
            if let Some(Err(e)) = self.maybe_auto_cycle(&settings).await {
                debug!(error = %e, "automatic cycle did not complete");
            }
        }
    }

    // -----------------------------------------------------------------------
    // The merge cycle
    // -----------------------------------------------------------------------

    /// Run one full merge cycle. `force` marks a manual trigger, which may
    /// pre-empt an in-flight automatic cycle (never another forced one).
    pub async fn run_cycle(&self, force: bool) -> Result<CycleOutcome, FeedError> {
        let (epoch, cycle_id) = self.begin_cycle(force)?;
        self.arm_watchdog(epoch);
        info!(cycle_id = %cycle_id, force, "merge cycle started");

        match self.drive_cycle(epoch, &cycle_id).await {
            Ok(outcome) => {
                if let Ok(mut status) = self.status.lock() {
                    status.cycles_completed += 1;
                    status.last_error = None;
                }
                let _ = self.outcome_tx.send(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                self.fail(epoch, &cycle_id, &err);
                Err(err)
            }
        }
    }

    async fn drive_cycle(&self, epoch: u64, cycle_id: &str) -> Result<CycleOutcome, FeedError> {
        // FETCHING_NEW_CONTENT: the entry guard already put us here.
        let snapshot = self.host.snapshot();
        let floor = snapshot.messages.first().ok_or(FeedError::MissingFloor)?;
        let existing_block = extract_block(&floor.text).map(str::to_string);

        let prompt = self.build_prompt(&snapshot, existing_block.as_deref());
        let incoming_text =
            match tokio::time::timeout(self.config.generate_timeout, self.generator.generate(&prompt))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(FeedError::GenerationTimeout(self.config.generate_timeout)),
            };

        // PARSING
        self.transition(epoch, CyclePhase::Parsing)?;
        let incoming = parse(&incoming_text);

        // MERGING / SERIALIZING. When no managed block exists yet there is
        // nothing to parse or merge; the incoming set is wrapped directly.
        let merged: FeedSet = match &existing_block {
            Some(inner) => {
                let existing = parse(inner);
                self.transition(epoch, CyclePhase::Merging)?;
                merge(&existing, &incoming, now_ms(), &self.config.merge)
            }
            None => {
                self.transition(epoch, CyclePhase::Merging)?;
                incoming
            }
        };
        self.transition(epoch, CyclePhase::Serializing)?;
        let block = wrap_block(&serialize(&merged));

        // WRITING_BACK: the transition doubles as the defensive pre-write
        // re-check: a pre-empted cycle aborts here instead of committing.
        self.transition(epoch, CyclePhase::WritingBack)?;
        // Re-read the floor so the splice lands in the freshest text; the
        // read-modify-write of the shared transcript is not otherwise atomic.
        let fresh = self.host.snapshot();
        let floor_text = fresh
            .messages
            .first()
            .map(|m| m.text.clone())
            .ok_or(FeedError::MissingFloor)?;
        let new_floor = splice_block(&floor_text, &block);
        if !self.host.modify_message(0, &new_floor) {
            return Err(FeedError::WriteRejected { index: 0 });
        }

        // Back to IDLE; arm the next threshold window.
        {
            let mut state = self.state.lock().map_err(|_| FeedError::Busy)?;
            if state.epoch != epoch {
                // The write already committed; pre-emption this late only
                // means the new cycle owns the phase variable.
                warn!(cycle_id = %cycle_id, "cycle pre-empted after write committed");
            } else {
                state.phase = CyclePhase::Idle;
                state.last_cycle_message_count = fresh.messages.len();
            }
        }

        info!(
            cycle_id = %cycle_id,
            posts = merged.posts.len(),
            comments = merged.comments.len(),
            "merge cycle committed"
        );
        Ok(CycleOutcome::Completed {
            cycle_id: cycle_id.to_string(),
            post_count: merged.posts.len(),
            comment_count: merged.comments.len(),
        })
    }

    /// Prompt context handed to the generation collaborator: character name,
    /// the trailing transcript window, and the current block for continuity.
    fn build_prompt(&self, snapshot: &ChatSnapshot, existing_block: Option<&str>) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!("Character: {}\n\n", snapshot.character_name));
        prompt.push_str("Recent conversation:\n");
        let tail = snapshot
            .messages
            .iter()
            .rev()
            .take(self.config.prompt_tail)
            .collect::<Vec<_>>();
        for msg in tail.into_iter().rev() {
            prompt.push_str(&format!("{}: {}\n", msg.author, msg.text));
        }
        if let Some(block) = existing_block {
            prompt.push_str("\nCurrent feed state:\n");
            prompt.push_str(block);
            prompt.push('\n');
        }
        prompt.push_str("\nGenerate new feed activity as bracket tokens.\n");
        prompt
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
