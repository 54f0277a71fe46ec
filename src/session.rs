//! The chat session controller.
//!
//! A [`ChatSession`] owns the transcript for the lifetime of one chat view.  It loads history
//! with exponential backoff, pushes outgoing messages through a debounce window into a single
//! in-flight slot, and can be torn down so that late timers and completions never touch state.
//!
//! History loading walks `Idle -> Loading -> {Loaded, Failed}`.  Authentication failures leave
//! the machine in `Unauthenticated`; the presentation layer decides where to send the user.
//!
//! Sends are split into discrete steps so an event loop can keep reading input while a request
//! is outstanding:
//!
//! 1. [`ChatSession::submit`] stages text; repeated submits within the window replace it.
//! 2. [`ChatSession::take_ready_send`] moves it into the in-flight slot once the window passes.
//! 3. [`ChatSession::dispatch`] returns the request future, which borrows nothing.
//! 4. [`ChatSession::complete_send`] applies the outcome.
//!
//! [`ChatSession::send`] runs all four in order.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::chat_api::ChatApi;
use crate::config::DEFAULT_DEBOUNCE;
use crate::debounce::Debouncer;
use crate::error::{Error, Result};
use crate::observability::{
    HISTORY_FAILURES, HISTORY_FETCHES, HISTORY_RETRIES, HISTORY_RETRY_BACKOFF, SEND_COALESCED,
    SEND_FAILURES, SEND_REJECTED, SEND_SENT,
};
use crate::retry::RetryPolicy;
use crate::types::ChatTurn;

const CLOSED: &str = "chat session closed";

/// Where history loading stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryState {
    /// Nothing requested yet.
    Idle,
    /// A fetch is running.  `attempt` counts from zero and resets on a manual retry.
    Loading {
        /// Zero-based attempt number.
        attempt: u32,
    },
    /// History arrived and the transcript holds it.
    Loaded,
    /// Every attempt failed.  Nothing more happens until a manual retry.
    Failed {
        /// The last error, as shown to the user.
        message: String,
    },
    /// The user has to log in again.
    Unauthenticated {
        /// Why.
        message: String,
    },
}

impl fmt::Display for HistoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryState::Idle => write!(f, "idle"),
            HistoryState::Loading { attempt } => write!(f, "loading (attempt {})", attempt + 1),
            HistoryState::Loaded => write!(f, "loaded"),
            HistoryState::Failed { message } => write!(f, "failed: {message}"),
            HistoryState::Unauthenticated { message } => write!(f, "logged out: {message}"),
        }
    }
}

/// Confirmed turns, in the order they were received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when there are no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The turns, oldest first.
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// The most recent turn.
    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, ChatTurn> {
        self.turns.iter()
    }

    fn replace(&mut self, turns: Vec<ChatTurn>) {
        self.turns = turns;
    }

    fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a ChatTurn;
    type IntoIter = std::slice::Iter<'a, ChatTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// A message that has left the debounce window and occupies the in-flight slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    seq: u64,
    text: String,
}

impl OutgoingMessage {
    /// Client-side sequence number, monotonic per session.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The text being sent.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Snapshot of a session for status displays.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// History state.
    pub history: HistoryState,
    /// Confirmed turns in the transcript.
    pub turn_count: usize,
    /// Text waiting out the debounce window.
    pub debouncing: Option<String>,
    /// Text of the send in flight.
    pub in_flight: Option<String>,
    /// Messages sent successfully during this session.
    pub sent: u64,
    /// Sends that failed during this session.
    pub failed_sends: u64,
    /// The last user-visible error.
    pub last_error: Option<String>,
    /// Debounce window.
    pub debounce: Duration,
    /// History retry policy.
    pub retry_policy: RetryPolicy,
}

/// Controller for one chat view.
pub struct ChatSession<A: ChatApi + 'static> {
    api: Arc<A>,
    policy: RetryPolicy,
    state: HistoryState,
    transcript: Transcript,
    last_error: Option<String>,
    outbox: Debouncer<String>,
    in_flight: Option<OutgoingMessage>,
    draft: Option<String>,
    next_seq: u64,
    sent: u64,
    failed_sends: u64,
    cancel: CancellationToken,
}

impl<A: ChatApi + 'static> ChatSession<A> {
    /// Creates a session with the default retry policy and debounce window.
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            policy: RetryPolicy::default(),
            state: HistoryState::Idle,
            transcript: Transcript::new(),
            last_error: None,
            outbox: Debouncer::new(DEFAULT_DEBOUNCE),
            in_flight: None,
            draft: None,
            next_seq: 0,
            sent: 0,
            failed_sends: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the history retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the debounce window for outgoing messages.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.outbox = Debouncer::new(window);
        self
    }

    /// The underlying API.
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Where history loading stands.
    pub fn history_state(&self) -> &HistoryState {
        &self.state
    }

    /// True once the server has rejected our credentials (or we had none).
    pub fn needs_reauth(&self) -> bool {
        matches!(self.state, HistoryState::Unauthenticated { .. })
    }

    /// Confirmed turns.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The last user-visible error, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Text that is debouncing or in flight.  Not part of the transcript; render it as
    /// unconfirmed.
    pub fn pending_message(&self) -> Option<&str> {
        self.in_flight
            .as_ref()
            .map(OutgoingMessage::text)
            .or_else(|| self.outbox.peek().map(String::as_str))
    }

    /// The text of the last submission that has not been confirmed.  Cleared on success so the
    /// input box can be emptied; kept on failure so the user can resend it.
    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    /// True while a send occupies the in-flight slot.
    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// A token that tears the session down when cancelled from elsewhere (e.g. a signal
    /// handler).  Cancelling it aborts backoff sleeps and in-flight requests.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Snapshot for status displays.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            history: self.state.clone(),
            turn_count: self.transcript.len(),
            debouncing: self.outbox.peek().cloned(),
            in_flight: self.in_flight.as_ref().map(|o| o.text.clone()),
            sent: self.sent,
            failed_sends: self.failed_sends,
            last_error: self.last_error.clone(),
            debounce: self.outbox.window(),
            retry_policy: self.policy,
        }
    }

    ////////////////////////////////////////// History //////////////////////////////////////////

    /// Load the transcript, retrying transient failures with exponential backoff.
    ///
    /// Attempts are strictly sequential.  Authentication failures stop immediately and leave the
    /// session in [`HistoryState::Unauthenticated`]; any other failure is retried until the
    /// policy's ceiling, after which the session is [`HistoryState::Failed`] and stays there
    /// until [`ChatSession::retry_history`].
    pub async fn load_history(&mut self) -> Result<()> {
        self.ensure_open()?;
        let cancel = self.cancel.clone();
        let mut failures = 0u32;
        loop {
            self.state = HistoryState::Loading { attempt: failures };
            HISTORY_FETCHES.click();
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::abort(CLOSED)),
                fetched = self.api.fetch_history() => fetched,
            };
            let err = match fetched {
                Ok(turns) => {
                    self.transcript.replace(turns);
                    self.last_error = None;
                    self.state = HistoryState::Loaded;
                    return Ok(());
                }
                Err(err) => err,
            };

            if err.requires_reauth() {
                self.last_error = Some(err.to_string());
                self.state = HistoryState::Unauthenticated {
                    message: err.to_string(),
                };
                return Err(err);
            }

            failures += 1;
            let Some(delay) = self.policy.delay_after(failures) else {
                HISTORY_FAILURES.click();
                self.last_error = Some(err.to_string());
                self.state = HistoryState::Failed {
                    message: err.to_string(),
                };
                return Err(err);
            };
            HISTORY_RETRIES.click();
            HISTORY_RETRY_BACKOFF.add(delay.as_secs_f64());
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::abort(CLOSED)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Manual retry: start over with the attempt counter at zero.
    pub async fn retry_history(&mut self) -> Result<()> {
        self.load_history().await
    }

    /// Record that a history load was abandoned by dropping its future.  A session left in
    /// `Loading` moves to `Failed` so a manual retry is offered; any other state is kept.
    pub fn interrupt_history(&mut self) {
        if matches!(self.state, HistoryState::Loading { .. }) {
            let message = "loading history was interrupted".to_string();
            self.last_error = Some(message.clone());
            self.state = HistoryState::Failed { message };
        }
    }

    //////////////////////////////////////////// Send ///////////////////////////////////////////

    /// Stage `text` for sending.
    ///
    /// Blank text is rejected.  While a send is in flight every submission is rejected with
    /// [`Error::Busy`]; it is not queued.  Otherwise the text replaces anything still waiting in
    /// the debounce window, and the window restarts.
    pub fn submit(&mut self, text: &str) -> Result<()> {
        self.ensure_open()?;
        if text.trim().is_empty() {
            return Err(Error::validation(
                "message must not be empty",
                Some("message".to_string()),
            ));
        }
        if self.in_flight.is_some() {
            SEND_REJECTED.click();
            return Err(Error::busy("a message is already being sent"));
        }
        if self.outbox.push(text.to_string(), Instant::now()) {
            SEND_COALESCED.click();
        }
        self.draft = Some(text.to_string());
        self.last_error = None;
        Ok(())
    }

    /// When staged text becomes ready to send.  `None` when nothing is staged or a send is
    /// already in flight.
    pub fn send_deadline(&self) -> Option<Instant> {
        if self.in_flight.is_some() || self.is_closed() {
            return None;
        }
        self.outbox.deadline()
    }

    /// Claim the in-flight slot for the staged text if its window has passed at `now`.
    pub fn take_ready_send(&mut self, now: Instant) -> Option<OutgoingMessage> {
        if self.in_flight.is_some() || self.is_closed() {
            return None;
        }
        let text = self.outbox.take_ready(now)?;
        self.next_seq += 1;
        let outgoing = OutgoingMessage {
            seq: self.next_seq,
            text,
        };
        self.in_flight = Some(outgoing.clone());
        Some(outgoing)
    }

    /// Drop text still waiting out the debounce window.  Sends already in flight are unaffected.
    pub fn discard_pending(&mut self) -> Option<String> {
        let discarded = self.outbox.cancel();
        if discarded.is_some() {
            self.draft = None;
        }
        discarded
    }

    /// The request for `outgoing`.  The future owns everything it needs and resolves to
    /// [`Error::Abort`] if the session is torn down first.
    pub fn dispatch(&self, outgoing: &OutgoingMessage) -> BoxFuture<'static, Result<ChatTurn>> {
        let api = Arc::clone(&self.api);
        let cancel = self.cancel.clone();
        let text = outgoing.text.clone();
        async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(Error::abort(CLOSED)),
                result = api.send_message(&text) => result,
            }
        }
        .boxed()
    }

    /// Apply the outcome of `outgoing`.
    ///
    /// On success the turn is appended and the draft cleared.  On failure the transcript is
    /// untouched and the error is recorded.  Completions for a torn-down session or for a send
    /// that no longer owns the slot change nothing and return [`Error::Abort`].
    pub fn complete_send(
        &mut self,
        outgoing: OutgoingMessage,
        result: Result<ChatTurn>,
    ) -> Result<ChatTurn> {
        if self.is_closed() {
            return Err(Error::abort(CLOSED));
        }
        match &self.in_flight {
            Some(current) if current.seq == outgoing.seq => {}
            _ => return Err(Error::abort("stale send completion")),
        }
        self.in_flight = None;

        match result {
            Ok(turn) => {
                SEND_SENT.click();
                self.sent += 1;
                self.transcript.push(turn.clone());
                self.draft = None;
                self.last_error = None;
                Ok(turn)
            }
            Err(err) => {
                SEND_FAILURES.click();
                self.failed_sends += 1;
                self.last_error = Some(err.to_string());
                if err.requires_reauth() {
                    self.state = HistoryState::Unauthenticated {
                        message: err.to_string(),
                    };
                }
                Err(err)
            }
        }
    }

    /// Wait out the debounce window and send whatever is staged.  `Ok(None)` when nothing was.
    pub async fn flush(&mut self) -> Result<Option<ChatTurn>> {
        let Some(deadline) = self.send_deadline() else {
            return Ok(None);
        };
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::abort(CLOSED)),
            _ = tokio::time::sleep_until(deadline) => {}
        }
        let Some(outgoing) = self.take_ready_send(Instant::now()) else {
            return Ok(None);
        };
        let result = self.dispatch(&outgoing).await;
        self.complete_send(outgoing, result).map(Some)
    }

    /// Submit `text` and carry it through to completion.
    pub async fn send(&mut self, text: &str) -> Result<ChatTurn> {
        self.submit(text)?;
        self.flush()
            .await?
            .ok_or_else(|| Error::abort("message was not sent"))
    }

    ////////////////////////////////////////// Teardown /////////////////////////////////////////

    /// End the session: cancel timers and requests, drop staged text and the transcript.
    /// Every later operation fails with [`Error::Abort`].
    pub fn teardown(&mut self) {
        self.cancel.cancel();
        self.outbox.cancel();
        self.in_flight = None;
        self.draft = None;
        self.transcript.clear();
        self.last_error = None;
        self.state = HistoryState::Idle;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::abort(CLOSED))
        } else {
            Ok(())
        }
    }
}

impl<A: ChatApi + 'static> Drop for ChatSession<A> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use time::macros::datetime;

    use super::*;

    const BASE: Duration = Duration::from_secs(1);

    fn turn(id: i64, message: &str, response: &str) -> ChatTurn {
        ChatTurn::new(id, message, response, datetime!(2024-05-01 10:30:00 UTC))
    }

    fn transient() -> Error {
        Error::connection("connection refused", None)
    }

    /// Replays scripted results and records when each call happened.
    #[derive(Default)]
    struct ScriptedApi {
        history: Mutex<VecDeque<Result<Vec<ChatTurn>>>>,
        sends: Mutex<VecDeque<Result<ChatTurn>>>,
        fetch_times: Mutex<Vec<Instant>>,
        sent_texts: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn with_history(results: Vec<Result<Vec<ChatTurn>>>) -> Self {
            Self {
                history: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        fn with_sends(results: Vec<Result<ChatTurn>>) -> Self {
            Self {
                sends: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        fn fetch_times(&self) -> Vec<Instant> {
            self.fetch_times.lock().unwrap().clone()
        }

        fn sent_texts(&self) -> Vec<String> {
            self.sent_texts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatApi for ScriptedApi {
        async fn fetch_history(&self) -> Result<Vec<ChatTurn>> {
            self.fetch_times.lock().unwrap().push(Instant::now());
            self.history
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(transient()))
        }

        async fn send_message(&self, text: &str) -> Result<ChatTurn> {
            self.sent_texts.lock().unwrap().push(text.to_string());
            self.sends
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(transient()))
        }
    }

    fn session(api: ScriptedApi) -> (Arc<ScriptedApi>, ChatSession<ScriptedApi>) {
        let api = Arc::new(api);
        let session = ChatSession::new(Arc::clone(&api));
        (api, session)
    }

    #[tokio::test(start_paused = true)]
    async fn history_loads_first_try() {
        let history = vec![turn(1, "hi", "hello"), turn(2, "how are you?", "fine")];
        let (api, mut session) = session(ScriptedApi::with_history(vec![Ok(history.clone())]));
        assert_eq!(session.history_state(), &HistoryState::Idle);

        session.load_history().await.unwrap();
        assert_eq!(session.history_state(), &HistoryState::Loaded);
        assert_eq!(session.transcript().turns(), history.as_slice());
        assert_eq!(api.fetch_times().len(), 1);
        assert!(session.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn history_recovers_after_transient_failures() {
        for failures in 1..=3usize {
            let mut script: Vec<Result<Vec<ChatTurn>>> =
                (0..failures).map(|_| Err(transient())).collect();
            script.push(Ok(vec![turn(1, "hi", "hello")]));
            let (api, mut session) = session(ScriptedApi::with_history(script));

            session.load_history().await.unwrap();
            assert_eq!(session.history_state(), &HistoryState::Loaded);
            assert_eq!(session.transcript().len(), 1);
            assert!(session.last_error().is_none());

            let times = api.fetch_times();
            assert_eq!(times.len(), failures + 1);
            for k in 0..failures {
                let gap = times[k + 1] - times[k];
                assert!(gap >= BASE * (1u32 << k), "gap {k} was {gap:?}");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn history_fails_after_ceiling_and_waits_for_manual_retry() {
        let mut script: Vec<Result<Vec<ChatTurn>>> = (0..4)
            .map(|_| Err(Error::internal_server("database is down")))
            .collect();
        script.push(Ok(vec![turn(9, "later", "recovered")]));
        let (api, mut session) = session(ScriptedApi::with_history(script));

        let err = session.load_history().await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(api.fetch_times().len(), 4);
        assert!(matches!(
            session.history_state(),
            HistoryState::Failed { message } if message.contains("database is down")
        ));
        assert!(session.last_error().unwrap().contains("database is down"));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(api.fetch_times().len(), 4);

        session.retry_history().await.unwrap();
        assert_eq!(api.fetch_times().len(), 5);
        assert_eq!(session.history_state(), &HistoryState::Loaded);
        assert_eq!(session.transcript().last().unwrap().id, 9);
        assert!(session.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_retry_gets_the_full_budget_again() {
        let script: Vec<Result<Vec<ChatTurn>>> = (0..8).map(|_| Err(transient())).collect();
        let (api, mut session) = session(ScriptedApi::with_history(script));

        assert!(session.load_history().await.is_err());
        assert_eq!(api.fetch_times().len(), 4);
        assert!(session.retry_history().await.is_err());
        assert_eq!(api.fetch_times().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn session_expiry_halts_retries() {
        let script = vec![
            Err(transient()),
            Err(Error::session_expired("Could not validate credentials")),
            Ok(vec![turn(1, "hi", "hello")]),
        ];
        let (api, mut session) = session(ScriptedApi::with_history(script));

        let err = session.load_history().await.unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(api.fetch_times().len(), 2);
        assert!(session.needs_reauth());
        assert!(session.transcript().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_token_is_not_retried() {
        let script = vec![Err(Error::auth_required("No authentication token found"))];
        let (api, mut session) = session(ScriptedApi::with_history(script));

        let err = session.load_history().await.unwrap_err();
        assert!(err.is_auth_required());
        assert_eq!(api.fetch_times().len(), 1);
        assert!(session.needs_reauth());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_backoff_stops_retries() {
        let (api, mut session) = session(ScriptedApi::default());
        let token = session.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            token.cancel();
        });

        let err = session.load_history().await.unwrap_err();
        assert!(err.is_abort());
        assert_eq!(api.fetch_times().len(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.fetch_times().len(), 2);
        assert!(session.load_history().await.unwrap_err().is_abort());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_load_can_be_marked_interrupted() {
        let script = vec![Err(transient()), Ok(vec![turn(1, "hi", "hello")])];
        let (api, mut session) = session(ScriptedApi::with_history(script));

        let dropped =
            tokio::time::timeout(Duration::from_millis(500), session.load_history()).await;
        assert!(dropped.is_err());
        assert!(matches!(
            session.history_state(),
            HistoryState::Loading { .. }
        ));

        session.interrupt_history();
        assert!(matches!(
            session.history_state(),
            HistoryState::Failed { message } if message.contains("interrupted")
        ));
        assert!(session.last_error().is_some());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.fetch_times().len(), 1);

        session.retry_history().await.unwrap();
        assert_eq!(session.history_state(), &HistoryState::Loaded);
        assert_eq!(api.fetch_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_leaves_settled_states_alone() {
        let (_, mut session) = session(ScriptedApi::with_history(vec![Ok(vec![])]));
        session.interrupt_history();
        assert_eq!(session.history_state(), &HistoryState::Idle);

        session.load_history().await.unwrap();
        session.interrupt_history();
        assert_eq!(session.history_state(), &HistoryState::Loaded);
        assert!(session.last_error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn send_without_token_leaves_transcript_alone() {
        let sends = vec![Err(Error::auth_required("No authentication token found"))];
        let (_, mut session) = session(ScriptedApi::with_sends(sends));

        let err = session.send("hello").await.unwrap_err();
        assert!(err.is_auth_required());
        assert!(session.transcript().is_empty());
        assert!(session.needs_reauth());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_submits_collapse_to_latest() {
        let sends = vec![Ok(turn(3, "second", "got it"))];
        let (api, mut session) = session(ScriptedApi::with_sends(sends));

        session.submit("first").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.submit("second").unwrap();
        assert_eq!(session.pending_message(), Some("second"));

        let sent = session.flush().await.unwrap().unwrap();
        assert_eq!(sent.message, "second");
        assert_eq!(api.sent_texts(), vec!["second".to_string()]);
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.flush().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_window_is_honored() {
        let sends = vec![Ok(turn(1, "hi", "hello!"))];
        let (_, mut session) = session(ScriptedApi::with_sends(sends));

        let start = Instant::now();
        session.submit("hi").unwrap();
        assert!(session.take_ready_send(start).is_none());
        assert_eq!(session.send_deadline(), Some(start + DEFAULT_DEBOUNCE));
        assert!(
            session
                .take_ready_send(start + DEFAULT_DEBOUNCE)
                .is_some()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn successful_send_appends_returned_turn() {
        let existing = vec![turn(5, "earlier", "sure"), turn(6, "again", "ok")];
        let reply = turn(7, "hi", "hello!");
        let api = ScriptedApi {
            history: Mutex::new(vec![Ok(existing)].into()),
            sends: Mutex::new(vec![Ok(reply.clone())].into()),
            ..ScriptedApi::default()
        };
        let (_, mut session) = session(api);
        session.load_history().await.unwrap();
        let before = session.transcript().len();

        let sent = session.send("hi").await.unwrap();
        assert_eq!(sent, reply);
        assert_eq!(session.transcript().len(), before + 1);
        assert_eq!(session.transcript().last(), Some(&reply));
        assert!(session.draft().is_none());
        assert!(session.pending_message().is_none());
        assert_eq!(session.stats().sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_leaves_transcript_unchanged() {
        let api = ScriptedApi {
            history: Mutex::new(vec![Ok(vec![turn(1, "hi", "hello")])].into()),
            sends: Mutex::new(vec![Err(Error::internal_server("upstream model failed"))].into()),
            ..ScriptedApi::default()
        };
        let (_, mut session) = session(api);
        session.load_history().await.unwrap();

        let err = session.send("tell me a joke").await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(session.transcript().len(), 1);
        assert!(!session.last_error().unwrap().is_empty());
        assert_eq!(session.draft(), Some("tell me a joke"));
        assert!(!session.is_sending());
        assert_eq!(session.stats().failed_sends, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_while_in_flight_is_rejected() {
        let sends = vec![Ok(turn(1, "first", "one")), Ok(turn(2, "second", "two"))];
        let (api, mut session) = session(ScriptedApi::with_sends(sends));

        session.submit("first").unwrap();
        let now = Instant::now() + DEFAULT_DEBOUNCE;
        let outgoing = session.take_ready_send(now).unwrap();
        assert_eq!(outgoing.text(), "first");
        assert!(session.is_sending());
        assert_eq!(session.send_deadline(), None);

        let err = session.submit("second").unwrap_err();
        assert!(err.is_busy());
        assert_eq!(session.pending_message(), Some("first"));

        let result = session.dispatch(&outgoing).await;
        session.complete_send(outgoing, result).unwrap();
        assert!(!session.is_sending());

        session.send("second").await.unwrap();
        assert_eq!(
            api.sent_texts(),
            vec!["first".to_string(), "second".to_string()]
        );
        let ids: Vec<i64> = session.transcript().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_text_is_never_sent() {
        let (api, mut session) = session(ScriptedApi::default());
        session.submit("oops").unwrap();
        assert_eq!(session.discard_pending(), Some("oops".to_string()));
        assert_eq!(session.flush().await.unwrap(), None);
        assert!(api.sent_texts().is_empty());
        assert!(session.draft().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_submit_is_rejected() {
        let (_, mut session) = session(ScriptedApi::default());
        assert!(session.submit("   ").unwrap_err().is_validation());
        assert!(session.pending_message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completion_after_teardown_is_ignored() {
        let sends = vec![Ok(turn(1, "hi", "hello!"))];
        let (_, mut session) = session(ScriptedApi::with_sends(sends));

        session.submit("hi").unwrap();
        let outgoing = session
            .take_ready_send(Instant::now() + DEFAULT_DEBOUNCE)
            .unwrap();
        let late = Ok(turn(1, "hi", "hello!"));
        session.teardown();

        let err = session.complete_send(outgoing, late).unwrap_err();
        assert!(err.is_abort());
        assert!(session.transcript().is_empty());
        assert!(session.submit("again").unwrap_err().is_abort());
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_aborts_on_teardown() {
        let (_, mut session) = session(ScriptedApi::default());
        session.submit("hi").unwrap();
        let outgoing = session
            .take_ready_send(Instant::now() + DEFAULT_DEBOUNCE)
            .unwrap();
        let request = session.dispatch(&outgoing);
        session.teardown();
        assert!(request.await.unwrap_err().is_abort());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_is_ignored() {
        let (_, mut session) = session(ScriptedApi::default());
        let bogus = OutgoingMessage {
            seq: 42,
            text: "never sent".to_string(),
        };
        let err = session
            .complete_send(bogus, Ok(turn(1, "never sent", "?")))
            .unwrap_err();
        assert!(err.is_abort());
        assert!(session.transcript().is_empty());
    }
}
