use super::config::SessionConfig;
use super::state::{Action, SessionState, StateMachine, Transition};
use super::stats::{Counters, SessionStats};
use super::translator::{ErrorNotification, ErrorReason, RecognitionResult, Translated, Translator};
use crate::engine::{EngineListener, RawResult, RecognitionEngine};
use crate::error::{Result, SessionError};
use crate::events::{
    ActivityEvent, DispatchGate, EventCategory, EventChannel, GateGuard, SessionEvent,
    SessionEventKind,
};
use crate::operation::{Executor, Operation, Sequencer};
use crate::params::{OutputFormat, ParameterName, ParameterStore, ParameterValue, RecognitionMode};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

/// A speech recognition session bound to one engine.
///
/// Every action validates the current state synchronously, then runs as a
/// single unit of work on the session's background executor and returns an
/// [`Operation`] immediately. State-changing work runs one unit at a time, in
/// the order the actions were accepted. Engine notifications are translated
/// and fired on the matching event channel from the engine's own thread.
///
/// Disposal is explicit through [`SpeechSession::dispose`] and also happens
/// on drop.
pub struct SpeechSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    machine: Mutex<StateMachine>,

    /// Taken out exactly once, at disposal
    engine: Mutex<Option<Arc<dyn RecognitionEngine>>>,

    /// Identifier from the most recent session-started notification
    session_id: RwLock<Option<String>>,

    /// Engine session in progress; cleared when it stops
    live_session_id: RwLock<Option<String>>,

    /// Session of the latest final or error result notification
    utterance_session_id: Mutex<Option<String>>,

    parameters: ParameterStore,

    session_events: EventChannel<SessionEvent>,
    intermediate_results: EventChannel<RecognitionResult>,
    final_results: EventChannel<RecognitionResult>,
    errors: EventChannel<ErrorNotification>,
    activities: EventChannel<ActivityEvent>,

    gate: DispatchGate,

    /// Held across every engine call made after construction
    engine_calls: DispatchGate,

    /// Orders state-changing work units
    sequencer: Sequencer,

    counters: Counters,
    created_at: DateTime<Utc>,
    executor: Executor,
}

/// Listener registered with the engine; holds the session weakly
struct EngineBridge {
    session: Weak<SessionInner>,
}

impl SpeechSession {
    /// Create a session over an already-configured engine
    pub fn new(engine: Arc<dyn RecognitionEngine>, config: &SessionConfig) -> Result<Self> {
        let executor = Executor::new(config.worker_threads, config.max_blocking_threads)
            .map_err(|e| SessionError::Runtime(e.to_string()))?;

        let parameters = ParameterStore::new();
        parameters.set_known(ParameterName::RecognitionLanguage, config.language.as_str())?;
        parameters.set_known(ParameterName::DeploymentId, config.deployment_id.as_str())?;
        parameters.set_known(ParameterName::OutputFormat, config.output_format.as_str())?;
        parameters.set_known(ParameterName::RecognitionMode, config.recognition_mode.as_str())?;
        for (name, value) in &config.parameters {
            parameters.set(name, value.clone())?;
        }

        for (name, value) in parameters.snapshot() {
            engine
                .set_parameter(&name, &value)
                .map_err(SessionError::engine)?;
        }

        let inner = Arc::new(SessionInner {
            machine: Mutex::new(StateMachine::new()),
            engine: Mutex::new(Some(Arc::clone(&engine))),
            session_id: RwLock::new(None),
            live_session_id: RwLock::new(None),
            utterance_session_id: Mutex::new(None),
            parameters,
            session_events: EventChannel::new(EventCategory::Session),
            intermediate_results: EventChannel::new(EventCategory::IntermediateResult),
            final_results: EventChannel::new(EventCategory::FinalResult),
            errors: EventChannel::new(EventCategory::Error),
            activities: EventChannel::new(EventCategory::Activity),
            gate: DispatchGate::new(),
            engine_calls: DispatchGate::new(),
            sequencer: Sequencer::new(),
            counters: Counters::default(),
            created_at: Utc::now(),
            executor,
        });

        let bridge = Arc::new(EngineBridge {
            session: Arc::downgrade(&inner),
        });
        engine
            .register_listener(bridge)
            .map_err(SessionError::engine)?;

        info!(
            "Created speech session (language={}, format={})",
            config.language,
            config.output_format.as_str()
        );

        Ok(Self { inner })
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Recognize a single utterance.
    ///
    /// The operation resolves to the final result. A no-match or canceled
    /// outcome fails the operation with [`SessionError::NotRecognized`].
    pub fn recognize_once(&self) -> Result<Operation<RecognitionResult>> {
        self.inner.submit(Action::RecognizeOnce, |inner, _| {
            let outcome = inner.run_recognize_once();
            inner.machine.lock().finish();
            inner.ensure_live()?;
            outcome
        })
    }

    /// Start listening until [`SpeechSession::stop_continuous_recognition`]
    pub fn start_continuous_recognition(&self) -> Result<Operation<()>> {
        self.inner.submit(Action::StartContinuous, |inner, _| {
            inner.run_start(RecognitionMode::Conversation, |engine| {
                engine.start_continuous_recognition()
            })
        })
    }

    /// Stop continuous recognition. Accepted while the start is still
    /// pending, in which case it runs once the start has finished.
    pub fn stop_continuous_recognition(&self) -> Result<Operation<()>> {
        self.inner.submit(Action::StopContinuous, |inner, transition| {
            inner.run_stop(transition, |engine| engine.stop_continuous_recognition())
        })
    }

    /// Arm keyword spotting; full recognition starts each time `keyword` is heard
    pub fn start_keyword_recognition(&self, keyword: impl Into<String>) -> Result<Operation<()>> {
        let keyword = keyword.into();
        if keyword.trim().is_empty() {
            return Err(SessionError::InvalidArgument(
                "keyword must not be empty".to_string(),
            ));
        }

        self.inner.submit(Action::StartKeyword, move |inner, _| {
            inner.run_start(RecognitionMode::Conversation, |engine| {
                engine.start_keyword_recognition(&keyword)
            })
        })
    }

    pub fn stop_keyword_recognition(&self) -> Result<Operation<()>> {
        self.inner.submit(Action::StopKeyword, |inner, transition| {
            inner.run_stop(transition, |engine| engine.stop_keyword_recognition())
        })
    }

    /// Open the connection to a dialog service
    pub fn connect(&self) -> Result<Operation<()>> {
        self.inner.submit(Action::Connect, |inner, _| {
            let outcome = inner.call_engine(|engine| engine.connect());
            inner.machine.lock().finish();
            outcome
        })
    }

    pub fn disconnect(&self) -> Result<Operation<()>> {
        self.inner.submit(Action::Disconnect, |inner, _| {
            let outcome = inner.call_engine(|engine| engine.disconnect());
            inner.machine.lock().finish();
            outcome
        })
    }

    /// Send an activity to a dialog service; resolves to the service acknowledgement
    pub fn send_activity(&self, activity: serde_json::Value) -> Result<Operation<String>> {
        self.inner.machine.lock().begin(Action::SendActivity)?;
        let payload = activity.to_string();
        let inner = Arc::clone(&self.inner);

        Ok(self.inner.executor.submit(Action::SendActivity.name(), move |_| {
            inner.call_engine(|engine| engine.send_activity(&payload))
        }))
    }

    // ------------------------------------------------------------------
    // Subscription points
    // ------------------------------------------------------------------

    /// Session started/stopped and speech start/end notifications
    pub fn session_events(&self) -> &EventChannel<SessionEvent> {
        &self.inner.session_events
    }

    pub fn intermediate_results(&self) -> &EventChannel<RecognitionResult> {
        &self.inner.intermediate_results
    }

    pub fn final_results(&self) -> &EventChannel<RecognitionResult> {
        &self.inner.final_results
    }

    /// No-match and canceled outcomes
    pub fn errors(&self) -> &EventChannel<ErrorNotification> {
        &self.inner.errors
    }

    pub fn activities(&self) -> &EventChannel<ActivityEvent> {
        &self.inner.activities
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    pub fn language(&self) -> Result<String> {
        self.inner.ensure_live()?;
        Ok(self.inner.parameters.get_string(ParameterName::RecognitionLanguage))
    }

    pub fn set_language(&self, language: &str) -> Result<()> {
        self.set_parameter(ParameterName::RecognitionLanguage.key(), language)
    }

    /// Deployment id of the customized speech model
    pub fn deployment_id(&self) -> Result<String> {
        self.inner.ensure_live()?;
        Ok(self.inner.parameters.get_string(ParameterName::DeploymentId))
    }

    pub fn set_deployment_id(&self, deployment_id: &str) -> Result<()> {
        self.set_parameter(ParameterName::DeploymentId.key(), deployment_id)
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        self.inner.ensure_live()?;
        Ok(self.inner.parameters.output_format())
    }

    pub fn set_output_format(&self, format: OutputFormat) -> Result<()> {
        self.set_parameter(ParameterName::OutputFormat.key(), format.as_str())
    }

    pub fn parameter(&self, name: &str) -> Result<Option<ParameterValue>> {
        self.inner.ensure_live()?;
        Ok(self.inner.parameters.get(name))
    }

    /// Set a parameter and forward it to the engine.
    ///
    /// The value is stored only once the engine has accepted it.
    pub fn set_parameter(&self, name: &str, value: impl Into<ParameterValue>) -> Result<()> {
        let value = value.into();
        self.inner.ensure_live()?;
        self.inner.parameters.check(name, &value)?;

        self.inner
            .call_engine(|engine| engine.set_parameter(name, &value))?;
        self.inner.parameters.set(name, value)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.inner.machine.lock().state()
    }

    /// Identifier assigned by the engine at the last session start
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.machine.lock().is_disposed()
    }

    pub fn stats(&self) -> SessionStats {
        let state = self.state();
        self.inner
            .counters
            .snapshot(state, self.session_id(), self.inner.created_at)
    }

    /// Tear the session down.
    ///
    /// Returns `false` if the session was already disposed. Once this returns,
    /// no event channel of this session fires again.
    pub fn dispose(&self) -> bool {
        self.inner.dispose()
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl SessionInner {
    fn ensure_live(&self) -> Result<()> {
        if self.machine.lock().is_disposed() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    /// Make one engine call, or fail with [`SessionError::Closed`] once
    /// disposal has begun. Disposal waits for calls already inside the engine.
    fn call_engine<T, F>(&self, call: F) -> Result<T>
    where
        F: FnOnce(&dyn RecognitionEngine) -> anyhow::Result<T>,
    {
        let Some(_call) = self.engine_calls.enter() else {
            return Err(SessionError::Closed);
        };
        self.ensure_live()?;

        let Some(engine) = self.engine.lock().clone() else {
            return Err(SessionError::Closed);
        };
        call(engine.as_ref()).map_err(SessionError::engine)
    }

    /// Accept a state-changing action and queue its work behind earlier ones.
    ///
    /// The ticket is drawn and the work spawned under the state lock, so the
    /// queue order is the acceptance order. Work cancelled before it starts
    /// still takes its turn to undo the transition.
    fn submit<T, F>(self: &Arc<Self>, action: Action, work: F) -> Result<Operation<T>>
    where
        T: Send + 'static,
        F: FnOnce(&SessionInner, Transition) -> Result<T> + Send + 'static,
    {
        let mut machine = self.machine.lock();
        let transition = machine.begin(action)?;
        debug!("{}: {} -> {}", action, transition.from, transition.to);

        let ticket = self.sequencer.ticket();
        let worker = Arc::clone(self);
        let undo = Arc::clone(self);
        let operation = self.executor.submit_with_rollback(
            action.name(),
            move |_| {
                let _turn = worker.sequencer.wait_turn(ticket);
                work(&*worker, transition)
            },
            move || {
                let _turn = undo.sequencer.wait_turn(ticket);
                undo.undo(transition);
            },
        );

        drop(machine);
        Ok(operation)
    }

    /// Revert the transition of work cancelled before it started
    fn undo(&self, transition: Transition) {
        let mut machine = self.machine.lock();
        if transition.to == SessionState::Stopping {
            machine.abort_stop(transition.from);
        } else {
            machine.finish();
        }
    }

    fn run_recognize_once(&self) -> Result<RecognitionResult> {
        self.select_recognition_mode(RecognitionMode::Interactive)?;
        self.machine.lock().enter_listening();

        *self.utterance_session_id.lock() = None;
        let raw = self.call_engine(|engine| engine.recognize_once())?;
        self.ensure_live()?;

        let session_id = self
            .utterance_session_id
            .lock()
            .take()
            .or_else(|| self.live_session_id.read().clone())
            .unwrap_or_default();

        match self.translator().translate(&session_id, raw) {
            Translated::Final(result) => Ok(result),
            Translated::Error(notification) => Err(SessionError::NotRecognized(notification)),
            Translated::Ignored => Err(SessionError::NotRecognized(ErrorNotification {
                session_id,
                reason: ErrorReason::NoMatch,
                detail: None,
                offset: 0,
            })),
            Translated::Intermediate(_) => Err(SessionError::engine(anyhow::anyhow!(
                "engine returned an intermediate result from recognize_once"
            ))),
        }
    }

    fn run_start<F>(&self, requested: RecognitionMode, start: F) -> Result<()>
    where
        F: FnOnce(&dyn RecognitionEngine) -> anyhow::Result<()>,
    {
        let outcome = self
            .select_recognition_mode(requested)
            .and_then(|()| self.call_engine(start));

        match outcome {
            Ok(()) => {
                self.machine.lock().complete_start();
                self.ensure_live()?;
                info!("Recognition started ({})", self.machine.lock().state());
                Ok(())
            }
            Err(e) => {
                self.machine.lock().finish();
                Err(e)
            }
        }
    }

    fn run_stop<F>(&self, transition: Transition, stop: F) -> Result<()>
    where
        F: FnOnce(&dyn RecognitionEngine) -> anyhow::Result<()>,
    {
        // A start that failed or was cancelled ahead of this stop left nothing running
        if self.machine.lock().state() != SessionState::Stopping {
            self.ensure_live()?;
            debug!("Nothing to stop");
            return Ok(());
        }

        match self.call_engine(stop) {
            Ok(()) => {
                self.machine.lock().finish();
                info!("Recognition stopped");
                Ok(())
            }
            Err(e) => {
                self.machine.lock().abort_stop(transition.from);
                Err(e)
            }
        }
    }

    /// Push the recognition mode for an action; dictation is always kept
    fn select_recognition_mode(&self, requested: RecognitionMode) -> Result<()> {
        let mode = match self.parameters.recognition_mode() {
            RecognitionMode::Dictation => RecognitionMode::Dictation,
            _ => requested,
        };

        let value = ParameterValue::from(mode.as_str());
        self.call_engine(|engine| {
            engine.set_parameter(ParameterName::RecognitionMode.key(), &value)
        })?;
        self.parameters.set_known(ParameterName::RecognitionMode, value)
    }

    fn translator(&self) -> Translator {
        Translator::new(self.parameters.output_format())
    }

    // ------------------------------------------------------------------
    // Notification delivery
    // ------------------------------------------------------------------

    fn admit(&self, notification: &str) -> Option<GateGuard<'_>> {
        let guard = self.gate.enter();
        if guard.is_none() {
            Counters::bump(&self.counters.dropped_notifications);
            trace!("Dropping {} notification for disposed session", notification);
        }
        guard
    }

    fn fire_session_event(&self, kind: SessionEventKind, session_id: &str, offset: Option<u64>) {
        let event = SessionEvent::new(kind, session_id, offset);
        debug!("{}", event);
        Counters::bump(&self.counters.session_events);
        self.session_events.fire(&event);
    }

    fn on_session_started(&self, session_id: &str) {
        let Some(_guard) = self.admit("session started") else {
            return;
        };
        *self.session_id.write() = Some(session_id.to_string());
        *self.live_session_id.write() = Some(session_id.to_string());
        info!("Session started: {}", session_id);
        self.fire_session_event(SessionEventKind::Started, session_id, None);
    }

    fn on_session_stopped(&self, session_id: &str) {
        let Some(_guard) = self.admit("session stopped") else {
            return;
        };
        {
            let mut live = self.live_session_id.write();
            if live.as_deref() == Some(session_id) {
                *live = None;
            }
        }
        info!("Session stopped: {}", session_id);
        self.fire_session_event(SessionEventKind::Stopped, session_id, None);
    }

    fn on_speech_start(&self, session_id: &str, offset: u64) {
        let Some(_guard) = self.admit("speech start") else {
            return;
        };
        self.machine.lock().on_speech_start();
        self.fire_session_event(SessionEventKind::SpeechStartDetected, session_id, Some(offset));
    }

    fn on_speech_end(&self, session_id: &str, offset: u64) {
        let Some(_guard) = self.admit("speech end") else {
            return;
        };
        self.fire_session_event(SessionEventKind::SpeechEndDetected, session_id, Some(offset));
    }

    fn on_result(&self, session_id: &str, raw: RawResult) {
        let Some(_guard) = self.admit("result") else {
            return;
        };

        match self.translator().translate(session_id, raw) {
            Translated::Intermediate(result) => {
                self.machine.lock().on_intermediate();
                Counters::bump(&self.counters.intermediate_results);
                self.intermediate_results.fire(&result);
            }
            Translated::Final(result) => {
                self.machine.lock().on_utterance_end();
                *self.utterance_session_id.lock() = Some(session_id.to_string());
                debug!("Final result in session {}: {}", session_id, result.text);
                Counters::bump(&self.counters.final_results);
                self.final_results.fire(&result);
            }
            Translated::Error(notification) => {
                self.machine.lock().on_utterance_end();
                *self.utterance_session_id.lock() = Some(session_id.to_string());
                debug!("Recognition error in session {}: {}", session_id, notification.reason);
                Counters::bump(&self.counters.errors);
                self.errors.fire(&notification);
            }
            Translated::Ignored => debug!("Ignoring empty result in session {}", session_id),
        }
    }

    fn on_activity(&self, session_id: &str, activity: &str, audio: Option<Vec<u8>>) {
        let Some(_guard) = self.admit("activity") else {
            return;
        };

        let activity = serde_json::from_str(activity)
            .unwrap_or_else(|_| serde_json::Value::String(activity.to_string()));
        let event = ActivityEvent {
            session_id: session_id.to_string(),
            activity,
            audio: audio.map(Arc::from),
        };
        self.activities.fire(&event);
    }

    // ------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------

    fn dispose(&self) -> bool {
        if !self.machine.lock().dispose() {
            debug!("Session already disposed");
            return false;
        }

        info!("Disposing speech session");

        let engine = self.engine.lock().take();

        if let Some(engine) = &engine {
            if let Err(e) = engine.unregister_listener() {
                warn!("Failed to unregister engine listener: {:#}", e);
            }
        }

        // Notifications already past the gate finish delivering; later ones are dropped.
        self.gate.close();

        // Calls already inside the engine finish before release; queued ones fail with Closed.
        self.engine_calls.close();

        if let Some(engine) = engine {
            if let Err(e) = engine.release() {
                error!("Failed to release engine: {:#}", e);
            }
        }

        self.session_events.clear();
        self.intermediate_results.clear();
        self.final_results.clear();
        self.errors.clear();
        self.activities.clear();
        self.parameters.clear();

        info!("Speech session disposed");
        true
    }
}

impl EngineListener for EngineBridge {
    fn session_started(&self, session_id: &str) {
        if let Some(session) = self.session.upgrade() {
            session.on_session_started(session_id);
        }
    }

    fn session_stopped(&self, session_id: &str) {
        if let Some(session) = self.session.upgrade() {
            session.on_session_stopped(session_id);
        }
    }

    fn speech_start_detected(&self, session_id: &str, offset: u64) {
        if let Some(session) = self.session.upgrade() {
            session.on_speech_start(session_id, offset);
        }
    }

    fn speech_end_detected(&self, session_id: &str, offset: u64) {
        if let Some(session) = self.session.upgrade() {
            session.on_speech_end(session_id, offset);
        }
    }

    fn result(&self, session_id: &str, result: RawResult) {
        if let Some(session) = self.session.upgrade() {
            session.on_result(session_id, result);
        }
    }

    fn activity_received(&self, session_id: &str, activity: &str, audio: Option<Vec<u8>>) {
        if let Some(session) = self.session.upgrade() {
            session.on_activity(session_id, activity, audio);
        }
    }
}
