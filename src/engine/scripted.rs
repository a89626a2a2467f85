use super::{EngineListener, RawReason, RawResult, RecognitionEngine};
use crate::params::ParameterValue;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Engine entry points, used for call accounting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCall {
    Connect,
    Disconnect,
    RecognizeOnce,
    StartContinuous,
    StopContinuous,
    StartKeyword,
    StopKeyword,
    SendActivity,
    SetParameter,
    RegisterListener,
    UnregisterListener,
    Release,
}

/// One scripted engine notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptStep {
    SessionStarted { session_id: String },
    SessionStopped { session_id: String },
    SpeechStart { session_id: String, offset: u64 },
    SpeechEnd { session_id: String, offset: u64 },
    Result { session_id: String, result: RawResult },
    Activity { session_id: String, activity: String },
}

/// Notifications played back when the matching engine call is made
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineScript {
    pub recognize_once: Vec<ScriptStep>,
    pub start_continuous: Vec<ScriptStep>,
    pub stop_continuous: Vec<ScriptStep>,
    pub start_keyword: Vec<ScriptStep>,
    pub stop_keyword: Vec<ScriptStep>,
    pub send_activity: Vec<ScriptStep>,
}

impl EngineScript {
    /// Load a script from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine script {}", path.display()))?;
        serde_json::from_str(&json).context("Failed to parse engine script")
    }
}

/// Replay engine driven by an [`EngineScript`].
///
/// Each call plays its scripted notifications synchronously on the calling
/// thread before returning. Calls are counted and recorded in order,
/// individual calls can be made to fail, and notifications can be pushed from
/// any thread with [`ScriptedEngine::emit`].
#[derive(Default)]
pub struct ScriptedEngine {
    script: Mutex<EngineScript>,
    listener: Mutex<Option<Arc<dyn EngineListener>>>,
    calls: Mutex<HashMap<EngineCall, usize>>,
    history: Mutex<Vec<EngineCall>>,
    after_release: Mutex<usize>,
    busy: Mutex<Busy>,
    failures: Mutex<HashSet<EngineCall>>,
    parameters: Mutex<BTreeMap<String, ParameterValue>>,
    delay: Mutex<Option<Duration>>,
    released: Mutex<bool>,
}

#[derive(Default)]
struct Busy {
    current: usize,
    peak: usize,
}

/// Marks a start/stop/recognize call as running until dropped
struct BusyGuard<'a> {
    busy: &'a Mutex<Busy>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.lock().current -= 1;
    }
}

impl ScriptedEngine {
    pub fn new(script: EngineScript) -> Self {
        Self {
            script: Mutex::new(script),
            ..Self::default()
        }
    }

    pub fn set_script(&self, script: EngineScript) {
        *self.script.lock() = script;
    }

    /// Make every subsequent `call` fail
    pub fn fail_on(&self, call: EngineCall) {
        self.failures.lock().insert(call);
    }

    /// Sleep this long inside every start/stop/recognize call
    pub fn set_call_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn call_count(&self, call: EngineCall) -> usize {
        self.calls.lock().get(&call).copied().unwrap_or(0)
    }

    /// Every call in the order it was made, release excluded
    pub fn call_history(&self) -> Vec<EngineCall> {
        self.history.lock().clone()
    }

    /// Most start/stop/recognize calls ever running at the same time
    pub fn peak_concurrent_calls(&self) -> usize {
        self.busy.lock().peak
    }

    /// Calls made after [`RecognitionEngine::release`]
    pub fn calls_after_release(&self) -> usize {
        *self.after_release.lock()
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }

    /// Currently registered listener, if any
    pub fn listener(&self) -> Option<Arc<dyn EngineListener>> {
        self.listener.lock().clone()
    }

    /// Last value the session pushed for a parameter
    pub fn parameter(&self, name: &str) -> Option<ParameterValue> {
        self.parameters.lock().get(name).cloned()
    }

    /// Deliver one notification to the registered listener.
    ///
    /// Returns `false` if no listener is registered.
    pub fn emit(&self, step: &ScriptStep) -> bool {
        let Some(listener) = self.listener() else {
            return false;
        };
        deliver(listener.as_ref(), step);
        true
    }

    fn enter(&self, call: EngineCall) -> Result<()> {
        *self.calls.lock().entry(call).or_insert(0) += 1;
        self.history.lock().push(call);

        if *self.released.lock() {
            *self.after_release.lock() += 1;
            bail!("engine used after release ({:?})", call);
        }
        if self.failures.lock().contains(&call) {
            bail!("scripted failure for {:?}", call);
        }
        Ok(())
    }

    /// Mark the call busy, then sleep for the configured delay
    fn occupy(&self) -> BusyGuard<'_> {
        {
            let mut busy = self.busy.lock();
            busy.current += 1;
            busy.peak = busy.peak.max(busy.current);
        }

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        BusyGuard { busy: &self.busy }
    }

    fn play(&self, steps: &[ScriptStep]) {
        // Listener is cloned out so delivery runs without holding our locks.
        let Some(listener) = self.listener() else {
            debug!("No listener registered; skipping {} scripted steps", steps.len());
            return;
        };
        for step in steps {
            deliver(listener.as_ref(), step);
        }
    }
}

fn deliver(listener: &dyn EngineListener, step: &ScriptStep) {
    match step {
        ScriptStep::SessionStarted { session_id } => listener.session_started(session_id),
        ScriptStep::SessionStopped { session_id } => listener.session_stopped(session_id),
        ScriptStep::SpeechStart { session_id, offset } => {
            listener.speech_start_detected(session_id, *offset)
        }
        ScriptStep::SpeechEnd { session_id, offset } => {
            listener.speech_end_detected(session_id, *offset)
        }
        ScriptStep::Result { session_id, result } => listener.result(session_id, result.clone()),
        ScriptStep::Activity {
            session_id,
            activity,
        } => listener.activity_received(session_id, activity, None),
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn connect(&self) -> Result<()> {
        self.enter(EngineCall::Connect)?;
        info!("Scripted engine connected");
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.enter(EngineCall::Disconnect)?;
        info!("Scripted engine disconnected");
        Ok(())
    }

    fn recognize_once(&self) -> Result<RawResult> {
        self.enter(EngineCall::RecognizeOnce)?;
        let _busy = self.occupy();

        let steps = self.script.lock().recognize_once.clone();
        self.play(&steps);

        // The terminal result is the last non-intermediate one in the script.
        let terminal = steps.iter().rev().find_map(|step| match step {
            ScriptStep::Result { result, .. } if result.reason != RawReason::Recognizing => {
                Some(result.clone())
            }
            _ => None,
        });

        Ok(terminal.unwrap_or_else(|| RawResult::new(RawReason::NoMatch, "")))
    }

    fn start_continuous_recognition(&self) -> Result<()> {
        self.enter(EngineCall::StartContinuous)?;
        let _busy = self.occupy();
        let steps = self.script.lock().start_continuous.clone();
        self.play(&steps);
        Ok(())
    }

    fn stop_continuous_recognition(&self) -> Result<()> {
        self.enter(EngineCall::StopContinuous)?;
        let _busy = self.occupy();
        let steps = self.script.lock().stop_continuous.clone();
        self.play(&steps);
        Ok(())
    }

    fn start_keyword_recognition(&self, keyword: &str) -> Result<()> {
        self.enter(EngineCall::StartKeyword)?;
        let _busy = self.occupy();
        debug!("Scripted engine armed for keyword '{}'", keyword);
        let steps = self.script.lock().start_keyword.clone();
        self.play(&steps);
        Ok(())
    }

    fn stop_keyword_recognition(&self) -> Result<()> {
        self.enter(EngineCall::StopKeyword)?;
        let _busy = self.occupy();
        let steps = self.script.lock().stop_keyword.clone();
        self.play(&steps);
        Ok(())
    }

    fn send_activity(&self, activity: &str) -> Result<String> {
        self.enter(EngineCall::SendActivity)?;
        debug!("Scripted engine received activity ({} bytes)", activity.len());
        let steps = self.script.lock().send_activity.clone();
        self.play(&steps);
        Ok(format!("interaction-{}", uuid::Uuid::new_v4()))
    }

    fn set_parameter(&self, name: &str, value: &ParameterValue) -> Result<()> {
        self.enter(EngineCall::SetParameter)?;
        self.parameters.lock().insert(name.to_string(), value.clone());
        Ok(())
    }

    fn register_listener(&self, listener: Arc<dyn EngineListener>) -> Result<()> {
        self.enter(EngineCall::RegisterListener)?;
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn unregister_listener(&self) -> Result<()> {
        self.enter(EngineCall::UnregisterListener)?;
        self.listener.lock().take();
        Ok(())
    }

    fn release(&self) -> Result<()> {
        *self.calls.lock().entry(EngineCall::Release).or_insert(0) += 1;

        let mut released = self.released.lock();
        if *released {
            bail!("engine released twice");
        }
        *released = true;
        info!("Scripted engine released");
        Ok(())
    }
}
