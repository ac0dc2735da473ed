//! In-memory fakes of the dashboard, its sessions and the browser driver.

use crate::auth::Cookie;
use crate::core::{InstanceNumber, StageStatus};
use crate::driver::{AutomationDriver, ElementHandle, Locator};
use crate::errors::ConduitError;
use crate::pipeline::{
    await_stage_passed, PipelineControl, PipelineTrigger, SessionProvider, StageReader, WaitLimits,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Something a [`FakeDashboard`] session was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardAction {
    /// A pipeline was triggered.
    Trigger {
        /// Pipeline name.
        pipeline: String,
    },
    /// The failed jobs of a stage were rerun.
    RetriggerStage {
        /// Pipeline name.
        pipeline: String,
        /// Stage name.
        stage: String,
    },
    /// A wait for a stage began.
    WaitStarted {
        /// Pipeline name.
        pipeline: String,
    },
    /// A wait for a stage ended successfully.
    WaitFinished {
        /// Pipeline name.
        pipeline: String,
    },
}

impl DashboardAction {
    /// Returns the pipeline the action was about.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        match self {
            Self::Trigger { pipeline }
            | Self::RetriggerStage { pipeline, .. }
            | Self::WaitStarted { pipeline }
            | Self::WaitFinished { pipeline } => pipeline,
        }
    }
}

#[derive(Default)]
struct DashboardState {
    stages: Mutex<HashMap<String, VecDeque<Vec<StageStatus>>>>,
    reads: Mutex<HashMap<String, usize>>,
    actions: Mutex<Vec<(usize, DashboardAction)>>,
    trigger_failures: Mutex<HashMap<String, String>>,
    wait_failures: Mutex<HashSet<String>>,
    trigger_delays: Mutex<HashMap<String, Duration>>,
    sessions: AtomicUsize,
    closed: AtomicUsize,
}

fn key(pipeline: &str) -> String {
    pipeline.to_lowercase()
}

/// A scripted dashboard.
///
/// Clones share state. Each clone made by [`FakeDashboard::session`] gets its
/// own session id so actions taken by recovery sessions can be told apart
/// from the main session's (id `0`).
#[derive(Clone, Default)]
pub struct FakeDashboard {
    state: Arc<DashboardState>,
    session: usize,
}

impl FakeDashboard {
    /// Creates an empty dashboard. Pipelines without stages are not shown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens another session on the same dashboard.
    #[must_use]
    pub fn session(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            session: self.state.sessions.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Returns this session's id.
    #[must_use]
    pub fn session_id(&self) -> usize {
        self.session
    }

    /// Shows `stages` on every read.
    pub fn set_stages(&self, pipeline: &str, stages: Vec<StageStatus>) {
        self.script_stages(pipeline, vec![stages]);
    }

    /// Shows one frame per read; the last frame repeats.
    pub fn script_stages(&self, pipeline: &str, frames: Vec<Vec<StageStatus>>) {
        self.state.stages.lock().insert(key(pipeline), frames.into());
    }

    /// Makes every trigger of `pipeline` fail.
    pub fn fail_trigger(&self, pipeline: &str, message: &str) {
        self.state
            .trigger_failures
            .lock()
            .insert(key(pipeline), message.to_string());
    }

    /// Makes every wait on `pipeline` time out immediately.
    pub fn fail_wait(&self, pipeline: &str) {
        self.state.wait_failures.lock().insert(key(pipeline));
    }

    /// Makes triggers of `pipeline` take `delay`.
    pub fn delay_trigger(&self, pipeline: &str, delay: Duration) {
        self.state.trigger_delays.lock().insert(key(pipeline), delay);
    }

    /// Returns how often the stages of `pipeline` were read.
    #[must_use]
    pub fn stage_reads(&self, pipeline: &str) -> usize {
        self.state.reads.lock().get(&key(pipeline)).copied().unwrap_or(0)
    }

    /// Returns every action in order.
    #[must_use]
    pub fn actions(&self) -> Vec<DashboardAction> {
        self.state.actions.lock().iter().map(|(_, a)| a.clone()).collect()
    }

    /// Returns the actions of the main session.
    #[must_use]
    pub fn main_actions(&self) -> Vec<DashboardAction> {
        self.actions_where(|session| session == 0)
    }

    /// Returns the actions taken by recovery sessions.
    #[must_use]
    pub fn recovery_actions(&self) -> Vec<DashboardAction> {
        self.actions_where(|session| session != 0)
    }

    /// Returns how many sessions were closed.
    #[must_use]
    pub fn closed_sessions(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn actions_where(&self, keep: impl Fn(usize) -> bool) -> Vec<DashboardAction> {
        self.state
            .actions
            .lock()
            .iter()
            .filter(|(session, _)| keep(*session))
            .map(|(_, a)| a.clone())
            .collect()
    }

    fn record(&self, action: DashboardAction) {
        self.state.actions.lock().push((self.session, action));
    }
}

#[async_trait]
impl StageReader for FakeDashboard {
    async fn list_stages(
        &self,
        _instance: &InstanceNumber,
        pipeline: &str,
    ) -> Result<Vec<StageStatus>, ConduitError> {
        let key = key(pipeline);
        *self.state.reads.lock().entry(key.clone()).or_insert(0) += 1;

        let mut stages = self.state.stages.lock();
        let frames = stages
            .get_mut(&key)
            .ok_or_else(|| ConduitError::element_not_found(format!("pipeline {pipeline}")))?;
        let frame = if frames.len() > 1 {
            frames.pop_front()
        } else {
            frames.front().cloned()
        };
        Ok(frame.unwrap_or_default())
    }
}

#[async_trait]
impl PipelineTrigger for FakeDashboard {
    async fn trigger(&self, _instance: &InstanceNumber, pipeline: &str) -> Result<(), ConduitError> {
        let delay = self.state.trigger_delays.lock().get(&key(pipeline)).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.state.trigger_failures.lock().get(&key(pipeline)) {
            return Err(ConduitError::Driver(message.clone()));
        }
        self.record(DashboardAction::Trigger {
            pipeline: pipeline.to_string(),
        });
        Ok(())
    }

    async fn retrigger_stage(
        &self,
        _instance: &InstanceNumber,
        pipeline: &str,
        stage: &str,
    ) -> Result<(), ConduitError> {
        self.record(DashboardAction::RetriggerStage {
            pipeline: pipeline.to_string(),
            stage: stage.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl PipelineControl for FakeDashboard {
    async fn wait_for_stage(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
        stage: &str,
        limits: WaitLimits,
    ) -> Result<(), ConduitError> {
        self.record(DashboardAction::WaitStarted {
            pipeline: pipeline.to_string(),
        });
        if self.state.wait_failures.lock().contains(&key(pipeline)) {
            return Err(ConduitError::timeout(format!("stage '{stage}' of '{pipeline}'"), limits.timeout));
        }
        await_stage_passed(self, instance, pipeline, stage, limits).await?;
        self.record(DashboardAction::WaitFinished {
            pipeline: pipeline.to_string(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ConduitError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for FakeDashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDashboard")
            .field("session", &self.session)
            .field("actions", &self.state.actions.lock().len())
            .finish()
    }
}

/// Hands out sessions on a [`FakeDashboard`].
#[derive(Debug)]
pub struct FakeSessions {
    dashboard: FakeDashboard,
    acquired: AtomicUsize,
    released: AtomicUsize,
    acquire_failure: Mutex<Option<String>>,
}

impl FakeSessions {
    /// Creates a provider of sessions on `dashboard`.
    #[must_use]
    pub fn new(dashboard: FakeDashboard) -> Self {
        Self {
            dashboard,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            acquire_failure: Mutex::new(None),
        }
    }

    /// Makes every acquire fail with a driver error.
    pub fn fail_acquire(&self, message: &str) {
        *self.acquire_failure.lock() = Some(message.to_string());
    }

    /// Returns the number of acquire calls, successful or not.
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Returns the number of released sessions.
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn acquire(&self) -> Result<Arc<dyn PipelineControl>, ConduitError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.acquire_failure.lock().clone() {
            return Err(ConduitError::Driver(message));
        }
        Ok(Arc::new(self.dashboard.session()))
    }

    async fn release(&self, session: Arc<dyn PipelineControl>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        let _ = session.close().await;
    }
}

#[derive(Debug, Clone)]
struct FakeElement {
    id: String,
    attributes: HashMap<String, String>,
    text: String,
}

#[derive(Debug, Default)]
struct DriverState {
    elements: HashMap<Locator, Vec<FakeElement>>,
    title: String,
    url: Option<String>,
    navigations: Vec<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    scripts: Vec<String>,
    detach_on_locate: HashSet<Locator>,
    quit: bool,
}

/// A browser with a fixed page.
///
/// Elements are registered per locator. Locating never waits: a locator
/// without elements fails at once with [`ConduitError::ElementNotFound`].
#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<DriverState>>,
}

impl FakeDriver {
    /// Creates a driver showing an empty page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element matched by `locator`.
    pub fn add_element(&self, locator: &Locator, id: &str, attributes: &[(&str, &str)], text: &str) {
        let element = FakeElement {
            id: id.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            text: text.to_string(),
        };
        self.state
            .lock()
            .elements
            .entry(locator.clone())
            .or_default()
            .push(element);
    }

    /// Sets the page title.
    pub fn set_title(&self, title: &str) {
        self.state.lock().title = title.to_string();
    }

    /// Pins the current URL regardless of navigation, e.g. to a login redirect.
    pub fn set_url(&self, url: &str) {
        self.state.lock().url = Some(url.to_string());
    }

    /// Removes the elements of `locator` from the page right after they are
    /// next located, so that acting on the returned handle goes stale.
    pub fn detach_on_locate(&self, locator: &Locator) {
        self.state.lock().detach_on_locate.insert(locator.clone());
    }

    /// Returns the ids of clicked elements in order.
    #[must_use]
    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    /// Returns `(element id, text)` for every `send_keys`.
    #[must_use]
    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().typed.clone()
    }

    /// Returns the added cookies.
    #[must_use]
    pub fn cookies(&self) -> Vec<Cookie> {
        self.state.lock().cookies.clone()
    }

    /// Returns the executed scripts.
    #[must_use]
    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().scripts.clone()
    }

    /// Returns the navigated URLs.
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    /// Returns true once the session was quit.
    #[must_use]
    pub fn has_quit(&self) -> bool {
        self.state.lock().quit
    }

    fn element(&self, handle: &ElementHandle) -> Result<FakeElement, ConduitError> {
        self.state
            .lock()
            .elements
            .values()
            .flatten()
            .find(|e| e.id == handle.id)
            .cloned()
            .ok_or_else(|| ConduitError::stale_element(&handle.id))
    }
}

#[async_trait]
impl AutomationDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), ConduitError> {
        self.state.lock().navigations.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ConduitError> {
        let state = self.state.lock();
        Ok(state
            .url
            .clone()
            .or_else(|| state.navigations.last().cloned())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn title(&self) -> Result<String, ConduitError> {
        Ok(self.state.lock().title.clone())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, ConduitError> {
        Ok(self
            .state
            .lock()
            .elements
            .get(locator)
            .map(|elements| elements.iter().map(|e| ElementHandle::new(&e.id)).collect())
            .unwrap_or_default())
    }

    async fn locate_once_visible(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<ElementHandle, ConduitError> {
        let element = self
            .find_all(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ConduitError::element_not_found(locator.to_string()))?;

        let mut state = self.state.lock();
        if state.detach_on_locate.remove(locator) {
            state.elements.remove(locator);
        }
        Ok(element)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), ConduitError> {
        let element = self.element(element)?;
        self.state.lock().clicks.push(element.id);
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), ConduitError> {
        let element = self.element(element)?;
        self.state.lock().typed.push((element.id, text.to_string()));
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, ConduitError> {
        Ok(self.element(element)?.text)
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, ConduitError> {
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    async fn add_cookie(&self, cookie: &Cookie) -> Result<(), ConduitError> {
        self.state.lock().cookies.push(cookie.clone());
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<(), ConduitError> {
        self.state.lock().scripts.push(script.to_string());
        Ok(())
    }

    async fn quit(&self) -> Result<(), ConduitError> {
        self.state.lock().quit = true;
        Ok(())
    }
}
