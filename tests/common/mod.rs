//! In-memory test doubles for the queue, the stores, and the generator.

#![allow(dead_code)]

use async_trait::async_trait;
use courseforge::error::{Error, Result};
use courseforge::generate::outline::Outline;
use courseforge::model::{
    Course, CourseModule, JobMessage, JobPayload, JobType, Roadmap, Run, RunId, RunPatch,
    RunStatus, RunStatusView,
};
use courseforge::queue::{Delivery, JobQueue};
use courseforge::store::{CourseStore, NewRoadmap, RunStore, StartOutcome};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<(i64, serde_json::Value)>,
    processing: HashMap<i64, serde_json::Value>,
    next_id: i64,
}

/// Pending/processing lists under one mutex, mirroring the durable queue's
/// contract closely enough to drive the worker loop.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<QueueInner>,
    ready: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a raw payload straight onto pending, bypassing the envelope.
    pub fn enqueue_raw(&self, payload: serde_json::Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.pending.push_back((id, payload));
        drop(inner);
        self.ready.notify_one();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    pub fn processing_len(&self) -> usize {
        self.inner.lock().unwrap().processing.len()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(
        &self,
        job_type: JobType,
        run_id: RunId,
        payload: JobPayload,
    ) -> Result<Uuid> {
        let message = JobMessage::new(job_type, run_id, payload);
        let task_id = message.task_id;
        let value = serde_json::to_value(&message)
            .map_err(|e| Error::Other(format!("encode job message: {e}")))?;
        self.enqueue_raw(value);
        Ok(task_id)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some((id, payload)) = inner.pending.pop_front() {
                    inner.processing.insert(id, payload.clone());
                    return Ok(Some(Delivery {
                        receipt: id,
                        payload,
                    }));
                }
            }
            let wait = deadline.saturating_duration_since(tokio::time::Instant::now());
            if wait.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(wait, self.ready.notified()).await;
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .processing
            .remove(&delivery.receipt);
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<u32> {
        let mut inner = self.inner.lock().unwrap();
        let mut payload = inner
            .processing
            .remove(&delivery.receipt)
            .ok_or_else(|| Error::NotFound(format!("receipt {}", delivery.receipt)))?;
        let attempt = payload
            .get("attempt")
            .and_then(|a| a.as_u64())
            .unwrap_or(0) as u32
            + 1;
        payload["attempt"] = serde_json::json!(attempt);
        let id = delivery.receipt;
        inner.pending.push_back((id, payload));
        drop(inner);
        self.ready.notify_one();
        Ok(attempt)
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    runs: HashMap<Uuid, Run>,
    roadmaps: HashMap<Uuid, Roadmap>,
    courses: HashMap<Uuid, Course>,
    modules: HashMap<Uuid, CourseModule>,
}

/// RunStore + CourseStore over hash maps, enforcing the same lifecycle rules
/// as the durable implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a roadmap directly and return it.
    pub fn seed_roadmap(&self, duration_weeks: i32) -> Roadmap {
        let roadmap = Roadmap {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Applied statistics from scratch".to_string(),
            field: "applied statistics".to_string(),
            level: "beginner".to_string(),
            weekly_hours: 5,
            duration_weeks,
        };
        self.inner
            .lock()
            .unwrap()
            .roadmaps
            .insert(roadmap.id, roadmap.clone());
        roadmap
    }

    /// Insert a course with `weeks` modules; weeks in `prefilled` start out
    /// with content already written.
    pub fn seed_course(&self, roadmap: &Roadmap, weeks: i32, prefilled: &[i32]) -> Uuid {
        let mut inner = self.inner.lock().unwrap();
        let course = Course {
            id: Uuid::new_v4(),
            owner_id: roadmap.owner_id,
            roadmap_id: roadmap.id,
            status: "draft".to_string(),
            title: roadmap.title.clone(),
            description: None,
        };
        let course_id = course.id;
        inner.courses.insert(course_id, course);
        for week in 1..=weeks {
            let module = CourseModule {
                id: Uuid::new_v4(),
                course_id,
                week,
                title: format!("Week {week}"),
                outcomes: vec!["first outcome".to_string(), "second outcome".to_string()],
                content_md: prefilled
                    .contains(&week)
                    .then(|| format!("## Overview\nexisting week {week}")),
            };
            inner.modules.insert(module.id, module);
        }
        course_id
    }

    /// Insert a run in an arbitrary state.
    pub fn seed_run(&self, roadmap: &Roadmap, status: RunStatus) -> RunId {
        let run = Run {
            id: RunId::new(),
            owner_id: roadmap.owner_id,
            roadmap_id: roadmap.id,
            course_id: None,
            status,
            progress: match status {
                RunStatus::Queued => 0,
                RunStatus::Running => 5,
                _ => 100,
            },
            message: None,
            error: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let id = run.id;
        self.inner.lock().unwrap().runs.insert(id.0, run);
        id
    }

    pub fn run(&self, id: RunId) -> Run {
        self.inner.lock().unwrap().runs[&id.0].clone()
    }

    pub fn course(&self, id: Uuid) -> Course {
        self.inner.lock().unwrap().courses[&id].clone()
    }

    pub fn course_count(&self) -> usize {
        self.inner.lock().unwrap().courses.len()
    }

    pub fn modules_of(&self, course_id: Uuid) -> Vec<CourseModule> {
        let inner = self.inner.lock().unwrap();
        let mut modules: Vec<CourseModule> = inner
            .modules
            .values()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.week);
        modules
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, owner_id: Uuid, roadmap_id: Uuid) -> Result<RunId> {
        let run = Run {
            id: RunId::new(),
            owner_id,
            roadmap_id,
            course_id: None,
            status: RunStatus::Queued,
            progress: 0,
            message: None,
            error: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let id = run.id;
        self.inner.lock().unwrap().runs.insert(id.0, run);
        Ok(id)
    }

    async fn get_run(&self, id: RunId) -> Result<Run> {
        self.inner
            .lock()
            .unwrap()
            .runs
            .get(&id.0)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("run {}", id.0)))
    }

    async fn start_run(&self, id: RunId) -> Result<StartOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(&id.0)
            .ok_or_else(|| Error::NotFound(format!("run {}", id.0)))?;
        match run.status {
            RunStatus::Queued => {
                run.status = RunStatus::Running;
                run.progress = run.progress.max(5);
                run.started_at.get_or_insert_with(Utc::now);
                Ok(StartOutcome::Started)
            }
            RunStatus::Running => Ok(StartOutcome::AlreadyRunning),
            status => Ok(StartOutcome::Finished(status)),
        }
    }

    async fn update_run(&self, id: RunId, patch: RunPatch) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(&id.0)
            .ok_or_else(|| Error::NotFound(format!("run {}", id.0)))?;
        if let Some(progress) = patch.progress {
            run.progress = run.progress.max(progress);
        }
        if let Some(message) = patch.message {
            run.message = Some(message);
        }
        if let Some(error) = patch.error {
            run.error = Some(error);
        }
        if let Some(result) = patch.result {
            run.result = Some(result);
        }
        Ok(())
    }

    async fn finish_run_ok(
        &self,
        id: RunId,
        result: serde_json::Value,
        message: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(&id.0)
            .ok_or_else(|| Error::NotFound(format!("run {}", id.0)))?;
        if run.status != RunStatus::Running {
            return Err(Error::InvalidTransition {
                from: run.status,
                to: RunStatus::Succeeded,
            });
        }
        run.status = RunStatus::Succeeded;
        run.progress = 100;
        run.result = Some(result);
        if message.is_some() {
            run.message = message;
        }
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn finish_run_fail(&self, id: RunId, error: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(&id.0)
            .ok_or_else(|| Error::NotFound(format!("run {}", id.0)))?;
        if run.status.is_terminal() {
            return Ok(());
        }
        run.status = RunStatus::Failed;
        run.error = Some(error.to_string());
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn run_status(&self, id: RunId) -> Result<RunStatusView> {
        let run = self.get_run(id).await?;
        Ok(RunStatusView::from_run(&run))
    }
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn create_roadmap(&self, new: NewRoadmap) -> Result<Uuid> {
        let roadmap = Roadmap {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            title: new.title,
            field: new.field,
            level: new.level,
            weekly_hours: new.weekly_hours,
            duration_weeks: new.duration_weeks,
        };
        let id = roadmap.id;
        self.inner.lock().unwrap().roadmaps.insert(id, roadmap);
        Ok(id)
    }

    async fn get_roadmap(&self, id: Uuid) -> Result<Roadmap> {
        self.inner
            .lock()
            .unwrap()
            .roadmaps
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("roadmap {id}")))
    }

    async fn create_course(
        &self,
        run: &Run,
        roadmap: &Roadmap,
        outline: &Outline,
    ) -> Result<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        let course = Course {
            id: Uuid::new_v4(),
            owner_id: run.owner_id,
            roadmap_id: roadmap.id,
            status: "draft".to_string(),
            title: format!("{} (AI-generated)", roadmap.title),
            description: None,
        };
        let course_id = course.id;
        inner.courses.insert(course_id, course);
        for week in &outline.weeks {
            let module = CourseModule {
                id: Uuid::new_v4(),
                course_id,
                week: week.week as i32,
                title: week.title.clone(),
                outcomes: week.outcomes.clone(),
                content_md: None,
            };
            inner.modules.insert(module.id, module);
        }
        if let Some(stored) = inner.runs.get_mut(&run.id.0) {
            stored.course_id = Some(course_id);
        }
        Ok(course_id)
    }

    async fn get_course(&self, id: Uuid) -> Result<Course> {
        self.inner
            .lock()
            .unwrap()
            .courses
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("course {id}")))
    }

    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<CourseModule>> {
        Ok(self.modules_of(course_id))
    }

    async fn write_module_content(&self, module_id: Uuid, content: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let module = inner
            .modules
            .get_mut(&module_id)
            .ok_or_else(|| Error::NotFound(format!("module {module_id}")))?;
        module.content_md = Some(content.to_string());
        Ok(())
    }

    async fn set_course_ready(&self, course_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let course = inner
            .courses
            .get_mut(&course_id)
            .ok_or_else(|| Error::NotFound(format!("course {course_id}")))?;
        course.status = "ready".to_string();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

enum Scripted {
    Text(String),
    TransportErr(String),
}

/// Generator returning scripted responses in order and recording every call.
/// Panics when called past the end of the script unless a transport-error
/// fallback is set.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(String, String, f64)>>,
    fallback_transport: Option<String>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator that fails every call with a transport error.
    pub fn always_failing(message: &str) -> Self {
        Self {
            fallback_transport: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn push_text(self, text: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Text(text.into()));
        self
    }

    pub fn push_transport_err(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::TransportErr(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<(String, String, f64)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl courseforge::llm::TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, system: &str, user: &str, temperature: f64) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string(), temperature));
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::TransportErr(message)) => Err(Error::Transport(message)),
            None => match &self.fallback_transport {
                Some(message) => Err(Error::Transport(message.clone())),
                None => panic!("generator called more times than scripted"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// JSON text for a structurally valid outline of `weeks` weeks.
pub fn valid_outline_json(weeks: i32) -> String {
    let weeks: Vec<serde_json::Value> = (1..=weeks)
        .map(|week| {
            serde_json::json!({
                "week": week,
                "title": format!("Week {week}: foundations"),
                "outcomes": ["explain the core idea", "apply it to a small problem"],
            })
        })
        .collect();
    serde_json::json!({ "weeks": weeks }).to_string()
}

/// Markdown that passes the module structure validator.
pub fn valid_module_md() -> String {
    "## Overview\nWhat this week covers.\n\n\
     ## Key concepts\n- sampling\n- bias\n\n\
     ## Worked example\nStep through a worked case.\n\n\
     ## Practice exercises\n1. First exercise.\n2. Second exercise.\n3. Third exercise.\n\n\
     ## Common mistakes\nConfusing the two terms.\n\n\
     ## Suggested resources\n- a good intro text\n"
        .to_string()
}
