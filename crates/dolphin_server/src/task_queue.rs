//! Per-session task queue drained by the long poll.
//!
//! Tasks are queued from any thread with [`SessionHandle::run_later`] and
//! run on the session's request thread while it holds the session, so they
//! may mutate beans freely. Changes they make travel to the client with the
//! long-poll response.

use crate::bean_manager::BeanManager;
use crate::error::{ServerError, ServerResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// A unit of work run inside a session.
pub type Task = Box<dyn FnOnce(&mut BeanManager) -> ServerResult<()> + Send>;

/// Queue of tasks waiting for a session's next long poll.
pub struct TaskQueue {
    session_id: String,
    tasks: Mutex<VecDeque<Task>>,
    signal: Condvar,
    interrupted: AtomicBool,
    max_poll_time: Duration,
}

impl TaskQueue {
    /// Creates a queue whose polls block at most `max_poll_time`.
    pub fn new(session_id: impl Into<String>, max_poll_time: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            tasks: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            interrupted: AtomicBool::new(false),
            max_poll_time,
        }
    }

    /// Queues a task and wakes a waiting poll.
    pub fn add_task(&self, task: Task) {
        let mut tasks = self.tasks.lock();
        tasks.push_back(task);
        trace!(session = %self.session_id, queued = tasks.len(), "task added");
        self.signal.notify_one();
    }

    /// Ends the current (or next) poll early.
    pub fn interrupt(&self) {
        let _tasks = self.tasks.lock();
        self.interrupted.store(true, Ordering::SeqCst);
        trace!(session = %self.session_id, "poll interrupted");
        self.signal.notify_one();
    }

    /// Returns the number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Returns true if no task is queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Runs queued tasks until a response command exists, the poll is
    /// interrupted, or the max poll time elapses.
    ///
    /// Returns the number of tasks run. A failing task aborts the poll.
    pub fn execute_tasks(&self, beans: &mut BeanManager) -> ServerResult<usize> {
        let deadline = Instant::now() + self.max_poll_time;
        let mut executed = 0;

        while !beans.has_response() {
            let Some(task) = self.next_task(deadline) else {
                break;
            };
            task(beans).map_err(|err| ServerError::Task {
                session: self.session_id.clone(),
                message: err.to_string(),
            })?;
            executed += 1;
        }

        trace!(
            session = %self.session_id,
            executed,
            remaining = self.len(),
            "poll finished"
        );
        Ok(executed)
    }

    fn next_task(&self, deadline: Instant) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        loop {
            if self.interrupted.swap(false, Ordering::SeqCst) {
                return None;
            }
            if let Some(task) = tasks.pop_front() {
                return Some(task);
            }
            if self.signal.wait_until(&mut tasks, deadline).timed_out() {
                self.interrupted.store(false, Ordering::SeqCst);
                return tasks.pop_front();
            }
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("session_id", &self.session_id)
            .field("queued", &self.len())
            .field("max_poll_time", &self.max_poll_time)
            .finish()
    }
}

/// A cloneable handle to a live session.
///
/// Handles stay valid after the session is destroyed; tasks queued then are
/// never run.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: Arc<str>,
    tasks: Arc<TaskQueue>,
}

impl SessionHandle {
    /// Creates a handle for a session's queue.
    pub fn new(id: &str, tasks: Arc<TaskQueue>) -> Self {
        Self {
            id: Arc::from(id),
            tasks,
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queues a task for the session's next long poll.
    pub fn run_later<F>(&self, task: F)
    where
        F: FnOnce(&mut BeanManager) -> ServerResult<()> + Send + 'static,
    {
        self.tasks.add_task(Box::new(task));
    }

    /// Interrupts the session's long poll.
    pub fn interrupt(&self) {
        self.tasks.interrupt();
    }

    /// Returns the number of tasks waiting to run.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dolphin_model::{BeanSchema, SchemaRegistry};
    use std::thread;

    fn beans() -> BeanManager {
        let mut schemas = SchemaRegistry::new();
        schemas
            .register(BeanSchema::new("Counter").with_value("count"))
            .unwrap();
        BeanManager::with_schemas(Arc::new(schemas))
    }

    #[test]
    fn poll_times_out_without_tasks() {
        let queue = TaskQueue::new("s", Duration::from_millis(20));
        let started = Instant::now();
        assert_eq!(queue.execute_tasks(&mut beans()).unwrap(), 0);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn poll_stops_at_first_response() {
        let queue = TaskQueue::new("s", Duration::from_secs(5));
        let mut beans = beans();
        let id = beans.create_root("Counter").unwrap();
        beans.take_response();

        let target = id.clone();
        queue.add_task(Box::new(move |beans: &mut BeanManager| beans.set(&target, "count", 1i64)));
        queue.add_task(Box::new(|_: &mut BeanManager| Ok(())));

        assert_eq!(queue.execute_tasks(&mut beans).unwrap(), 1);
        assert_eq!(queue.len(), 1);
        assert!(beans.has_response());
    }

    #[test]
    fn interrupt_wakes_poll() {
        let queue = Arc::new(TaskQueue::new("s", Duration::from_secs(10)));
        let waker = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.interrupt();
        });

        let started = Instant::now();
        assert_eq!(queue.execute_tasks(&mut beans()).unwrap(), 0);
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn task_from_other_thread_wakes_poll() {
        let queue = Arc::new(TaskQueue::new("s", Duration::from_secs(10)));
        let session = SessionHandle::new("s", Arc::clone(&queue));
        let mut beans = beans();
        let id = beans.create_root("Counter").unwrap();
        beans.take_response();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            session.run_later(move |beans| beans.set(&id, "count", 7i64));
        });

        assert_eq!(queue.execute_tasks(&mut beans).unwrap(), 1);
        assert_eq!(beans.take_response().len(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn failing_task_aborts_poll() {
        let queue = TaskQueue::new("s", Duration::from_secs(1));
        queue.add_task(Box::new(|_: &mut BeanManager| {
            Err(ServerError::Internal("boom".into()))
        }));
        assert!(matches!(
            queue.execute_tasks(&mut beans()),
            Err(ServerError::Task { .. })
        ));
    }
}
