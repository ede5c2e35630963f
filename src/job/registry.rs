//! The job type registry.
//!
//! Job behavior is registered, not discovered: each job type declares its
//! named handlers (`perform`, `before_perform`, `after_perform`, or any
//! `{event}_{method}` name), the attribute names that may be assigned through
//! dirmon entry properties, and an optional defaults hook applied during
//! `build`. Method invocation is a registry lookup with a silent miss, so a
//! job type that defines no `before_perform` simply skips that step.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::exception::JobError;
use super::job::Job;

/// Result of a user-supplied handler.
///
/// The returned value is captured into `job.result` when the job has
/// `collect_output` set (main method only; hook return values are ignored).
pub type HandlerResult = Result<Value, JobError>;

/// A registered handler: receives the job (mutable, so handlers can read and
/// adjust its fields) and the job's arguments.
pub type Handler = Arc<dyn Fn(&mut Job, &[Value]) -> HandlerResult + Send + Sync>;

/// Defaults hook applied to a freshly built job before the caller's
/// configuration closure.
pub type DefaultsHook = Arc<dyn Fn(&mut Job) + Send + Sync>;

/// A registered job type: handlers, settable attributes, defaults.
pub struct JobType {
    name: String,
    attributes: BTreeSet<String>,
    handlers: HashMap<String, Handler>,
    defaults: Option<DefaultsHook>,
}

impl JobType {
    /// Creates an empty job type with the given class name.
    pub fn new(name: impl Into<String>) -> Self {
        JobType {
            name: name.into(),
            attributes: BTreeSet::new(),
            handlers: HashMap::new(),
            defaults: None,
        }
    }

    /// Declares an attribute assignable through dirmon entry properties.
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }

    /// Registers a named handler (`perform`, `before_perform`, ...).
    pub fn with_handler(
        mut self,
        method: impl Into<String>,
        handler: impl Fn(&mut Job, &[Value]) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method.into(), Arc::new(handler));
        self
    }

    /// Registers the defaults hook, applied during `build` before the
    /// caller's configuration closure. Returns `self` for chaining.
    pub fn with_defaults(mut self, hook: impl Fn(&mut Job) + Send + Sync + 'static) -> Self {
        self.defaults = Some(Arc::new(hook));
        self
    }

    /// The class name this type is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a handler by method name; `None` means the type does not
    /// define that method.
    pub fn handler(&self, method: &str) -> Option<Handler> {
        self.handlers.get(method).cloned()
    }

    /// Whether `key` names a settable attribute on this type.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains(key)
    }

    pub fn defaults(&self) -> Option<DefaultsHook> {
        self.defaults.clone()
    }
}

impl std::fmt::Debug for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobType")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("defaults", &self.defaults.is_some())
            .finish()
    }
}

/// Registry of job types, keyed by class name.
///
/// Registration normally happens once at startup; lookups happen on every
/// dispatch, so reads take a shared lock.
#[derive(Default)]
pub struct JobRegistry {
    types: RwLock<HashMap<String, Arc<JobType>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry::default()
    }

    /// Registers a job type, replacing any previous registration under the
    /// same name.
    pub fn register(&self, job_type: JobType) {
        let mut types = self.types.write().unwrap();
        types.insert(job_type.name.clone(), Arc::new(job_type));
    }

    /// Resolves a class name; `None` if it was never registered.
    pub fn get(&self, name: &str) -> Option<Arc<JobType>> {
        self.types.read().unwrap().get(name).cloned()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types = self.types.read().unwrap();
        f.debug_struct("JobRegistry")
            .field("types", &types.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_resolve() {
        let registry = JobRegistry::new();
        registry.register(JobType::new("reporting_job"));
        assert!(registry.get("reporting_job").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn handler_lookup_misses_silently() {
        let registry = JobRegistry::new();
        registry.register(
            JobType::new("noop_job").with_handler("perform", |_, _| Ok(Value::Null)),
        );
        let job_type = registry.get("noop_job").unwrap();
        assert!(job_type.handler("perform").is_some());
        assert!(job_type.handler("before_perform").is_none());
    }

    #[test]
    fn attributes_are_declared_explicitly() {
        let job_type = JobType::new("upload")
            .with_attribute("path")
            .with_attribute("user");
        assert!(job_type.has_attribute("path"));
        assert!(!job_type.has_attribute("priority_override"));
    }

    #[test]
    fn later_registration_wins() {
        let registry = JobRegistry::new();
        registry.register(JobType::new("j").with_attribute("a"));
        registry.register(JobType::new("j").with_attribute("b"));
        let job_type = registry.get("j").unwrap();
        assert!(!job_type.has_attribute("a"));
        assert!(job_type.has_attribute("b"));
    }
}
