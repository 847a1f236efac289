//! Saving and restoring a session's breakpoint tree.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use nova_jdwp::SuspendPolicy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::breakpoint::{
    Breakpoint, BreakpointKind, ClassBreakpoint, ExceptionBreakpoint, LineBreakpoint,
    MethodBreakpoint, ThreadBreakpoint, TraceBreakpoint, UncaughtExceptionBreakpoint,
    WatchBreakpoint,
};
use crate::condition::ConditionConfig;
use crate::error::{BreakpointError, Fault, PersistError};
use crate::group::BreakpointGroup;
use crate::manager::BreakpointManager;
use crate::monitor::MonitorConfig;
use crate::pattern::ClassPattern;
use crate::{parse_suspend_policy, props, suspend_policy_name, GroupId};

/// Name of the blob holding a session's breakpoints.
pub fn blob_name(session_id: &str) -> String {
    format!("{session_id}-breakpoints.json")
}

/// Named-blob storage for persisted breakpoint trees.
pub trait BreakpointStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored under `name` yet.
    fn read(&self, name: &str) -> Result<Option<String>, PersistError>;
    fn write(&self, name: &str, contents: &str) -> Result<(), PersistError>;
    fn delete(&self, name: &str) -> Result<(), PersistError>;
}

/// One JSON file per blob inside a directory.
#[derive(Clone, Debug)]
pub struct FileBreakpointStore {
    dir: PathBuf,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FileBreakpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl BreakpointStore for FileBreakpointStore {
    fn read(&self, name: &str) -> Result<Option<String>, PersistError> {
        let path = self.path_of(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path)(err)),
        }
    }

    /// Written to a temporary sibling first and renamed into place, so a
    /// crash never leaves a truncated store behind.
    fn write(&self, name: &str, contents: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.path_of(name);
        let tmp_path = self.dir.join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let write_result = (|| -> io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        })();
        if let Err(err) = write_result.and_then(|()| fs::rename(&tmp_path, &path)) {
            if let Err(remove_err) = fs::remove_file(&tmp_path) {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(
                        target: "nova.breakpoints",
                        path = %tmp_path.display(),
                        error = %remove_err,
                        "failed to remove temporary breakpoint store"
                    );
                }
            }
            return Err(io_error(&path)(err));
        }
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), PersistError> {
        let path = self.path_of(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&path)(err)),
        }
    }
}

/// Store kept in memory; for tests and sessions that opt out of saving.
#[derive(Debug, Default)]
pub struct MemoryBreakpointStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, name: &str) -> Option<String> {
        self.blobs.lock().get(name).cloned()
    }
}

impl BreakpointStore for MemoryBreakpointStore {
    fn read(&self, name: &str) -> Result<Option<String>, PersistError> {
        Ok(self.contents(name))
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), PersistError> {
        self.blobs
            .lock()
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), PersistError> {
        self.blobs.lock().remove(name);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedGroup {
    pub name: String,
    pub enabled: bool,
    pub conditions: Vec<ConditionConfig>,
    pub monitors: Vec<MonitorConfig>,
    pub groups: Vec<PersistedGroup>,
    pub breakpoints: Vec<PersistedBreakpoint>,
}

impl Default for PersistedGroup {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            conditions: Vec::new(),
            monitors: Vec::new(),
            groups: Vec::new(),
            breakpoints: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedBreakpoint {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_policy")]
    pub suspend_policy: String,
    #[serde(default)]
    pub delete_on_hit: bool,
    #[serde(default)]
    pub delete_on_expire: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_filter: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub kind: PersistedKind,
}

fn default_true() -> bool {
    true
}

fn default_policy() -> String {
    suspend_policy_name(SuspendPolicy::All).to_string()
}

/// Kind-specific part of a persisted breakpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedKind {
    Line {
        class: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        package: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_name: Option<String>,
        line: u32,
    },
    Method {
        class: String,
        #[serde(default)]
        method: String,
        #[serde(default)]
        parameters: Vec<String>,
    },
    Exception {
        class: String,
        caught: bool,
        uncaught: bool,
    },
    Watch {
        class: String,
        field: String,
        access: bool,
        modify: bool,
    },
    Thread {
        start: bool,
        death: bool,
    },
    Class {
        prepare: bool,
        unload: bool,
    },
    Trace {
        enter: bool,
        exit: bool,
    },
    UncaughtException,
}

impl PersistedKind {
    /// `None` for kinds tied to one VM's object or location ids.
    fn from_kind(kind: &BreakpointKind) -> Option<Self> {
        Some(match kind {
            BreakpointKind::Line(bp) => PersistedKind::Line {
                class: bp.class_pattern().to_string(),
                url: bp.url().map(str::to_string),
                package: bp.package().map(str::to_string),
                source_name: bp.source_name().map(str::to_string),
                line: bp.line(),
            },
            BreakpointKind::Method(bp) => PersistedKind::Method {
                class: bp.class_pattern().to_string(),
                method: bp.method_name().to_string(),
                parameters: bp.parameters().to_vec(),
            },
            BreakpointKind::Exception(bp) => PersistedKind::Exception {
                class: bp.class_pattern().to_string(),
                caught: bp.stop_on_caught(),
                uncaught: bp.stop_on_uncaught(),
            },
            BreakpointKind::Watch(bp) => PersistedKind::Watch {
                class: bp.class_pattern().to_string(),
                field: bp.field_name().to_string(),
                access: bp.stop_on_access(),
                modify: bp.stop_on_modify(),
            },
            BreakpointKind::Thread(bp) => PersistedKind::Thread {
                start: bp.stop_on_start(),
                death: bp.stop_on_death(),
            },
            BreakpointKind::Class(bp) => PersistedKind::Class {
                prepare: bp.stop_on_prepare(),
                unload: bp.stop_on_unload(),
            },
            BreakpointKind::Trace(bp) => PersistedKind::Trace {
                enter: bp.stop_on_enter(),
                exit: bp.stop_on_exit(),
            },
            BreakpointKind::UncaughtException(_) => PersistedKind::UncaughtException,
            BreakpointKind::Location(_) | BreakpointKind::InstanceWatch(_) => return None,
        })
    }

    fn into_kind(self) -> Result<BreakpointKind, BreakpointError> {
        Ok(match self {
            PersistedKind::Line {
                class,
                url,
                package,
                source_name,
                line,
            } => BreakpointKind::Line(
                LineBreakpoint::new(ClassPattern::parse(&class)?, line)?
                    .with_url(url.as_deref())
                    .with_package(package.as_deref())
                    .with_source_name(source_name.as_deref()),
            ),
            PersistedKind::Method {
                class,
                method,
                parameters,
            } => BreakpointKind::Method(MethodBreakpoint::new(
                ClassPattern::parse(&class)?,
                method,
                parameters,
            )?),
            PersistedKind::Exception {
                class,
                caught,
                uncaught,
            } => BreakpointKind::Exception(ExceptionBreakpoint::new(
                ClassPattern::parse(&class)?,
                caught,
                uncaught,
            )),
            PersistedKind::Watch {
                class,
                field,
                access,
                modify,
            } => BreakpointKind::Watch(WatchBreakpoint::new(
                ClassPattern::parse(&class)?,
                field,
                access,
                modify,
            )?),
            PersistedKind::Thread { start, death } => {
                BreakpointKind::Thread(ThreadBreakpoint::new(start, death))
            }
            PersistedKind::Class { prepare, unload } => {
                BreakpointKind::Class(ClassBreakpoint::new(prepare, unload))
            }
            PersistedKind::Trace { enter, exit } => {
                BreakpointKind::Trace(TraceBreakpoint::new(enter, exit))
            }
            PersistedKind::UncaughtException => {
                BreakpointKind::UncaughtException(UncaughtExceptionBreakpoint)
            }
        })
    }
}

impl PersistedBreakpoint {
    pub fn from_breakpoint(bp: &Breakpoint) -> Option<Self> {
        let kind = PersistedKind::from_kind(bp.kind())?;
        let mut properties = bp.properties().clone();
        // Reassigned every time the breakpoint is added to a manager.
        properties.remove(props::NUMBER);
        Some(Self {
            enabled: bp.enabled(),
            suspend_policy: suspend_policy_name(bp.suspend_policy()).to_string(),
            delete_on_hit: bp.delete_on_hit(),
            delete_on_expire: bp.delete_on_expire(),
            class_filter: bp.class_filter().map(str::to_string),
            thread_filter: bp.thread_filter().map(str::to_string),
            conditions: bp.conditions().iter().filter_map(|c| c.config()).collect(),
            monitors: bp.monitors().iter().filter_map(|m| m.config()).collect(),
            properties,
            kind,
        })
    }

    pub fn into_breakpoint(self) -> Result<Breakpoint, PersistError> {
        self.build().map_err(PersistError::Invalid)
    }

    fn build(self) -> Result<Breakpoint, BreakpointError> {
        let mut bp = Breakpoint::new(self.kind.into_kind()?);
        bp.set_enabled(self.enabled);
        bp.set_suspend_policy(parse_suspend_policy(&self.suspend_policy)?);
        bp.set_delete_on_hit(self.delete_on_hit);
        bp.set_delete_on_expire(self.delete_on_expire);
        bp.set_class_filter(self.class_filter.as_deref())?;
        bp.set_thread_filter(self.thread_filter.as_deref())?;
        for condition in &self.conditions {
            bp.add_condition(condition.build());
        }
        for monitor in &self.monitors {
            bp.add_monitor(monitor.build());
        }
        for (name, value) in self.properties {
            bp.set_property(name, value);
        }
        Ok(bp)
    }
}

impl BreakpointManager {
    /// Serializable copy of the whole tree below the default group.
    pub fn to_persisted(&self) -> PersistedGroup {
        self.persist_group(self.default_group())
    }

    fn persist_group(&self, id: GroupId) -> PersistedGroup {
        let Some(group) = self.group(id) else {
            return PersistedGroup::default();
        };
        PersistedGroup {
            name: group.name().to_string(),
            enabled: group.enabled(),
            conditions: group.conditions().iter().filter_map(|c| c.config()).collect(),
            monitors: group.monitors().iter().filter_map(|m| m.config()).collect(),
            groups: group
                .groups()
                .iter()
                .map(|child| self.persist_group(*child))
                .collect(),
            breakpoints: group
                .breakpoints()
                .iter()
                .filter_map(|bp| self.breakpoint(*bp))
                .filter_map(PersistedBreakpoint::from_breakpoint)
                .collect(),
        }
    }

    /// Replace everything below the default group with a persisted tree.
    /// Breakpoints that no longer validate are reported as group errors and
    /// skipped.
    pub fn restore(&mut self, tree: PersistedGroup) {
        self.clear_tree();
        let root = self.default_group();
        self.restore_into(root, tree);
    }

    fn clear_tree(&mut self) {
        let root = self.default_group();
        let Some(group) = self.group(root) else {
            return;
        };
        let (children, breakpoints) = (group.groups().to_vec(), group.breakpoints().to_vec());
        for child in children.into_iter().rev() {
            if let Err(err) = self.remove_group(child) {
                tracing::warn!(target: "nova.breakpoints", group = %child, error = %err, "could not clear group");
            }
        }
        for bp in breakpoints.into_iter().rev() {
            if let Err(err) = self.remove_breakpoint(bp) {
                tracing::warn!(target: "nova.breakpoints", breakpoint = %bp, error = %err, "could not clear breakpoint");
            }
        }
        if let Some(group) = self.groups.get_mut(&root) {
            group.clear_actions();
        }
    }

    fn restore_into(&mut self, id: GroupId, tree: PersistedGroup) {
        let mut faults = Vec::new();
        if let Some(group) = self.groups.get_mut(&id) {
            if !tree.name.trim().is_empty() {
                group.set_name(tree.name);
            }
            group.enabled = tree.enabled;
            for condition in &tree.conditions {
                group.add_condition(condition.build());
            }
            for monitor in &tree.monitors {
                if let Err(err) = group.add_monitor(monitor.build()) {
                    faults.push(PersistError::Invalid(err));
                }
            }
        }
        for persisted in tree.breakpoints {
            match persisted.into_breakpoint() {
                Ok(bp) => {
                    if let Err(err) = self.add_breakpoint_to(id, bp) {
                        faults.push(PersistError::Invalid(err));
                    }
                }
                Err(err) => faults.push(err),
            }
        }
        for fault in faults {
            self.publish_group_error(id, Fault::Persist(fault));
        }
        for child in tree.groups {
            let group = match BreakpointGroup::new(child.name.clone()) {
                Ok(group) => group,
                Err(err) => {
                    self.publish_group_error(id, Fault::Persist(PersistError::Invalid(err)));
                    continue;
                }
            };
            match self.add_group(id, group) {
                Ok(child_id) => self.restore_into(child_id, child),
                Err(err) => self.publish_group_error(id, Fault::Persist(PersistError::Invalid(err))),
            }
        }
    }

    /// Load this session's tree from the store. Returns `false` when the
    /// store has nothing for the session yet.
    pub fn load(&mut self) -> Result<bool, PersistError> {
        let name = blob_name(self.session_id());
        let Some(contents) = self.store().read(&name)? else {
            tracing::debug!(target: "nova.breakpoints", blob = %name, "no saved breakpoints");
            return Ok(false);
        };
        let tree: PersistedGroup = serde_json::from_str(&contents)?;
        self.restore(tree);
        tracing::debug!(target: "nova.breakpoints", blob = %name, "restored breakpoints");
        Ok(true)
    }

    pub fn save(&self) -> Result<(), PersistError> {
        let name = blob_name(self.session_id());
        let contents = serde_json::to_string_pretty(&self.to_persisted())?;
        self.store().write(&name, &contents)?;
        tracing::debug!(target: "nova.breakpoints", blob = %name, "saved breakpoints");
        Ok(())
    }

    pub fn delete_store(&self) -> Result<(), PersistError> {
        self.store().delete(&blob_name(self.session_id()))
    }
}
