use nova_jdwp::{
    ClassInfo, EventKind, EventModifier, EventRequest, FieldInfo, ObjectRef, RequestId,
    VirtualMachine,
};
use serde_json::{json, Value};

use super::RequestSettings;
use crate::error::{BreakpointError, ResolveError};
use crate::names;
use crate::pattern::ClassPattern;
use crate::props;

/// Stops when a named field is read or written.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchBreakpoint {
    class: ClassPattern,
    field_name: String,
    stop_on_access: bool,
    stop_on_modify: bool,
}

impl WatchBreakpoint {
    pub fn new(
        class: ClassPattern,
        field_name: impl Into<String>,
        stop_on_access: bool,
        stop_on_modify: bool,
    ) -> Result<Self, BreakpointError> {
        let field_name = field_name.into();
        if field_name.is_empty() {
            return Err(BreakpointError::Empty("field name"));
        }
        if !names::is_identifier(&field_name) {
            return Err(ResolveError::MalformedMemberName(field_name).into());
        }
        Ok(Self {
            class,
            field_name,
            stop_on_access,
            stop_on_modify,
        })
    }

    pub fn class_pattern(&self) -> &ClassPattern {
        &self.class
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn stop_on_access(&self) -> bool {
        self.stop_on_access
    }

    pub fn stop_on_modify(&self) -> bool {
        self.stop_on_modify
    }

    pub fn set_stop_on_access(&mut self, stop: bool) {
        self.stop_on_access = stop;
    }

    pub fn set_stop_on_modify(&mut self, stop: bool) {
        self.stop_on_modify = stop;
    }

    pub(crate) fn resolve_reference(
        &self,
        vm: &dyn VirtualMachine,
        class: &ClassInfo,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let field = vm
            .fields(class.type_id)?
            .into_iter()
            .find(|f| f.name == self.field_name)
            .ok_or_else(|| ResolveError::NoSuchField {
                class: class.name.clone(),
                field: self.field_name.clone(),
            })?;
        watch_requests(vm, settings, &field, None, self.stop_on_access, self.stop_on_modify)
    }

    pub(crate) fn description(&self) -> String {
        format!("{}.{}{}", self.class, self.field_name, access_suffix(self.stop_on_access, self.stop_on_modify))
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.extend([
            (props::CLASS_NAME, json!(self.class.to_string())),
            (props::FIELD_NAME, json!(self.field_name)),
            (props::STOP_ON_ACCESS, json!(self.stop_on_access)),
            (props::STOP_ON_MODIFY, json!(self.stop_on_modify)),
        ]);
    }
}

/// Watch on one field of one object instance.
///
/// Object ids die with the VM, so these are removed on disconnect and never
/// persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceWatchBreakpoint {
    field: FieldInfo,
    object: ObjectRef,
    stop_on_access: bool,
    stop_on_modify: bool,
}

impl InstanceWatchBreakpoint {
    pub fn new(field: FieldInfo, object: ObjectRef, stop_on_access: bool, stop_on_modify: bool) -> Self {
        Self {
            field,
            object,
            stop_on_access,
            stop_on_modify,
        }
    }

    pub fn field(&self) -> &FieldInfo {
        &self.field
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn stop_on_access(&self) -> bool {
        self.stop_on_access
    }

    pub fn stop_on_modify(&self) -> bool {
        self.stop_on_modify
    }

    pub(crate) fn create_requests(
        &self,
        vm: &dyn VirtualMachine,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        watch_requests(
            vm,
            settings,
            &self.field,
            Some(self.object.id),
            self.stop_on_access,
            self.stop_on_modify,
        )
    }

    pub(crate) fn description(&self) -> String {
        format!(
            "{} of {} #{}{}",
            self.field.name,
            self.object.runtime_type,
            self.object.id,
            access_suffix(self.stop_on_access, self.stop_on_modify)
        )
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.extend([
            (props::FIELD_NAME, json!(self.field.name)),
            (props::OBJECT, json!(self.object.id)),
            (props::STOP_ON_ACCESS, json!(self.stop_on_access)),
            (props::STOP_ON_MODIFY, json!(self.stop_on_modify)),
        ]);
    }
}

fn watch_requests(
    vm: &dyn VirtualMachine,
    settings: &RequestSettings<'_>,
    field: &FieldInfo,
    object: Option<u64>,
    access: bool,
    modify: bool,
) -> Result<Vec<RequestId>, ResolveError> {
    let capabilities = vm.capabilities();
    if access && !capabilities.can_watch_field_access {
        return Err(ResolveError::Unsupported("watch field access"));
    }
    if modify && !capabilities.can_watch_field_modification {
        return Err(ResolveError::Unsupported("watch field modification"));
    }

    let mut requests = Vec::new();
    for (wanted, kind) in [
        (access, EventKind::FieldAccess),
        (modify, EventKind::FieldModification),
    ] {
        if !wanted {
            continue;
        }
        let mut request = EventRequest::new(kind).modifier(EventModifier::FieldOnly {
            declaring_type: field.declaring_type,
            field_id: field.field_id,
        });
        if let Some(object) = object {
            request = request.modifier(EventModifier::InstanceOnly { object });
        }
        requests.push(request);
    }
    Ok(settings.install_all(vm, requests)?)
}

fn access_suffix(access: bool, modify: bool) -> &'static str {
    match (access, modify) {
        (true, true) => " (access, modify)",
        (true, false) => " (access)",
        (false, true) => " (modify)",
        (false, false) => "",
    }
}
