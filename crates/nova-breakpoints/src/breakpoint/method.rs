use nova_jdwp::{
    ClassInfo, EventKind, EventModifier, EventRequest, MethodInfo, RequestId, VirtualMachine,
};
use serde_json::{json, Value};

use super::RequestSettings;
use crate::error::ResolveError;
use crate::names;
use crate::pattern::ClassPattern;
use crate::props;

/// Stops on entry to a method (its first executable location).
///
/// An empty method name selects every method of the class; an empty
/// parameter list selects every overload of the named method.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodBreakpoint {
    class: ClassPattern,
    method_name: String,
    parameters: Vec<String>,
}

impl MethodBreakpoint {
    pub fn new(
        class: ClassPattern,
        method_name: impl Into<String>,
        parameters: Vec<String>,
    ) -> Result<Self, ResolveError> {
        let method_name = method_name.into();
        if !method_name.is_empty() && !names::is_method_name(&method_name) {
            return Err(ResolveError::MalformedMemberName(method_name));
        }
        let parameters = parameters
            .into_iter()
            .map(|p| p.trim().to_string())
            .collect::<Vec<_>>();
        if let Some(bad) = parameters.iter().find(|p| !names::is_type_name(p)) {
            return Err(ResolveError::InvalidParameterType(bad.clone()));
        }
        Ok(Self {
            class,
            method_name,
            parameters,
        })
    }

    pub fn class_pattern(&self) -> &ClassPattern {
        &self.class
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    fn select<'m>(
        &self,
        class: &ClassInfo,
        methods: &'m [MethodInfo],
    ) -> Result<Vec<&'m MethodInfo>, ResolveError> {
        if self.method_name.is_empty() {
            return Ok(methods.iter().collect());
        }
        let named = methods.iter().filter(|m| m.name == self.method_name);
        let found: Vec<&MethodInfo> = if self.parameters.is_empty() {
            named.collect()
        } else {
            named
                .filter(|m| {
                    m.argument_type_names.len() == self.parameters.len()
                        && m.argument_type_names
                            .iter()
                            .zip(&self.parameters)
                            .all(|(declared, typed)| names::type_matches(declared, typed))
                })
                .collect()
        };
        match found.len() {
            0 => Err(ResolveError::NoSuchMethod {
                class: class.name.clone(),
                method: self.signature(),
            }),
            1 => Ok(found),
            // Only an explicit parameter list can be ambiguous, e.g. when a
            // simple type name matches two qualified ones.
            _ if !self.parameters.is_empty() => Err(ResolveError::AmbiguousMethod {
                class: class.name.clone(),
                method: self.signature(),
            }),
            _ => Ok(found),
        }
    }

    pub(crate) fn resolve_reference(
        &self,
        vm: &dyn VirtualMachine,
        class: &ClassInfo,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let methods = vm.methods(class.type_id)?;
        // Abstract and native methods have no code.
        let requests = self
            .select(class, &methods)?
            .into_iter()
            .filter_map(|method| method.location)
            .map(|location| {
                EventRequest::new(EventKind::Breakpoint)
                    .modifier(EventModifier::LocationOnly { location })
            });
        Ok(settings.install_all(vm, requests)?)
    }

    fn signature(&self) -> String {
        if self.parameters.is_empty() {
            self.method_name.clone()
        } else {
            format!("{}({})", self.method_name, self.parameters.join(", "))
        }
    }

    pub(crate) fn description(&self) -> String {
        if self.method_name.is_empty() {
            format!("{}.*", self.class)
        } else {
            format!("{}.{}", self.class, self.signature())
        }
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.extend([
            (props::CLASS_NAME, json!(self.class.to_string())),
            (props::METHOD_NAME, json!(self.method_name)),
            (props::METHOD_PARAMETERS, json!(self.parameters)),
        ]);
    }
}
