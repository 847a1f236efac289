use nova_jdwp::{ClassInfo, EventKind, EventModifier, EventRequest, RequestId, VirtualMachine};
use serde_json::{json, Value};

use super::RequestSettings;
use crate::error::{BreakpointError, ResolveError};
use crate::names;
use crate::pattern::ClassPattern;
use crate::props;

/// Stops at the first executable location of a source line.
#[derive(Clone, Debug, PartialEq)]
pub struct LineBreakpoint {
    class: ClassPattern,
    url: Option<String>,
    package: Option<String>,
    source_name: Option<String>,
    line: u32,
}

impl LineBreakpoint {
    pub fn new(class: ClassPattern, line: u32) -> Result<Self, BreakpointError> {
        if line == 0 {
            return Err(BreakpointError::InvalidLineNumber);
        }
        Ok(Self {
            class,
            url: None,
            package: None,
            source_name: None,
            line,
        })
    }

    /// Breakpoint on a source file rather than a class. Matches any class in
    /// `package` whose recorded source path is a suffix of `url`.
    pub fn for_source(
        url: impl Into<String>,
        package: Option<&str>,
        line: u32,
    ) -> Result<Self, BreakpointError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(BreakpointError::Empty("source url"));
        }
        let class = match package.filter(|p| !p.is_empty()) {
            Some(package) => ClassPattern::Prefix(format!("{package}.")),
            None => ClassPattern::Any,
        };
        let source_name = normalize(&url)
            .rsplit('/')
            .next()
            .map(str::to_string)
            .filter(|name| !name.is_empty());
        let mut bp = Self::new(class, line)?;
        bp.package = package.map(str::to_string);
        bp.source_name = source_name;
        bp.url = Some(url);
        Ok(bp)
    }

    pub fn with_url(mut self, url: Option<&str>) -> Self {
        self.url = url.map(str::to_string);
        self
    }

    pub fn with_package(mut self, package: Option<&str>) -> Self {
        self.package = package.map(str::to_string);
        self
    }

    pub fn with_source_name(mut self, source_name: Option<&str>) -> Self {
        self.source_name = source_name.map(str::to_string);
        self
    }

    pub fn class_pattern(&self) -> &ClassPattern {
        &self.class
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Source file name to filter on; only breakpoints set in a file know it.
    pub(crate) fn source_filter(&self) -> Option<&str> {
        self.url.as_ref().and(self.source_name.as_deref())
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn set_line(&mut self, line: u32) -> Result<(), BreakpointError> {
        if line == 0 {
            return Err(BreakpointError::InvalidLineNumber);
        }
        self.line = line;
        Ok(())
    }

    pub(crate) fn matches(&self, vm: &dyn VirtualMachine, class: &ClassInfo) -> bool {
        if !self.class.matches(&class.name) {
            return false;
        }
        if let Some(url) = &self.url {
            let url = normalize(url);
            match vm.source_paths(class.type_id) {
                Ok(paths) => {
                    if paths.iter().any(|path| url.ends_with(&normalize(path))) {
                        return true;
                    }
                }
                Err(err) => {
                    tracing::trace!(target: "nova.breakpoints", class = %class.name, error = %err, "no source paths");
                    return false;
                }
            }
        }
        match (&self.package, &self.url) {
            (Some(package), _) => names::package_of(&class.name).unwrap_or("") == package,
            (None, Some(_)) => false,
            (None, None) => true,
        }
    }

    pub(crate) fn resolve_reference(
        &self,
        vm: &dyn VirtualMachine,
        class: &ClassInfo,
        settings: &RequestSettings<'_>,
    ) -> Result<Vec<RequestId>, ResolveError> {
        let source = self.source_filter();
        let mut locations = vm.locations_of_line(class.type_id, source, self.line)?;
        if locations.is_empty() {
            // Code on the line may belong to an inner or anonymous class.
            for nested in vm.nested_types(class.type_id)? {
                if !nested.prepared {
                    continue;
                }
                locations = vm.locations_of_line(nested.type_id, source, self.line)?;
                if !locations.is_empty() {
                    break;
                }
            }
        }
        let Some(&location) = locations.first() else {
            tracing::debug!(target: "nova.breakpoints", class = %class.name, line = self.line, "no code at line");
            return Ok(Vec::new());
        };
        let request =
            EventRequest::new(EventKind::Breakpoint).modifier(EventModifier::LocationOnly { location });
        Ok(vec![settings.install(vm, request)?])
    }

    pub(crate) fn description(&self) -> String {
        match (&self.url, &self.source_name) {
            (Some(_), Some(source)) => format!("{source}:{}", self.line),
            _ => format!("{}:{}", self.class, self.line),
        }
    }

    pub(crate) fn property_values(&self, out: &mut Vec<(&'static str, Value)>) {
        out.extend([
            (props::CLASS_NAME, json!(self.class.to_string())),
            (props::URL, json!(self.url)),
            (props::PACKAGE_NAME, json!(self.package)),
            (props::SOURCE_NAME, json!(self.source_name)),
            (props::LINE_NUMBER, json!(self.line)),
        ]);
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}
