//! Property names carried by [`crate::PropertyChange`] events.

pub const BREAKPOINT_GROUP: &str = "breakpointGroup";
pub const CLASS_FILTER: &str = "classFilter";
pub const THREAD_FILTER: &str = "threadFilter";
pub const DELETE_ON_EXPIRE: &str = "deleteOnExpire";
pub const DELETE_ON_HIT: &str = "deleteOnHit";
pub const ENABLED: &str = "enabled";
pub const RESOLVED: &str = "resolved";
pub const SUSPEND_POLICY: &str = "suspendPolicy";
pub const HIT_COUNT: &str = "hitCount";
pub const CONDITIONS: &str = "conditions";
pub const MONITORS: &str = "monitors";

pub const CLASS_NAME: &str = "className";
pub const URL: &str = "url";
pub const PACKAGE_NAME: &str = "packageName";
pub const SOURCE_NAME: &str = "sourceName";
pub const LINE_NUMBER: &str = "lineNumber";
pub const METHOD_NAME: &str = "methodName";
pub const METHOD_PARAMETERS: &str = "methodParameters";
pub const FIELD_NAME: &str = "fieldName";
pub const OBJECT: &str = "object";
pub const LOCATION: &str = "location";
pub const STOP_ON_ACCESS: &str = "stopOnAccess";
pub const STOP_ON_MODIFY: &str = "stopOnModify";
pub const STOP_ON_CAUGHT: &str = "stopOnCaught";
pub const STOP_ON_UNCAUGHT: &str = "stopOnUncaught";
pub const STOP_ON_PREPARE: &str = "stopOnPrepare";
pub const STOP_ON_UNLOAD: &str = "stopOnUnload";
pub const STOP_ON_START: &str = "stopOnStart";
pub const STOP_ON_DEATH: &str = "stopOnDeath";
pub const STOP_ON_ENTER: &str = "stopOnEnter";
pub const STOP_ON_EXIT: &str = "stopOnExit";

/// Group name.
pub const NAME: &str = "name";

/// Sequence number assigned when a breakpoint is added; used for listings.
pub const NUMBER: &str = "number";
