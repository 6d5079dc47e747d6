//! Name-scope (C1, §4.1): a thread-local stack that assigns globally unique,
//! stable full names to every graph part created while a [`crate::waterwork::Waterwork`]
//! is "entered".

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{WaterworksError, WwResult};

/// A single active scope frame: the waterwork's own name plus the per-kind
/// counters used to default-name parts created within it (`Placeholder_<n>`,
/// `<ClassName>_<n>`).
struct ScopeFrame {
    name: String,
    counters: HashMap<String, u32>,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeFrame>> = RefCell::new(Vec::new());
}

/// Handle onto the thread-local scope stack. Stateless; every method operates on
/// the thread-local storage directly, mirroring the Python source's
/// `_default_waterwork` global (§9's "process-wide default graph" design note).
pub struct NameScope;

impl NameScope {
    /// Pushes a new frame named `name`. Per §4.1, at most one frame may be active;
    /// entering while one already is fails with [`WaterworksError::ScopeConflict`].
    pub fn enter(name: &str) -> WwResult<()> {
        SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(active) = stack.last() {
                return Err(WaterworksError::ScopeConflict {
                    active: active.name.clone(),
                    attempted: name.to_string(),
                });
            }
            stack.push(ScopeFrame {
                name: name.to_string(),
                counters: HashMap::new(),
            });
            Ok(())
        })
    }

    /// Pops the active frame. A no-op if no frame is active.
    pub fn exit() {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }

    /// Whether any scope is currently active on this thread.
    pub fn is_active() -> bool {
        SCOPE_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The name of the currently active waterwork, if any.
    pub fn active_name() -> Option<String> {
        SCOPE_STACK.with(|stack| stack.borrow().last().map(|f| f.name.clone()))
    }

    /// Joins all active frame names with `/`. Only ever one frame deep in
    /// practice (§4.1), but implemented as a join over the stack so nested
    /// frames would compose correctly if that constraint were ever relaxed.
    pub fn current_prefix() -> String {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join("/")
        })
    }

    /// Returns the next monotonically increasing counter value for `kind`
    /// (e.g. `"Placeholder"`, `"Add"`) scoped to the active waterwork, starting
    /// at 0. Panics if no scope is active; callers must only reach this path
    /// while constructing parts inside an active waterwork.
    pub fn next_suffix(kind: &str) -> u32 {
        SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let frame = stack
                .last_mut()
                .expect("next_suffix called with no active scope");
            let counter = frame.counters.entry(kind.to_string()).or_insert(0);
            let value = *counter;
            *counter += 1;
            value
        })
    }

    /// `current_prefix() + "/" + local`, the default full name for a part with
    /// no explicit name (§4.1).
    pub fn default_name(local: &str) -> String {
        format!("{}/{}", Self::current_prefix(), local)
    }
}

/// RAII guard that exits the scope when dropped, so `?`-propagation out of
/// `Waterwork::build` doesn't leave a stale active scope behind.
pub struct ScopeGuard;

impl ScopeGuard {
    pub fn enter(name: &str) -> WwResult<Self> {
        NameScope::enter(name)?;
        Ok(ScopeGuard)
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        NameScope::exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each #[test] runs on its own OS thread by default, so the thread-local
    // scope stack is naturally isolated between these tests.

    #[test]
    fn reentry_fails_with_scope_conflict() {
        let _guard = ScopeGuard::enter("ww1").unwrap();
        let err = NameScope::enter("ww2").unwrap_err();
        assert!(matches!(err, WaterworksError::ScopeConflict { .. }));
    }

    #[test]
    fn counters_start_at_zero_and_increment_per_kind() {
        let _guard = ScopeGuard::enter("ww").unwrap();
        assert_eq!(NameScope::next_suffix("Add"), 0);
        assert_eq!(NameScope::next_suffix("Add"), 1);
        assert_eq!(NameScope::next_suffix("Placeholder"), 0);
    }

    #[test]
    fn default_name_joins_prefix_and_local() {
        let _guard = ScopeGuard::enter("ww").unwrap();
        assert_eq!(NameScope::default_name("Add_0/tubes/target"), "ww/Add_0/tubes/target");
    }
}
