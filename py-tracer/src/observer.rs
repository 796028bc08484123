//! Interface between the tracer and the host that runs the program
//!
//! The host owns execution. It calls back into an [`ExecutionObserver`] before
//! every statement and whenever a call context is about to return, and stops
//! early when a callback answers [`Flow::Halt`].

use crate::value::Value;
use crate::Result;

/// Identity of one activation of a callable (one frame)
pub type ContextId = u64;

/// What kind of code a call context is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The program's top level
    Module,
    /// A function body
    Function,
    /// A list/dict/set comprehension or generator expression
    Comprehension,
}

impl ScopeKind {
    /// Classify a context from its code object name
    pub fn from_code_name(name: &str) -> Self {
        match name {
            "<module>" => Self::Module,
            "<listcomp>" | "<dictcomp>" | "<setcomp>" | "<genexpr>" => Self::Comprehension,
            _ => Self::Function,
        }
    }
}

/// One live call context, as exposed by the host during a callback
pub trait CallContext {
    /// Identity of this activation, stable for its lifetime
    fn id(&self) -> ContextId;

    /// Name of the code object being run (`<module>`, a function name, ...)
    fn code_name(&self) -> &str;

    /// Where the running code came from (a filename, or `<string>` for the program)
    fn origin(&self) -> &str;

    /// Current local bindings, in insertion order
    fn locals(&self) -> Vec<(&str, &Value)>;

    fn scope(&self) -> ScopeKind {
        ScopeKind::from_code_name(self.code_name())
    }
}

/// Answer from an observer callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep running and delivering events
    Continue,
    /// Stop the run; no further events will be recorded
    Halt,
}

/// Receiver of execution events, in program order
pub trait ExecutionObserver {
    /// Called before the statement on 1-based line `line` executes
    fn on_line(&mut self, context: &dyn CallContext, line: usize) -> Flow;

    /// Called when `context` is about to return `value` from 1-based line `line`
    fn on_return(&mut self, context: &dyn CallContext, line: usize, value: &Value) -> Flow;
}

/// Something that can run program code under observation
///
/// Errors raised by the program itself are the host's to report; the tracer
/// does not catch or reinterpret them.
pub trait ExecutionHost {
    fn run(&mut self, code: &str, observer: &mut dyn ExecutionObserver) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_code_name() {
        assert_eq!(ScopeKind::from_code_name("<module>"), ScopeKind::Module);
        assert_eq!(ScopeKind::from_code_name("<listcomp>"), ScopeKind::Comprehension);
        assert_eq!(ScopeKind::from_code_name("<dictcomp>"), ScopeKind::Comprehension);
        assert_eq!(ScopeKind::from_code_name("<genexpr>"), ScopeKind::Comprehension);
        assert_eq!(ScopeKind::from_code_name("fib"), ScopeKind::Function);
    }
}
