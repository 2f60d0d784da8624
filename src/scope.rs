use std::rc::Rc;

use crate::assembler::SourceFile;
use crate::ast::{Expr, MacroDecl, SimVarRef, Span};
use crate::types::Type;

pub type ScopeId = usize;

/// A frame plus the number of its bindings that are visible through it.
///
/// Macros capture a mark at declaration, so names bound later in the same
/// frame stay invisible to the macro body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeMark {
    pub id: ScopeId,
    pub visible: usize,
}

/// What a name refers to.
#[derive(Debug, Clone)]
pub enum Binding {
    Local {
        register: usize,
        ty: Type,
    },
    Alias {
        var: SimVarRef,
        span: Span,
    },
    /// `scope` is the defining scope; `None` for imported macros.
    Macro {
        decl: Rc<MacroDecl>,
        scope: Option<ScopeMark>,
        file: Rc<SourceFile>,
    },
    /// A macro parameter, evaluated in the caller's scope and file.
    Argument {
        expr: Rc<Expr>,
        scope: Option<ScopeId>,
        file: Rc<SourceFile>,
    },
}

#[derive(Debug)]
struct Frame {
    /// In declaration order.
    bindings: Vec<(String, Binding)>,
    parent: Option<ScopeMark>,
    watermark: usize,
}

/// Arena of lexical scopes. Frames are never freed during a compilation, so
/// a captured `ScopeId` or `ScopeMark` stays valid.
#[derive(Debug, Default)]
pub struct Scopes {
    frames: Vec<Frame>,
}

impl Scopes {
    /// Open a frame under `parent`, recording the register index at entry.
    pub fn push(&mut self, parent: Option<ScopeMark>, watermark: usize) -> ScopeId {
        self.frames.push(Frame {
            bindings: Vec::new(),
            parent,
            watermark,
        });
        self.frames.len() - 1
    }

    /// Everything bound in `id` so far.
    pub fn mark(&self, id: ScopeId) -> ScopeMark {
        ScopeMark {
            id,
            visible: self.frames.get(id).map_or(0, |f| f.bindings.len()),
        }
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.frames.get(id).and_then(|f| f.parent).map(|m| m.id)
    }

    pub fn watermark(&self, id: ScopeId) -> usize {
        self.frames.get(id).map_or(0, |f| f.watermark)
    }

    /// Innermost binding of `name` visible from all of frame `from`.
    pub fn lookup(&self, from: Option<ScopeId>, name: &str) -> Option<&Binding> {
        self.lookup_at(from.map(|id| self.mark(id)), name)
    }

    /// Innermost binding of `name` visible through `from`.
    pub fn lookup_at(&self, from: Option<ScopeMark>, name: &str) -> Option<&Binding> {
        let mut at = from;
        while let Some(mark) = at {
            let frame = self.frames.get(mark.id)?;
            let found = frame
                .bindings
                .iter()
                .take(mark.visible)
                .find(|(bound, _)| bound == name);
            if let Some((_, binding)) = found {
                return Some(binding);
            }
            at = frame.parent;
        }
        None
    }

    /// Bind `name` in frame `at`. Fails if the name is already visible
    /// anywhere in the chain; shadowing is not allowed.
    pub fn declare(&mut self, at: ScopeId, name: &str, binding: Binding) -> bool {
        if self.lookup(Some(at), name).is_some() {
            return false;
        }
        match self.frames.get_mut(at) {
            Some(frame) => {
                frame.bindings.push((name.to_string(), binding));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn local(register: usize) -> Binding {
        Binding::Local { register, ty: Type::Number }
    }

    fn child(scopes: &mut Scopes, parent: ScopeId) -> ScopeId {
        let mark = scopes.mark(parent);
        scopes.push(Some(mark), 0)
    }

    #[test]
    fn lookup_walks_outward() {
        let mut scopes = Scopes::default();
        let outer = scopes.push(None, 0);
        assert!(scopes.declare(outer, "a", local(0)));
        let inner = scopes.push(Some(scopes.mark(outer)), 1);
        assert!(matches!(scopes.lookup(Some(inner), "a"), Some(Binding::Local { register: 0, .. })));
        assert!(scopes.lookup(Some(outer), "b").is_none());
        assert!(scopes.lookup(None, "a").is_none());
        assert_eq!(scopes.parent(inner), Some(outer));
        assert_eq!(scopes.watermark(inner), 1);
    }

    #[test]
    fn no_shadowing_across_the_chain() {
        let mut scopes = Scopes::default();
        let outer = scopes.push(None, 0);
        assert!(scopes.declare(outer, "x", local(0)));
        let inner = child(&mut scopes, outer);
        assert!(!scopes.declare(inner, "x", local(1)));
        assert!(!scopes.declare(outer, "x", local(1)));
    }

    #[test]
    fn siblings_do_not_see_each_other() {
        let mut scopes = Scopes::default();
        let root = scopes.push(None, 0);
        let first = child(&mut scopes, root);
        let second = child(&mut scopes, root);
        assert!(scopes.declare(first, "t", local(0)));
        assert!(scopes.declare(second, "t", local(0)));
    }

    #[test]
    fn marks_hide_later_bindings() {
        let mut scopes = Scopes::default();
        let root = scopes.push(None, 0);
        assert!(scopes.declare(root, "early", local(0)));
        let mark = scopes.mark(root);
        assert!(scopes.declare(root, "late", local(1)));

        assert!(scopes.lookup_at(Some(mark), "early").is_some());
        assert!(scopes.lookup_at(Some(mark), "late").is_none());
        assert!(scopes.lookup(Some(root), "late").is_some());

        // A frame opened under the mark may reuse the later name.
        let body = scopes.push(Some(mark), 0);
        assert!(scopes.declare(body, "late", local(2)));
        assert!(!scopes.declare(body, "early", local(2)));
    }
}
