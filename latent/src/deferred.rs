// Placeholders and the capability view over their bookkeeping
//
// A `Deferred` is a stable handle whose state is a swappable delegate:
// `Pending` records every operation into its world's ledger, `Resolved`
// forwards everything to the real subject. Resolution swaps the state
// without touching the handle, so existing clones keep working.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use lazy_static::lazy_static;

use crate::error::{RuntimeError, RuntimeResult};
use crate::record::{OpKind, OperationRecord, Recorder};
use crate::values::{CallArgs, Function, Op, Value};

lazy_static! {
    /// Member names belonging to placeholder bookkeeping. Ordinary member
    /// reads on an unresolved placeholder refuse them, so nothing can reach
    /// the ledger or the subject without going through `CapabilityView`.
    static ref BOOKKEEPING_MEMBERS: HashSet<&'static str> = {
        ["subject", "resolved", "cache", "recorder", "ledger", "members"]
            .iter()
            .copied()
            .collect()
    };
}

#[derive(Clone)]
pub struct Deferred(Rc<DeferredCell>);

struct DeferredCell {
    state: RefCell<DeferredState>,
}

enum DeferredState {
    Pending {
        recorder: Rc<Recorder>,
        /// Subject known at suspend time but withheld until release;
        /// `None` for a husk.
        subject: Option<Value>,
        /// Child placeholder previously returned for each member name.
        cache: HashMap<String, Deferred>,
    },
    Resolved(Value),
}

impl Deferred {
    /// Creates an unresolved placeholder and registers it with its world.
    pub(crate) fn pending(recorder: Rc<Recorder>, subject: Option<Value>) -> Deferred {
        let deferred = Deferred(Rc::new(DeferredCell {
            state: RefCell::new(DeferredState::Pending {
                recorder: Rc::clone(&recorder),
                subject,
                cache: HashMap::new(),
            }),
        }));
        recorder.register(deferred.clone());
        deferred
    }

    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.0.state.borrow(), DeferredState::Resolved(_))
    }

    pub(crate) fn subject(&self) -> Option<Value> {
        CapabilityView::of(self).subject()
    }

    /// Member read: forwards when resolved; otherwise returns the cached
    /// child for this name or records a fresh one.
    pub(crate) fn member(&self, name: &str) -> RuntimeResult<Value> {
        let view = CapabilityView::of(self);
        if let Some(subject) = view.subject() {
            return subject.member(name);
        }
        if BOOKKEEPING_MEMBERS.contains(name) {
            return Err(RuntimeError::AccessDenied {
                member: name.to_string(),
            });
        }
        if let Some(child) = view.cached(name) {
            return Ok(Value::Deferred(child));
        }
        let recorder = view.require_recorder()?;
        let child = Deferred::pending(Rc::clone(&recorder), None);
        view.cache_insert(name, child.clone());
        recorder.append(OperationRecord::new(
            self.clone(),
            OpKind::MemberRead(name.to_string()),
            CallArgs::empty(),
            Value::Deferred(child.clone()),
        ));
        Ok(Value::Deferred(child))
    }

    /// Invocation: forwards when resolved; otherwise records the call and
    /// returns a fresh placeholder for its future result.
    pub(crate) fn invoke(&self, args: CallArgs) -> RuntimeResult<Value> {
        let view = CapabilityView::of(self);
        if let Some(subject) = view.subject() {
            return subject.invoke(args);
        }
        let recorder = view.require_recorder()?;
        let child = Deferred::pending(Rc::clone(&recorder), None);
        recorder.append(OperationRecord::new(
            self.clone(),
            OpKind::Invoke,
            args,
            Value::Deferred(child.clone()),
        ));
        Ok(Value::Deferred(child))
    }

    /// Operator use with this placeholder on one side. `reflected` marks the
    /// placeholder as the right operand.
    pub(crate) fn apply(&self, op: Op, other: &Value, reflected: bool) -> RuntimeResult<Value> {
        let view = CapabilityView::of(self);
        if let Some(subject) = view.subject() {
            return if reflected {
                other.apply(op, &subject)
            } else {
                subject.apply(op, other)
            };
        }
        let recorder = view.require_recorder()?;
        let child = Deferred::pending(Rc::clone(&recorder), None);
        recorder.append(OperationRecord::new(
            self.clone(),
            OpKind::Operator { op, reflected },
            CallArgs::positional(vec![other.clone()]),
            Value::Deferred(child.clone()),
        ));
        Ok(Value::Deferred(child))
    }

    /// Class derivation with this placeholder among the bases: records the
    /// full base list and body, and returns a placeholder standing for the
    /// future class.
    pub(crate) fn derive(
        &self,
        name: &str,
        bases: Vec<Value>,
        body: Vec<(String, Function)>,
    ) -> RuntimeResult<Value> {
        let view = CapabilityView::of(self);
        let recorder = view.require_recorder()?;
        let child = Deferred::pending(Rc::clone(&recorder), None);
        recorder.append(OperationRecord::new(
            self.clone(),
            OpKind::DeriveSubtype {
                name: name.to_string(),
                bases,
                body,
            },
            CallArgs::empty(),
            Value::Deferred(child.clone()),
        ));
        Ok(Value::Deferred(child))
    }
}

impl fmt::Display for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.state.borrow() {
            DeferredState::Resolved(subject) => write!(f, "{}", subject),
            DeferredState::Pending { .. } => write!(f, "#<deferred>"),
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.state.borrow() {
            DeferredState::Resolved(subject) => write!(f, "Deferred(resolved {})", subject),
            DeferredState::Pending { cache, .. } => {
                write!(f, "Deferred(pending, {} cached members)", cache.len())
            }
        }
    }
}

/// Privileged accessor over a placeholder's bookkeeping. This is the only
/// path that touches the cell directly; everything else goes through the
/// recording surface above.
pub(crate) struct CapabilityView<'a> {
    cell: &'a DeferredCell,
}

impl<'a> CapabilityView<'a> {
    pub(crate) fn of(deferred: &'a Deferred) -> CapabilityView<'a> {
        CapabilityView { cell: &deferred.0 }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        matches!(&*self.cell.state.borrow(), DeferredState::Resolved(_))
    }

    /// The real subject, present only after resolution.
    pub(crate) fn subject(&self) -> Option<Value> {
        match &*self.cell.state.borrow() {
            DeferredState::Resolved(subject) => Some(subject.clone()),
            DeferredState::Pending { .. } => None,
        }
    }

    /// The subject stashed at suspend time, still withheld.
    pub(crate) fn pending_subject(&self) -> Option<Value> {
        match &*self.cell.state.borrow() {
            DeferredState::Pending { subject, .. } => subject.clone(),
            DeferredState::Resolved(_) => None,
        }
    }

    pub(crate) fn recorder(&self) -> Option<Rc<Recorder>> {
        match &*self.cell.state.borrow() {
            DeferredState::Pending { recorder, .. } => Some(Rc::clone(recorder)),
            DeferredState::Resolved(_) => None,
        }
    }

    pub(crate) fn require_recorder(&self) -> RuntimeResult<Rc<Recorder>> {
        self.recorder().ok_or_else(|| {
            RuntimeError::InternalError("unresolved placeholder without a recorder".to_string())
        })
    }

    pub(crate) fn cached(&self, name: &str) -> Option<Deferred> {
        match &*self.cell.state.borrow() {
            DeferredState::Pending { cache, .. } => cache.get(name).cloned(),
            DeferredState::Resolved(_) => None,
        }
    }

    pub(crate) fn cache_insert(&self, name: &str, child: Deferred) {
        if let DeferredState::Pending { cache, .. } = &mut *self.cell.state.borrow_mut() {
            cache.insert(name.to_string(), child);
        }
    }

    /// Shape-shift: swaps the pending delegate for the real subject. The
    /// cache and the recorder reference are dropped with the old state;
    /// resolution happens at most once.
    pub(crate) fn resolve(&self, subject: Value) -> RuntimeResult<()> {
        let mut state = self.cell.state.borrow_mut();
        match &*state {
            DeferredState::Resolved(_) => Err(RuntimeError::AlreadyResolved),
            DeferredState::Pending { .. } => {
                log::trace!("placeholder resolved to {}", subject.type_name());
                *state = DeferredState::Resolved(subject);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bookkeeping_members_are_access_denied() {
        let recorder = Recorder::new();
        let deferred = Deferred::pending(recorder, None);

        for name in ["subject", "resolved", "cache", "recorder", "ledger", "members"] {
            let err = deferred.member(name).unwrap_err();
            assert_eq!(
                err,
                RuntimeError::AccessDenied {
                    member: name.to_string()
                }
            );
        }
    }

    #[test]
    fn member_reads_are_cached_by_name() {
        let recorder = Recorder::new();
        let deferred = Deferred::pending(Rc::clone(&recorder), None);

        let first = deferred.member("a").unwrap();
        let second = deferred.member("a").unwrap();
        let other = deferred.member("b").unwrap();

        assert_eq!(first, second);
        assert!(first != other);
        // the cache hit did not append a second record
        assert_eq!(recorder.ledger_len(), 2);
    }

    #[test]
    fn resolution_is_monotonic() {
        let recorder = Recorder::new();
        let deferred = Deferred::pending(recorder, None);
        let view = CapabilityView::of(&deferred);

        view.resolve(Value::Integer(1)).unwrap();
        let err = view.resolve(Value::Integer(2)).unwrap_err();
        assert_eq!(err, RuntimeError::AlreadyResolved);
        assert_eq!(Value::Deferred(deferred.clone()), Value::Integer(1));
    }

    #[test]
    fn pending_display_is_an_opaque_marker() {
        let recorder = Recorder::new();
        let deferred = Deferred::pending(recorder, None);
        assert_eq!(deferred.to_string(), "#<deferred>");

        CapabilityView::of(&deferred)
            .resolve(Value::String("late".to_string()))
            .unwrap();
        assert_eq!(deferred.to_string(), "\"late\"");
    }
}
