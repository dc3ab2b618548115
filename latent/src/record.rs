// The ordered operation ledger of one deferred world and its replay logic

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::deferred::{CapabilityView, Deferred};
use crate::error::{RuntimeError, RuntimeResult};
use crate::ops;
use crate::values::{CallArgs, Function, Op, Value};

/// The captured action, tagged by kind. Each variant carries exactly what
/// its replay step needs; there is no reflection anywhere in the dispatch.
#[derive(Debug, Clone)]
pub enum OpKind {
    MemberRead(String),
    Invoke,
    Operator {
        op: Op,
        /// The origin placeholder was the right operand.
        reflected: bool,
    },
    DeriveSubtype {
        name: String,
        bases: Vec<Value>,
        body: Vec<(String, Function)>,
    },
}

impl OpKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OpKind::MemberRead(_) => "member-read",
            OpKind::Invoke => "invoke",
            OpKind::Operator { .. } => "generic-operator",
            OpKind::DeriveSubtype { .. } => "derive-subtype",
        }
    }
}

/// One intercepted action: where it happened, what it was, the arguments
/// captured verbatim, and the placeholder handed back at capture time.
/// Immutable after creation; replay order equals creation order.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    origin: Deferred,
    kind: OpKind,
    args: CallArgs,
    continuation: Value,
}

impl OperationRecord {
    pub(crate) fn new(
        origin: Deferred,
        kind: OpKind,
        args: CallArgs,
        continuation: Value,
    ) -> OperationRecord {
        OperationRecord {
            origin,
            kind,
            args,
            continuation,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }

    /// Replays this action against the now-resolved origin subject, then
    /// resolves the continuation placeholder with the result.
    fn perform(&self) -> RuntimeResult<()> {
        let subject = CapabilityView::of(&self.origin).subject().ok_or_else(|| {
            RuntimeError::InternalError(
                "replay reached a record whose origin is still unresolved".to_string(),
            )
        })?;
        let result = match &self.kind {
            OpKind::Invoke => subject.invoke(self.args.clone())?,
            OpKind::MemberRead(name) => subject.member(name)?,
            OpKind::Operator { op, reflected } => {
                let operand = self.args.positional.first().cloned().ok_or_else(|| {
                    RuntimeError::InternalError("operator record without an operand".to_string())
                })?;
                if *reflected {
                    operand.apply(*op, &subject)?
                } else {
                    subject.apply(*op, &operand)?
                }
            }
            OpKind::DeriveSubtype { name, bases, body } => {
                ops::build_class(name, bases.clone(), body.clone())?
            }
        };
        if let Value::Deferred(continuation) = &self.continuation {
            let view = CapabilityView::of(continuation);
            if !view.is_resolved() {
                view.resolve(result)?;
            }
        }
        Ok(())
    }
}

/// One deferred world: the append-only ledger of captured operations and
/// every placeholder created under it.
pub struct Recorder {
    ledger: RefCell<Vec<OperationRecord>>,
    members: RefCell<Vec<Deferred>>,
    replayed: Cell<bool>,
}

impl Recorder {
    pub(crate) fn new() -> Rc<Recorder> {
        Rc::new(Recorder {
            ledger: RefCell::new(Vec::new()),
            members: RefCell::new(Vec::new()),
            replayed: Cell::new(false),
        })
    }

    pub(crate) fn register(&self, member: Deferred) {
        self.members.borrow_mut().push(member);
    }

    pub(crate) fn append(&self, record: OperationRecord) {
        log::debug!(
            "recorded {} (ledger length {})",
            record.kind_name(),
            self.ledger.borrow().len() + 1
        );
        self.ledger.borrow_mut().push(record);
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.borrow().len()
    }

    pub fn member_count(&self) -> usize {
        self.members.borrow().len()
    }

    /// Replays the ledger strictly in insertion order, each record exactly
    /// once, synchronously. Records appended while replaying are performed
    /// in the same pass. The first failure propagates immediately; records
    /// already performed stay applied. A second or re-entrant replay fails
    /// with `AlreadyReplayed`.
    pub(crate) fn replay(&self) -> RuntimeResult<()> {
        if self.replayed.replace(true) {
            return Err(RuntimeError::AlreadyReplayed);
        }
        log::debug!("replaying {} records", self.ledger.borrow().len());
        let mut index = 0;
        loop {
            let record = match self.ledger.borrow().get(index) {
                Some(record) => record.clone(),
                None => break,
            };
            record.perform()?;
            index += 1;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("records", &self.ledger.borrow().len())
            .field("members", &self.members.borrow().len())
            .field("replayed", &self.replayed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ledger_preserves_capture_order() {
        let recorder = Recorder::new();
        let root = Deferred::pending(Rc::clone(&recorder), Some(Value::Integer(3)));

        root.member("a").unwrap();
        root.invoke(CallArgs::empty()).unwrap();
        root.apply(Op::Add, &Value::Integer(4), false).unwrap();

        let ledger = recorder.ledger.borrow();
        let kinds: Vec<&str> = ledger.iter().map(|r| r.kind_name()).collect();
        assert_eq!(kinds, vec!["member-read", "invoke", "generic-operator"]);
    }

    #[test]
    fn replay_runs_exactly_once() {
        let recorder = Recorder::new();
        let root = Deferred::pending(Rc::clone(&recorder), Some(Value::Integer(3)));
        let sum = root.apply(Op::Add, &Value::Integer(4), false).unwrap();

        CapabilityView::of(&root).resolve(Value::Integer(3)).unwrap();
        recorder.replay().unwrap();
        assert_eq!(sum, Value::Integer(7));

        assert_eq!(recorder.replay().unwrap_err(), RuntimeError::AlreadyReplayed);
    }

    #[test]
    fn replay_failure_propagates_and_keeps_prior_effects() {
        let recorder = Recorder::new();
        let subject = Value::Map(
            [("known".to_string(), Value::Integer(1))]
                .into_iter()
                .collect(),
        );
        let root = Deferred::pending(Rc::clone(&recorder), None);

        let known = root.member("known").unwrap();
        root.member("missing").unwrap();

        CapabilityView::of(&root).resolve(subject).unwrap();
        let err = recorder.replay().unwrap_err();
        assert!(matches!(err, RuntimeError::MemberNotFound { .. }));
        // the record performed before the failure stays applied
        assert_eq!(known, Value::Integer(1));
    }
}
