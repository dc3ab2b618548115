// Property: the ledger replays method calls in exactly the order they were
// captured, reproducing the side effects of direct execution.

use std::cell::RefCell;
use std::rc::Rc;

use latent::{derive_class, Arity, CallArgs, Function, Stasis, Value};
use proptest::prelude::*;

const METHODS: [&str; 3] = ["ping", "pong", "pung"];

fn call_logger(log: Rc<RefCell<Vec<String>>>) -> Value {
    let body = METHODS
        .iter()
        .map(|&name| {
            let log = Rc::clone(&log);
            (
                name.to_string(),
                Function::native(name, Arity::Fixed(1), move |_| {
                    log.borrow_mut().push(name.to_string());
                    Ok(Value::Nil)
                }),
            )
        })
        .collect();
    let class = derive_class("Logger", vec![], body).unwrap();
    class.invoke(CallArgs::empty()).unwrap()
}

proptest! {
    #[test]
    fn replay_reproduces_call_order(
        indices in proptest::collection::vec(0usize..METHODS.len(), 1..24)
    ) {
        let recorded_log = Rc::new(RefCell::new(Vec::new()));
        let direct_log = Rc::new(RefCell::new(Vec::new()));

        let mut stasis = Stasis::new();
        let (placeholder, ticket) = stasis.suspend(call_logger(Rc::clone(&recorded_log)));
        let direct = call_logger(Rc::clone(&direct_log));

        for &index in &indices {
            let name = METHODS[index];
            placeholder.member(name).unwrap().invoke(CallArgs::empty()).unwrap();
            direct.member(name).unwrap().invoke(CallArgs::empty()).unwrap();
        }

        prop_assert!(recorded_log.borrow().is_empty());
        stasis.release(ticket).unwrap();
        prop_assert_eq!(&*recorded_log.borrow(), &*direct_log.borrow());
    }
}
