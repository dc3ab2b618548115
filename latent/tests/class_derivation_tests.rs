// Deferring a class definition until its base class exists.

use latent::{derive_class, Arity, CallArgs, Function, Mimic, Stasis, Value};
use pretty_assertions::assert_eq;

fn storing_init() -> (String, Function) {
    (
        "init".to_string(),
        Function::native("init", Arity::Fixed(2), |args| {
            args.positional[0].set_member("thing", args.positional[1].clone())?;
            Ok(Value::Nil)
        }),
    )
}

#[test]
fn class_defined_on_a_husk_base_works_after_absorption() {
    let mut mimic = Mimic::new();
    let (husk, ticket) = mimic.husk();

    let derived = derive_class(
        "Doer",
        vec![husk.clone()],
        vec![(
            "do_the_thing".to_string(),
            Function::native("do_the_thing", Arity::Fixed(1), |args| {
                args.positional[0].member("thing")
            }),
        )],
    )
    .unwrap();
    assert!(matches!(derived, Value::Deferred(_)));

    let doer = derived
        .invoke(CallArgs::positional(vec![Value::String(
            "doing the thing".to_string(),
        )]))
        .unwrap();
    let dont_look_yet = doer
        .member("do_the_thing")
        .unwrap()
        .invoke(CallArgs::empty())
        .unwrap();
    assert!(matches!(dont_look_yet, Value::Deferred(_)));

    let base = derive_class("Base", vec![], vec![storing_init()]).unwrap();
    mimic.absorb(ticket).unwrap().resolve(base).unwrap();

    assert_eq!(dont_look_yet, Value::String("doing the thing".to_string()));
}

#[test]
fn derived_placeholder_class_poses_as_the_real_one() {
    let mut mimic = Mimic::new();
    let (husk, ticket) = mimic.husk();

    let derived = derive_class("Poser", vec![husk.clone()], vec![]).unwrap();
    let instance = derived.invoke(CallArgs::empty()).unwrap();

    let base = derive_class("Base", vec![], vec![]).unwrap();
    mimic.absorb(ticket).unwrap().resolve(base.clone()).unwrap();

    assert!(instance.is_instance_of(&derived).unwrap());
    assert!(instance.is_instance_of(&base).unwrap());
}

#[test]
fn suspended_class_instantiates_on_release() {
    let mut stasis = Stasis::new();
    let class = derive_class("Holder", vec![], vec![storing_init()]).unwrap();
    let (placeholder, ticket) = stasis.suspend(class);

    let held = placeholder
        .invoke(CallArgs::positional(vec![Value::String(
            "some param".to_string(),
        )]))
        .unwrap();
    let param = held.member("thing").unwrap();

    assert!(param != Value::String("some param".to_string()));
    stasis.release(ticket).unwrap();
    assert_eq!(param, Value::String("some param".to_string()));
}

#[test]
fn suspended_instance_method_call_collapses_on_release() {
    let class = derive_class(
        "Echo",
        vec![],
        vec![(
            "shout".to_string(),
            Function::native("shout", Arity::Fixed(2), |args| {
                match args.positional[1].concrete() {
                    Value::String(s) => Ok(Value::String(s.to_uppercase())),
                    other => Ok(Value::String(other.to_string())),
                }
            }),
        )],
    )
    .unwrap();

    let mut stasis = Stasis::new();
    let (placeholder, ticket) = stasis.suspend(class);

    let echo = placeholder.invoke(CallArgs::empty()).unwrap();
    let result = echo
        .member("shout")
        .unwrap()
        .invoke(CallArgs::positional(vec![Value::String(
            "quiet".to_string(),
        )]))
        .unwrap();

    assert!(result != Value::String("QUIET".to_string()));
    stasis.release(ticket).unwrap();
    assert_eq!(result, Value::String("QUIET".to_string()));
}
