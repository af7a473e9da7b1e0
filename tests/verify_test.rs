/**
End-to-end verification tests: registry → verifier → engine
*/
use std::rc::Rc;

use loomc::registry::{ContractDef, EnumDef, ShapeDef, VariantDef};
use loomc::verifier::Resolution;
use loomc::{
    verify, Body, BuildError, Effect, Instr, Literal, Object, Overload, Registry, Slot, SlotType,
};

fn call(name: &str) -> Instr {
    Instr::Call(name.to_string())
}

fn composed(inputs: Vec<Slot>, outputs: Vec<Slot>, body: Vec<Instr>) -> Overload {
    Overload::new(Effect::new(inputs, outputs), Body::Composed(body))
}

fn string_output(entry_body: Vec<Instr>) -> Overload {
    composed(vec![], vec![Slot::typed(SlotType::String)], entry_body)
}

/// A classify word whose overloads are separated by an exact literal, a
/// threshold predicate (at least 9000), and an unbounded fallback, in that
/// declaration order.
fn classify_registry() -> Registry {
    let mut registry = Registry::with_prelude();
    registry.define_word(
        "classify",
        composed(
            vec![Slot::refined(
                SlotType::UnsignedInt,
                loomc::Refinement::Literal(Literal::UnsignedInt(42)),
            )],
            vec![Slot::typed(SlotType::String)],
            vec![call("drop"), Instr::Push(Literal::String("exact".into()))],
        ),
    );
    registry.define_word(
        "classify",
        composed(
            vec![Slot::refined(
                SlotType::UnsignedInt,
                loomc::Refinement::Predicate(Rc::new(vec![
                    Instr::Push(Literal::UnsignedInt(8999)),
                    call(">"),
                ])),
            )],
            vec![Slot::typed(SlotType::String)],
            vec![call("drop"), Instr::Push(Literal::String("huge".into()))],
        ),
    );
    registry.define_word(
        "classify",
        composed(
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![Slot::typed(SlotType::String)],
            vec![call("drop"), Instr::Push(Literal::String("modest".into()))],
        ),
    );
    registry
}

#[test]
fn test_literal_refinement_selects_first_matching_overload() {
    let mut registry = classify_registry();
    registry.define_word(
        "main",
        string_output(vec![Instr::Push(Literal::UnsignedInt(42)), call("classify")]),
    );

    let program = verify(&registry).expect("program should verify");
    let plan = program.plan("main", 0, &[1]).expect("plan for the call site");
    assert_eq!(plan.resolution, Resolution::Static(0));

    let mut stack = program.run("main").expect("main should run");
    assert_eq!(stack.pop(), Ok(Object::String(Rc::new("exact".to_string()))));
}

#[test]
fn test_predicate_refinement_folds_against_known_literal() {
    let mut registry = classify_registry();
    registry.define_word(
        "main",
        string_output(vec![
            Instr::Push(Literal::UnsignedInt(9000)),
            call("classify"),
        ]),
    );

    let program = verify(&registry).expect("program should verify");
    assert_eq!(
        program.plan("main", 0, &[1]).unwrap().resolution,
        Resolution::Static(1)
    );
    let mut stack = program.run("main").unwrap();
    assert_eq!(stack.pop(), Ok(Object::String(Rc::new("huge".to_string()))));
}

#[test]
fn test_failed_predicate_falls_through_to_unbounded_overload() {
    let mut registry = classify_registry();
    registry.define_word(
        "main",
        string_output(vec![Instr::Push(Literal::UnsignedInt(5)), call("classify")]),
    );

    let program = verify(&registry).expect("program should verify");
    assert_eq!(
        program.plan("main", 0, &[1]).unwrap().resolution,
        Resolution::Static(2)
    );
    let mut stack = program.run("main").unwrap();
    assert_eq!(stack.pop(), Ok(Object::String(Rc::new("modest".to_string()))));
}

#[test]
fn test_statically_unknown_value_skips_bounded_overloads() {
    let mut registry = classify_registry();
    // blur launders the literal knowledge: its output is only a type
    registry.define_word(
        "blur",
        composed(
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![call("drop"), Instr::Push(Literal::UnsignedInt(0))],
        ),
    );
    registry.define_word(
        "main",
        string_output(vec![
            Instr::Push(Literal::UnsignedInt(42)),
            call("blur"),
            call("classify"),
        ]),
    );

    let program = verify(&registry).expect("program should verify");
    // 42 went in, but the bounded overloads cannot see through blur
    assert_eq!(
        program.plan("main", 0, &[2]).unwrap().resolution,
        Resolution::Static(2)
    );
}

#[test]
fn test_shape_field_refinements_match_constructed_knowledge() {
    let mut registry = Registry::with_prelude();
    registry.define_shape(ShapeDef {
        name: "Packet".to_string(),
        fields: vec![
            ("bar".to_string(), SlotType::UnsignedInt),
            ("baz".to_string(), SlotType::String),
        ],
        contracts: vec![],
    });
    registry.define_word(
        "inspect",
        composed(
            vec![Slot::refined(
                SlotType::Shape("Packet".to_string()),
                loomc::Refinement::Fields(vec![("bar".to_string(), Literal::UnsignedInt(42))]),
            )],
            vec![Slot::typed(SlotType::String)],
            vec![call("drop"), Instr::Push(Literal::String("answer packet".into()))],
        ),
    );
    registry.define_word(
        "inspect",
        composed(
            vec![Slot::refined(
                SlotType::Shape("Packet".to_string()),
                loomc::Refinement::Fields(vec![
                    ("bar".to_string(), Literal::UnsignedInt(420)),
                    ("baz".to_string(), Literal::String("loljk".to_string())),
                ]),
            )],
            vec![Slot::typed(SlotType::String)],
            vec![call("drop"), Instr::Push(Literal::String("joke packet".into()))],
        ),
    );
    registry.define_word(
        "inspect",
        composed(
            vec![Slot::typed(SlotType::Shape("Packet".to_string()))],
            vec![Slot::typed(SlotType::String)],
            vec![call("drop"), Instr::Push(Literal::String("plain packet".into()))],
        ),
    );
    let entry = |bar: u64, baz: &str| {
        string_output(vec![
            Instr::Push(Literal::UnsignedInt(bar)),
            Instr::Push(Literal::String(baz.to_string())),
            call("Packet"),
            call("inspect"),
        ])
    };
    registry.define_word("probe_answer", entry(42, "whatever"));
    registry.define_word("probe_joke", entry(420, "loljk"));
    registry.define_word("probe_plain", entry(420, "serious"));

    let program = verify(&registry).expect("program should verify");
    for (word, overload, result) in [
        ("probe_answer", 0, "answer packet"),
        ("probe_joke", 1, "joke packet"),
        ("probe_plain", 2, "plain packet"),
    ] {
        assert_eq!(
            program.plan(word, 0, &[3]).unwrap().resolution,
            Resolution::Static(overload)
        );
        let mut stack = program.run(word).unwrap();
        assert_eq!(stack.pop(), Ok(Object::String(Rc::new(result.to_string()))));
    }
}

fn size_registry(cover_large: bool) -> Registry {
    let mut registry = Registry::with_prelude();
    registry.define_enum(EnumDef {
        name: "Size".to_string(),
        variants: vec![
            VariantDef {
                name: "Small".to_string(),
                payload: None,
            },
            VariantDef {
                name: "Large".to_string(),
                payload: None,
            },
        ],
    });
    registry.define_word(
        "pick",
        composed(
            vec![Slot::refined(
                SlotType::Enum("Size".to_string()),
                loomc::Refinement::Variant("Small".to_string()),
            )],
            vec![Slot::typed(SlotType::String)],
            vec![call("drop"), Instr::Push(Literal::String("small".into()))],
        ),
    );
    if cover_large {
        registry.define_word(
            "pick",
            composed(
                vec![Slot::refined(
                    SlotType::Enum("Size".to_string()),
                    loomc::Refinement::Variant("Large".to_string()),
                )],
                vec![Slot::typed(SlotType::String)],
                vec![call("drop"), Instr::Push(Literal::String("large".into()))],
            ),
        );
    }
    // describe sees a Size of unknown variant
    registry.define_word(
        "describe",
        composed(
            vec![Slot::typed(SlotType::Enum("Size".to_string()))],
            vec![Slot::typed(SlotType::String)],
            vec![call("pick")],
        ),
    );
    registry
}

#[test]
fn test_uncovered_variant_fails_the_build() {
    let registry = size_registry(false);
    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::NonExhaustiveMatch { word, callee, missing, .. }
            if word == "describe" && callee == "pick" && missing == &vec!["Large".to_string()]
    )));
}

#[test]
fn test_covered_variants_dispatch_at_runtime() {
    let mut registry = size_registry(true);
    registry.define_word(
        "main",
        string_output(vec![call("Size.Large"), call("describe")]),
    );

    let program = verify(&registry).expect("program should verify");
    match &program.plan("describe", 0, &[0]).unwrap().resolution {
        Resolution::ByVariant(table) => {
            assert_eq!(table.get("Small"), Some(&0));
            assert_eq!(table.get("Large"), Some(&1));
        }
        other => panic!("expected variant dispatch, got {:?}", other),
    }

    let mut stack = program.run("main").unwrap();
    assert_eq!(stack.pop(), Ok(Object::String(Rc::new("large".to_string()))));
}

#[test]
fn test_variant_dispatch_preserves_surviving_value() {
    let mut registry = Registry::with_prelude();
    registry.define_enum(EnumDef {
        name: "Flag".to_string(),
        variants: vec![
            VariantDef {
                name: "On".to_string(),
                payload: None,
            },
            VariantDef {
                name: "Off".to_string(),
                payload: None,
            },
        ],
    });
    // strip ( x Flag::On -- x ) / ( x Flag::Off -- x ): both branches carry
    // x through and discard the flag
    for variant in ["On", "Off"] {
        registry.define_word(
            "strip",
            composed(
                vec![
                    Slot::generic("x"),
                    Slot::refined(
                        SlotType::Enum("Flag".to_string()),
                        loomc::Refinement::Variant(variant.to_string()),
                    ),
                ],
                vec![Slot::generic("x")],
                vec![call("drop")],
            ),
        );
    }
    // keep sees a Flag of unknown variant, so strip dispatches by variant;
    // x must still count as the surviving input value
    registry.define_word(
        "keep",
        composed(
            vec![
                Slot::generic("x"),
                Slot::typed(SlotType::Enum("Flag".to_string())),
            ],
            vec![Slot::generic("x")],
            vec![call("strip")],
        ),
    );
    registry.define_word(
        "main",
        composed(
            vec![],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![
                Instr::Push(Literal::UnsignedInt(42)),
                call("Flag.On"),
                call("keep"),
            ],
        ),
    );

    let program = verify(&registry).expect("program should verify");
    assert!(matches!(
        program.plan("keep", 0, &[0]).unwrap().resolution,
        Resolution::ByVariant(_)
    ));
    let mut stack = program.run("main").unwrap();
    assert_eq!(stack.pop(), Ok(Object::UnsignedInt(42)));
}

#[test]
fn test_variant_branches_must_agree_on_surviving_inputs() {
    let mut registry = Registry::with_prelude();
    registry.define_enum(EnumDef {
        name: "Flag".to_string(),
        variants: vec![
            VariantDef {
                name: "On".to_string(),
                payload: None,
            },
            VariantDef {
                name: "Off".to_string(),
                payload: None,
            },
        ],
    });
    // one branch keeps x, the other replaces it
    registry.define_word(
        "strip",
        composed(
            vec![
                Slot::typed(SlotType::UnsignedInt).with_tag("x"),
                Slot::refined(
                    SlotType::Enum("Flag".to_string()),
                    loomc::Refinement::Variant("On".to_string()),
                ),
            ],
            vec![Slot::typed(SlotType::UnsignedInt).with_tag("x")],
            vec![call("drop")],
        ),
    );
    registry.define_word(
        "strip",
        composed(
            vec![
                Slot::typed(SlotType::UnsignedInt),
                Slot::refined(
                    SlotType::Enum("Flag".to_string()),
                    loomc::Refinement::Variant("Off".to_string()),
                ),
            ],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![call("drop"), call("drop"), Instr::Push(Literal::UnsignedInt(0))],
        ),
    );
    registry.define_word(
        "keep",
        composed(
            vec![
                Slot::typed(SlotType::UnsignedInt).with_tag("x"),
                Slot::typed(SlotType::Enum("Flag".to_string())),
            ],
            vec![Slot::typed(SlotType::UnsignedInt).with_tag("x")],
            vec![call("strip")],
        ),
    );

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::TypeMismatch { word, context, .. }
            if word == "keep" && context.contains("variant dispatch branches")
    )));
}

#[test]
fn test_variant_branches_must_agree_on_outputs() {
    let mut registry = Registry::with_prelude();
    registry.define_enum(EnumDef {
        name: "Coin".to_string(),
        variants: vec![
            VariantDef {
                name: "Heads".to_string(),
                payload: None,
            },
            VariantDef {
                name: "Tails".to_string(),
                payload: None,
            },
        ],
    });
    registry.define_word(
        "flip",
        composed(
            vec![Slot::refined(
                SlotType::Enum("Coin".to_string()),
                loomc::Refinement::Variant("Heads".to_string()),
            )],
            vec![Slot::typed(SlotType::String)],
            vec![call("drop"), Instr::Push(Literal::String("heads".into()))],
        ),
    );
    registry.define_word(
        "flip",
        composed(
            vec![Slot::refined(
                SlotType::Enum("Coin".to_string()),
                loomc::Refinement::Variant("Tails".to_string()),
            )],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![call("drop"), Instr::Push(Literal::UnsignedInt(1))],
        ),
    );
    registry.define_word(
        "play",
        composed(
            vec![Slot::typed(SlotType::Enum("Coin".to_string()))],
            vec![Slot::typed(SlotType::String)],
            vec![call("flip")],
        ),
    );

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::TypeMismatch { word, context, .. }
            if word == "play" && context.contains("variant dispatch branches")
    )));
}

#[test]
fn test_affine_underflow_at_the_call_site() {
    let mut registry = Registry::with_prelude();
    registry.define_word(
        "burn2",
        composed(
            vec![Slot::generic("a").with_affine(2), Slot::generic("a")],
            vec![],
            vec![call("drop"), call("drop")],
        ),
    );
    registry.define_word(
        "bad",
        composed(
            vec![Slot::generic("a"), Slot::generic("b")],
            vec![],
            vec![call("burn2")],
        ),
    );

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::AffineUnderflow { word, callee, required: 2, found: 1, .. }
            if word == "bad" && callee == "burn2"
    )));
}

#[test]
fn test_duplicated_value_satisfies_affine_requirement() {
    let mut registry = Registry::with_prelude();
    registry.define_word(
        "burn2",
        composed(
            vec![Slot::generic("a").with_affine(2), Slot::generic("a")],
            vec![],
            vec![call("drop"), call("drop")],
        ),
    );
    registry.define_word(
        "good",
        composed(
            vec![Slot::generic("a")],
            vec![],
            vec![call("dup"), call("burn2")],
        ),
    );

    assert!(verify(&registry).is_ok());
}

#[test]
fn test_surplus_live_binding_is_a_leak() {
    let mut registry = Registry::with_prelude();
    registry.define_word(
        "leak",
        composed(
            vec![Slot::generic("a")],
            vec![Slot::generic("a")],
            vec![call("dup")],
        ),
    );

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::AffineLeak { word, tag, live: 2, declared: 1, .. }
            if word == "leak" && tag == "a"
    )));
}

#[test]
fn test_output_tag_requires_the_input_value_to_survive() {
    let mut registry = Registry::with_prelude();
    registry.define_word(
        "impostor",
        composed(
            vec![Slot::generic("a")],
            vec![Slot::generic("a")],
            vec![call("drop"), Instr::Push(Literal::UnsignedInt(5))],
        ),
    );

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::TypeMismatch { word, context, .. }
            if word == "impostor" && context.contains("output binding")
    )));
}

#[test]
fn test_unknown_word_fails_the_build() {
    let mut registry = Registry::with_prelude();
    registry.define_word("broken", string_output(vec![call("nonesuch")]));

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::UnknownWord { word, callee, .. }
            if word == "broken" && callee == "nonesuch"
    )));
}

#[test]
fn test_identical_overloads_are_ambiguous() {
    let mut registry = Registry::with_prelude();
    for _ in 0..2 {
        registry.define_word(
            "twin",
            composed(
                vec![Slot::typed(SlotType::UnsignedInt)],
                vec![Slot::typed(SlotType::UnsignedInt)],
                vec![],
            ),
        );
    }

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::AmbiguousOverload { word, first: 0, second: 1, .. } if word == "twin"
    )));
}

#[test]
fn test_call_with_too_few_values_is_a_build_underflow() {
    let mut registry = Registry::with_prelude();
    registry.define_word(
        "halfsum",
        composed(
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![call("+")],
        ),
    );

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::StackUnderflow { word, callee, required: 2, available: 1, .. }
            if word == "halfsum" && callee == "+"
    )));
}

#[test]
fn test_block_conformance_and_application() {
    let mut registry = Registry::with_prelude();
    registry.define_word(
        "bump",
        composed(
            vec![],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![
                Instr::Push(Literal::UnsignedInt(41)),
                Instr::Block(Rc::new(vec![Instr::Push(Literal::UnsignedInt(1)), call("+")])),
                call("apply"),
            ],
        ),
    );
    registry.define_word(
        "main",
        composed(vec![], vec![Slot::typed(SlotType::UnsignedInt)], vec![call("bump")]),
    );

    let program = verify(&registry).expect("program should verify");
    let mut stack = program.run("main").unwrap();
    assert_eq!(stack.pop(), Ok(Object::UnsignedInt(42)));
}

#[test]
fn test_non_conforming_block_fails_the_build() {
    let mut registry = Registry::with_prelude();
    // the block produces two values where ( a -- b ) requires one
    registry.define_word(
        "bad_bump",
        composed(
            vec![],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![
                Instr::Push(Literal::UnsignedInt(41)),
                Instr::Block(Rc::new(vec![Instr::Push(Literal::UnsignedInt(1))])),
                call("apply"),
            ],
        ),
    );

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::TypeMismatch { word, context, .. }
            if word == "bad_bump" && context == "block effect"
    )));
}

#[test]
fn test_claimed_contract_requires_a_matching_word() {
    let mut registry = Registry::with_prelude();
    registry.define_contract(ContractDef {
        name: "Measured".to_string(),
        word: "measure".to_string(),
        effect: Effect::new(
            vec![Slot::typed(SlotType::SelfShape)],
            vec![Slot::typed(SlotType::UnsignedInt)],
        ),
    });
    registry.define_shape(ShapeDef {
        name: "Crate".to_string(),
        fields: vec![("weight".to_string(), SlotType::UnsignedInt)],
        contracts: vec!["Measured".to_string()],
    });

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::ContractUnsatisfied { shape, contract, word, .. }
            if shape == "Crate" && contract == "Measured" && word == "measure"
    )));

    // providing measure ( Crate -- UnsignedInt ) satisfies the claim
    registry.define_word(
        "measure",
        composed(
            vec![Slot::typed(SlotType::Shape("Crate".to_string()))],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![call("drop"), Instr::Push(Literal::UnsignedInt(12))],
        ),
    );
    registry.define_word(
        "main",
        composed(
            vec![],
            vec![Slot::typed(SlotType::UnsignedInt)],
            vec![
                Instr::Push(Literal::UnsignedInt(12)),
                call("Crate"),
                call("measure"),
            ],
        ),
    );
    let program = verify(&registry).expect("program should verify");
    let mut stack = program.run("main").unwrap();
    assert_eq!(stack.pop(), Ok(Object::UnsignedInt(12)));
}

#[test]
fn test_claiming_an_unknown_contract_fails_the_build() {
    let mut registry = Registry::with_prelude();
    registry.define_shape(ShapeDef {
        name: "Crate".to_string(),
        fields: vec![("weight".to_string(), SlotType::UnsignedInt)],
        contracts: vec!["Nonesuch".to_string()],
    });

    let errors = verify(&registry).err().expect("verification should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        BuildError::UnknownContract { shape, contract }
            if shape == "Crate" && contract == "Nonesuch"
    )));
}

#[test]
fn test_run_requires_a_nullary_entry() {
    let registry = classify_registry();
    let program = verify(&registry).expect("program should verify");
    assert!(matches!(
        program.run("classify"),
        Err(loomc::RuntimeError::UndefinedEntry { .. })
    ));
    assert!(matches!(
        program.run("nonesuch"),
        Err(loomc::RuntimeError::UndefinedEntry { .. })
    ));
}
