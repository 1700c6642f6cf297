use progs_vm::vm::types::{EntityId, StringIndex};
use progs_vm::{AssemblySource, VmConfig, Value, VMError, VM};

fn assemble(source: &str) -> Vec<u8> {
    AssemblySource::from_json(source)
        .expect("valid assembly json")
        .assemble()
        .expect("assembles")
        .to_bytes()
}

fn load(source: &str, config: VmConfig) -> VM {
    VM::load(&assemble(source), 8, 256, config).expect("module loads")
}

const FACTORIAL: &str = r#"{
    "globals": [
        {"name": "one", "value": {"type": "float", "value": 1}},
        {"name": "n", "value": {"type": "float", "value": 5}}
    ],
    "functions": [
        {
            "name": "fact",
            "file": "math.qc",
            "params": [{"name": "x", "type": "float"}],
            "locals": [{"name": "t", "type": "float"}],
            "statements": [
                ["le.f", "x", "one", "t"],
                ["ifnot", "t", 3],
                ["store.f", "one", "return"],
                ["return", "return"],
                ["sub.f", "x", "one", "parm0"],
                ["call1", "fact"],
                ["mul.f", "x", "return", "t"],
                ["return", "t"]
            ]
        },
        {
            "name": "main",
            "file": "main.qc",
            "statements": [["store.f", "n", "parm0"], ["call1", "fact"], ["return", "return"]]
        }
    ]
}"#;

#[test]
fn test_recursion_restores_caller_locals() {
    let mut vm = load(FACTORIAL, VmConfig::default());
    vm.execute_by_name("main").unwrap();

    assert_eq!(vm.result_float().unwrap(), 120.0);
    assert_eq!(vm.call_depth(), 0);
    // The top-level call saved the untouched region and put it back.
    assert_eq!(vm.global_value("x").unwrap(), Value::Float(0.0));
    assert_eq!(vm.global_value("t").unwrap(), Value::Float(0.0));
}

#[test]
fn test_profile_and_trace() {
    let mut vm = load(FACTORIAL, VmConfig::default());
    vm.set_trace(true);
    vm.execute_by_name("main").unwrap();

    let report = vm.profile_report(2);
    assert_eq!(report[0].function, "fact");
    assert_eq!(report[0].file, "math.qc");
    assert_eq!(report[1].function, "main");
    assert_eq!(report[1].statements, 3);

    let lines = vm.trace_lines();
    assert!(lines[0].contains("store.f"));
    assert!(lines.iter().any(|line| line.contains("call1")));
}

#[test]
fn test_variadic_arguments_are_wired() {
    let source = r#"{
        "globals": [
            {"name": "a", "value": {"type": "float", "value": 1}},
            {"name": "b", "value": {"type": "float", "value": 2}},
            {"name": "c", "value": {"type": "float", "value": 3}},
            {"name": "seen_first", "value": {"type": "float", "value": 0}},
            {"name": "seen_argc", "value": {"type": "integer", "value": 0}},
            {"name": "seen_a", "value": {"type": "float", "value": 0}},
            {"name": "seen_b", "value": {"type": "float", "value": 0}}
        ],
        "functions": [
            {
                "name": "collect",
                "variadic": true,
                "params": [{"name": "first", "type": "float"}],
                "statements": [
                    ["store.f", "first", "seen_first"],
                    ["store.i", "argc", "seen_argc"],
                    ["loadbi.f", "argv", 0, "seen_a"],
                    ["loadbi.f", "argv", 3, "seen_b"],
                    ["return", 0]
                ]
            },
            {
                "name": "main",
                "statements": [
                    ["store.f", "a", "parm0"],
                    ["store.f", "b", "parm1"],
                    ["store.f", "c", "parm2"],
                    ["call3", "collect"]
                ]
            }
        ]
    }"#;
    let mut vm = load(source, VmConfig::default());
    vm.execute_by_name("main").unwrap();

    assert_eq!(vm.global_value("seen_first").unwrap(), Value::Float(1.0));
    assert_eq!(vm.global_value("seen_argc").unwrap(), Value::Integer(2));
    assert_eq!(vm.global_value("seen_a").unwrap(), Value::Float(2.0));
    assert_eq!(vm.global_value("seen_b").unwrap(), Value::Float(3.0));
}

const COUNTER: &str = r#"{
    "globals": [
        {"name": "one", "value": {"type": "float", "value": 1}},
        {"name": "limit", "value": {"type": "float", "value": 500}},
        {"name": "i", "value": {"type": "float", "value": 0}},
        {"name": "t", "value": {"type": "float", "value": 0}}
    ],
    "functions": [
        {
            "name": "count",
            "statements": [
                ["add.f", "i", "one", "i"],
                ["lt.f", "i", "limit", "t"],
                ["if", "t", -2],
                ["return", "i"]
            ]
        },
        {"name": "spin", "statements": [["goto", 0]]}
    ]
}"#;

#[test]
fn test_runaway_budget() {
    let config = VmConfig {
        runaway_budget: 100,
        ..VmConfig::default()
    };
    let mut vm = load(COUNTER, config.clone());
    let err = vm.execute_by_name("spin").unwrap_err();
    assert_eq!(err.kind, VMError::RunawayLoop(100));
    assert_eq!(err.function, "spin");
    assert_eq!(vm.call_depth(), 0);

    let err = vm.execute_by_name("count").unwrap_err();
    assert_eq!(err.kind, VMError::RunawayLoop(100));

    let unlimited = VmConfig {
        no_exec_limit: true,
        ..config
    };
    let mut vm = load(COUNTER, unlimited);
    vm.execute_by_name("count").unwrap();
    assert_eq!(vm.result_float().unwrap(), 500.0);
}

#[test]
fn test_call_stack_overflow_unwinds() {
    let source = r#"{"functions": [{"name": "deep", "statements": [["call0", "deep"]]}]}"#;
    let config = VmConfig {
        max_stack_depth: 16,
        ..VmConfig::default()
    };
    let mut vm = load(source, config);
    let err = vm.execute_by_name("deep").unwrap_err();
    assert_eq!(err.kind, VMError::StackOverflow { limit: 16 });
    assert_eq!(err.backtrace.len(), 16);
    assert_eq!(vm.call_depth(), 0);

    // The VM stays usable after a fault.
    let err = vm.execute_by_name("deep").unwrap_err();
    assert_eq!(err.kind, VMError::StackOverflow { limit: 16 });
}

#[test]
fn test_locals_overflow() {
    let source = r#"{"functions": [{
        "name": "wide",
        "locals": [
            {"name": "v1", "type": "vector"},
            {"name": "v2", "type": "vector"}
        ],
        "statements": [["return", 0]]
    }]}"#;
    let config = VmConfig {
        locals_stack_size: 4,
        ..VmConfig::default()
    };
    let mut vm = load(source, config);
    let err = vm.execute_by_name("wide").unwrap_err();
    assert_eq!(
        err.kind,
        VMError::LocalsOverflow {
            needed: 6,
            available: 4
        }
    );
}

#[test]
fn test_null_and_bad_function_calls() {
    let source = r#"{
        "globals": [
            {"name": "nothing", "value": {"type": "function", "value": 0}},
            {"name": "bogus", "value": {"type": "function", "value": 99}}
        ],
        "functions": [
            {"name": "call_null", "statements": [["call0", "nothing"]]},
            {"name": "call_bogus", "statements": [["call0", "bogus"]]}
        ]
    }"#;
    let mut vm = load(source, VmConfig::default());
    assert_eq!(
        vm.execute_by_name("call_null").unwrap_err().kind,
        VMError::NullFunction
    );
    assert_eq!(
        vm.execute_by_name("call_bogus").unwrap_err().kind,
        VMError::BadFunction(99)
    );
}

#[test]
fn test_builtin_can_reenter_the_interpreter() {
    let source = r#"{
        "globals": [
            {"name": "one", "value": {"type": "float", "value": 1}},
            {"name": "counter", "value": {"type": "float", "value": 0}}
        ],
        "functions": [
            {"name": "twice", "builtin": 1},
            {"name": "bump", "statements": [["add.f", "counter", "one", "counter"]]},
            {"name": "main", "statements": [["call0", "twice"], ["return", "counter"]]}
        ]
    }"#;
    let mut vm = load(source, VmConfig::default());
    vm.register_builtin(1, "twice", |vm| {
        for _ in 0..2 {
            vm.execute_by_name("bump")
                .map_err(|err| VMError::Builtin(err.to_string()))?;
        }
        Ok(())
    });

    vm.execute_by_name("main").unwrap();
    assert_eq!(vm.result_float().unwrap(), 2.0);
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn test_builtin_errors_carry_location() {
    let source = r#"{
        "functions": [
            {"name": "fail", "builtin": 4},
            {"name": "main", "file": "main.qc", "statements": [["call0", "fail"]]}
        ]
    }"#;
    let mut vm = load(source, VmConfig::default());
    vm.register_builtin(4, "fail", |_| Err(VMError::Builtin("no".into())));

    let err = vm.execute_by_name("main").unwrap_err();
    assert_eq!(err.kind, VMError::Builtin("no".into()));
    assert_eq!(err.function, "main");
    assert_eq!(err.file, "main.qc");
    assert!(err.disassembly.unwrap().contains("call0 fail"));
}

const THINKER: &str = r#"{
    "fields": [
        {"name": "nextthink", "type": "float"},
        {"name": "frame", "type": "float"},
        {"name": "think", "type": "function"}
    ],
    "globals": [
        {"name": "self", "value": {"type": "entity", "value": 1}},
        {"name": "time", "value": {"type": "float", "value": 10}},
        {"name": "framenum", "value": {"type": "float", "value": 7}}
    ],
    "functions": [
        {"name": "main", "statements": [["state", "framenum", "main"]]}
    ]
}"#;

#[test]
fn test_state_schedules_next_think() {
    let mut vm = load(THINKER, VmConfig::default());
    vm.execute_by_name("main").unwrap();
    let main = vm.find_function("main").unwrap();

    assert_eq!(
        vm.read_entity_field(EntityId(1), "nextthink").unwrap(),
        Value::Float(10.0f32 + 0.1f32)
    );
    assert_eq!(
        vm.read_entity_field(EntityId(1), "frame").unwrap(),
        Value::Float(7.0)
    );
    assert_eq!(
        vm.read_entity_field(EntityId(1), "think").unwrap(),
        Value::Function(main)
    );
}

#[test]
fn test_state_without_bindings() {
    let source = THINKER.replace(r#""name": "time""#, r#""name": "clock""#);
    let mut vm = load(&source, VmConfig::default());
    let err = vm.execute_by_name("main").unwrap_err();
    assert_eq!(err.kind, VMError::MissingBinding("time"));
}

#[test]
fn test_string_operations() {
    let source = r#"{
        "globals": [
            {"name": "s1", "string": "foo"},
            {"name": "s2", "string": "bar"},
            {"name": "s3", "string": "foobar"},
            {"name": "empty", "string": ""},
            {"name": "joined", "string": ""},
            {"name": "same", "value": {"type": "integer", "value": 0}},
            {"name": "is_empty", "value": {"type": "integer", "value": 0}},
            {"name": "before", "value": {"type": "integer", "value": 0}}
        ],
        "functions": [{
            "name": "main",
            "statements": [
                ["add.s", "s1", "s2", "joined"],
                ["eq.s", "joined", "s3", "same"],
                ["not.s", "empty", 0, "is_empty"],
                ["lt.s", "s2", "s1", "before"]
            ]
        }]
    }"#;
    let mut vm = load(source, VmConfig::default());
    vm.execute_by_name("main").unwrap();

    assert_eq!(vm.global_value("same").unwrap(), Value::Integer(1));
    assert_eq!(vm.global_value("is_empty").unwrap(), Value::Integer(1));
    assert_eq!(vm.global_value("before").unwrap(), Value::Integer(1));
    let joined = match vm.global_value("joined").unwrap() {
        Value::String(index) => index,
        other => panic!("unexpected {:?}", other),
    };
    assert!(joined.is_temp());
    assert_eq!(vm.string(joined).unwrap(), "foobar");

    vm.clear_temp_strings();
    assert!(vm.string(joined).is_err());
    assert_eq!(vm.string(StringIndex(0)).unwrap(), "");
}

#[test]
fn test_temp_strings_do_not_accumulate_across_runs() {
    let source = r#"{
        "globals": [
            {"name": "name", "string": ""},
            {"name": "suffix", "string": "!"},
            {"name": "joined", "string": ""}
        ],
        "functions": [{
            "name": "think",
            "statements": [["add.s", "name", "suffix", "joined"]]
        }]
    }"#;
    let mut vm = load(source, VmConfig::default());

    for frame in 0..1000 {
        let name = vm.set_temp_string(format!("ent{}", frame));
        vm.set_global("name", Value::String(name)).unwrap();
        vm.execute_by_name("think").unwrap();

        let joined = match vm.global_value("joined").unwrap() {
            Value::String(index) => index,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(vm.string(joined).unwrap(), format!("ent{}!", frame));
        assert!(vm.temp_string_count() <= 2);
    }
}

#[test]
fn test_deadbeef_poisons_locals() {
    let source = r#"{
        "globals": [{"name": "seen", "value": {"type": "integer", "value": 0}}],
        "functions": [{
            "name": "main",
            "locals": [{"name": "scratch", "type": "integer"}],
            "statements": [["store.i", "scratch", "seen"]]
        }]
    }"#;
    let config = VmConfig {
        deadbeef_locals: true,
        ..VmConfig::default()
    };
    let mut vm = load(source, config);
    vm.execute_by_name("main").unwrap();
    assert_eq!(
        vm.global_value("seen").unwrap(),
        Value::Integer(0xdead_beefu32 as i32)
    );
    assert_eq!(vm.global_value("scratch").unwrap(), Value::Integer(0));
}

const POINTERS: &str = r#"{
    "fields": [{"name": "health", "type": "float"}],
    "globals": [
        {"name": "world", "value": {"type": "entity", "value": 0}},
        {"name": "player", "value": {"type": "entity", "value": 2}},
        {"name": "ptr", "value": {"type": "pointer", "value": 0}},
        {"name": "hp", "value": {"type": "float", "value": 75}},
        {"name": "out", "value": {"type": "float", "value": 0}},
        {"name": "target", "value": {"type": "integer", "value": 999}}
    ],
    "functions": [
        {
            "name": "hurt",
            "statements": [
                ["address", "player", "health", "ptr"],
                ["storep.f", "hp", "ptr"],
                ["load.f", "player", "health", "out"]
            ]
        },
        {"name": "world_write", "statements": [["address", "world", "health", "ptr"]]},
        {"name": "wild_jump", "statements": [["jump", "target"]]}
    ]
}"#;

#[test]
fn test_entity_pointers() {
    let mut vm = load(POINTERS, VmConfig::default());
    vm.execute_by_name("hurt").unwrap();
    assert_eq!(vm.global_value("out").unwrap(), Value::Float(75.0));
    assert_eq!(
        vm.read_entity_field(EntityId(2), "health").unwrap(),
        Value::Float(75.0)
    );
}

#[test]
fn test_world_assignment_and_jump_bounds() {
    let checked = VmConfig {
        bounds_check: true,
        ..VmConfig::default()
    };
    let mut vm = load(POINTERS, checked.clone());
    assert_eq!(
        vm.execute_by_name("world_write").unwrap_err().kind,
        VMError::WorldAssignment
    );
    assert_eq!(
        vm.execute_by_name("wild_jump").unwrap_err().kind,
        VMError::InvalidJump(999)
    );

    let lenient = VmConfig {
        null_bad: false,
        ..checked
    };
    let mut vm = load(POINTERS, lenient);
    vm.execute_by_name("world_write").unwrap();

    let mut vm = load(POINTERS, VmConfig::default());
    assert_eq!(
        vm.execute_by_name("wild_jump").unwrap_err().kind,
        VMError::InvalidStatement(999)
    );
}
