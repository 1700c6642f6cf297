use progs_vm::vm::opcodes::{lookup, Opcode, OpcodeDef};
use progs_vm::vm::types::{EType, Statement, PROG_ID_VERSION, PROG_VERSION};
use progs_vm::vm::{load, validate, Module};
use progs_vm::{AssemblySource, ModuleBuilder, VmConfig, Value, VM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A module with a handful of globals and one function holding `body`.
fn random_module(rng: &mut StdRng, version: u32, body: &[Statement]) -> Vec<u8> {
    let mut builder = ModuleBuilder::new();
    builder.set_version(version);
    builder.add_field("health", EType::Float);
    for n in 0..12 {
        builder.add_global(&format!("g{}", n), Value::Float(rng.gen_range(-4.0..4.0)));
    }
    let first = builder.push_statements(body);
    builder.add_function("main", "fuzz.qc", first, 0, &[], 0);
    builder.to_bytes()
}

fn random_statement(rng: &mut StdRng, globals: u16) -> Statement {
    let op = if rng.gen_bool(0.05) {
        rng.gen_range(200..=u16::MAX)
    } else {
        Opcode::ALL[rng.gen_range(0..Opcode::ALL.len())] as u16
    };
    let mut operand = || {
        if rng.gen_bool(0.1) {
            rng.gen::<u16>()
        } else {
            rng.gen_range(0..globals + 4)
        }
    };
    Statement::new(op, operand(), operand(), operand())
}

/// Words the interpreter touches for each operand slot of `st`, as
/// `(operand, width)` pairs. Branch offsets and short immediates are left out.
fn addressed_words(def: &OpcodeDef, st: &Statement) -> Vec<(u16, u32)> {
    let width = |etype: EType| match etype {
        EType::Void | EType::Short => None,
        other => Some(other.word_count()),
    };
    let slots = match def.opcode {
        Opcode::Goto => vec![],
        op if op.is_conditional_branch() => vec![(st.a, width(def.type_a))],
        Opcode::Done | Opcode::Return => vec![(st.a, Some(3))],
        _ => vec![
            (st.a, width(def.type_a)),
            (st.b, width(def.type_b)),
            (st.c, width(def.type_c)),
        ],
    };
    slots
        .into_iter()
        .filter_map(|(operand, width)| width.map(|width| (operand, width)))
        .collect()
}

fn operands_in_range(module: &Module, index: usize, st: &Statement) -> bool {
    let def = match lookup(st.op) {
        Some(def) => def,
        None => return false,
    };
    if !def.allowed_in(module.version()) {
        return false;
    }
    let lands = |offset: i16| {
        let target = index as i64 + offset as i64;
        target >= 0 && target < module.statements.len() as i64
    };
    let branches = match def.opcode {
        Opcode::Goto => lands(st.a_short()),
        op if op.is_conditional_branch() => lands(st.b_short()),
        _ => true,
    };
    branches
        && addressed_words(def, st)
            .iter()
            .all(|&(operand, width)| operand as u32 + width <= module.header.num_globals)
}

#[test]
fn test_validated_modules_have_sound_operands() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut accepted = 0;

    for round in 0..400 {
        let version = if round % 4 == 0 {
            PROG_ID_VERSION
        } else {
            PROG_VERSION
        };
        let len = rng.gen_range(1..6);
        let probe = load(&random_module(&mut rng, version, &[]), 1, 0).unwrap();
        let globals = probe.header.num_globals as u16;
        let body: Vec<Statement> = (0..len).map(|_| random_statement(&mut rng, globals)).collect();
        let module = load(&random_module(&mut rng, version, &body), 1, 0).unwrap();

        if validate(&module).is_ok() {
            accepted += 1;
            for (index, st) in module.statements.iter().enumerate() {
                assert!(
                    operands_in_range(&module, index, st),
                    "validator accepted statement {} {:?}",
                    index,
                    st
                );
            }
        }
    }
    assert!(accepted > 0);
}

#[test]
fn test_unknown_opcode_rejected_before_execution() {
    let mut rng = StdRng::seed_from_u64(7);
    let bytes = random_module(
        &mut rng,
        PROG_VERSION,
        &[Statement::new(0xffff, 0, 0, 0)],
    );
    let checked = VmConfig {
        bounds_check: true,
        ..VmConfig::default()
    };
    let err = VM::load(&bytes, 1, 0, checked).unwrap_err();
    assert!(err.to_string().contains("unknown opcode 65535 at statement 1"));

    let mut vm = VM::load(&bytes, 1, 0, VmConfig::default()).unwrap();
    let err = vm.execute_by_name("main").unwrap_err();
    assert_eq!(err.kind, progs_vm::VMError::UnknownOpcode(0xffff));
}

#[test]
fn test_random_programs_never_escape_memory() {
    let mut rng = StdRng::seed_from_u64(42);
    let config = VmConfig {
        bounds_check: true,
        runaway_budget: 500,
        ..VmConfig::default()
    };

    for _ in 0..300 {
        let len = rng.gen_range(1..12);
        let probe = load(&random_module(&mut rng, PROG_VERSION, &[]), 1, 0).unwrap();
        let globals = probe.header.num_globals as u16;
        let body: Vec<Statement> = (0..len).map(|_| random_statement(&mut rng, globals)).collect();
        let bytes = random_module(&mut rng, PROG_VERSION, &body);

        let unchecked = VmConfig {
            bounds_check: false,
            ..config.clone()
        };
        for config in [config.clone(), unchecked] {
            let mut vm = match VM::load(&bytes, 4, 16, config) {
                Ok(vm) => vm,
                Err(_) => continue,
            };
            let _ = vm.execute_by_name("main");
            assert_eq!(vm.call_depth(), 0);
        }
    }
}

const MIXER: &str = r#"{
    "globals": [
        {"name": "a", "value": {"type": "float", "value": 0}},
        {"name": "b", "value": {"type": "float", "value": 0}},
        {"name": "v", "value": {"type": "vector", "value": [0, 0, 0]}},
        {"name": "t", "value": {"type": "float", "value": 0}},
        {"name": "u", "value": {"type": "float", "value": 0}}
    ],
    "functions": [{
        "name": "mix",
        "statements": [
            ["mul.f", "a", "b", "t"],
            ["add.f", "t", "a", "t"],
            ["sub.f", "t", "b", "u"],
            ["mul.fv", "u", "v", "return"],
            ["mul.v", "return", "v", "t"],
            ["add.f", "t", "u", "t"],
            ["return", "return"]
        ]
    }]
}"#;

#[test]
fn test_execution_is_deterministic() {
    let bytes = AssemblySource::from_json(MIXER)
        .unwrap()
        .assemble()
        .unwrap()
        .to_bytes();
    let mut rng = StdRng::seed_from_u64(1234);

    for _ in 0..50 {
        let a = Value::Float(rng.gen_range(-100.0..100.0));
        let b = Value::Float(rng.gen_range(-100.0..100.0));
        let v = Value::Vector([rng.gen(), rng.gen(), rng.gen()]);

        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut vm = VM::load(&bytes, 2, 0, VmConfig::default()).unwrap();
            vm.set_global("a", a).unwrap();
            vm.set_global("b", b).unwrap();
            vm.set_global("v", v).unwrap();
            vm.execute_by_name("mix").unwrap();
            runs.push(vm.memory().words().to_vec());
        }
        assert_eq!(runs[0], runs[1]);
    }
}

#[test]
fn test_set_global_checks_declared_type() {
    let bytes = AssemblySource::from_json(MIXER)
        .unwrap()
        .assemble()
        .unwrap()
        .to_bytes();
    let mut vm = VM::load(&bytes, 2, 0, VmConfig::default()).unwrap();
    assert!(vm.set_global("a", Value::Integer(3)).is_err());
    assert!(vm.set_global("missing", Value::Float(1.0)).is_err());
    assert_eq!(vm.global_value("a").unwrap(), Value::Float(0.0));
}
