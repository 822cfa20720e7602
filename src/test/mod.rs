//! Fixtures shared by the unit tests: module factories and fake collaborators.
//!
//! The scenario modules model a small game script assembly:
//!
//! - `Game.Cache` with the generic `static T Get<T>(int)` and a static initializer
//! - `Game.Player` with `Update()`, a static initializer and the closure container
//!   `Game.Player/<>c`
//! - `Game.Spawner`, which only exists in the patch module
//! - the wrapper container with the empty lookup-table method (patch module only)
//!
//! The base module instantiates `Get<int>` and `Get<string>`.

use std::collections::HashSet;

use uguid::guid;

use crate::{
    assembly::{Immediate, Instruction, OpCode},
    metadata::{
        method::{MethodAttributes, MethodBody},
        module::{MethodDefBuilder, Module, TypeDefBuilder},
        sequencepoints::SequencePoint,
        signatures::{MethodSignature, TypeSignature},
        tables::ResolutionScope,
        token::Token,
        typesystem::{FieldAttributes, TypeAttributes},
    },
    patch::{
        ClassifyContext, Collaborators, DiffOutcome, GenericMethodRecord, InstantiationRecord,
        MethodClassification, ModulePair,
    },
    Result,
};

/// An empty module with a fixed MVID
pub fn empty_module(name: &str) -> Module {
    Module::new(name, guid!("6f3c8b2a-51d4-4e0b-9a77-0c1d2e3f4a5b"))
}

fn default_ctor() -> MethodDefBuilder {
    MethodDefBuilder::new(".ctor")
        .flags(
            MethodAttributes::PUBLIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RTSPECIAL_NAME,
        )
        .signature(MethodSignature::new_instance(TypeSignature::Void, vec![]))
        .body(MethodBody::new(vec![Instruction::new(OpCode::Ret)], 0))
}

/// The support module defining both annotation types
pub fn support_module() -> Module {
    let mut module = empty_module("ShareCode");
    for name in ["GenericMethodIndexAttribute", "GenericMethodWrapperAttribute"] {
        let ty = TypeDefBuilder::new("ScriptHotReload", name)
            .flags(TypeAttributes::PUBLIC | TypeAttributes::SEALED)
            .build(&mut module)
            .unwrap();
        default_ctor().build(&mut module, ty).unwrap();
    }
    module
}

/// A module holding only `Game.Cache::Get<T>(int)`; returns the module and the method
pub fn generic_cache_module(name: &str) -> (Module, Token) {
    let mut module = empty_module(name);
    let cache = TypeDefBuilder::new("Game", "Cache")
        .flags(TypeAttributes::PUBLIC)
        .build(&mut module)
        .unwrap();
    let get = add_generic_get(&mut module, cache, None);
    (module, get)
}

fn add_generic_get(module: &mut Module, cache: Token, document: Option<u32>) -> Token {
    let instructions = match document {
        Some(document) => vec![
            Instruction::new(OpCode::Ldnull).at(SequencePoint::new(document, 12, 9, 12, 21)),
            Instruction::new(OpCode::Ret).at(SequencePoint::new(document, 13, 5, 13, 6)),
        ],
        None => vec![
            Instruction::new(OpCode::Ldnull),
            Instruction::new(OpCode::Ret),
        ],
    };

    MethodDefBuilder::new("Get")
        .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG)
        .generic_param("T")
        .signature(MethodSignature::new_static(
            TypeSignature::GenericParamMethod(0),
            vec![TypeSignature::I4],
        ))
        .body(MethodBody::new(instructions, 1))
        .build(module, cache)
        .unwrap()
}

fn add_static_initializer(module: &mut Module, owner: Token, field: Token) -> Token {
    MethodDefBuilder::new(".cctor")
        .flags(MethodAttributes::type_initializer())
        .signature(MethodSignature::new_static(TypeSignature::Void, vec![]))
        .body(MethodBody::new(
            vec![
                Instruction::with_immediate(OpCode::LdcI4S, Immediate::Int8(16)),
                Instruction::with_token(OpCode::Stsfld, field),
                Instruction::new(OpCode::Ret),
            ],
            1,
        ))
        .build(module, owner)
        .unwrap()
}

fn add_game_types(module: &mut Module, document: Option<u32>, with_spawner: bool) {
    let static_int = FieldAttributes::PRIVATE | FieldAttributes::STATIC;

    let cache = TypeDefBuilder::new("Game", "Cache")
        .flags(TypeAttributes::PUBLIC)
        .build(module)
        .unwrap();
    add_generic_get(module, cache, document);
    let capacity = module
        .add_field(cache, "capacity", static_int, TypeSignature::I4)
        .unwrap();
    add_static_initializer(module, cache, capacity);

    let player = TypeDefBuilder::new("Game", "Player")
        .flags(TypeAttributes::PUBLIC)
        .build(module)
        .unwrap();
    let lives = module
        .add_field(player, "lives", static_int, TypeSignature::I4)
        .unwrap();
    add_static_initializer(module, player, lives);
    MethodDefBuilder::new("Update")
        .flags(MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG)
        .signature(MethodSignature::new_instance(TypeSignature::Void, vec![]))
        .body(MethodBody::new(vec![Instruction::new(OpCode::Ret)], 0))
        .build(module, player)
        .unwrap();

    let closure = TypeDefBuilder::new("", "<>c")
        .flags(TypeAttributes::NESTED_PRIVATE | TypeAttributes::SEALED)
        .nested_in(player)
        .build(module)
        .unwrap();
    let counter = module
        .add_field(closure, "<>9__0_0", static_int, TypeSignature::I4)
        .unwrap();
    add_static_initializer(module, closure, counter);
    MethodDefBuilder::new("<Update>b__0_0")
        .flags(MethodAttributes::ASSEM | MethodAttributes::HIDE_BY_SIG)
        .signature(MethodSignature::new_instance(TypeSignature::Void, vec![]))
        .body(MethodBody::new(vec![Instruction::new(OpCode::Ret)], 0))
        .build(module, closure)
        .unwrap();

    if with_spawner {
        let spawner = TypeDefBuilder::new("Game", "Spawner")
            .flags(TypeAttributes::PUBLIC)
            .build(module)
            .unwrap();
        let count = module
            .add_field(spawner, "count", static_int, TypeSignature::I4)
            .unwrap();
        add_static_initializer(module, spawner, count);
        MethodDefBuilder::new("Spawn")
            .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG)
            .signature(MethodSignature::new_static(TypeSignature::Void, vec![]))
            .body(MethodBody::new(vec![Instruction::new(OpCode::Ret)], 0))
            .build(module, spawner)
            .unwrap();
    }
}

/// The base module of the scenario, with `Get<int>` and `Get<string>` instantiated
pub fn scenario_base() -> Module {
    let mut module = empty_module("Assembly-CSharp");
    add_game_types(&mut module, None, false);

    let cache = module.find_type("Game.Cache").unwrap();
    let get = module.find_method(cache, "Get").unwrap();
    module.add_method_spec(get, vec![TypeSignature::I4]);
    module.add_method_spec(get, vec![TypeSignature::String]);
    module
}

/// The freshly compiled patch module of the scenario
pub fn scenario_patch() -> Module {
    let mut module = empty_module("Assembly-CSharp_patch");
    let document = module.add_document("Assets/Scripts/Game/Cache.cs");
    add_game_types(&mut module, Some(document), true);

    let corlib = ResolutionScope::Assembly("mscorlib".to_string());
    let dictionary = module.add_type_ref(corlib.clone(), "System.Collections.Generic", "Dictionary`2");
    let method_base = module.add_type_ref(corlib, "System.Reflection", "MethodBase");

    let container = TypeDefBuilder::new("ScriptHotReload", "__Patch_GenericInst_Wrapper__Gen__")
        .flags(TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED)
        .build(&mut module)
        .unwrap();
    MethodDefBuilder::new("GetGenericInstMethodForPatch")
        .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG)
        .signature(MethodSignature::new_static(
            TypeSignature::GenericInst(
                Box::new(TypeSignature::Class(dictionary)),
                vec![
                    TypeSignature::Class(method_base),
                    TypeSignature::Class(method_base),
                ],
            ),
            vec![],
        ))
        .body(MethodBody::new(
            vec![Instruction::new(OpCode::Ldnull), Instruction::new(OpCode::Ret)],
            1,
        ))
        .build(&mut module, container)
        .unwrap();
    module
}

/// The diffed scenario pair
pub fn scenario_pair() -> ModulePair {
    let mut pair = ModulePair::new(scenario_base(), scenario_patch());
    pair.added_types.insert("Game.Spawner".to_string());
    let cache = pair.patch.find_type("Game.Cache").unwrap();
    let player = pair.patch.find_type("Game.Player").unwrap();
    pair.changed_methods
        .insert(pair.patch.find_method(cache, "Get").unwrap());
    pair.changed_methods
        .insert(pair.patch.find_method(player, "Update").unwrap());
    pair
}

/// Classifies by full method name: `Get` and `Spawn` are hooked, `Update` and the closure
/// body are fixed, everything else is left unchanged
pub fn scenario_classifier(method: Token, ctx: &mut ClassifyContext<'_>) -> Result<()> {
    let name = ctx.pair().patch.method_full_name(method)?;
    let classification = match name.as_str() {
        "Game.Cache::Get" | "Game.Spawner::Spawn" => MethodClassification::Hook,
        "Game.Player::Update" | "Game.Player/<>c::<Update>b__0_0" => MethodClassification::IlFix,
        _ => MethodClassification::Unchanged,
    };
    ctx.record(method, classification);
    Ok(())
}

/// Pairs every `MethodSpec` of the base module with the patch method of the same name
pub fn method_spec_scanner(pair: &ModulePair) -> Result<Vec<GenericMethodRecord>> {
    let mut records: Vec<GenericMethodRecord> = Vec::new();
    for spec in pair.base.method_specs() {
        let name = pair.base.method_full_name(spec.method)?;
        let Some(patched) = pair
            .patch
            .methods()
            .iter()
            .find(|method| pair.patch.method_full_name(method.token).is_ok_and(|n| n == name))
        else {
            continue;
        };

        let record = InstantiationRecord::new(Vec::new(), spec.instantiation.clone(), spec.token);
        match records.iter_mut().find(|r| r.method == patched.token) {
            Some(existing) => existing.instantiations.push(record),
            None => records.push(GenericMethodRecord::new(patched.token, vec![record])),
        }
    }
    Ok(records)
}

/// Collaborators producing the scenario pair for every module name
pub fn scenario_collaborators() -> Collaborators {
    Collaborators::new(
        |_: &str| -> Result<DiffOutcome> { Ok(DiffOutcome::Valid(scenario_pair())) },
        scenario_classifier,
        method_spec_scanner,
    )
}

/// Collaborators whose differ always reports incompatible modules
pub fn invalid_collaborators() -> Collaborators {
    Collaborators::new(
        |name: &str| -> Result<DiffOutcome> {
            Ok(DiffOutcome::Invalid(format!("signature mismatch in {name}")))
        },
        scenario_classifier,
        method_spec_scanner,
    )
}

/// Full names of all methods of `module`, for readable assertions
pub fn method_names(module: &Module) -> HashSet<String> {
    module
        .methods()
        .iter()
        .filter_map(|method| module.method_full_name(method.token).ok())
        .collect()
}
