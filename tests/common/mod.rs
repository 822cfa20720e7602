//! Scenario modules and fake collaborators shared by the integration tests.
//!
//! The base module `Assembly-CSharp` has `Game.Cache` with `static T Get<T>(int)` and a
//! static initializer, `Game.Player` with a branching static initializer guarded by a
//! try/finally and the closure container `Game.Player/<>c`, and instantiates `Get<int>` and
//! `Get<string>`. The patch module adds `Game.Spawner`, debug documents and the wrapper
//! container.

#![allow(dead_code)]

use std::sync::Arc;

use dotpatch::{
    assembly::Immediate,
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags},
        sequencepoints::SequencePoint,
        tables::ResolutionScope,
        typesystem::{FieldAttributes, TypeAttributes},
    },
    prelude::*,
};
use uguid::guid;

pub const MODULE: &str = "Assembly-CSharp";

fn module(name: &str) -> Module {
    Module::new(name, guid!("0d9c41aa-7e21-4b55-8c3f-5b2e6a1f9d70"))
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

pub fn support_module() -> Module {
    let mut support = module("ShareCode");
    for name in ["GenericMethodIndexAttribute", "GenericMethodWrapperAttribute"] {
        let ty = TypeDefBuilder::new("ScriptHotReload", name)
            .flags(TypeAttributes::PUBLIC | TypeAttributes::SEALED)
            .build(&mut support)
            .unwrap();
        default_ctor().build(&mut support, ty).unwrap();
    }
    support
}

fn static_initializer(module: &mut Module, owner: Token, field: &str) {
    let field = module
        .add_field(
            owner,
            field,
            FieldAttributes::PRIVATE | FieldAttributes::STATIC,
            TypeSignature::I4,
        )
        .unwrap();
    MethodDefBuilder::new(".cctor")
        .flags(MethodAttributes::type_initializer())
        .signature(MethodSignature::new_static(TypeSignature::Void, vec![]))
        .body(MethodBody::new(
            vec![
                Instruction::with_immediate(OpCode::LdcI4S, Immediate::Int8(64)),
                Instruction::with_token(OpCode::Stsfld, field),
                Instruction::new(OpCode::Ret),
            ],
            1,
        ))
        .build(module, owner)
        .unwrap();
}

/// `if (lives == 0) { try { lives = 3; } finally { } }`
fn guarded_initializer(module: &mut Module, owner: Token, document: Option<u32>) {
    let lives = module
        .add_field(
            owner,
            "lives",
            FieldAttributes::PRIVATE | FieldAttributes::STATIC,
            TypeSignature::I4,
        )
        .unwrap();
    let at = |instruction: Instruction, line: u32| match document {
        Some(document) => instruction.at(SequencePoint::new(document, line, 9, line, 30)),
        None => instruction,
    };

    let mut body = MethodBody::new(
        vec![
            at(Instruction::with_token(OpCode::Ldsfld, lives), 8),
            Instruction::branch(OpCode::BrtrueS, 7),
            at(Instruction::with_immediate(OpCode::LdcI4S, Immediate::Int8(3)), 10),
            Instruction::with_token(OpCode::Stsfld, lives),
            Instruction::branch(OpCode::LeaveS, 7),
            Instruction::new(OpCode::Nop),
            Instruction::new(OpCode::Endfinally),
            Instruction::new(OpCode::Ret),
        ],
        1,
    );
    body.exception_handlers.push(ExceptionHandler {
        flags: ExceptionHandlerFlags::FINALLY,
        try_start: 2,
        try_end: 5,
        handler_start: 5,
        handler_end: 7,
        class_token: None,
        filter_start: None,
    });

    MethodDefBuilder::new(".cctor")
        .flags(MethodAttributes::type_initializer())
        .signature(MethodSignature::new_static(TypeSignature::Void, vec![]))
        .body(body)
        .build(module, owner)
        .unwrap();
}

fn game_types(module: &mut Module, document: Option<u32>, patch: bool) {
    let cache = TypeDefBuilder::new("Game", "Cache")
        .flags(TypeAttributes::PUBLIC)
        .build(module)
        .unwrap();
    let mut load = Instruction::new(OpCode::Ldnull);
    let mut ret = Instruction::new(OpCode::Ret);
    if let Some(document) = document {
        load = load.at(SequencePoint::new(document, 20, 9, 20, 30));
        ret = ret.at(SequencePoint::new(document, 21, 5, 21, 6));
    }
    MethodDefBuilder::new("Get")
        .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG)
        .generic_param("T")
        .signature(MethodSignature::new_static(
            TypeSignature::GenericParamMethod(0),
            vec![TypeSignature::I4],
        ))
        .body(MethodBody::new(vec![load, ret], 1))
        .build(module, cache)
        .unwrap();
    static_initializer(module, cache, "capacity");

    let player = TypeDefBuilder::new("Game", "Player")
        .flags(TypeAttributes::PUBLIC)
        .build(module)
        .unwrap();
    guarded_initializer(module, player, document);
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
    static_initializer(module, closure, "<>9__0_0");
    MethodDefBuilder::new("<Update>b__0_0")
        .flags(MethodAttributes::ASSEM | MethodAttributes::HIDE_BY_SIG)
        .signature(MethodSignature::new_instance(TypeSignature::Void, vec![]))
        .body(MethodBody::new(vec![Instruction::new(OpCode::Ret)], 0))
        .build(module, closure)
        .unwrap();

    if patch {
        let spawner = TypeDefBuilder::new("Game", "Spawner")
            .flags(TypeAttributes::PUBLIC)
            .build(module)
            .unwrap();
        static_initializer(module, spawner, "count");
        MethodDefBuilder::new("Spawn")
            .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG)
            .signature(MethodSignature::new_static(TypeSignature::Void, vec![]))
            .body(MethodBody::new(vec![Instruction::new(OpCode::Ret)], 0))
            .build(module, spawner)
            .unwrap();
    }
}

pub fn base_module() -> Module {
    let mut base = module(MODULE);
    game_types(&mut base, None, false);
    let cache = base.find_type("Game.Cache").unwrap();
    let get = base.find_method(cache, "Get").unwrap();
    base.add_method_spec(get, vec![TypeSignature::I4]);
    base.add_method_spec(get, vec![TypeSignature::String]);
    base
}

pub fn patch_module() -> Module {
    let mut patch = module("Assembly-CSharp_patch");
    let document = patch.add_document("Assets/Scripts/Game/Cache.cs");
    game_types(&mut patch, Some(document), true);

    let corlib = ResolutionScope::Assembly("mscorlib".to_string());
    let dictionary =
        patch.add_type_ref(corlib.clone(), "System.Collections.Generic", "Dictionary`2");
    let method_base = patch.add_type_ref(corlib, "System.Reflection", "MethodBase");
    let container = TypeDefBuilder::new("ScriptHotReload", "__Patch_GenericInst_Wrapper__Gen__")
        .flags(TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED)
        .build(&mut patch)
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
        .build(&mut patch, container)
        .unwrap();
    patch
}

fn differ(_: &str) -> Result<DiffOutcome> {
    let mut pair = ModulePair::new(base_module(), patch_module());
    pair.added_types.insert("Game.Spawner".to_string());
    let cache = pair.patch.find_type("Game.Cache").unwrap();
    pair.changed_methods
        .insert(pair.patch.find_method(cache, "Get").unwrap());
    Ok(DiffOutcome::Valid(pair))
}

fn classifier(method: Token, ctx: &mut ClassifyContext<'_>) -> Result<()> {
    let name = ctx.pair().patch.method_full_name(method)?;
    let classification = match name.as_str() {
        "Game.Cache::Get" | "Game.Spawner::Spawn" => MethodClassification::Hook,
        "Game.Player::Update" | "Game.Player/<>c::<Update>b__0_0" => MethodClassification::IlFix,
        _ => MethodClassification::Unchanged,
    };
    ctx.record(method, classification);
    Ok(())
}

/// One record per patched method that the base module instantiates
fn scanner(pair: &ModulePair) -> Result<Vec<GenericMethodRecord>> {
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
        let instantiation =
            InstantiationRecord::new(Vec::new(), spec.instantiation.clone(), spec.token);
        match records.iter_mut().find(|record| record.method == patched.token) {
            Some(record) => record.instantiations.push(instantiation),
            None => records.push(GenericMethodRecord::new(patched.token, vec![instantiation])),
        }
    }
    Ok(records)
}

pub fn collaborators() -> Collaborators {
    Collaborators::new(differ, classifier, scanner)
}

pub fn context() -> Arc<PatchContext> {
    Arc::new(PatchContext::new(PatchConfig::default(), &support_module()).unwrap())
}

/// A pipeline that already ran successfully
pub fn finished_pipeline() -> PatchPipeline {
    let mut pipeline = PatchPipeline::new(MODULE, context(), collaborators());
    assert!(pipeline.run().unwrap());
    pipeline
}
