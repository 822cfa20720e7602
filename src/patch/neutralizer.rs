//! Static initializer neutralization.
//!
//! The base module already ran the static initializers of its types. When the patched copy
//! of such a type is first used, the runtime runs the patch module's initializer as well,
//! which would redo every side effect. Touched types therefore get a `ret` prepended to their
//! `.cctor`. Nothing is removed: branch targets, handler ranges and sequence points stay on
//! their instructions and the symbol file still maps every original instruction.
//!
//! Two kinds of types keep their initializer:
//!
//! - types added by the patch, whose initializer has never run
//! - compiler-generated closure containers (`<>c`), whose members cannot be matched across
//!   compilations and are not redirected

use std::collections::{BTreeSet, HashSet};

use crate::{
    assembly::{Instruction, OpCode},
    metadata::{module::Module, token::Token},
    patch::PatchConfig,
    Error, Result,
};

/// Why a touched type keeps its static initializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exemption {
    /// The type only exists in the patch module
    AddedType,
    /// The type is a compiler-generated closure container
    ClosureContainer,
}

/// Returns the exemption that applies to `type_name`, if any
#[must_use]
pub fn exemption(
    type_name: &str,
    added_types: &HashSet<String>,
    config: &PatchConfig,
) -> Option<Exemption> {
    if type_name.contains(&config.closure_marker) {
        Some(Exemption::ClosureContainer)
    } else if added_types.contains(type_name) {
        Some(Exemption::AddedType)
    } else {
        None
    }
}

/// Prepends `ret` to the static initializer of every non-exempt touched type.
///
/// Returns the neutralized initializers in type order.
///
/// # Errors
/// Returns [`crate::Error::TokenNotFound`] if a touched type does not resolve.
pub fn neutralize_static_initializers(
    module: &mut Module,
    touched: &BTreeSet<Token>,
    added_types: &HashSet<String>,
    config: &PatchConfig,
) -> Result<Vec<Token>> {
    let mut initializers = Vec::new();
    for ty in touched {
        let name = module.type_full_name(*ty)?;
        if let Some(reason) = exemption(&name, added_types, config) {
            log::debug!("Keeping static initializer of {name} ({reason:?})");
            continue;
        }

        let row = module.type_def(*ty).ok_or(Error::TokenNotFound(*ty))?;
        initializers.extend(row.methods.iter().copied().filter(|method| {
            module
                .method(*method)
                .is_some_and(|method| method.is_static_constructor() && method.has_body())
        }));
    }

    for initializer in &initializers {
        let method = module
            .method_mut(*initializer)
            .ok_or(Error::TokenNotFound(*initializer))?;
        if let Some(body) = method.body.as_mut() {
            body.insert(0, Instruction::new(OpCode::Ret))?;
        }
        log::debug!("Neutralized static initializer {initializer}");
    }

    Ok(initializers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::scenario_pair;

    fn touched_all(module: &Module, names: &[&str]) -> BTreeSet<Token> {
        names
            .iter()
            .map(|name| module.find_type(name).unwrap())
            .collect()
    }

    #[test]
    fn test_exemptions() {
        let config = PatchConfig::default();
        let added = HashSet::from(["Game.Spawner".to_string()]);
        assert_eq!(
            exemption("Game.Player/<>c", &added, &config),
            Some(Exemption::ClosureContainer)
        );
        assert_eq!(
            exemption("Game.Spawner", &added, &config),
            Some(Exemption::AddedType)
        );
        assert_eq!(exemption("Game.Player", &added, &config), None);
    }

    #[test]
    fn test_prepends_ret_to_touched_types() {
        let mut pair = scenario_pair();
        let touched = touched_all(
            &pair.patch,
            &["Game.Player", "Game.Player/<>c", "Game.Spawner", "Game.Cache"],
        );
        let before: Vec<_> = pair.patch.methods().to_vec();

        let neutralized = neutralize_static_initializers(
            &mut pair.patch,
            &touched,
            &pair.added_types,
            &PatchConfig::default(),
        )
        .unwrap();
        assert_eq!(neutralized.len(), 2);

        for method in pair.patch.methods() {
            let original = before.iter().find(|m| m.token == method.token).unwrap();
            let (Some(body), Some(original_body)) = (&method.body, &original.body) else {
                continue;
            };
            let owner = pair.patch.type_full_name(method.declaring_type).unwrap();
            if neutralized.contains(&method.token) {
                assert!(owner == "Game.Player" || owner == "Game.Cache");
                assert_eq!(body.instructions.len(), original_body.instructions.len() + 1);
                assert_eq!(body.instructions[0].opcode, OpCode::Ret);
                assert_eq!(&body.instructions[1..], &original_body.instructions[..]);
            } else {
                assert_eq!(body, original_body, "{owner}::{} changed", method.name);
            }
        }
    }

    #[test]
    fn test_untouched_types_are_left_alone() {
        let mut pair = scenario_pair();
        let neutralized = neutralize_static_initializers(
            &mut pair.patch,
            &BTreeSet::new(),
            &pair.added_types,
            &PatchConfig::default(),
        )
        .unwrap();
        assert!(neutralized.is_empty());
    }
}
