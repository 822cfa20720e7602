//! Builders for appending type and method definitions to a [`Module`].

use crate::{
    metadata::{
        method::{MethodAttributes, MethodBody, MethodImplAttributes},
        module::Module,
        signatures::MethodSignature,
        tables::{MethodDef, TypeDef},
        token::Token,
        typesystem::TypeAttributes,
    },
    Error, Result,
};

/// Builder for a new `TypeDef` row
///
/// ```rust,no_run
/// use dotpatch::metadata::module::{Module, TypeDefBuilder};
/// use dotpatch::metadata::typesystem::TypeAttributes;
///
/// # fn example(module: &mut Module) -> dotpatch::Result<()> {
/// let token = TypeDefBuilder::new("Game", "Player")
///     .flags(TypeAttributes::PUBLIC)
///     .build(module)?;
/// # Ok(())
/// # }
/// ```
pub struct TypeDefBuilder {
    namespace: String,
    name: String,
    flags: TypeAttributes,
    extends: Option<Token>,
    enclosing: Option<Token>,
    generic_params: Vec<String>,
}

impl TypeDefBuilder {
    /// Starts a type named `namespace.name`
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        TypeDefBuilder {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags: TypeAttributes::empty(),
            extends: None,
            enclosing: None,
            generic_params: Vec::new(),
        }
    }

    /// Sets the type attributes
    #[must_use]
    pub fn flags(mut self, flags: TypeAttributes) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the base type; extending `System.ValueType` or `System.Enum` makes a value type
    #[must_use]
    pub fn extends(mut self, base: Token) -> Self {
        self.extends = Some(base);
        self
    }

    /// Nests the type in `enclosing`
    #[must_use]
    pub fn nested_in(mut self, enclosing: Token) -> Self {
        self.enclosing = Some(enclosing);
        self
    }

    /// Declares a generic parameter
    #[must_use]
    pub fn generic_param(mut self, name: &str) -> Self {
        self.generic_params.push(name.to_string());
        self
    }

    /// Appends the type to `module`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the enclosing or base type does not exist.
    pub fn build(self, module: &mut Module) -> Result<Token> {
        if let Some(enclosing) = self.enclosing {
            if module.type_def(enclosing).is_none() {
                return Err(Error::TokenNotFound(enclosing));
            }
        }
        if let Some(base) = self.extends {
            if module.type_full_name(base).is_err() && module.type_spec(base).is_none() {
                return Err(Error::TokenNotFound(base));
            }
        }

        Ok(module.push_type_def(TypeDef {
            token: Token::new(0),
            namespace: self.namespace,
            name: self.name,
            flags: self.flags,
            extends: self.extends,
            enclosing: self.enclosing,
            generic_params: self.generic_params,
            fields: Vec::new(),
            methods: Vec::new(),
        }))
    }
}

/// Builder for a new `MethodDef` row
pub struct MethodDefBuilder {
    name: String,
    flags: MethodAttributes,
    impl_flags: MethodImplAttributes,
    signature: MethodSignature,
    generic_params: Vec<String>,
    body: Option<MethodBody>,
}

impl MethodDefBuilder {
    /// Starts a method called `name`
    #[must_use]
    pub fn new(name: &str) -> Self {
        MethodDefBuilder {
            name: name.to_string(),
            flags: MethodAttributes::empty(),
            impl_flags: MethodImplAttributes::empty(),
            signature: MethodSignature::default(),
            generic_params: Vec::new(),
            body: None,
        }
    }

    /// Sets the method attributes
    #[must_use]
    pub fn flags(mut self, flags: MethodAttributes) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the implementation attributes
    #[must_use]
    pub fn impl_flags(mut self, impl_flags: MethodImplAttributes) -> Self {
        self.impl_flags = impl_flags;
        self
    }

    /// Sets the signature; `has_this` is derived from the `STATIC` flag when built
    #[must_use]
    pub fn signature(mut self, signature: MethodSignature) -> Self {
        self.signature = signature;
        self
    }

    /// Declares a method generic parameter
    #[must_use]
    pub fn generic_param(mut self, name: &str) -> Self {
        self.generic_params.push(name.to_string());
        self
    }

    /// Sets the body
    #[must_use]
    pub fn body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends the method to `module` as a member of `declaring_type`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the declaring type does not exist.
    pub fn build(self, module: &mut Module, declaring_type: Token) -> Result<Token> {
        let mut signature = self.signature;
        signature.has_this = !self.flags.contains(MethodAttributes::STATIC);
        signature.generic_param_count = u32::try_from(self.generic_params.len()).unwrap_or(u32::MAX);

        module.push_method_def(MethodDef {
            token: Token::new(0),
            declaring_type,
            name: self.name,
            flags: self.flags,
            impl_flags: self.impl_flags,
            signature,
            generic_params: self.generic_params,
            body: self.body,
        })
    }
}
