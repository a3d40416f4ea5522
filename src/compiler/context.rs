use crate::{
    metadata::{
        module::{ModuleId, ModuleSet},
        typesystem::{CilType, MethodDefinition},
    },
    Error, Result,
};

/// A local variable of the suspended method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSlot {
    /// Source name
    pub name: String,
    /// Declared type
    pub ty: CilType,
}

/// A parameter of the suspended method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
    /// Source name
    pub name: String,
    /// Declared type, without the by-ref modifier
    pub ty: CilType,
    /// Declared `ref` or `out`
    pub by_ref: bool,
}

/// The method the debuggee is suspended in.
///
/// Expressions are compiled as if they were written inside this method: its locals,
/// parameters and the members of its containing type are in scope. Locals occupy the first
/// local slots of every generated method, in the order they were added.
#[derive(Debug, Clone)]
pub struct MethodContext {
    module: ModuleId,
    containing_type: CilType,
    method: MethodDefinition,
    parameters: Vec<ParameterSlot>,
    locals: Vec<LocalSlot>,
}

impl MethodContext {
    /// Look up `method_name` on `type_name` in `module`.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] or [`Error::MemberNotFound`] when the type or method
    /// does not exist, and [`Error::UnsupportedType`] for generic types and methods.
    pub fn new(
        modules: &ModuleSet,
        module: ModuleId,
        type_name: &str,
        method_name: &str,
    ) -> Result<Self> {
        let definition = modules
            .module(module)
            .and_then(|loaded| loaded.type_by_name(type_name))
            .ok_or_else(|| Error::TypeNotFound(type_name.to_string()))?;
        if !definition.generic_params.is_empty() {
            return Err(Error::UnsupportedType(definition.full_name()));
        }

        let method = definition
            .methods_named(method_name)
            .next()
            .cloned()
            .ok_or_else(|| Error::MemberNotFound {
                type_name: type_name.to_string(),
                member: method_name.to_string(),
            })?;
        if !method.generic_params.is_empty() {
            return Err(Error::UnsupportedType(format!("{type_name}.{method_name}")));
        }

        let containing_type = CilType::named(module, definition, Vec::new());
        let parameters = method
            .params
            .iter()
            .map(|param| {
                Ok(ParameterSlot {
                    name: param.name.clone(),
                    ty: modules.resolve_signature(&param.signature, module, &[], &[])?,
                    by_ref: param.by_ref,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MethodContext {
            module,
            containing_type,
            method,
            parameters,
            locals: Vec::new(),
        })
    }

    /// Declare the next local slot
    #[must_use]
    pub fn with_local(mut self, name: &str, ty: CilType) -> Self {
        self.locals.push(LocalSlot {
            name: name.to_string(),
            ty,
        });
        self
    }

    /// Module defining the method
    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Type declaring the method
    #[must_use]
    pub fn containing_type(&self) -> &CilType {
        &self.containing_type
    }

    /// Name of the method
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    /// Returns true if there is no `this`
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.method.is_static
    }

    /// Parameters in declaration order
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSlot] {
        &self.parameters
    }

    /// Locals in slot order
    #[must_use]
    pub fn locals(&self) -> &[LocalSlot] {
        &self.locals
    }

    /// Slot and declaration of a local
    #[must_use]
    pub fn local(&self, name: &str) -> Option<(u16, &LocalSlot)> {
        self.locals
            .iter()
            .enumerate()
            .find(|(_, local)| local.name == name)
            .and_then(|(index, local)| Some((u16::try_from(index).ok()?, local)))
    }

    /// Argument index and declaration of a parameter; `this` is argument 0 of instance methods
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<(u16, &ParameterSlot)> {
        let offset = usize::from(!self.is_static());
        self.parameters
            .iter()
            .enumerate()
            .find(|(_, param)| param.name == name)
            .and_then(|(index, param)| Some((u16::try_from(index + offset).ok()?, param)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        corlib,
        identity::AssemblyVersion,
        typesystem::{CilPrimitiveKind, ModuleBuilder},
    };

    fn snapshot() -> (ModuleSet, ModuleId) {
        let mut modules = ModuleSet::new();
        modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
        let app = modules.add(
            ModuleBuilder::named("App")
                .class("C", |t| {
                    t.method(MethodDefinition::static_method("M").param("a", CilPrimitiveKind::I4))
                        .method(
                            MethodDefinition::instance("N")
                                .param("a", CilPrimitiveKind::String)
                                .ref_param("b", CilPrimitiveKind::I4),
                        )
                        .method(MethodDefinition::static_method("G").with_generic_params(&["T"]))
                })
                .build(),
        );
        (modules, app)
    }

    #[test]
    fn test_parameters_account_for_this() {
        let (modules, app) = snapshot();

        let m = MethodContext::new(&modules, app, "C", "M").unwrap();
        assert!(m.is_static());
        assert_eq!(m.parameter("a").unwrap().0, 0);

        let n = MethodContext::new(&modules, app, "C", "N").unwrap();
        assert_eq!(n.parameter("a").unwrap().0, 1);
        let (index, b) = n.parameter("b").unwrap();
        assert_eq!(index, 2);
        assert!(b.by_ref);
        assert_eq!(b.ty.to_string(), "int");
    }

    #[test]
    fn test_locals_take_slots_in_order() {
        let (modules, app) = snapshot();
        let int = modules.primitive(CilPrimitiveKind::I4).unwrap();
        let context = MethodContext::new(&modules, app, "C", "M")
            .unwrap()
            .with_local("x", int.clone())
            .with_local("y", int);

        assert_eq!(context.local("y").unwrap().0, 1);
        assert!(context.local("z").is_none());
        assert_eq!(context.locals().len(), 2);
    }

    #[test]
    fn test_lookup_failures() {
        let (modules, app) = snapshot();
        assert!(matches!(
            MethodContext::new(&modules, app, "D", "M"),
            Err(Error::TypeNotFound(_))
        ));
        assert!(matches!(
            MethodContext::new(&modules, app, "C", "Q"),
            Err(Error::MemberNotFound { .. })
        ));
        assert!(matches!(
            MethodContext::new(&modules, app, "C", "G"),
            Err(Error::UnsupportedType(_))
        ));
    }
}
