//! Synthetic core library.
//!
//! [`build`] produces a minimal `mscorlib` module containing the types the binder relies on:
//! the root types, the built-in primitives, the exception hierarchy used by the exception
//! accessors, `System.Type` and `System.Nullable`1`. Hosts that mirror the real core library
//! of the debuggee can use [`crate::metadata::typesystem::ModuleBuilder`] directly instead.

use crate::metadata::{
    identity::{AssemblyIdentity, AssemblyVersion, PublicKeyToken},
    module::LoadedModule,
    typesystem::{CilPrimitiveKind, ModuleBuilder, TypeSignature},
};

/// Simple name of the synthetic core library
pub const CORE_LIBRARY_NAME: &str = "mscorlib";

/// Public key token of the .NET Framework core library
pub const CORE_LIBRARY_TOKEN: [u8; 8] = [0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89];

/// Build the core library module with the given version
#[must_use]
pub fn build(version: AssemblyVersion) -> LoadedModule {
    let identity = AssemblyIdentity::new(
        CORE_LIBRARY_NAME,
        version,
        None,
        Some(PublicKeyToken(CORE_LIBRARY_TOKEN)),
    );

    let mut builder = ModuleBuilder::new(identity)
        .class("System.Object", |t| t.primitive(CilPrimitiveKind::Object))
        .class("System.ValueType", |t| t)
        .class("System.Array", |t| t.property("Length", CilPrimitiveKind::I4))
        .class("System.String", |t| {
            t.primitive(CilPrimitiveKind::String)
                .property("Length", CilPrimitiveKind::I4)
        });

    for kind in [
        CilPrimitiveKind::Boolean,
        CilPrimitiveKind::Char,
        CilPrimitiveKind::I1,
        CilPrimitiveKind::U1,
        CilPrimitiveKind::I2,
        CilPrimitiveKind::U2,
        CilPrimitiveKind::I4,
        CilPrimitiveKind::U4,
        CilPrimitiveKind::I8,
        CilPrimitiveKind::U8,
        CilPrimitiveKind::R4,
        CilPrimitiveKind::R8,
        CilPrimitiveKind::I,
        CilPrimitiveKind::U,
    ] {
        builder = builder.value_type(kind.clr_full_name(), |t| t.primitive(kind));
    }

    builder
        .class("System.Exception", |t| {
            t.property("InnerException", "System.Exception")
                .property("Message", CilPrimitiveKind::String)
        })
        .class("System.SystemException", |t| t.extends("System.Exception"))
        .class("System.IO.IOException", |t| t.extends("System.SystemException"))
        .class("System.InvalidOperationException", |t| {
            t.extends("System.SystemException")
        })
        .class("System.Type", |t| {
            t.property("BaseType", "System.Type")
                .property("Name", CilPrimitiveKind::String)
        })
        .value_type("System.Nullable`1", |t| {
            t.generic_params(&["T"])
                .property("HasValue", CilPrimitiveKind::Boolean)
                .property("Value", TypeSignature::TypeParameter(0))
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeKind;

    #[test]
    fn test_identity() {
        let module = build(AssemblyVersion::new(4, 0, 0, 0));
        assert_eq!(
            module.identity.display_name(),
            "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"
        );
    }

    #[test]
    fn test_primitives_are_marked() {
        let module = build(AssemblyVersion::new(4, 0, 0, 0));
        let int = module.type_by_name("System.Int32").unwrap();
        assert_eq!(int.primitive, Some(CilPrimitiveKind::I4));
        assert_eq!(int.kind, TypeKind::ValueType);

        let string = module.type_by_name("System.String").unwrap();
        assert_eq!(string.primitive, Some(CilPrimitiveKind::String));
        assert_eq!(string.kind, TypeKind::Class);

        let object = module.type_by_name("System.Object").unwrap();
        assert_eq!(object.base, None);
    }

    #[test]
    fn test_exception_hierarchy() {
        let module = build(AssemblyVersion::new(4, 0, 0, 0));
        let io = module.type_by_name("System.IO.IOException").unwrap();
        assert_eq!(io.base, Some(TypeSignature::named("System.SystemException")));
        assert!(module
            .type_by_name("System.Exception")
            .unwrap()
            .property("InnerException")
            .is_some());
    }
}
