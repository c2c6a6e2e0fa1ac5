//! Signatures: materialize references to the runtime-library entry
//! points the pass may emit calls to.
//!
//! Everything here runs exactly once per module, before discovery, because
//! later phases just want a `FuncId` to call, not a name to re-resolve.

use crate::ir::{CallConv, CanonicalType, FuncId, Module, Signature, Type};
use crate::symbols;
use cranelift_entity::EntityRef;

/// Declared (not defined) references to every runtime-library function the
/// pass might call, plus the eight canonical scalar types in one place.
pub struct RuntimeSignatures {
    loads: [FuncId; 8],
    stores: [FuncId; 8],
    pub malloc: FuncId,
    pub aligned_alloc: FuncId,
    pub free: FuncId,
    pub memcpy: FuncId,
    pub memset: FuncId,
    pub memmove: FuncId,
    pub translate_call: FuncId,
    pub unsafe_marker: FuncId,
    pub execute_c_internal: FuncId,
    pub register_clone: FuncId,
}

impl RuntimeSignatures {
    /// Declare every runtime entry point as an external (non-definition)
    /// function in `module`. Idempotent: calling it twice on the same
    /// module just returns the existing declarations, since
    /// `Module::declare_function` is get-or-insert.
    pub fn materialize(module: &mut Module) -> Self {
        let mut loads = [FuncId::new(0); 8];
        let mut stores = [FuncId::new(0); 8];
        for ty in CanonicalType::ALL {
            let scalar = canonical_to_type(ty);
            loads[ty.index()] = module.declare_function(
                &format!("load_{}", ty.suffix()),
                Signature {
                    params: vec![Type::Ptr],
                    ret: Some(scalar),
                    call_conv: CallConv::C,
                },
                false,
            );
            stores[ty.index()] = module.declare_function(
                &format!("store_{}", ty.suffix()),
                Signature {
                    params: vec![scalar, Type::Ptr],
                    ret: None,
                    call_conv: CallConv::C,
                },
                false,
            );
        }

        let malloc = module.declare_function(
            symbols::MALLOC,
            Signature {
                params: vec![Type::I64],
                ret: Some(Type::Ptr),
                call_conv: CallConv::C,
            },
            false,
        );
        let aligned_alloc = module.declare_function(
            symbols::ALIGNED_ALLOC,
            Signature {
                params: vec![Type::I64, Type::I64],
                ret: Some(Type::Ptr),
                call_conv: CallConv::C,
            },
            false,
        );
        let free = module.declare_function(
            symbols::FREE,
            Signature {
                params: vec![Type::Ptr],
                ret: None,
                call_conv: CallConv::C,
            },
            false,
        );
        let memcpy = module.declare_function(
            symbols::MEMCPY,
            Signature {
                params: vec![Type::Ptr, Type::Ptr, Type::I64, Type::I32],
                ret: Some(Type::Ptr),
                call_conv: CallConv::C,
            },
            false,
        );
        let memset = module.declare_function(
            symbols::MEMSET,
            Signature {
                params: vec![Type::Ptr, Type::I32, Type::I64, Type::I32],
                ret: Some(Type::Ptr),
                call_conv: CallConv::C,
            },
            false,
        );
        let memmove = module.declare_function(
            symbols::MEMMOVE,
            Signature {
                params: vec![Type::Ptr, Type::Ptr, Type::I64],
                ret: Some(Type::Ptr),
                call_conv: CallConv::C,
            },
            false,
        );
        let translate_call = module.declare_function(
            symbols::TRANSLATE_CALL,
            Signature {
                params: vec![Type::Ptr],
                ret: Some(Type::Ptr),
                call_conv: CallConv::C,
            },
            false,
        );
        let unsafe_marker = module.declare_function(
            symbols::UNSAFE_MARKER,
            Signature {
                params: vec![],
                ret: None,
                call_conv: CallConv::C,
            },
            false,
        );
        let execute_c_internal = module.declare_function(
            symbols::EXECUTE_C_INTERNAL,
            Signature {
                params: vec![Type::I32, Type::Ptr, Type::Ptr, Type::Ptr],
                ret: None,
                call_conv: CallConv::C,
            },
            false,
        );
        let register_clone = module.declare_function(
            symbols::REGISTER_CLONE,
            Signature {
                params: vec![Type::Ptr, Type::Ptr],
                ret: None,
                call_conv: CallConv::C,
            },
            false,
        );

        Self {
            loads,
            stores,
            malloc,
            aligned_alloc,
            free,
            memcpy,
            memset,
            memmove,
            translate_call,
            unsafe_marker,
            execute_c_internal,
            register_clone,
        }
    }

    pub fn load_for(&self, ty: CanonicalType) -> FuncId {
        self.loads[ty.index()]
    }

    pub fn store_for(&self, ty: CanonicalType) -> FuncId {
        self.stores[ty.index()]
    }
}

fn canonical_to_type(ty: CanonicalType) -> Type {
    match ty {
        CanonicalType::U1 => Type::I8,
        CanonicalType::U2 => Type::I16,
        CanonicalType::U4 => Type::I32,
        CanonicalType::U8 => Type::I64,
        CanonicalType::F32 => Type::F32,
        CanonicalType::F64 => Type::F64,
        CanonicalType::F80 => Type::F80,
        CanonicalType::Ptr => Type::Ptr,
    }
}
