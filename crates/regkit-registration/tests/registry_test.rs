use std::thread;

use proptest::prelude::*;
use regkit_core::{PixelType, TypeSignature};
use regkit_registration::pipeline::PIPELINE_FAMILY;
use regkit_registration::registry::global;

const PIXEL_TYPES: [PixelType; 8] = [
    PixelType::Char,
    PixelType::UnsignedChar,
    PixelType::Short,
    PixelType::UnsignedShort,
    PixelType::Int,
    PixelType::UnsignedInt,
    PixelType::Float,
    PixelType::Double,
];

fn signature() -> impl Strategy<Value = TypeSignature> {
    (0..PIXEL_TYPES.len(), 1usize..5, 0..PIXEL_TYPES.len(), 1usize..5)
        .prop_map(|(fp, fd, mp, md)| TypeSignature::new(PIXEL_TYPES[fp], fd, PIXEL_TYPES[mp], md))
}

proptest! {
    #[test]
    fn index_lookup_is_deterministic(signature in signature()) {
        let registry = global();
        let first = registry.index_for(&signature);
        prop_assert_eq!(first, registry.index_for(&signature));
        if let Some(index) = first {
            prop_assert_eq!(registry.signature(index), Some(&signature));
            prop_assert!(registry.lookup(PIPELINE_FAMILY, index).is_some());
        }
    }

    #[test]
    fn only_symmetric_float_and_double_are_compiled(signature in signature()) {
        let compiled = signature.fixed_pixel_type == signature.moving_pixel_type
            && signature.fixed_dimension == signature.moving_dimension
            && matches!(signature.fixed_pixel_type, PixelType::Float | PixelType::Double)
            && matches!(signature.fixed_dimension, 2 | 3);
        prop_assert_eq!(global().index_for(&signature).is_some(), compiled);
    }
}

#[test]
fn test_global_registry_is_built_once() {
    let addresses: Vec<usize> = (0..8)
        .map(|_| thread::spawn(|| global() as *const _ as usize))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(addresses[0], global() as *const _ as usize);
}

#[test]
fn test_lookups_do_not_change_the_registry() {
    let registry = global();
    let before = registry.len();
    let index = registry
        .index_for(&TypeSignature::symmetric(PixelType::Float, 2))
        .unwrap();
    for _ in 0..3 {
        assert!(registry.create("AdvancedMeanSquares", index).is_some());
        assert!(registry.create("NoSuchComponent", index).is_none());
    }
    assert_eq!(registry.len(), before);
    assert_eq!(registry.signatures().count(), 4);
}

#[test]
fn test_each_signature_gets_a_fresh_instance() {
    let registry = global();
    let index = registry
        .index_for(&TypeSignature::symmetric(PixelType::Double, 3))
        .unwrap();
    let a = registry.create("TranslationTransform", index).unwrap();
    let b = registry.create("TranslationTransform", index).unwrap();
    assert!(!std::ptr::eq(a.as_ref(), b.as_ref()));
}
