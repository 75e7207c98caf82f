#![allow(dead_code)]

use simcore::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Productivity {
    pub rate: f32,
}

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

/// Spawns `count` agents carrying both bench components.
pub fn populate(store: &Store, count: usize) {
    for index in 0..count {
        let entity = store.new_entity();
        let mut bundle = Bundle::new();
        bundle.insert(register_component::<Wealth>(), Wealth { value: index as f32 });
        bundle.insert(register_component::<Productivity>(), Productivity { rate: 0.01 });
        store.write_bundle(entity, bundle);
    }
}
