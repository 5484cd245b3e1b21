use quiver_planner::Symbol;

use crate::value::TypedValue;

/// A fixed-slot row: one [`TypedValue`] per symbol the plan binds.
#[derive(Debug, Clone)]
pub struct Frame {
    slots: Vec<TypedValue>,
}

impl Frame {
    pub fn new(size: usize) -> Self {
        Frame {
            slots: vec![TypedValue::Null; size],
        }
    }

    pub fn get(&self, symbol: Symbol) -> &TypedValue {
        &self.slots[symbol.position()]
    }

    pub fn set(&mut self, symbol: Symbol, value: TypedValue) {
        self.slots[symbol.position()] = value;
    }

    pub fn take_snapshot(&self, symbols: &[Symbol]) -> Vec<TypedValue> {
        symbols.iter().map(|symbol| self.get(*symbol).clone()).collect()
    }

    pub fn restore_snapshot(&mut self, symbols: &[Symbol], values: &[TypedValue]) {
        for (symbol, value) in symbols.iter().zip(values) {
            self.set(*symbol, value.clone());
        }
    }
}
