use smol_str::SmolStr;

/// A frame slot assigned during semantic analysis. Executor frames are
/// indexed by the symbol's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol {
    position: usize,
}

impl Symbol {
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Maps variable names to frame slots. Slots are never reused within one
/// query, so a frame sized to `len()` fits every binding the plan touches.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    names: Vec<SmolStr>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh slot, shadowing any previous binding of the name.
    pub fn create(&mut self, name: &str) -> Symbol {
        self.names.push(SmolStr::new(name));
        Symbol {
            position: self.names.len() - 1,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        // Latest binding wins, matching shadowing across WITH boundaries.
        self.names
            .iter()
            .rposition(|existing| existing == name)
            .map(|position| Symbol { position })
    }

    pub fn get_or_create(&mut self, name: &str) -> Symbol {
        self.lookup(name).unwrap_or_else(|| self.create(name))
    }

    pub fn name(&self, symbol: Symbol) -> &str {
        &self.names[symbol.position]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_shadows_and_lookup_finds_latest() {
        let mut table = SymbolTable::new();
        let first = table.create("n");
        let second = table.create("n");
        assert_ne!(first, second);
        assert_eq!(table.lookup("n"), Some(second));
        assert_eq!(table.get_or_create("n"), second);
        assert_eq!(table.len(), 2);
    }
}
