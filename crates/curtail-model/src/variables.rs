//! Variable layout information for compressed states.

use crate::state::CompressedState;

/// Name of the distinguished boolean that encodes the synthetic sink.
pub const ABSORBING_VARIABLE: &str = "Absorbing";

/// A boolean program variable occupying a single bit.
#[derive(Debug, Clone)]
pub struct BooleanVariable {
    pub name: String,
    pub bit_offset: u32,
}

/// A bounded integer program variable, stored as an offset from its lower bound.
#[derive(Debug, Clone)]
pub struct IntegerVariable {
    pub name: String,
    pub bit_offset: u32,
    pub bit_width: u32,
    pub lower_bound: i64,
}

/// Bit layout of all program variables within a `CompressedState`.
///
/// Variables are packed back to back in declaration order. The layout is
/// produced by the next-state oracle and consumed here to build the sink
/// valuation and to decode states for export.
#[derive(Debug, Clone, Default)]
pub struct VariableInformation {
    pub booleans: Vec<BooleanVariable>,
    pub integers: Vec<IntegerVariable>,
    pub total_bit_count: u32,
}

impl VariableInformation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a boolean variable at the next free bit.
    pub fn with_boolean(mut self, name: &str) -> Self {
        self.booleans.push(BooleanVariable {
            name: name.to_string(),
            bit_offset: self.total_bit_count,
        });
        self.total_bit_count += 1;
        self
    }

    /// Appends a bounded integer variable at the next free bit.
    pub fn with_integer(mut self, name: &str, bit_width: u32, lower_bound: i64) -> Self {
        self.integers.push(IntegerVariable {
            name: name.to_string(),
            bit_offset: self.total_bit_count,
            bit_width,
            lower_bound,
        });
        self.total_bit_count += bit_width;
        self
    }

    /// A zeroed valuation of this layout.
    pub fn empty_state(&self) -> CompressedState {
        CompressedState::new(self.total_bit_count)
    }

    /// The sink valuation: everything zeroed except the `Absorbing` flag.
    /// Returns `None` when the layout carries no such flag.
    pub fn absorbing_state(&self) -> Option<CompressedState> {
        let var = self.booleans.iter().find(|v| v.name == ABSORBING_VARIABLE)?;
        let mut state = self.empty_state();
        state.set_bit(var.bit_offset, true);
        Some(state)
    }

    pub fn boolean_value(&self, state: &CompressedState, name: &str) -> Option<bool> {
        let var = self.booleans.iter().find(|v| v.name == name)?;
        Some(state.get_bit(var.bit_offset))
    }

    pub fn integer_value(&self, state: &CompressedState, name: &str) -> Option<i64> {
        let var = self.integers.iter().find(|v| v.name == name)?;
        Some(state.get_bits(var.bit_offset, var.bit_width) as i64 + var.lower_bound)
    }

    /// Space-separated dump of all variable values in layout order.
    /// Booleans print as 0/1, integers as signed decimals.
    pub fn value_dump(&self, state: &CompressedState) -> String {
        let mut fields: Vec<(u32, String)> =
            Vec::with_capacity(self.booleans.len() + self.integers.len());
        for var in &self.booleans {
            let value = state.get_bit(var.bit_offset) as u8;
            fields.push((var.bit_offset, value.to_string()));
        }
        for var in &self.integers {
            let value = state.get_bits(var.bit_offset, var.bit_width) as i64 + var.lower_bound;
            fields.push((var.bit_offset, value.to_string()));
        }
        fields.sort_by_key(|&(offset, _)| offset);
        let values: Vec<String> = fields.into_iter().map(|(_, v)| v).collect();
        values.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> VariableInformation {
        VariableInformation::new()
            .with_boolean(ABSORBING_VARIABLE)
            .with_integer("queue", 8, 0)
            .with_boolean("busy")
    }

    #[test]
    fn test_layout_offsets() {
        let info = layout();
        assert_eq!(info.total_bit_count, 10);
        assert_eq!(info.booleans[0].bit_offset, 0);
        assert_eq!(info.integers[0].bit_offset, 1);
        assert_eq!(info.booleans[1].bit_offset, 9);
    }

    #[test]
    fn test_absorbing_state() {
        let info = layout();
        let sink = info.absorbing_state().unwrap();
        assert_eq!(info.boolean_value(&sink, ABSORBING_VARIABLE), Some(true));
        assert_eq!(info.integer_value(&sink, "queue"), Some(0));
        assert_eq!(info.boolean_value(&sink, "busy"), Some(false));
    }

    #[test]
    fn test_absorbing_state_missing_flag() {
        let info = VariableInformation::new().with_integer("x", 4, 0);
        assert!(info.absorbing_state().is_none());
    }

    #[test]
    fn test_value_dump_in_layout_order() {
        let info = layout();
        let mut state = info.empty_state();
        state.set_bits(1, 8, 42);
        state.set_bit(9, true);
        assert_eq!(info.value_dump(&state), "0 42 1");
    }

    #[test]
    fn test_integer_lower_bound() {
        let info = VariableInformation::new().with_integer("delta", 4, -5);
        let mut state = info.empty_state();
        state.set_bits(0, 4, 3);
        assert_eq!(info.integer_value(&state, "delta"), Some(-2));
    }
}
