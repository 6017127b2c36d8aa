//! Out-of-order accumulation of transitions prior to matrix flush.

use curtail_model::{SparseMatrixBuilder, StateId};

/// A single buffered edge.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub to: StateId,
    pub rate: f64,
}

/// Per-row transition lists accepting out-of-order insertion.
///
/// At flush time each row is emitted sorted by target id with duplicate
/// targets merged by summing their rates. Rows without any transition
/// materialise as rate-1 self-loops, which closes deadlocked states.
#[derive(Debug, Clone, Default)]
pub struct TransitionBuffer {
    rows: Vec<Vec<Transition>>,
    len: usize,
}

impl TransitionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the edge `(from, to, rate)`, growing the row table to cover
    /// both endpoints.
    pub fn push(&mut self, from: StateId, to: StateId, rate: f64) {
        let needed = from.index().max(to.index()) + 1;
        if self.rows.len() < needed {
            self.rows.resize_with(needed, Vec::new);
        }
        self.rows[from.index()].push(Transition { to, rate });
        self.len += 1;
    }

    /// Number of buffered transitions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn row_is_empty(&self, id: StateId) -> bool {
        self.rows
            .get(id.index())
            .map(|row| row.is_empty())
            .unwrap_or(true)
    }

    /// Grows the row table so at least `rows` rows take part in the flush.
    pub fn ensure_rows(&mut self, rows: usize) {
        if self.rows.len() < rows {
            self.rows.resize_with(rows, Vec::new);
        }
    }

    /// Emits every row into `builder`: sorted by target, duplicates merged,
    /// empty rows closed as self-loops. The buffer itself is left untouched
    /// so successive refinement passes can flush again.
    pub fn flush_into(&self, builder: &mut SparseMatrixBuilder) {
        for (row, transitions) in self.rows.iter().enumerate() {
            if transitions.is_empty() {
                builder.add_next_value(row as u32, row as u32, 1.0);
                continue;
            }
            let mut sorted = transitions.clone();
            sorted.sort_by_key(|t| t.to);
            let mut i = 0;
            while i < sorted.len() {
                let to = sorted[i].to;
                let mut rate = sorted[i].rate;
                i += 1;
                while i < sorted.len() && sorted[i].to == to {
                    rate += sorted[i].rate;
                    i += 1;
                }
                builder.add_next_value(row as u32, to.as_u32(), rate);
            }
        }
    }
}
