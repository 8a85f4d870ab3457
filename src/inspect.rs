//! The scope/variable inspector.
//!
//! While the target is paused, scopes and expandable values are handed
//! to the front-end as integer handles. Handles live in an arena keyed
//! by handle number, with parents referenced by handle; the whole arena
//! and the handle counter are cleared on every resume, so a handle is
//! only meaningful within the pause that produced it.

use std::collections::HashMap;

use crate::host::{Bindings, Value, ValueView};
use crate::message::{ScopeDescriptor, VariableDescriptor, VariablesFilter};
use crate::Error;

// name, type and parent ride along for future set-variable support;
// only the value itself is read today
#[allow(dead_code)]
enum Slot {
    /// A root scope: the frame's locals or globals.
    Scope(Bindings),
    /// A value reached by expanding its parent.
    Value {
        value: Value,
        name: String,
        type_name: String,
        parent: usize,
    },
}

pub struct Inspector {
    slots: HashMap<usize, Slot>,
    next_id: usize,
}

impl Inspector {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_id: 0,
        }
    }

    /// Drop every handle and restart the counter. Called on resume.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.next_id = 0;
    }

    fn allocate(&mut self, slot: Slot) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(id, slot);
        id
    }

    /// Register a root scope and describe it for the `scopes` response.
    pub fn scope(
        &mut self,
        bindings: Bindings,
        name: &'static str,
        expensive: bool,
    ) -> ScopeDescriptor {
        let named_variables = bindings.len();
        let variables_reference = self.allocate(Slot::Scope(bindings));
        ScopeDescriptor {
            name,
            variables_reference,
            expensive,
            named_variables,
        }
    }

    /// Expand a handle into variable descriptors, honoring the filter
    /// and paging parameters.
    pub fn expand(
        &mut self,
        reference: usize,
        filter: Option<VariablesFilter>,
        start: Option<usize>,
        count: Option<usize>,
    ) -> Result<Vec<VariableDescriptor>, Error> {
        let entries = match self.slots.get(&reference).ok_or(Error::UnknownReference)? {
            Slot::Scope(bindings) => {
                if filter == Some(VariablesFilter::Indexed) {
                    return Ok(Vec::new());
                }
                named_entries(bindings.clone())
            }
            Slot::Value { value, .. } => match value.view() {
                ValueView::Mapping(entries) => {
                    if filter == Some(VariablesFilter::Indexed) {
                        return Ok(Vec::new());
                    }
                    named_entries(entries)
                }
                ValueView::Fields(fields) => {
                    if filter == Some(VariablesFilter::Indexed) {
                        return Ok(Vec::new());
                    }
                    named_entries(fields)
                }
                ValueView::Sequence(items) => {
                    if filter == Some(VariablesFilter::Named) {
                        return Ok(Vec::new());
                    }
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(index, value)| (index.to_string(), value))
                        .collect()
                }
                ValueView::Opaque => Vec::new(),
            },
        };

        // start = 0 means from the beginning, count = 0 means all
        let skip = start.unwrap_or(0);
        let take = match count {
            Some(0) | None => usize::MAX,
            Some(count) => count,
        };

        let mut variables = Vec::new();
        for (name, value) in entries.into_iter().skip(skip).take(take) {
            variables.push(self.descriptor(reference, name, value));
        }
        Ok(variables)
    }

    fn descriptor(&mut self, parent: usize, name: String, value: Value) -> VariableDescriptor {
        let (named_variables, indexed_variables) = match value.view() {
            ValueView::Mapping(entries) => (Some(entries.len()), None),
            ValueView::Sequence(items) => (None, Some(items.len())),
            ValueView::Fields(fields) => (Some(fields.len()), None),
            ValueView::Opaque => (None, None),
        };

        let rendered = value.render();
        let type_name = value.type_name();
        let reference = self.allocate(Slot::Value {
            value,
            name: name.clone(),
            type_name: type_name.clone(),
            parent,
        });

        VariableDescriptor {
            evaluate_name: name.clone(),
            name,
            value: rendered,
            type_name,
            variables_reference: reference,
            named_variables,
            indexed_variables,
        }
    }
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort a named enumeration by key and move any `self` entry to the
/// front.
fn named_entries(mut entries: Vec<(String, Value)>) -> Vec<(String, Value)> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some(position) = entries.iter().position(|(name, _)| name == "self") {
        let own = entries.remove(position);
        entries.insert(0, own);
    }
    entries
}
